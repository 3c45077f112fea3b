use super::{body, expected_version, id_param, VersionBody};
use crate::{
    api::state::AppState,
    error::Error,
    model::{validate_team_name, NewTeam, Team, TeamMeta, Validator},
};
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Extension, Path,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;

#[derive(ToSchema, Deserialize, Debug)]
pub struct CreateTeam {
    name: String,
    #[serde(default)]
    meta: TeamMeta,
}

#[derive(ToSchema, Deserialize, Debug, Default)]
pub struct TeamMetaPatch {
    git_url: Option<String>,
    server_url: Option<String>,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct UpdateTeam {
    version: i32,
    name: Option<String>,
    meta: Option<TeamMetaPatch>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TeamView {
    pub id: i64,
    pub name: String,
    pub meta: TeamMeta,
    pub num_members: i64,
    pub version: i32,
    pub created_at: DateTime<Utc>,
}

impl From<&Team> for TeamView {
    fn from(team: &Team) -> Self {
        Self {
            id: team.id,
            name: team.name.clone(),
            meta: team.meta.clone(),
            num_members: team.num_members,
            version: team.version.get(),
            created_at: team.created_at,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TeamResponse {
    pub team: TeamView,
}

impl TeamResponse {
    fn new(team: &Team) -> Json<Self> {
        Json(Self {
            team: TeamView::from(team),
        })
    }
}

#[utoipa::path(
    post,
    path= "/v1/teams",
    request_body = CreateTeam,
    responses (
        (status = 201, description = "Team created", body = TeamResponse),
        (status = 403, description = "Role lacks teams-write"),
        (status = 422, description = "Invalid fields or name already taken"),
    ),
    security(("bearer" = [])),
    tag= "teams"
)]
#[instrument(skip_all)]
pub async fn create(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<CreateTeam>, JsonRejection>,
) -> Result<impl IntoResponse, Error> {
    let input = body(payload)?;
    let new_team = NewTeam::build(&input.name, input.meta)?;

    let team = state.store.insert_team(&new_team).await?;

    info!("created team {} ({})", team.id, team.name);

    Ok((StatusCode::CREATED, TeamResponse::new(&team)))
}

#[utoipa::path(
    get,
    path= "/v1/teams/{id}",
    params(("id" = i64, Path, description = "Team id")),
    responses (
        (status = 200, description = "Team", body = TeamResponse),
        (status = 404, description = "No such team"),
    ),
    security(("bearer" = [])),
    tag= "teams"
)]
pub async fn show(
    Extension(state): Extension<Arc<AppState>>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<impl IntoResponse, Error> {
    let id = id_param(path)?;

    let team = state.store.team(id).await?.ok_or(Error::NotFound)?;

    Ok(TeamResponse::new(&team))
}

#[utoipa::path(
    patch,
    path= "/v1/teams/{id}",
    params(("id" = i64, Path, description = "Team id")),
    request_body = UpdateTeam,
    responses (
        (status = 200, description = "Team updated", body = TeamResponse),
        (status = 404, description = "No such team"),
        (status = 409, description = "Version is stale"),
        (status = 422, description = "Invalid fields or name already taken"),
    ),
    security(("bearer" = [])),
    tag= "teams"
)]
#[instrument(skip_all)]
pub async fn update(
    Extension(state): Extension<Arc<AppState>>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<UpdateTeam>, JsonRejection>,
) -> Result<impl IntoResponse, Error> {
    let id = id_param(path)?;
    let input = body(payload)?;
    let expected = expected_version(input.version)?;

    let mut team = state.store.team(id).await?.ok_or(Error::NotFound)?;

    let mut v = Validator::new();
    if let Some(name) = input.name {
        let name = name.trim().to_string();
        validate_team_name(&mut v, &name);
        team.name = name;
    }
    v.finish()?;

    let patch = input.meta.unwrap_or_default();
    if let Some(git_url) = patch.git_url {
        team.meta.git_url = git_url;
    }
    if let Some(server_url) = patch.server_url {
        team.meta.server_url = server_url;
    }

    team.version = state.guard.update(&*state.store, &team, expected).await?;

    info!("updated team {} to version {}", team.id, team.version);

    Ok(TeamResponse::new(&team))
}

#[utoipa::path(
    delete,
    path= "/v1/teams/{id}",
    params(("id" = i64, Path, description = "Team id")),
    request_body = VersionBody,
    responses (
        (status = 200, description = "Team deleted"),
        (status = 404, description = "No such team"),
        (status = 409, description = "Version is stale"),
        (status = 422, description = "Team still has members"),
    ),
    security(("bearer" = [])),
    tag= "teams"
)]
#[instrument(skip_all)]
pub async fn delete(
    Extension(state): Extension<Arc<AppState>>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<VersionBody>, JsonRejection>,
) -> Result<impl IntoResponse, Error> {
    let id = id_param(path)?;
    let expected = expected_version(body(payload)?.version)?;

    state
        .guard
        .delete::<_, Team>(&*state.store, id, expected)
        .await?;

    info!("deleted team {}", id);

    Ok(Json(json!({ "message": "team successfully deleted" })))
}
