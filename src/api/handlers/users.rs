use super::{body, expected_version, id_param, VersionBody};
use crate::{
    api::state::AppState,
    auth::password::PasswordHash,
    error::Error,
    model::{
        normalize_email, validate_email, validate_password_plaintext, validate_team_name, Account,
        Identity, NewAccount, Validator,
    },
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
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;

fn default_activated() -> bool {
    true
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct CreateUser {
    email: String,
    #[schema(value_type = String)]
    password: SecretString,
    role: String,
    team: String,
    #[serde(default = "default_activated")]
    activated: bool,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct UpdateUser {
    version: i32,
    email: Option<String>,
    #[schema(value_type = Option<String>)]
    password: Option<SecretString>,
    role: Option<String>,
    activated: Option<bool>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct TeamRefView {
    pub id: i64,
    pub name: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserView {
    pub id: i64,
    pub email: String,
    pub activated: bool,
    pub role: String,
    pub team: Option<TeamRefView>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
}

impl From<&Account> for UserView {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            email: account.email.clone(),
            activated: account.activated,
            role: account.role.clone(),
            team: account.team.as_ref().map(|team| TeamRefView {
                id: team.id,
                name: team.name.clone(),
            }),
            version: account.version.get(),
            created_at: account.created_at,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserResponse {
    pub user: UserView,
}

impl UserResponse {
    fn new(account: &Account) -> Json<Self> {
        Json(Self {
            user: UserView::from(account),
        })
    }
}

#[utoipa::path(
    get,
    path= "/v1/users",
    responses (
        (status = 200, description = "The authenticated account", body = UserResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Role lacks users-read"),
    ),
    security(("bearer" = [])),
    tag= "users"
)]
pub async fn current(Extension(identity): Extension<Identity>) -> Result<impl IntoResponse, Error> {
    let account = identity.account().ok_or(Error::InvalidToken)?;

    Ok(UserResponse::new(account))
}

#[utoipa::path(
    post,
    path= "/v1/users",
    request_body = CreateUser,
    responses (
        (status = 201, description = "Account created", body = UserResponse),
        (status = 403, description = "Role lacks users-write"),
        (status = 422, description = "Invalid fields or email already taken"),
    ),
    security(("bearer" = [])),
    tag= "users"
)]
#[instrument(skip_all)]
pub async fn create(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<CreateUser>, JsonRejection>,
) -> Result<impl IntoResponse, Error> {
    let input = body(payload)?;
    let email = normalize_email(&input.email);

    let mut v = Validator::new();
    validate_email(&mut v, &email);
    validate_password_plaintext(&mut v, &input.password);
    v.check(!input.role.trim().is_empty(), "role", "must be provided");
    validate_team_name(&mut v, &input.team);
    v.finish()?;

    let password = PasswordHash::set(&input.password).await?;
    let new_account = NewAccount::build(&email, password, &input.role, &input.team, input.activated)?;

    let account = state.store.insert_account(&new_account).await?;

    info!("created account {} in team {}", account.id, new_account.team());

    Ok((StatusCode::CREATED, UserResponse::new(&account)))
}

#[utoipa::path(
    get,
    path= "/v1/users/{id}",
    params(("id" = i64, Path, description = "Account id")),
    responses (
        (status = 200, description = "Account", body = UserResponse),
        (status = 404, description = "No such account"),
    ),
    security(("bearer" = [])),
    tag= "users"
)]
pub async fn show(
    Extension(state): Extension<Arc<AppState>>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<impl IntoResponse, Error> {
    let id = id_param(path)?;

    let account = state.store.account(id).await?.ok_or(Error::NotFound)?;

    Ok(UserResponse::new(&account))
}

#[utoipa::path(
    patch,
    path= "/v1/users/{id}",
    params(("id" = i64, Path, description = "Account id")),
    request_body = UpdateUser,
    responses (
        (status = 200, description = "Account updated", body = UserResponse),
        (status = 404, description = "No such account"),
        (status = 409, description = "Version is stale"),
        (status = 422, description = "Invalid fields"),
    ),
    security(("bearer" = [])),
    tag= "users"
)]
#[instrument(skip_all)]
pub async fn update(
    Extension(state): Extension<Arc<AppState>>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<UpdateUser>, JsonRejection>,
) -> Result<impl IntoResponse, Error> {
    let id = id_param(path)?;
    let input = body(payload)?;
    let expected = expected_version(input.version)?;

    let mut account = state.store.account(id).await?.ok_or(Error::NotFound)?;

    let mut v = Validator::new();
    if let Some(email) = input.email {
        let email = normalize_email(&email);
        validate_email(&mut v, &email);
        account.email = email;
    }
    if let Some(password) = &input.password {
        validate_password_plaintext(&mut v, password);
    }
    if let Some(role) = input.role {
        let role = role.trim().to_string();
        v.check(!role.is_empty(), "role", "must be provided");
        account.role = role;
    }
    if let Some(activated) = input.activated {
        account.activated = activated;
    }
    v.finish()?;

    if let Some(password) = &input.password {
        account.password = PasswordHash::set(password).await?;
    }

    account.version = state.guard.update(&*state.store, &account, expected).await?;

    info!("updated account {} to version {}", account.id, account.version);

    Ok(UserResponse::new(&account))
}

#[utoipa::path(
    delete,
    path= "/v1/users/{id}",
    params(("id" = i64, Path, description = "Account id")),
    request_body = VersionBody,
    responses (
        (status = 200, description = "Account deleted"),
        (status = 404, description = "No such account"),
        (status = 409, description = "Version is stale"),
    ),
    security(("bearer" = [])),
    tag= "users"
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
        .delete::<_, Account>(&*state.store, id, expected)
        .await?;

    info!("deleted account {}", id);

    Ok(Json(json!({ "message": "user successfully deleted" })))
}
