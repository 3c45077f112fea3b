use super::body;
use crate::{
    api::state::AppState,
    auth::{
        password::PasswordHash,
        token::{Scope, Token},
    },
    error::Error,
    model::{normalize_email, validate_email, validate_password_plaintext, Identity, Validator},
};
use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use utoipa::ToSchema;

#[derive(ToSchema, Deserialize, Debug)]
pub struct Credentials {
    email: String,
    #[schema(value_type = String)]
    password: SecretString,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct IssuedToken {
    pub token: String,
    pub scope: String,
    pub expiry: DateTime<Utc>,
}

impl From<&Token> for IssuedToken {
    fn from(token: &Token) -> Self {
        Self {
            token: token.plaintext().expose_secret().to_string(),
            scope: token.scope().as_str().to_string(),
            expiry: token.expiry(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AuthenticationTokenResponse {
    pub authentication_token: IssuedToken,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ReadOnlyTokenResponse {
    pub read_only_token: IssuedToken,
}

#[utoipa::path(
    post,
    path= "/v1/tokens/authentication",
    request_body = Credentials,
    responses (
        (status = 201, description = "Login token issued", body = AuthenticationTokenResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 422, description = "Invalid email or password format"),
    ),
    tag= "tokens"
)]
#[instrument(skip_all)]
pub async fn login(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<impl IntoResponse, Error> {
    let input = body(payload)?;
    let email = normalize_email(&input.email);

    let mut v = Validator::new();
    validate_email(&mut v, &email);
    validate_password_plaintext(&mut v, &input.password);
    v.finish()?;

    let Some(account) = state.store.account_by_email(&email).await? else {
        PasswordHash::match_absent(&input.password).await?;
        debug!("login for unknown email");
        return Err(Error::InvalidCredentials);
    };

    if !account.password.matches(&input.password).await? {
        debug!("wrong password for account {}", account.id);
        return Err(Error::InvalidCredentials);
    }

    if !account.activated {
        debug!("login refused for deactivated account {}", account.id);
        return Err(Error::InvalidCredentials);
    }

    let token = state
        .tokens
        .issue(account.id, state.config.token_ttl(), Scope::Login)
        .await?;

    info!("account {} logged in", account.id);

    Ok((
        StatusCode::CREATED,
        Json(AuthenticationTokenResponse {
            authentication_token: IssuedToken::from(&token),
        }),
    ))
}

#[utoipa::path(
    delete,
    path= "/v1/tokens/authentication",
    responses (
        (status = 204, description = "All login tokens of the caller were removed"),
        (status = 401, description = "Missing or invalid token"),
    ),
    security(("bearer" = [])),
    tag= "tokens"
)]
#[instrument(skip_all)]
pub async fn logout(
    Extension(state): Extension<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, Error> {
    let account = identity.account().ok_or(Error::InvalidToken)?;

    let removed = state.tokens.revoke_all(Scope::Login, account.id).await?;

    info!("removed {} login tokens of account {}", removed, account.id);

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path= "/v1/tokens/read-only",
    responses (
        (status = 201, description = "Read-only token issued", body = ReadOnlyTokenResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Role lacks tokens-write"),
    ),
    security(("bearer" = [])),
    tag= "tokens"
)]
#[instrument(skip_all)]
pub async fn read_only(
    Extension(state): Extension<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, Error> {
    let account = identity.account().ok_or(Error::InvalidToken)?;

    let token = state
        .tokens
        .issue(account.id, state.config.token_ttl(), Scope::ReadOnly)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ReadOnlyTokenResponse {
            read_only_token: IssuedToken::from(&token),
        }),
    ))
}
