use crate::error::Error;
use axum::{
    http::{header::WWW_AUTHENTICATE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(errors) => {
                (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "errors": errors }))).into_response()
            }

            Self::InvalidToken => {
                let mut response = (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "error": Self::InvalidToken.to_string() })),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                response
            }

            Self::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "invalid credentials" })),
            )
                .into_response(),

            Self::NotPermitted(_) => (
                StatusCode::FORBIDDEN,
                Json(json!({ "error": self.to_string() })),
            )
                .into_response(),

            Self::Conflict => (
                StatusCode::CONFLICT,
                Json(json!({ "error": self.to_string() })),
            )
                .into_response(),

            Self::Duplicate { field } => {
                let message = format!("a record with this {field} already exists");
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({ "errors": { field: message } })),
                )
                    .into_response()
            }

            Self::NotFound => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": self.to_string() })),
            )
                .into_response(),

            Self::Internal(err) => {
                error!("Internal error: {:#}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "the server encountered a problem and could not process your request"
                    })),
                )
                    .into_response()
            }
        }
    }
}
