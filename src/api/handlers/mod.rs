pub mod health;
pub mod teams;
pub mod tokens;
pub mod users;

// common functions for the handlers
use crate::{error::Error, store::version::Version};
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path,
    },
    Json,
};
use serde::Deserialize;
use tracing::debug;
use utoipa::ToSchema;

/// Body of a version-checked delete.
#[derive(ToSchema, Deserialize, Debug)]
pub struct VersionBody {
    pub version: i32,
}

/// Unwrap a JSON body, turning a rejection into a `body` field error.
pub(crate) fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, Error> {
    match payload {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => {
            debug!("rejected request body: {}", rejection.body_text());
            Err(Error::field("body", &rejection.body_text()))
        }
    }
}

/// Record ids are positive; anything else addresses nothing.
pub(crate) fn id_param(path: Result<Path<i64>, PathRejection>) -> Result<i64, Error> {
    match path {
        Ok(Path(id)) if id > 0 => Ok(id),
        _ => Err(Error::NotFound),
    }
}

/// Last-known version sent by the client for an update or delete.
pub(crate) fn expected_version(version: i32) -> Result<Version, Error> {
    Version::new(version).ok_or_else(|| Error::field("version", "must be greater than zero"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_below_one_are_field_errors() {
        assert!(expected_version(1).is_ok());
        let Err(Error::Validation(errors)) = expected_version(0) else {
            panic!("expected validation error");
        };
        assert_eq!(errors["version"], "must be greater than zero");
    }

    #[test]
    fn non_positive_ids_are_not_found() {
        assert!(matches!(id_param(Ok(Path(0))), Err(Error::NotFound)));
        assert!(matches!(id_param(Ok(Path(-1))), Err(Error::NotFound)));
        assert_eq!(id_param(Ok(Path(9))).unwrap(), 9);
    }
}
