//! Crate-wide error type.
//!
//! Every failure a request can hit ends up as one of these variants; the HTTP
//! layer maps them to status codes in `api::errors`.

use crate::{
    auth::{password::CredentialError, policy::PolicyError, token::TokenError},
    store::StoreError,
};
use std::collections::BTreeMap;
use thiserror::Error;

/// Field name to human readable message, returned together as `{"errors": {...}}`.
pub type FieldErrors = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed validation")]
    Validation(FieldErrors),

    #[error("invalid or missing authentication token")]
    InvalidToken,

    #[error("invalid authentication credentials")]
    InvalidCredentials,

    #[error("your user account doesn't have the necessary permissions ({0})")]
    NotPermitted(String),

    #[error("unable to update the record due to an edit conflict, please try again")]
    Conflict,

    #[error("{field} already exists")]
    Duplicate { field: String },

    #[error("the requested resource could not be found")]
    NotFound,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl Error {
    /// Shorthand for a validation failure on a single field.
    pub fn field(key: &str, message: &str) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(key.to_string(), message.to_string());
        Self::Validation(errors)
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation { field } => Self::Duplicate {
                field: field.to_string(),
            },
            StoreError::InUse => Self::field("team", "team still has members"),
            other => Self::Internal(anyhow::Error::new(other)),
        }
    }
}

impl From<TokenError> for Error {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed | TokenError::NotFound => Self::InvalidToken,
            TokenError::Storage(err) => Self::from(err),
            other @ TokenError::Issue(_) => Self::Internal(anyhow::Error::new(other)),
        }
    }
}

impl From<CredentialError> for Error {
    fn from(err: CredentialError) -> Self {
        Self::Internal(anyhow::Error::new(err))
    }
}

impl From<PolicyError> for Error {
    fn from(err: PolicyError) -> Self {
        Self::Internal(anyhow::Error::new(err))
    }
}
