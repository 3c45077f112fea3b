use super::token::{Scope, TokenError, TokenService};
use crate::{error::Error, model::Identity};
use tracing::debug;

/// Maps the `Authorization` header of one request to an [`Identity`].
#[derive(Clone)]
pub struct AuthenticationResolver {
    tokens: TokenService,
}

impl AuthenticationResolver {
    #[must_use]
    pub fn new(tokens: TokenService) -> Self {
        Self { tokens }
    }

    /// No header means anonymous. Anything other than `Bearer <login token>`
    /// resolving to a live token is `Error::InvalidToken`; callers cannot tell
    /// the failure modes apart.
    ///
    /// # Errors
    /// `Error::InvalidToken`, or `Error::Internal` when storage fails.
    pub async fn authenticate(&self, header: Option<&str>) -> Result<Identity, Error> {
        let Some(header) = header else {
            return Ok(Identity::Anonymous);
        };

        let parts: Vec<&str> = header.split(' ').collect();
        let token = match parts.as_slice() {
            ["Bearer", token] if !token.is_empty() => *token,
            _ => {
                debug!("rejected malformed authorization header");
                return Err(Error::InvalidToken);
            }
        };

        match self.tokens.validate(Scope::Login, token).await {
            Ok(account) => Ok(Identity::from(account)),
            Err(TokenError::Malformed | TokenError::NotFound) => Err(Error::InvalidToken),
            Err(err) => Err(Error::Internal(anyhow::Error::new(err))),
        }
    }
}
