use super::policy::PolicyStore;
use crate::{
    error::Error,
    model::Identity,
    store::SharedStore,
};
use std::sync::Arc;
use tracing::debug;

/// Decides whether an identity holds a permission code.
///
/// The account's role is read from storage on every call, so role changes
/// take effect on the next request.
#[derive(Clone)]
pub struct AuthorizationGate {
    store: SharedStore,
    policy: Arc<dyn PolicyStore>,
}

impl AuthorizationGate {
    #[must_use]
    pub fn new(store: SharedStore, policy: Arc<dyn PolicyStore>) -> Self {
        Self { store, policy }
    }

    /// # Errors
    /// - `Error::NotPermitted` for anonymous callers and roles lacking `code`
    /// - `Error::InvalidToken` if the account disappeared or was deactivated
    ///   since authentication
    /// - `Error::Internal` when the role or the store cannot be read
    pub async fn authorize(&self, identity: &Identity, code: &str) -> Result<(), Error> {
        let Identity::Account(account) = identity else {
            debug!("anonymous caller denied {}", code);
            return Err(Error::NotPermitted(code.to_string()));
        };

        let Some(current) = self.store.account(account.id).await? else {
            debug!("account {} no longer exists", account.id);
            return Err(Error::InvalidToken);
        };

        if !current.activated {
            debug!("account {} is deactivated", current.id);
            return Err(Error::InvalidToken);
        }

        let permissions = self.policy.permissions_for_role(&current.role)?;

        if permissions.include(code) {
            Ok(())
        } else {
            debug!(
                "account {} with role {:?} denied {}",
                current.id, current.role, code
            );
            Err(Error::NotPermitted(code.to_string()))
        }
    }
}
