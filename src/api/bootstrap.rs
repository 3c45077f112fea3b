//! First administrator, created at startup so somebody holds `users-write`.

use crate::{
    auth::password::PasswordHash,
    error::Error,
    model::{normalize_email, validate_email, validate_password_plaintext, validate_team_name, NewAccount, Validator},
    store::Store,
};
use secrecy::SecretString;
use tracing::{info, warn};

pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone)]
pub struct AdminAccount {
    pub email: String,
    pub password: SecretString,
    pub team: String,
}

/// Make sure an account with the administrator email exists.
///
/// An existing account is left as it is, whatever its role.
///
/// # Errors
/// Returns `Error::Validation` for malformed credentials and store errors as-is.
pub async fn ensure_admin(store: &dyn Store, admin: &AdminAccount) -> Result<(), Error> {
    let email = normalize_email(&admin.email);

    let mut v = Validator::new();
    validate_email(&mut v, &email);
    validate_password_plaintext(&mut v, &admin.password);
    validate_team_name(&mut v, &admin.team);
    v.finish()?;

    if let Some(existing) = store.account_by_email(&email).await? {
        info!("administrator account {} already exists", existing.id);
        return Ok(());
    }

    let password = PasswordHash::set(&admin.password).await?;
    let new_account = NewAccount::build(&email, password, ADMIN_ROLE, &admin.team, true)?;

    match store.insert_account(&new_account).await.map_err(Error::from) {
        Ok(account) => {
            info!("created administrator account {} in team {}", account.id, new_account.team());
            Ok(())
        }
        // another instance won the race
        Err(Error::Duplicate { .. }) => {
            warn!("administrator account was created concurrently");
            Ok(())
        }
        Err(err) => Err(err),
    }
}
