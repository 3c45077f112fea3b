use super::{normalize_email, validate_email, validate_team_name, TeamRef, Validator};
use crate::{auth::password::PasswordHash, error::Error, store::version::Version};
use chrono::{DateTime, Utc};

pub type AccountId = i64;

/// A stored user account. The password is only ever held as a PHC hash.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: AccountId,
    pub email: String,
    pub password: PasswordHash,
    pub activated: bool,
    pub role: String,
    pub team: Option<TeamRef>,
    pub version: Version,
    pub created_at: DateTime<Utc>,
}

/// A validated account that has not been stored yet.
///
/// Building one requires a [`PasswordHash`], so an account without a
/// credential cannot reach the store.
#[derive(Debug, Clone)]
pub struct NewAccount {
    email: String,
    password: PasswordHash,
    activated: bool,
    role: String,
    team: String,
}

impl NewAccount {
    /// # Errors
    /// `Error::Validation` listing every invalid field.
    pub fn build(
        email: &str,
        password: PasswordHash,
        role: &str,
        team: &str,
        activated: bool,
    ) -> Result<Self, Error> {
        let email = normalize_email(email);
        let role = role.trim();
        let team = team.trim();

        let mut v = Validator::new();
        validate_email(&mut v, &email);
        v.check(!role.is_empty(), "role", "must be provided");
        validate_team_name(&mut v, team);
        v.finish()?;

        Ok(Self {
            email,
            password,
            activated,
            role: role.to_string(),
            team: team.to_string(),
        })
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    #[must_use]
    pub fn password(&self) -> &PasswordHash {
        &self.password
    }

    #[must_use]
    pub fn activated(&self) -> bool {
        self.activated
    }

    #[must_use]
    pub fn role(&self) -> &str {
        &self.role
    }

    /// Name of the team the account joins; created on demand by the store.
    #[must_use]
    pub fn team(&self) -> &str {
        &self.team
    }

    /// Turn the pending record into a stored one once the store assigned its keys.
    #[must_use]
    pub fn into_account(self, id: AccountId, team: TeamRef, created_at: DateTime<Utc>) -> Account {
        Account {
            id,
            email: self.email,
            password: self.password,
            activated: self.activated,
            role: self.role,
            team: Some(team),
            version: Version::INITIAL,
            created_at,
        }
    }
}
