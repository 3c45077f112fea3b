//! Records persisted by the stores and the field rules they must satisfy.

pub mod account;
pub mod identity;
pub mod team;

pub use account::{Account, AccountId, NewAccount};
pub use identity::Identity;
pub use team::{NewTeam, Team, TeamId, TeamMeta, TeamRef};

use crate::error::{Error, FieldErrors};
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};

pub const PASSWORD_MIN_BYTES: usize = 8;
pub const PASSWORD_MAX_BYTES: usize = 72;

/// Collects field errors so that every problem is reported in one response.
#[derive(Debug, Default)]
pub struct Validator {
    errors: FieldErrors,
}

impl Validator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` for `key` unless `ok`. The first message per key wins.
    pub fn check(&mut self, ok: bool, key: &str, message: &str) {
        if !ok {
            self.errors
                .entry(key.to_string())
                .or_insert_with(|| message.to_string());
        }
    }

    #[must_use]
    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// # Errors
    /// `Error::Validation` carrying every recorded field error.
    pub fn finish(self) -> Result<(), Error> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(self.errors))
        }
    }
}

/// Normalize an email for lookup and uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

pub fn validate_email(v: &mut Validator, email: &str) {
    v.check(!email.is_empty(), "email", "must be provided");
    v.check(valid_email(email), "email", "must be a valid email address");
}

pub fn validate_password_plaintext(v: &mut Validator, password: &SecretString) {
    let len = password.expose_secret().len();
    v.check(len > 0, "password", "must be provided");
    v.check(
        len >= PASSWORD_MIN_BYTES,
        "password",
        "must be at least 8 bytes long",
    );
    v.check(
        len <= PASSWORD_MAX_BYTES,
        "password",
        "must not be more than 72 bytes long",
    );
}

pub fn validate_team_name(v: &mut Validator, name: &str) {
    v.check(!name.trim().is_empty(), "team", "must be provided");
}
