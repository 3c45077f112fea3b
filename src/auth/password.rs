//! Password hashing and verification (Argon2id, PHC strings).
//!
//! Plaintext only ever arrives as a `&SecretString` parameter; nothing in this
//! module keeps it in a struct field. Both hashing and verification run on the
//! blocking pool because Argon2 is deliberately slow.

use argon2::{
    password_hash::{
        self, rand_core::OsRng, PasswordHash as PhcString, PasswordHasher, PasswordVerifier,
        SaltString,
    },
    Algorithm, Argon2, Params, Version,
};
use secrecy::{ExposeSecret, SecretString};
use std::{fmt, sync::OnceLock};
use thiserror::Error;

/// Memory cost in KiB (19 MiB).
const ARGON2_M_COST: u32 = 19 * 1024;
const ARGON2_T_COST: u32 = 2;
const ARGON2_P_COST: u32 = 1;

/// Plaintext behind [`DECOY`]. It is never stored, so it matches no account.
const DECOY_PLAINTEXT: &str = "sqlm-auth-no-such-account";

/// Hash compared against when a login names no account.
static DECOY: OnceLock<PasswordHash> = OnceLock::new();

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("stored password hash is malformed: {0}")]
    Malformed(String),

    #[error("password hashing failed: {0}")]
    Hashing(String),
}

/// A salted one-way password hash in PHC string form.
///
/// The cost parameters travel inside the string, so hashes created with older
/// parameters keep verifying.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHash(..)")
    }
}

impl PasswordHash {
    /// Wrap a PHC string read back from storage.
    #[must_use]
    pub fn from_phc(phc: String) -> Self {
        Self(phc)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hash `plaintext` with a fresh random salt.
    ///
    /// # Errors
    /// `CredentialError::Hashing` if Argon2 fails or the blocking task dies.
    pub async fn set(plaintext: &SecretString) -> Result<Self, CredentialError> {
        let plaintext = plaintext.clone();
        tokio::task::spawn_blocking(move || Self::set_blocking(&plaintext))
            .await
            .map_err(|err| CredentialError::Hashing(err.to_string()))?
    }

    /// Compare `candidate` against this hash.
    ///
    /// `Ok(false)` is a clean mismatch. Only `Ok(true)` means the password is
    /// correct; an error must never be treated as authenticated.
    ///
    /// # Errors
    /// `CredentialError::Malformed` when the stored hash cannot be parsed.
    pub async fn matches(&self, candidate: &SecretString) -> Result<bool, CredentialError> {
        let stored = self.clone();
        let candidate = candidate.clone();
        tokio::task::spawn_blocking(move || stored.matches_blocking(&candidate))
            .await
            .map_err(|err| CredentialError::Hashing(err.to_string()))?
    }

    /// Run one full verification for a login that found no account, so the
    /// response takes as long as a wrong password would. Always `Ok(false)`.
    ///
    /// # Errors
    /// `CredentialError::Hashing` if the decoy hash cannot be built.
    pub async fn match_absent(candidate: &SecretString) -> Result<bool, CredentialError> {
        let candidate = candidate.clone();
        tokio::task::spawn_blocking(move || {
            decoy()?.matches_blocking(&candidate)?;
            Ok(false)
        })
        .await
        .map_err(|err| CredentialError::Hashing(err.to_string()))?
    }

    /// # Errors
    /// `CredentialError::Hashing` if Argon2 fails.
    pub fn set_blocking(plaintext: &SecretString) -> Result<Self, CredentialError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = hasher()?
            .hash_password(plaintext.expose_secret().as_bytes(), &salt)
            .map_err(|err| CredentialError::Hashing(err.to_string()))?;

        Ok(Self(hash.to_string()))
    }

    /// # Errors
    /// `CredentialError::Malformed` when the stored hash cannot be parsed.
    pub fn matches_blocking(&self, candidate: &SecretString) -> Result<bool, CredentialError> {
        let parsed =
            PhcString::new(&self.0).map_err(|err| CredentialError::Malformed(err.to_string()))?;

        // Params come from the PHC string, not from the hasher defaults.
        match Argon2::default().verify_password(candidate.expose_secret().as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(err) => Err(CredentialError::Malformed(err.to_string())),
        }
    }
}

fn decoy() -> Result<&'static PasswordHash, CredentialError> {
    if let Some(hash) = DECOY.get() {
        return Ok(hash);
    }
    let hash = PasswordHash::set_blocking(&SecretString::from(DECOY_PLAINTEXT))?;
    Ok(DECOY.get_or_init(|| hash))
}

fn hasher() -> Result<Argon2<'static>, CredentialError> {
    let params = Params::new(ARGON2_M_COST, ARGON2_T_COST, ARGON2_P_COST, None)
        .map_err(|err| CredentialError::Hashing(err.to_string()))?;

    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}
