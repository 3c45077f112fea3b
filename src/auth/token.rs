//! Opaque bearer tokens.
//!
//! A token is `<prefix><payload>`: a four character scope tag followed by 16
//! random bytes as unpadded URL-safe base64 (22 chars), 26 chars in total.
//! The plaintext goes back to the caller once; storage only sees the SHA-256
//! digest of the full string.

use crate::{
    model::{Account, AccountId},
    store::{SharedStore, StoreError},
};
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::{fmt, time::Duration};
use thiserror::Error;
use tracing::{debug, Instrument};

const RANDOM_BYTES: usize = 16;
const PREFIX_LEN: usize = 4;
const PAYLOAD_LEN: usize = 22;
pub const TOKEN_LEN: usize = PREFIX_LEN + PAYLOAD_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Full session token handed out at login.
    Login,
    /// Restricted token for automation.
    ReadOnly,
}

impl Scope {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::ReadOnly => "read-only",
        }
    }

    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Login => "sml_",
            Self::ReadOnly => "smr_",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,

    #[error("token not found")]
    NotFound,

    #[error("failed to issue token: {0}")]
    Issue(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// SHA-256 digest of a token plaintext; the only form that is persisted.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenHash([u8; 32]);

impl TokenHash {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Rebuild from a stored column; `None` unless exactly 32 bytes.
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; 32]>::try_from(bytes).ok().map(Self)
    }
}

impl fmt::Debug for TokenHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenHash(")?;
        for byte in &self.0[..4] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "..)")
    }
}

/// What the token store keeps for each issued token.
#[derive(Debug, Clone)]
pub struct TokenRecord {
    pub hash: TokenHash,
    pub account_id: AccountId,
    pub expiry: DateTime<Utc>,
    pub scope: Scope,
}

/// A freshly issued token. The plaintext is not retrievable again.
#[derive(Debug)]
pub struct Token {
    plaintext: SecretString,
    record: TokenRecord,
}

impl Token {
    #[must_use]
    pub fn plaintext(&self) -> &SecretString {
        &self.plaintext
    }

    #[must_use]
    pub fn hash(&self) -> &TokenHash {
        &self.record.hash
    }

    #[must_use]
    pub fn expiry(&self) -> DateTime<Utc> {
        self.record.expiry
    }

    #[must_use]
    pub fn scope(&self) -> Scope {
        self.record.scope
    }
}

/// Hash a token so raw values never touch the database.
#[must_use]
pub fn digest(plaintext: &str) -> TokenHash {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    TokenHash(hasher.finalize().into())
}

/// Create a new random token plaintext for `scope`.
///
/// # Errors
/// `TokenError::Issue` if the OS random source fails.
pub fn generate(scope: Scope) -> Result<SecretString, TokenError> {
    let mut bytes = [0u8; RANDOM_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| TokenError::Issue(err.to_string()))?;

    Ok(SecretString::from(format!(
        "{}{}",
        scope.prefix(),
        Base64UrlUnpadded::encode_string(&bytes)
    )))
}

/// Cheap shape check done before any hashing or storage access.
///
/// # Errors
/// `TokenError::Malformed` for the wrong length, a prefix that does not belong
/// to `scope`, or a payload that is not 16 bytes of base64url.
pub fn check_format(scope: Scope, presented: &str) -> Result<(), TokenError> {
    if presented.len() != TOKEN_LEN {
        return Err(TokenError::Malformed);
    }

    let payload = presented
        .strip_prefix(scope.prefix())
        .ok_or(TokenError::Malformed)?;

    let mut buf = [0u8; RANDOM_BYTES];
    let decoded =
        Base64UrlUnpadded::decode(payload, &mut buf).map_err(|_| TokenError::Malformed)?;

    if decoded.len() == RANDOM_BYTES {
        Ok(())
    } else {
        Err(TokenError::Malformed)
    }
}

/// Issues, validates and revokes tokens against the token store.
#[derive(Clone)]
pub struct TokenService {
    store: SharedStore,
}

impl TokenService {
    #[must_use]
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Issue a token for `account_id` valid for `ttl`.
    ///
    /// # Errors
    /// `TokenError::Issue` when randomness or the expiry computation fails,
    /// `TokenError::Storage` when the record cannot be stored.
    pub async fn issue(
        &self,
        account_id: AccountId,
        ttl: Duration,
        scope: Scope,
    ) -> Result<Token, TokenError> {
        let ttl = chrono::Duration::from_std(ttl).map_err(|err| TokenError::Issue(err.to_string()))?;
        let expiry = Utc::now()
            .checked_add_signed(ttl)
            .ok_or_else(|| TokenError::Issue("expiry out of range".to_string()))?;

        let plaintext = generate(scope)?;
        let record = TokenRecord {
            hash: digest(plaintext.expose_secret()),
            account_id,
            expiry,
            scope,
        };

        let span = tracing::info_span!("token.issue", scope = scope.as_str(), account_id);
        self.store.insert_token(&record).instrument(span).await?;

        debug!("issued {} token for account {}", scope, account_id);

        Ok(Token { plaintext, record })
    }

    /// Resolve a presented token to its owning account.
    ///
    /// # Errors
    /// `TokenError::Malformed` on a bad shape, `TokenError::NotFound` when no
    /// unexpired token of `scope` has this digest.
    pub async fn validate(&self, scope: Scope, presented: &str) -> Result<Account, TokenError> {
        check_format(scope, presented)?;

        let hash = digest(presented);

        self.store
            .account_for_token(scope, &hash, Utc::now())
            .await?
            .ok_or(TokenError::NotFound)
    }

    /// Delete every token of `scope` owned by `account_id`.
    ///
    /// # Errors
    /// `TokenError::Storage` when the store fails.
    pub async fn revoke_all(&self, scope: Scope, account_id: AccountId) -> Result<u64, TokenError> {
        Ok(self.store.delete_tokens(scope, account_id).await?)
    }
}
