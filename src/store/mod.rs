//! Storage seams: accounts, teams and tokens.
//!
//! Two backends implement these traits: [`postgres::PgStore`] for the service
//! and [`memory::MemoryStore`] for tests and local runs. Both apply mutations
//! as a single compare-and-swap on the record version.

pub mod memory;
pub mod postgres;
pub mod version;

use crate::{
    auth::token::{Scope, TokenHash, TokenRecord},
    model::{Account, AccountId, NewAccount, NewTeam, Team, TeamId},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{future::Future, sync::Arc, time::Duration};
use thiserror::Error;
use version::Version;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated on {field}")]
    UniqueViolation { field: &'static str },

    #[error("record is still referenced")]
    InUse,

    #[error("record version cannot be incremented further")]
    VersionExhausted,

    #[error("storage operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("storage backend failure: {0}")]
    Backend(#[source] anyhow::Error),
}

/// Compare-and-swap primitives shared by every versioned record type.
#[async_trait]
pub trait VersionedStore<T: Send + Sync>: Send + Sync {
    async fn exists(&self, id: i64) -> Result<bool, StoreError>;

    /// Write `record` only if the stored version equals `expected`; returns the
    /// new version, or `None` when nothing matched.
    async fn update_if_version(
        &self,
        record: &T,
        expected: Version,
    ) -> Result<Option<Version>, StoreError>;

    /// Remove the record only if the stored version equals `expected`.
    async fn delete_if_version(&self, id: i64, expected: Version) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait AccountStore: VersionedStore<Account> {
    /// Store a new account at version 1, joining (and creating on demand) its team.
    async fn insert_account(&self, account: &NewAccount) -> Result<Account, StoreError>;

    async fn account(&self, id: AccountId) -> Result<Option<Account>, StoreError>;

    async fn account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;
}

#[async_trait]
pub trait TeamStore: VersionedStore<Team> {
    async fn insert_team(&self, team: &NewTeam) -> Result<Team, StoreError>;

    async fn team(&self, id: TeamId) -> Result<Option<Team>, StoreError>;

    async fn team_by_name(&self, name: &str) -> Result<Option<Team>, StoreError>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert_token(&self, record: &TokenRecord) -> Result<(), StoreError>;

    /// Owner of the token with `hash` and `scope` whose expiry is after `now`.
    async fn account_for_token(
        &self,
        scope: Scope,
        hash: &TokenHash,
        now: DateTime<Utc>,
    ) -> Result<Option<Account>, StoreError>;

    async fn delete_tokens(&self, scope: Scope, account_id: AccountId) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Everything the service needs from a backend.
pub trait Store: AccountStore + TeamStore + TokenStore + HealthCheck {}

impl<T: AccountStore + TeamStore + TokenStore + HealthCheck> Store for T {}

pub type SharedStore = Arc<dyn Store>;

/// Bound a storage future by `limit`. A timeout is a failure, never an answer.
///
/// # Errors
/// `StoreError::Timeout` when `limit` elapses, otherwise the future's error.
pub async fn with_timeout<T, E, F>(limit: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<StoreError>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}
