//! Optimistic versioning for mutable records.
//!
//! Every account and team row carries a `version` that starts at 1 and grows
//! by one on each successful update. Writers must present the version they
//! last read; the store applies the change only if it still matches.

use super::VersionedStore;
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use utoipa::ToSchema;

#[derive(
    ToSchema, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i32);

impl Version {
    pub const INITIAL: Self = Self(1);

    /// `None` for anything below [`Version::INITIAL`].
    #[must_use]
    pub fn new(value: i32) -> Option<Self> {
        (value >= Self::INITIAL.0).then_some(Self(value))
    }

    #[must_use]
    pub fn get(self) -> i32 {
        self.0
    }

    /// `None` once the counter is exhausted; a record at `i32::MAX` cannot
    /// be written again.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Version-checked update and delete on top of any [`VersionedStore`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ConcurrencyGuard;

impl ConcurrencyGuard {
    /// Apply `record` if the stored version is still `expected`; returns the
    /// new version.
    ///
    /// # Errors
    /// `Error::Conflict` when another writer got there first, `Error::Duplicate`
    /// on a unique-key clash, `Error::Internal` on storage failure.
    pub async fn update<S, T>(&self, store: &S, record: &T, expected: Version) -> Result<Version, Error>
    where
        S: VersionedStore<T> + ?Sized,
        T: Send + Sync,
    {
        match store.update_if_version(record, expected).await? {
            Some(version) => Ok(version),
            None => {
                debug!("update rejected, version {} is stale", expected);
                Err(Error::Conflict)
            }
        }
    }

    /// Delete record `id` if its stored version is still `expected`.
    ///
    /// # Errors
    /// `Error::Conflict` if the record exists with another version,
    /// `Error::NotFound` if it does not exist at all.
    pub async fn delete<S, T>(&self, store: &S, id: i64, expected: Version) -> Result<(), Error>
    where
        S: VersionedStore<T> + ?Sized,
        T: Send + Sync,
    {
        if store.delete_if_version(id, expected).await? {
            return Ok(());
        }

        if store.exists(id).await? {
            debug!("delete of {} rejected, version {} is stale", id, expected);
            Err(Error::Conflict)
        } else {
            Err(Error::NotFound)
        }
    }
}
