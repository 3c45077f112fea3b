//! In-process store used by tests and `--dsn memory://` runs.
//!
//! A single mutex guards all maps, so each trait method is atomic and the
//! version compare-and-swap behaves like the SQL `WHERE version = $n` form.
//! The lock is never held across an `.await`.

use super::{
    version::Version, AccountStore, HealthCheck, StoreError, TeamStore, TokenStore,
    VersionedStore,
};
use crate::{
    auth::token::{Scope, TokenHash, TokenRecord},
    model::{Account, AccountId, NewAccount, NewTeam, Team, TeamId, TeamMeta, TeamRef},
};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{
    collections::{BTreeMap, HashMap},
    sync::{Mutex, MutexGuard},
};

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    last_account_id: AccountId,
    last_team_id: TeamId,
    accounts: BTreeMap<AccountId, Account>,
    teams: BTreeMap<TeamId, Team>,
    members: BTreeMap<AccountId, TeamId>,
    tokens: HashMap<TokenHash, TokenRecord>,
}

impl Inner {
    fn account_view(&self, id: AccountId) -> Option<Account> {
        let mut account = self.accounts.get(&id)?.clone();
        account.team = self.members.get(&id).and_then(|team_id| {
            self.teams.get(team_id).map(|team| TeamRef {
                id: team.id,
                name: team.name.clone(),
            })
        });
        Some(account)
    }

    fn team_view(&self, id: TeamId) -> Option<Team> {
        let mut team = self.teams.get(&id)?.clone();
        team.num_members = self.member_count(id);
        Some(team)
    }

    fn member_count(&self, team_id: TeamId) -> i64 {
        let count = self.members.values().filter(|id| **id == team_id).count();
        i64::try_from(count).unwrap_or(i64::MAX)
    }

    fn email_taken(&self, email: &str, except: Option<AccountId>) -> bool {
        self.accounts
            .values()
            .any(|account| account.email == email && Some(account.id) != except)
    }

    fn team_name_taken(&self, name: &str, except: Option<TeamId>) -> bool {
        self.teams
            .values()
            .any(|team| team.name == name && Some(team.id) != except)
    }

    fn create_team(&mut self, team: NewTeam) -> TeamId {
        self.last_team_id += 1;
        let id = self.last_team_id;
        self.teams.insert(id, team.into_team(id, Utc::now()));
        id
    }

    fn team_id_by_name(&self, name: &str) -> Option<TeamId> {
        self.teams
            .values()
            .find(|team| team.name == name)
            .map(|team| team.id)
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend(anyhow!("memory store lock poisoned")))
    }
}

#[async_trait]
impl VersionedStore<Account> for MemoryStore {
    async fn exists(&self, id: i64) -> Result<bool, StoreError> {
        Ok(self.lock()?.accounts.contains_key(&id))
    }

    async fn update_if_version(
        &self,
        record: &Account,
        expected: Version,
    ) -> Result<Option<Version>, StoreError> {
        let mut inner = self.lock()?;

        let current = match inner.accounts.get(&record.id) {
            Some(current) if current.version == expected => current.version,
            _ => return Ok(None),
        };

        if inner.email_taken(&record.email, Some(record.id)) {
            return Err(StoreError::UniqueViolation { field: "email" });
        }

        let version = current.next().ok_or(StoreError::VersionExhausted)?;
        if let Some(stored) = inner.accounts.get_mut(&record.id) {
            stored.email.clone_from(&record.email);
            stored.password = record.password.clone();
            stored.activated = record.activated;
            stored.role.clone_from(&record.role);
            stored.version = version;
        }

        Ok(Some(version))
    }

    async fn delete_if_version(&self, id: i64, expected: Version) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;

        match inner.accounts.get(&id) {
            Some(current) if current.version == expected => {}
            _ => return Ok(false),
        }

        inner.accounts.remove(&id);
        inner.members.remove(&id);
        inner.tokens.retain(|_, token| token.account_id != id);

        Ok(true)
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn insert_account(&self, account: &NewAccount) -> Result<Account, StoreError> {
        let mut inner = self.lock()?;

        if inner.email_taken(account.email(), None) {
            return Err(StoreError::UniqueViolation { field: "email" });
        }

        let team_id = match inner.team_id_by_name(account.team()) {
            Some(id) => id,
            None => {
                let team = NewTeam::build(account.team(), TeamMeta::default())
                    .map_err(|err| StoreError::Backend(anyhow!("invalid team: {err}")))?;
                inner.create_team(team)
            }
        };

        inner.last_account_id += 1;
        let id = inner.last_account_id;
        let mut stored = account.clone().into_account(
            id,
            TeamRef {
                id: team_id,
                name: account.team().to_string(),
            },
            Utc::now(),
        );
        let view = stored.clone();
        stored.team = None;

        inner.accounts.insert(id, stored);
        inner.members.insert(id, team_id);

        Ok(view)
    }

    async fn account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.lock()?.account_view(id))
    }

    async fn account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let inner = self.lock()?;
        let id = inner
            .accounts
            .values()
            .find(|account| account.email == email)
            .map(|account| account.id);
        Ok(id.and_then(|id| inner.account_view(id)))
    }
}

#[async_trait]
impl VersionedStore<Team> for MemoryStore {
    async fn exists(&self, id: i64) -> Result<bool, StoreError> {
        Ok(self.lock()?.teams.contains_key(&id))
    }

    async fn update_if_version(
        &self,
        record: &Team,
        expected: Version,
    ) -> Result<Option<Version>, StoreError> {
        let mut inner = self.lock()?;

        let current = match inner.teams.get(&record.id) {
            Some(current) if current.version == expected => current.version,
            _ => return Ok(None),
        };

        if inner.team_name_taken(&record.name, Some(record.id)) {
            return Err(StoreError::UniqueViolation { field: "name" });
        }

        let version = current.next().ok_or(StoreError::VersionExhausted)?;
        if let Some(stored) = inner.teams.get_mut(&record.id) {
            stored.name.clone_from(&record.name);
            stored.meta = record.meta.clone();
            stored.version = version;
        }

        Ok(Some(version))
    }

    async fn delete_if_version(&self, id: i64, expected: Version) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;

        match inner.teams.get(&id) {
            Some(current) if current.version == expected => {}
            _ => return Ok(false),
        }

        if inner.member_count(id) > 0 {
            return Err(StoreError::InUse);
        }

        inner.teams.remove(&id);

        Ok(true)
    }
}

#[async_trait]
impl TeamStore for MemoryStore {
    async fn insert_team(&self, team: &NewTeam) -> Result<Team, StoreError> {
        let mut inner = self.lock()?;

        if inner.team_name_taken(team.name(), None) {
            return Err(StoreError::UniqueViolation { field: "name" });
        }

        let id = inner.create_team(team.clone());
        inner
            .team_view(id)
            .ok_or_else(|| StoreError::Backend(anyhow!("team {id} vanished after insert")))
    }

    async fn team(&self, id: TeamId) -> Result<Option<Team>, StoreError> {
        Ok(self.lock()?.team_view(id))
    }

    async fn team_by_name(&self, name: &str) -> Result<Option<Team>, StoreError> {
        let inner = self.lock()?;
        Ok(inner.team_id_by_name(name).and_then(|id| inner.team_view(id)))
    }
}

#[async_trait]
impl HealthCheck for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn insert_token(&self, record: &TokenRecord) -> Result<(), StoreError> {
        let mut inner = self.lock()?;

        if !inner.accounts.contains_key(&record.account_id) {
            return Err(StoreError::Backend(anyhow!(
                "token owner {} does not exist",
                record.account_id
            )));
        }

        inner.tokens.insert(record.hash, record.clone());

        Ok(())
    }

    async fn account_for_token(
        &self,
        scope: Scope,
        hash: &TokenHash,
        now: DateTime<Utc>,
    ) -> Result<Option<Account>, StoreError> {
        let inner = self.lock()?;

        Ok(inner
            .tokens
            .get(hash)
            .filter(|token| token.scope == scope && token.expiry > now)
            .and_then(|token| inner.account_view(token.account_id)))
    }

    async fn delete_tokens(&self, scope: Scope, account_id: AccountId) -> Result<u64, StoreError> {
        let mut inner = self.lock()?;

        let before = inner.tokens.len();
        inner
            .tokens
            .retain(|_, token| !(token.account_id == account_id && token.scope == scope));

        Ok(u64::try_from(before - inner.tokens.len()).unwrap_or(u64::MAX))
    }
}
