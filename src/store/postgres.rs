//! PostgreSQL backend (schema in `sql/schema.sql`).

use super::{
    version::Version, with_timeout, AccountStore, HealthCheck, StoreError, TeamStore, TokenStore,
    VersionedStore,
};
use crate::{
    auth::{
        password::PasswordHash,
        token::{Scope, TokenHash, TokenRecord},
    },
    model::{Account, AccountId, NewAccount, NewTeam, Team, TeamId, TeamMeta, TeamRef},
};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgArguments, query::QueryAs, Connection, PgPool, Postgres};
use std::{future::Future, time::Duration};
use tracing::{info_span, Instrument, Span};

macro_rules! select_account {
    () => {
        r"
        SELECT u.id, u.email, u.password_hash, u.activated, u.role, u.version, u.created_at,
               t.id AS team_id, t.name AS team_name
        FROM user_account u
        LEFT JOIN users_teams ut ON ut.user_account_id = u.id
        LEFT JOIN team t ON t.id = ut.team_id
        "
    };
}

macro_rules! select_team {
    () => {
        r"
        SELECT t.id, t.name, t.version, t.created_at, m.git_url, m.server_url,
               (SELECT COUNT(*) FROM users_teams ut WHERE ut.team_id = t.id) AS num_members
        FROM team t
        INNER JOIN team_meta m ON m.id = t.team_meta_id
        "
    };
}

const ACCOUNT_BY_ID: &str = concat!(select_account!(), "WHERE u.id = $1");
const ACCOUNT_BY_EMAIL: &str = concat!(select_account!(), "WHERE u.email = $1");
const ACCOUNT_BY_TOKEN: &str = concat!(
    select_account!(),
    "INNER JOIN token tk ON tk.user_account_id = u.id
     WHERE tk.hash = $1 AND tk.scope = $2 AND tk.expiry > $3"
);
const TEAM_BY_ID: &str = concat!(select_team!(), "WHERE t.id = $1");
const TEAM_BY_NAME: &str = concat!(select_team!(), "WHERE t.name = $1");

type RowQuery<O> = QueryAs<'static, Postgres, O, PgArguments>;

fn query_span(operation: &'static str, statement: &'static str) -> Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

/// Map a unique constraint name from the schema to the offending field.
fn unique_field(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some("user_account_email_key") => "email",
        Some("team_name_key") => "name",
        _ => "record",
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            match db_err.code().as_deref() {
                Some("23505") => {
                    return Self::UniqueViolation {
                        field: unique_field(db_err.constraint()),
                    }
                }
                Some("23503") if db_err.constraint() == Some("users_teams_team_id_fkey") => {
                    return Self::InUse;
                }
                // `version + 1` past INTEGER range.
                Some("22003") => return Self::VersionExhausted,
                _ => {}
            }
        }
        Self::Backend(anyhow::Error::new(err))
    }
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: i64,
    email: String,
    password_hash: String,
    activated: bool,
    role: String,
    version: i32,
    created_at: DateTime<Utc>,
    team_id: Option<i64>,
    team_name: Option<String>,
}

impl AccountRow {
    fn into_account(self) -> Result<Account, StoreError> {
        let team = match (self.team_id, self.team_name) {
            (Some(id), Some(name)) => Some(TeamRef { id, name }),
            _ => None,
        };

        Ok(Account {
            id: self.id,
            email: self.email,
            password: PasswordHash::from_phc(self.password_hash),
            activated: self.activated,
            role: self.role,
            team,
            version: stored_version(self.version)?,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TeamRow {
    id: i64,
    name: String,
    version: i32,
    created_at: DateTime<Utc>,
    git_url: String,
    server_url: String,
    num_members: i64,
}

impl TeamRow {
    fn into_team(self) -> Result<Team, StoreError> {
        Ok(Team {
            id: self.id,
            name: self.name,
            meta: TeamMeta {
                git_url: self.git_url,
                server_url: self.server_url,
            },
            num_members: self.num_members,
            version: stored_version(self.version)?,
            created_at: self.created_at,
        })
    }
}

fn stored_version(value: i32) -> Result<Version, StoreError> {
    Version::new(value).ok_or_else(|| StoreError::Backend(anyhow!("invalid stored version {value}")))
}

/// Postgres-backed store. Every call is bounded by `timeout`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, sqlx::Error>> + Send,
    {
        with_timeout(self.timeout, fut).await
    }

    async fn fetch_account(
        &self,
        statement: &'static str,
        bind: impl FnOnce(RowQuery<AccountRow>) -> RowQuery<AccountRow> + Send,
    ) -> Result<Option<Account>, StoreError> {
        let query = bind(sqlx::query_as::<_, AccountRow>(statement));
        let row = self
            .bounded(
                query
                    .fetch_optional(&self.pool)
                    .instrument(query_span("SELECT", statement)),
            )
            .await?;

        row.map(AccountRow::into_account).transpose()
    }

    async fn fetch_team(
        &self,
        statement: &'static str,
        bind: impl FnOnce(RowQuery<TeamRow>) -> RowQuery<TeamRow> + Send,
    ) -> Result<Option<Team>, StoreError> {
        let query = bind(sqlx::query_as::<_, TeamRow>(statement));
        let row = self
            .bounded(
                query
                    .fetch_optional(&self.pool)
                    .instrument(query_span("SELECT", statement)),
            )
            .await?;

        row.map(TeamRow::into_team).transpose()
    }
}

#[async_trait]
impl HealthCheck for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.bounded(async {
            let mut conn = self
                .pool
                .acquire()
                .instrument(info_span!(
                    "db.acquire",
                    db.system = "postgresql",
                    db.operation = "ACQUIRE"
                ))
                .await?;
            conn.ping()
                .instrument(info_span!(
                    "db.ping",
                    db.system = "postgresql",
                    db.operation = "PING"
                ))
                .await
        })
        .await
    }
}

#[async_trait]
impl VersionedStore<Account> for PgStore {
    async fn exists(&self, id: i64) -> Result<bool, StoreError> {
        let query = "SELECT EXISTS (SELECT 1 FROM user_account WHERE id = $1)";
        self.bounded(
            sqlx::query_scalar::<_, bool>(query)
                .bind(id)
                .fetch_one(&self.pool)
                .instrument(query_span("SELECT", query)),
        )
        .await
    }

    async fn update_if_version(
        &self,
        record: &Account,
        expected: Version,
    ) -> Result<Option<Version>, StoreError> {
        let query = r"
            UPDATE user_account
            SET email = $1, password_hash = $2, activated = $3, role = $4, version = version + 1
            WHERE id = $5 AND version = $6
            RETURNING version
        ";
        let version = self
            .bounded(
                sqlx::query_scalar::<_, i32>(query)
                    .bind(&record.email)
                    .bind(record.password.as_str())
                    .bind(record.activated)
                    .bind(&record.role)
                    .bind(record.id)
                    .bind(expected.get())
                    .fetch_optional(&self.pool)
                    .instrument(query_span("UPDATE", query)),
            )
            .await?;

        version.map(stored_version).transpose()
    }

    async fn delete_if_version(&self, id: i64, expected: Version) -> Result<bool, StoreError> {
        // Memberships and tokens go with the account (ON DELETE CASCADE).
        let query = "DELETE FROM user_account WHERE id = $1 AND version = $2";
        let result = self
            .bounded(
                sqlx::query(query)
                    .bind(id)
                    .bind(expected.get())
                    .execute(&self.pool)
                    .instrument(query_span("DELETE", query)),
            )
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn insert_account(&self, account: &NewAccount) -> Result<Account, StoreError> {
        let (id, created_at, team_id) = self
            .bounded(async {
                let mut tx = self.pool.begin().await?;

                let query = r"
                    INSERT INTO user_account (email, password_hash, activated, role)
                    VALUES ($1, $2, $3, $4)
                    RETURNING id, created_at
                ";
                let (id, created_at): (i64, DateTime<Utc>) = sqlx::query_as(query)
                    .bind(account.email())
                    .bind(account.password().as_str())
                    .bind(account.activated())
                    .bind(account.role())
                    .fetch_one(&mut *tx)
                    .instrument(query_span("INSERT", query))
                    .await?;

                let query = "SELECT id FROM team WHERE name = $1";
                let existing: Option<i64> = sqlx::query_scalar(query)
                    .bind(account.team())
                    .fetch_optional(&mut *tx)
                    .instrument(query_span("SELECT", query))
                    .await?;

                let team_id = match existing {
                    Some(team_id) => team_id,
                    None => {
                        let query = "INSERT INTO team_meta DEFAULT VALUES RETURNING id";
                        let meta_id: i64 = sqlx::query_scalar(query)
                            .fetch_one(&mut *tx)
                            .instrument(query_span("INSERT", query))
                            .await?;

                        // A concurrent registration may create the same team first;
                        // join that one and drop the unused meta row.
                        let query = r"
                            INSERT INTO team (name, team_meta_id) VALUES ($1, $2)
                            ON CONFLICT (name) DO NOTHING
                            RETURNING id
                        ";
                        let created: Option<i64> = sqlx::query_scalar(query)
                            .bind(account.team())
                            .bind(meta_id)
                            .fetch_optional(&mut *tx)
                            .instrument(query_span("INSERT", query))
                            .await?;

                        match created {
                            Some(team_id) => team_id,
                            None => {
                                let query = "DELETE FROM team_meta WHERE id = $1";
                                sqlx::query(query)
                                    .bind(meta_id)
                                    .execute(&mut *tx)
                                    .instrument(query_span("DELETE", query))
                                    .await?;

                                let query = "SELECT id FROM team WHERE name = $1";
                                sqlx::query_scalar::<_, i64>(query)
                                    .bind(account.team())
                                    .fetch_one(&mut *tx)
                                    .instrument(query_span("SELECT", query))
                                    .await?
                            }
                        }
                    }
                };

                let query = "INSERT INTO users_teams (user_account_id, team_id) VALUES ($1, $2)";
                sqlx::query(query)
                    .bind(id)
                    .bind(team_id)
                    .execute(&mut *tx)
                    .instrument(query_span("INSERT", query))
                    .await?;

                tx.commit().await?;

                Ok::<_, sqlx::Error>((id, created_at, team_id))
            })
            .await?;

        Ok(account.clone().into_account(
            id,
            TeamRef {
                id: team_id,
                name: account.team().to_string(),
            },
            created_at,
        ))
    }

    async fn account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        self.fetch_account(ACCOUNT_BY_ID, move |query| query.bind(id))
            .await
    }

    async fn account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let email = email.to_string();
        self.fetch_account(ACCOUNT_BY_EMAIL, move |query| query.bind(email))
            .await
    }
}

#[async_trait]
impl VersionedStore<Team> for PgStore {
    async fn exists(&self, id: i64) -> Result<bool, StoreError> {
        let query = "SELECT EXISTS (SELECT 1 FROM team WHERE id = $1)";
        self.bounded(
            sqlx::query_scalar::<_, bool>(query)
                .bind(id)
                .fetch_one(&self.pool)
                .instrument(query_span("SELECT", query)),
        )
        .await
    }

    async fn update_if_version(
        &self,
        record: &Team,
        expected: Version,
    ) -> Result<Option<Version>, StoreError> {
        let version = self
            .bounded(async {
                let mut tx = self.pool.begin().await?;

                let query = r"
                    UPDATE team SET name = $1, version = version + 1
                    WHERE id = $2 AND version = $3
                    RETURNING version, team_meta_id
                ";
                let updated: Option<(i32, i64)> = sqlx::query_as(query)
                    .bind(&record.name)
                    .bind(record.id)
                    .bind(expected.get())
                    .fetch_optional(&mut *tx)
                    .instrument(query_span("UPDATE", query))
                    .await?;

                let Some((version, meta_id)) = updated else {
                    tx.rollback().await?;
                    return Ok(None);
                };

                let query = "UPDATE team_meta SET git_url = $1, server_url = $2 WHERE id = $3";
                sqlx::query(query)
                    .bind(&record.meta.git_url)
                    .bind(&record.meta.server_url)
                    .bind(meta_id)
                    .execute(&mut *tx)
                    .instrument(query_span("UPDATE", query))
                    .await?;

                tx.commit().await?;

                Ok::<_, sqlx::Error>(Some(version))
            })
            .await?;

        version.map(stored_version).transpose()
    }

    async fn delete_if_version(&self, id: i64, expected: Version) -> Result<bool, StoreError> {
        // A team with members is protected by the users_teams foreign key.
        self.bounded(async {
            let mut tx = self.pool.begin().await?;

            let query = "DELETE FROM team WHERE id = $1 AND version = $2 RETURNING team_meta_id";
            let meta_id: Option<i64> = sqlx::query_scalar(query)
                .bind(id)
                .bind(expected.get())
                .fetch_optional(&mut *tx)
                .instrument(query_span("DELETE", query))
                .await?;

            let Some(meta_id) = meta_id else {
                tx.rollback().await?;
                return Ok(false);
            };

            let query = "DELETE FROM team_meta WHERE id = $1";
            sqlx::query(query)
                .bind(meta_id)
                .execute(&mut *tx)
                .instrument(query_span("DELETE", query))
                .await?;

            tx.commit().await?;

            Ok::<_, sqlx::Error>(true)
        })
        .await
    }
}

#[async_trait]
impl TeamStore for PgStore {
    async fn insert_team(&self, team: &NewTeam) -> Result<Team, StoreError> {
        let (id, created_at) = self
            .bounded(async {
                let mut tx = self.pool.begin().await?;

                let query =
                    "INSERT INTO team_meta (git_url, server_url) VALUES ($1, $2) RETURNING id";
                let meta_id: i64 = sqlx::query_scalar(query)
                    .bind(&team.meta().git_url)
                    .bind(&team.meta().server_url)
                    .fetch_one(&mut *tx)
                    .instrument(query_span("INSERT", query))
                    .await?;

                let query = r"
                    INSERT INTO team (name, team_meta_id) VALUES ($1, $2)
                    RETURNING id, created_at
                ";
                let row: (i64, DateTime<Utc>) = sqlx::query_as(query)
                    .bind(team.name())
                    .bind(meta_id)
                    .fetch_one(&mut *tx)
                    .instrument(query_span("INSERT", query))
                    .await?;

                tx.commit().await?;

                Ok::<_, sqlx::Error>(row)
            })
            .await?;

        Ok(team.clone().into_team(id, created_at))
    }

    async fn team(&self, id: TeamId) -> Result<Option<Team>, StoreError> {
        self.fetch_team(TEAM_BY_ID, move |query| query.bind(id)).await
    }

    async fn team_by_name(&self, name: &str) -> Result<Option<Team>, StoreError> {
        let name = name.to_string();
        self.fetch_team(TEAM_BY_NAME, move |query| query.bind(name))
            .await
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn insert_token(&self, record: &TokenRecord) -> Result<(), StoreError> {
        let query = r"
            INSERT INTO token (hash, user_account_id, expiry, scope)
            VALUES ($1, $2, $3, $4)
        ";
        self.bounded(
            sqlx::query(query)
                .bind(record.hash.as_bytes().to_vec())
                .bind(record.account_id)
                .bind(record.expiry)
                .bind(record.scope.as_str())
                .execute(&self.pool)
                .instrument(query_span("INSERT", query)),
        )
        .await?;

        Ok(())
    }

    async fn account_for_token(
        &self,
        scope: Scope,
        hash: &TokenHash,
        now: DateTime<Utc>,
    ) -> Result<Option<Account>, StoreError> {
        let hash = hash.as_bytes().to_vec();
        self.fetch_account(ACCOUNT_BY_TOKEN, move |query| {
            query.bind(hash).bind(scope.as_str()).bind(now)
        })
        .await
    }

    async fn delete_tokens(&self, scope: Scope, account_id: AccountId) -> Result<u64, StoreError> {
        let query = "DELETE FROM token WHERE scope = $1 AND user_account_id = $2";
        let result = self
            .bounded(
                sqlx::query(query)
                    .bind(scope.as_str())
                    .bind(account_id)
                    .execute(&self.pool)
                    .instrument(query_span("DELETE", query)),
            )
            .await?;

        Ok(result.rows_affected())
    }
}
