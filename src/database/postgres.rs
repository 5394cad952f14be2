use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use super::models::{ApiKeyRecord, GroupRecord, UserRecord};
use super::store::{
    ApiKeyStore, GroupStore, RateLimitStore, StoreError, StoreHealth, StoreResult, UserStore,
    ValidTokenStore,
};
use crate::config::DatabaseConfig;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        password_hash TEXT NOT NULL,
        role TEXT NOT NULL DEFAULT 'UTILISATEUR',
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS api_keys (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL REFERENCES users(id),
        name TEXT NOT NULL,
        key_hash TEXT NOT NULL UNIQUE,
        key_prefix TEXT NOT NULL,
        scopes TEXT[] NOT NULL DEFAULT '{}',
        environment TEXT NOT NULL,
        rate_limit_per_minute INTEGER NOT NULL,
        revoked BOOLEAN NOT NULL DEFAULT false,
        revoked_at TIMESTAMPTZ,
        expires_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        last_used_at TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS api_key_rate_limits (
        api_key_id UUID NOT NULL,
        window_start TIMESTAMPTZ NOT NULL,
        request_count INTEGER NOT NULL,
        PRIMARY KEY (api_key_id, window_start)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS valid_tokens (
        token_hash TEXT PRIMARY KEY,
        user_id UUID NOT NULL,
        expires_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS valid_tokens_user_idx ON valid_tokens (user_id)",
    r#"
    CREATE TABLE IF NOT EXISTS groups (
        id UUID PRIMARY KEY,
        owner_id UUID NOT NULL REFERENCES users(id),
        name TEXT NOT NULL,
        description TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
];

const API_KEY_COLUMNS: &str = "id, user_id, name, key_hash, key_prefix, scopes, environment, \
    rate_limit_per_minute, revoked, revoked_at, expires_at, created_at, last_used_at";

/// Postgres backend. The pool is created once and passed in explicitly.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, config: &DatabaseConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout))
            .connect(url)
            .await?;

        info!("Created database pool (max {} connections)", config.max_connections);
        Ok(Self { pool })
    }

    /// Creates missing tables; safe to run on every start
    pub async fn migrate(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Database schema is up to date");
        Ok(())
    }

    /// Close the pool (e.g., on shutdown)
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Closed database pool");
    }
}

fn map_unique_violation(err: sqlx::Error, what: &str) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            StoreError::Conflict(what.to_string())
        }
        _ => StoreError::Sqlx(err),
    }
}

#[async_trait]
impl ApiKeyStore for PgStore {
    async fn insert(&self, record: ApiKeyRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO api_keys (
                id, user_id, name, key_hash, key_prefix, scopes, environment,
                rate_limit_per_minute, revoked, revoked_at, expires_at, created_at, last_used_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(&record.name)
        .bind(&record.key_hash)
        .bind(&record.key_prefix)
        .bind(&record.scopes)
        .bind(record.environment.as_str())
        .bind(record.rate_limit_per_minute)
        .bind(record.revoked)
        .bind(record.revoked_at)
        .bind(record.expires_at)
        .bind(record.created_at)
        .bind(record.last_used_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "api key hash"))?;
        Ok(())
    }

    async fn find_by_hash(&self, key_hash: &str) -> StoreResult<Option<ApiKeyRecord>> {
        let query = format!("SELECT {} FROM api_keys WHERE key_hash = $1", API_KEY_COLUMNS);
        let record = sqlx::query_as::<_, ApiKeyRecord>(&query)
            .bind(key_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    async fn find_for_user(&self, user_id: Uuid, id: Uuid) -> StoreResult<Option<ApiKeyRecord>> {
        let query = format!(
            "SELECT {} FROM api_keys WHERE id = $1 AND user_id = $2",
            API_KEY_COLUMNS
        );
        let record = sqlx::query_as::<_, ApiKeyRecord>(&query)
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    async fn list_for_user(&self, user_id: Uuid) -> StoreResult<Vec<ApiKeyRecord>> {
        let query = format!(
            "SELECT {} FROM api_keys WHERE user_id = $1 ORDER BY created_at DESC",
            API_KEY_COLUMNS
        );
        let records = sqlx::query_as::<_, ApiKeyRecord>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    async fn mark_revoked(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query(
            "UPDATE api_keys SET revoked = true, revoked_at = COALESCE(revoked_at, $2) WHERE id = $1",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn replace_secret(&self, id: Uuid, key_hash: &str, key_prefix: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE api_keys SET key_hash = $2, key_prefix = $3 WHERE id = $1 AND NOT revoked",
        )
        .bind(id)
        .bind(key_hash)
        .bind(key_prefix)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "api key hash"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn touch_last_used(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE api_keys SET last_used_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl RateLimitStore for PgStore {
    async fn increment(&self, api_key_id: Uuid, window_start: DateTime<Utc>) -> StoreResult<u32> {
        // One statement: the row lock taken by ON CONFLICT serialises concurrent increments
        let count: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO api_key_rate_limits (api_key_id, window_start, request_count)
            VALUES ($1, $2, 1)
            ON CONFLICT (api_key_id, window_start)
            DO UPDATE SET request_count = api_key_rate_limits.request_count + 1
            RETURNING request_count
            "#,
        )
        .bind(api_key_id)
        .bind(window_start)
        .fetch_one(&self.pool)
        .await?;

        u32::try_from(count).map_err(|_| StoreError::Corrupt(format!("request_count {}", count)))
    }

    async fn purge_before(&self, window_start: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM api_key_rate_limits WHERE window_start < $1")
            .bind(window_start)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ValidTokenStore for PgStore {
    async fn register(
        &self,
        token_hash: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO valid_tokens (token_hash, user_id, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (token_hash) DO UPDATE SET expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(token_hash)
        .bind(user_id)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn is_valid(&self, token_hash: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        let found: Option<i32> = sqlx::query_scalar(
            "SELECT 1 FROM valid_tokens WHERE token_hash = $1 AND expires_at > $2",
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }

    async fn revoke(&self, token_hash: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM valid_tokens WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM valid_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn insert(&self, user: UserRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, name, password_hash, role, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, &format!("email {}", user.email)))?;
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>> {
        let user = sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT id, email, name, password_hash, role, created_at
            FROM users
            WHERE lower(email) = lower($1)
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<UserRecord>> {
        let user = sqlx::query_as::<_, UserRecord>(
            "SELECT id, email, name, password_hash, role, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }
}

#[async_trait]
impl GroupStore for PgStore {
    async fn insert(&self, group: GroupRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO groups (id, owner_id, name, description, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(group.id)
        .bind(group.owner_id)
        .bind(&group.name)
        .bind(&group.description)
        .bind(group.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_for_user(&self, user_id: Uuid) -> StoreResult<Vec<GroupRecord>> {
        let groups = sqlx::query_as::<_, GroupRecord>(
            r#"
            SELECT id, owner_id, name, description, created_at
            FROM groups
            WHERE owner_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(groups)
    }
}

#[async_trait]
impl StoreHealth for PgStore {
    /// Pings the pool to ensure connectivity
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
