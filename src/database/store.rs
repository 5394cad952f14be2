//! Storage seams consumed by the auth pipeline and the services.
//!
//! Every trait is implemented by both [`super::memory::MemoryStore`] and
//! [`super::postgres::PgStore`]. Components receive them as `Arc<dyn …>` at
//! construction so tests can swap in the in-memory backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use super::models::{ApiKeyRecord, GroupRecord, UserRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Duplicate value: {0}")]
    Conflict(String),

    #[error("Stored row is invalid: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    async fn insert(&self, record: ApiKeyRecord) -> StoreResult<()>;

    async fn find_by_hash(&self, key_hash: &str) -> StoreResult<Option<ApiKeyRecord>>;

    /// Looks a key up by id, restricted to its owner
    async fn find_for_user(&self, user_id: Uuid, id: Uuid) -> StoreResult<Option<ApiKeyRecord>>;

    async fn list_for_user(&self, user_id: Uuid) -> StoreResult<Vec<ApiKeyRecord>>;

    async fn mark_revoked(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()>;

    /// Swaps the secret material of an unrevoked key; the old hash stops
    /// resolving immediately. Returns false when the key is missing or revoked.
    async fn replace_secret(&self, id: Uuid, key_hash: &str, key_prefix: &str) -> StoreResult<bool>;

    async fn touch_last_used(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()>;
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Atomically increments the counter of `(api_key_id, window_start)` and
    /// returns the new count.
    async fn increment(&self, api_key_id: Uuid, window_start: DateTime<Utc>) -> StoreResult<u32>;

    /// Drops counters of windows that started before `window_start`
    async fn purge_before(&self, window_start: DateTime<Utc>) -> StoreResult<u64>;
}

/// Tracks session tokens that are still allowed; logout removes them.
#[async_trait]
pub trait ValidTokenStore: Send + Sync {
    async fn register(
        &self,
        token_hash: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn is_valid(&self, token_hash: &str, now: DateTime<Utc>) -> StoreResult<bool>;

    async fn revoke(&self, token_hash: &str) -> StoreResult<bool>;

    async fn revoke_all_for_user(&self, user_id: Uuid) -> StoreResult<u64>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: UserRecord) -> StoreResult<()>;

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>>;

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<UserRecord>>;
}

#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn insert(&self, group: GroupRecord) -> StoreResult<()>;

    async fn list_for_user(&self, user_id: Uuid) -> StoreResult<Vec<GroupRecord>>;
}

#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;
}

/// Handles to every store, wired once at process start
#[derive(Clone)]
pub struct Stores {
    pub api_keys: Arc<dyn ApiKeyStore>,
    pub rate_limits: Arc<dyn RateLimitStore>,
    pub tokens: Arc<dyn ValidTokenStore>,
    pub users: Arc<dyn UserStore>,
    pub groups: Arc<dyn GroupStore>,
    pub health: Arc<dyn StoreHealth>,
}

impl Stores {
    /// Uses one backend object for every seam
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: ApiKeyStore
            + RateLimitStore
            + ValidTokenStore
            + UserStore
            + GroupStore
            + StoreHealth
            + 'static,
    {
        Self {
            api_keys: backend.clone(),
            rate_limits: backend.clone(),
            tokens: backend.clone(),
            users: backend.clone(),
            groups: backend.clone(),
            health: backend,
        }
    }
}
