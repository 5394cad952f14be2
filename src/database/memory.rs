use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::models::{ApiKeyRecord, GroupRecord, UserRecord};
use super::store::{
    ApiKeyStore, GroupStore, RateLimitStore, StoreError, StoreHealth, StoreResult, UserStore,
    ValidTokenStore,
};

#[derive(Debug, Clone)]
struct TokenEntry {
    user_id: Uuid,
    expires_at: DateTime<Utc>,
}

/// Process-local backend used when no `DATABASE_URL` is configured and in tests
#[derive(Default)]
pub struct MemoryStore {
    api_keys: RwLock<HashMap<Uuid, ApiKeyRecord>>,
    // Single mutex: the read-increment-write of a counter happens under one lock
    rate_windows: Mutex<HashMap<(Uuid, DateTime<Utc>), u32>>,
    tokens: RwLock<HashMap<String, TokenEntry>>,
    users: RwLock<HashMap<Uuid, UserRecord>>,
    groups: RwLock<Vec<GroupRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApiKeyStore for MemoryStore {
    async fn insert(&self, record: ApiKeyRecord) -> StoreResult<()> {
        let mut keys = self.api_keys.write().await;
        if keys.values().any(|k| k.key_hash == record.key_hash) {
            return Err(StoreError::Conflict("api key hash".to_string()));
        }
        keys.insert(record.id, record);
        Ok(())
    }

    async fn find_by_hash(&self, key_hash: &str) -> StoreResult<Option<ApiKeyRecord>> {
        let keys = self.api_keys.read().await;
        Ok(keys.values().find(|k| k.key_hash == key_hash).cloned())
    }

    async fn find_for_user(&self, user_id: Uuid, id: Uuid) -> StoreResult<Option<ApiKeyRecord>> {
        let keys = self.api_keys.read().await;
        Ok(keys.get(&id).filter(|k| k.user_id == user_id).cloned())
    }

    async fn list_for_user(&self, user_id: Uuid) -> StoreResult<Vec<ApiKeyRecord>> {
        let keys = self.api_keys.read().await;
        let mut owned: Vec<ApiKeyRecord> =
            keys.values().filter(|k| k.user_id == user_id).cloned().collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }

    async fn mark_revoked(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        if let Some(key) = self.api_keys.write().await.get_mut(&id) {
            if !key.revoked {
                key.revoked = true;
                key.revoked_at = Some(at);
            }
        }
        Ok(())
    }

    async fn replace_secret(&self, id: Uuid, key_hash: &str, key_prefix: &str) -> StoreResult<bool> {
        match self.api_keys.write().await.get_mut(&id) {
            Some(key) if !key.revoked => {
                key.key_hash = key_hash.to_string();
                key.key_prefix = key_prefix.to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn touch_last_used(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        if let Some(key) = self.api_keys.write().await.get_mut(&id) {
            key.last_used_at = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn increment(&self, api_key_id: Uuid, window_start: DateTime<Utc>) -> StoreResult<u32> {
        let mut windows = self.rate_windows.lock().await;
        let count = windows.entry((api_key_id, window_start)).or_insert(0);
        *count = count.saturating_add(1);
        Ok(*count)
    }

    async fn purge_before(&self, window_start: DateTime<Utc>) -> StoreResult<u64> {
        let mut windows = self.rate_windows.lock().await;
        let before = windows.len();
        windows.retain(|(_, start), _| *start >= window_start);
        Ok((before - windows.len()) as u64)
    }
}

#[async_trait]
impl ValidTokenStore for MemoryStore {
    async fn register(
        &self,
        token_hash: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.tokens.write().await.insert(
            token_hash.to_string(),
            TokenEntry {
                user_id,
                expires_at,
            },
        );
        Ok(())
    }

    async fn is_valid(&self, token_hash: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        let tokens = self.tokens.read().await;
        Ok(tokens
            .get(token_hash)
            .map_or(false, |entry| entry.expires_at > now))
    }

    async fn revoke(&self, token_hash: &str) -> StoreResult<bool> {
        Ok(self.tokens.write().await.remove(token_hash).is_some())
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> StoreResult<u64> {
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, entry| entry.user_id != user_id);
        Ok((before - tokens.len()) as u64)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert(&self, user: UserRecord) -> StoreResult<()> {
        let mut users = self.users.write().await;
        if users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(StoreError::Conflict(format!("email {}", user.email)));
        }
        users.insert(user.id, user);
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<UserRecord>> {
        Ok(self.users.read().await.get(&id).cloned())
    }
}

#[async_trait]
impl GroupStore for MemoryStore {
    async fn insert(&self, group: GroupRecord) -> StoreResult<()> {
        self.groups.write().await.push(group);
        Ok(())
    }

    async fn list_for_user(&self, user_id: Uuid) -> StoreResult<Vec<GroupRecord>> {
        let groups = self.groups.read().await;
        Ok(groups.iter().filter(|g| g.owner_id == user_id).cloned().collect())
    }
}

#[async_trait]
impl StoreHealth for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
