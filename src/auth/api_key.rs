use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

use super::sha256_hex;
use crate::database::models::{ApiKeyRecord, KeyEnvironment};
use crate::database::{ApiKeyStore, StoreResult};

/// Hex characters of random material after the environment prefix
const SECRET_HEX_LEN: usize = 64;
/// Extra characters kept after the prefix for display (`ag_live_3f9c…`)
const DISPLAY_CHARS: usize = 4;

/// Usable key, as seen by the resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyData {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub scopes: BTreeSet<String>,
    pub environment: KeyEnvironment,
    pub rate_limit_per_minute: u32,
}

impl KeyData {
    /// Exact membership; no wildcards, no hierarchy
    pub fn has_scope(&self, required: &str) -> bool {
        self.scopes.contains(required)
    }
}

impl From<ApiKeyRecord> for KeyData {
    fn from(record: ApiKeyRecord) -> Self {
        Self {
            id: record.id,
            user_id: record.user_id,
            name: record.name,
            scopes: record.scopes.into_iter().collect(),
            environment: record.environment,
            rate_limit_per_minute: u32::try_from(record.rate_limit_per_minute).unwrap_or(0),
        }
    }
}

/// Outcome of looking up a raw key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyValidation {
    Valid(KeyData),
    /// No record matches the key's hash
    NotFound,
    /// A record exists but is revoked or past its expiry
    RevokedOrExpired,
}

#[derive(Clone)]
pub struct ApiKeyValidator {
    store: Arc<dyn ApiKeyStore>,
}

impl ApiKeyValidator {
    pub fn new(store: Arc<dyn ApiKeyStore>) -> Self {
        Self { store }
    }

    pub async fn validate(&self, raw_key: &str, now: DateTime<Utc>) -> StoreResult<KeyValidation> {
        let Some(record) = self.store.find_by_hash(&sha256_hex(raw_key)).await? else {
            return Ok(KeyValidation::NotFound);
        };

        if record.revoked || record.is_expired(now) {
            return Ok(KeyValidation::RevokedOrExpired);
        }

        Ok(KeyValidation::Valid(record.into()))
    }

    /// Best-effort usage stamp; failures are logged, never surfaced
    pub async fn record_use(&self, key_id: Uuid, now: DateTime<Utc>) {
        if let Err(e) = self.store.touch_last_used(key_id, now).await {
            tracing::warn!("Failed to record API key use for {}: {}", key_id, e);
        }
    }
}

/// Fresh secret material. `secret` is handed to the client once and never stored.
#[derive(Debug, Clone)]
pub struct GeneratedKey {
    pub secret: String,
    pub hash: String,
    pub display_prefix: String,
}

pub fn generate_key(prefix: &str) -> GeneratedKey {
    let random: [u8; SECRET_HEX_LEN / 2] = rand::random();
    let secret = format!("{}{}", prefix, hex::encode(random));
    GeneratedKey {
        hash: sha256_hex(&secret),
        display_prefix: display_prefix(&secret, prefix),
        secret,
    }
}

/// Shortened form of a key safe to show in listings and logs
pub fn display_prefix(key: &str, prefix: &str) -> String {
    key.chars().take(prefix.len() + DISPLAY_CHARS).collect()
}
