use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Which prefix family a key was issued under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyEnvironment {
    Live,
    Test,
}

impl KeyEnvironment {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyEnvironment::Live => "live",
            KeyEnvironment::Test => "test",
        }
    }
}

impl TryFrom<String> for KeyEnvironment {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "live" => Ok(KeyEnvironment::Live),
            "test" => Ok(KeyEnvironment::Test),
            other => Err(format!("unknown key environment '{}'", other)),
        }
    }
}

/// Persisted API key. Rows are never deleted, only revoked.
#[derive(Debug, Clone, FromRow)]
pub struct ApiKeyRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    /// SHA-256 hex of the full secret
    pub key_hash: String,
    /// Leading characters of the secret, kept for display
    pub key_prefix: String,
    pub scopes: Vec<String>,
    #[sqlx(try_from = "String")]
    pub environment: KeyEnvironment,
    pub rate_limit_per_minute: i32,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ApiKeyRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |expires_at| expires_at <= now)
    }
}

/// Client-facing projection; never carries secret material
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyView {
    pub id: Uuid,
    pub name: String,
    pub key_prefix: String,
    pub scopes: Vec<String>,
    pub environment: KeyEnvironment,
    pub rate_limit_per_minute: i32,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl From<&ApiKeyRecord> for ApiKeyView {
    fn from(record: &ApiKeyRecord) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            key_prefix: record.key_prefix.clone(),
            scopes: record.scopes.clone(),
            environment: record.environment,
            rate_limit_per_minute: record.rate_limit_per_minute,
            revoked: record.revoked,
            revoked_at: record.revoked_at,
            expires_at: record.expires_at,
            created_at: record.created_at,
            last_used_at: record.last_used_at,
        }
    }
}
