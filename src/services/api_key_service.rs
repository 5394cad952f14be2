use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::api_key::generate_key;
use crate::auth::scopes;
use crate::clock::Clock;
use crate::config::ApiKeyConfig;
use crate::database::models::{ApiKeyRecord, ApiKeyView, KeyEnvironment};
use crate::database::{ApiKeyStore, StoreError};
use crate::error::ApiError;

const MAX_NAME_LEN: usize = 100;

/// Body of `POST /api/keys`
#[derive(Debug, Clone, Deserialize)]
pub struct NewApiKey {
    pub name: String,
    pub scopes: Vec<String>,
    #[serde(default = "default_environment")]
    pub environment: KeyEnvironment,
    #[serde(default)]
    pub rate_limit_per_minute: Option<u32>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_environment() -> KeyEnvironment {
    KeyEnvironment::Live
}

/// A key together with its plaintext secret. Only returned by create and regenerate.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CreatedApiKey {
    #[serde(flatten)]
    pub key: ApiKeyView,
    pub secret: String,
}

#[derive(Debug, thiserror::Error)]
pub enum KeyServiceError {
    #[error("{field}: {message}")]
    Validation { field: &'static str, message: String },
    #[error("API key not found")]
    NotFound,
    #[error("API key has been revoked")]
    AlreadyRevoked,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl KeyServiceError {
    pub fn into_api_error(self, debug: bool) -> ApiError {
        match self {
            KeyServiceError::Validation { field, message } => ApiError::invalid_field(field, message),
            KeyServiceError::NotFound => ApiError::not_found("API key not found"),
            KeyServiceError::AlreadyRevoked => ApiError::conflict("API key has been revoked"),
            KeyServiceError::Store(e) => ApiError::internal(&e, debug),
        }
    }
}

/// Key lifecycle for the owning user
pub struct ApiKeyService {
    store: Arc<dyn ApiKeyStore>,
    config: ApiKeyConfig,
    clock: Clock,
}

impl ApiKeyService {
    pub fn new(store: Arc<dyn ApiKeyStore>, config: ApiKeyConfig, clock: Clock) -> Self {
        Self { store, config, clock }
    }

    pub async fn create(&self, user_id: Uuid, request: NewApiKey) -> Result<CreatedApiKey, KeyServiceError> {
        let name = request.name.trim().to_string();
        self.validate_name(&name)?;
        let scopes = self.validate_scopes(request.scopes)?;
        let now = self.clock.now();

        if let Some(expires_at) = request.expires_at {
            if expires_at <= now {
                return Err(KeyServiceError::Validation {
                    field: "expires_at",
                    message: "must be in the future".to_string(),
                });
            }
        }

        let rate_limit = request
            .rate_limit_per_minute
            .unwrap_or(self.config.default_rate_limit_per_minute);
        if rate_limit == 0 {
            return Err(KeyServiceError::Validation {
                field: "rate_limit_per_minute",
                message: "must be at least 1".to_string(),
            });
        }
        let rate_limit = i32::try_from(rate_limit).map_err(|_| KeyServiceError::Validation {
            field: "rate_limit_per_minute",
            message: "is too large".to_string(),
        })?;

        let generated = generate_key(self.prefix_for(request.environment));
        let record = ApiKeyRecord {
            id: Uuid::new_v4(),
            user_id,
            name,
            key_hash: generated.hash,
            key_prefix: generated.display_prefix,
            scopes,
            environment: request.environment,
            rate_limit_per_minute: rate_limit,
            revoked: false,
            revoked_at: None,
            expires_at: request.expires_at,
            created_at: now,
            last_used_at: None,
        };
        self.store.insert(record.clone()).await?;

        tracing::info!("Created API key {} ({}) for user {}", record.id, record.key_prefix, user_id);
        Ok(CreatedApiKey {
            key: ApiKeyView::from(&record),
            secret: generated.secret,
        })
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<ApiKeyView>, KeyServiceError> {
        let records = self.store.list_for_user(user_id).await?;
        Ok(records.iter().map(ApiKeyView::from).collect())
    }

    /// Revoking an already revoked key succeeds and leaves `revoked_at` untouched.
    pub async fn revoke(&self, user_id: Uuid, id: Uuid) -> Result<ApiKeyView, KeyServiceError> {
        let mut record = self.owned(user_id, id).await?;
        if !record.revoked {
            let now = self.clock.now();
            self.store.mark_revoked(id, now).await?;
            record.revoked = true;
            record.revoked_at = Some(now);
            tracing::info!("Revoked API key {} for user {}", id, user_id);
        }
        Ok(ApiKeyView::from(&record))
    }

    /// New secret for the same key id; the previous secret stops resolving.
    pub async fn regenerate(&self, user_id: Uuid, id: Uuid) -> Result<CreatedApiKey, KeyServiceError> {
        let mut record = self.owned(user_id, id).await?;
        if record.revoked {
            return Err(KeyServiceError::AlreadyRevoked);
        }

        let generated = generate_key(self.prefix_for(record.environment));
        // A revoke may land between the lookup and the swap
        let replaced = self
            .store
            .replace_secret(id, &generated.hash, &generated.display_prefix)
            .await?;
        if !replaced {
            return Err(KeyServiceError::AlreadyRevoked);
        }
        record.key_hash = generated.hash;
        record.key_prefix = generated.display_prefix;

        tracing::info!("Regenerated API key {} for user {}", id, user_id);
        Ok(CreatedApiKey {
            key: ApiKeyView::from(&record),
            secret: generated.secret,
        })
    }

    async fn owned(&self, user_id: Uuid, id: Uuid) -> Result<ApiKeyRecord, KeyServiceError> {
        self.store
            .find_for_user(user_id, id)
            .await?
            .ok_or(KeyServiceError::NotFound)
    }

    fn prefix_for(&self, environment: KeyEnvironment) -> &str {
        match environment {
            KeyEnvironment::Live => &self.config.live_prefix,
            KeyEnvironment::Test => &self.config.test_prefix,
        }
    }

    fn validate_name(&self, name: &str) -> Result<(), KeyServiceError> {
        if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
            return Err(KeyServiceError::Validation {
                field: "name",
                message: format!("must be between 1 and {} characters", MAX_NAME_LEN),
            });
        }
        Ok(())
    }

    fn validate_scopes(&self, requested: Vec<String>) -> Result<Vec<String>, KeyServiceError> {
        if requested.is_empty() {
            return Err(KeyServiceError::Validation {
                field: "scopes",
                message: "at least one scope is required".to_string(),
            });
        }
        if let Some(unknown) = requested.iter().find(|s| !scopes::is_known(s)) {
            return Err(KeyServiceError::Validation {
                field: "scopes",
                message: format!("unknown scope '{}'", unknown),
            });
        }

        let mut scopes = requested;
        scopes.sort();
        scopes.dedup();
        Ok(scopes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{ApiKeyValidator, KeyValidation};
    use crate::database::MemoryStore;

    fn service() -> (ApiKeyService, ApiKeyValidator) {
        let store = Arc::new(MemoryStore::new());
        (
            ApiKeyService::new(store.clone(), ApiKeyConfig::default(), Clock::System),
            ApiKeyValidator::new(store),
        )
    }

    fn request(scopes: &[&str]) -> NewApiKey {
        NewApiKey {
            name: "sync job".into(),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            environment: KeyEnvironment::Test,
            rate_limit_per_minute: None,
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn create_returns_secret_once() {
        let (service, validator) = service();
        let user = Uuid::new_v4();

        let created = service.create(user, request(&["read:groups"])).await.unwrap();
        assert!(created.secret.starts_with("ag_test_"));
        assert_eq!(created.key.rate_limit_per_minute, 60);
        assert!(matches!(
            validator.validate(&created.secret, Utc::now()).await.unwrap(),
            KeyValidation::Valid(_)
        ));

        let listed = serde_json::to_value(service.list(user).await.unwrap()).unwrap();
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert!(listed[0].get("secret").is_none());
        assert!(listed[0].get("key_hash").is_none());
    }

    #[tokio::test]
    async fn unknown_or_missing_scopes_are_rejected() {
        let (service, _) = service();
        let user = Uuid::new_v4();

        assert!(matches!(
            service.create(user, request(&[])).await,
            Err(KeyServiceError::Validation { field: "scopes", .. })
        ));
        assert!(matches!(
            service.create(user, request(&["read:*"])).await,
            Err(KeyServiceError::Validation { field: "scopes", .. })
        ));
    }

    #[tokio::test]
    async fn regenerate_swaps_secret_and_keeps_identity() {
        let (service, validator) = service();
        let user = Uuid::new_v4();
        let created = service.create(user, request(&["read:groups", "write:groups"])).await.unwrap();

        let regenerated = service.regenerate(user, created.key.id).await.unwrap();
        assert_ne!(regenerated.secret, created.secret);

        assert_eq!(
            validator.validate(&created.secret, Utc::now()).await.unwrap(),
            KeyValidation::NotFound
        );
        match validator.validate(&regenerated.secret, Utc::now()).await.unwrap() {
            KeyValidation::Valid(data) => {
                assert_eq!(data.id, created.key.id);
                assert_eq!(data.name, "sync job");
                assert!(data.has_scope("read:groups") && data.has_scope("write:groups"));
            }
            other => panic!("expected a valid key, got {:?}", other),
        }
    }

    /// Revokes every key right after handing it out, as a concurrent revoke would
    struct RevokedMidway(Arc<MemoryStore>);

    #[async_trait::async_trait]
    impl ApiKeyStore for RevokedMidway {
        async fn insert(&self, record: ApiKeyRecord) -> Result<(), StoreError> {
            self.0.insert(record).await
        }
        async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>, StoreError> {
            self.0.find_by_hash(key_hash).await
        }
        async fn find_for_user(&self, user_id: Uuid, id: Uuid) -> Result<Option<ApiKeyRecord>, StoreError> {
            let found = self.0.find_for_user(user_id, id).await?;
            self.0.mark_revoked(id, Utc::now()).await?;
            Ok(found)
        }
        async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<ApiKeyRecord>, StoreError> {
            self.0.list_for_user(user_id).await
        }
        async fn mark_revoked(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
            self.0.mark_revoked(id, at).await
        }
        async fn replace_secret(&self, id: Uuid, key_hash: &str, key_prefix: &str) -> Result<bool, StoreError> {
            self.0.replace_secret(id, key_hash, key_prefix).await
        }
        async fn touch_last_used(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
            self.0.touch_last_used(id, at).await
        }
    }

    #[tokio::test]
    async fn regenerate_loses_to_a_concurrent_revoke() {
        let memory = Arc::new(MemoryStore::new());
        let setup = ApiKeyService::new(memory.clone(), ApiKeyConfig::default(), Clock::System);
        let racing = ApiKeyService::new(
            Arc::new(RevokedMidway(memory.clone())),
            ApiKeyConfig::default(),
            Clock::System,
        );
        let validator = ApiKeyValidator::new(memory);
        let user = Uuid::new_v4();
        let created = setup.create(user, request(&["read:groups"])).await.unwrap();

        assert!(matches!(
            racing.regenerate(user, created.key.id).await,
            Err(KeyServiceError::AlreadyRevoked)
        ));
        assert_eq!(
            validator.validate(&created.secret, Utc::now()).await.unwrap(),
            KeyValidation::RevokedOrExpired
        );
    }

    #[tokio::test]
    async fn revoke_is_idempotent_and_owner_scoped() {
        let (service, validator) = service();
        let owner = Uuid::new_v4();
        let created = service.create(owner, request(&["read:groups"])).await.unwrap();

        assert!(matches!(
            service.revoke(Uuid::new_v4(), created.key.id).await,
            Err(KeyServiceError::NotFound)
        ));

        let first = service.revoke(owner, created.key.id).await.unwrap();
        let second = service.revoke(owner, created.key.id).await.unwrap();
        assert!(first.revoked && second.revoked);
        assert_eq!(first.revoked_at, second.revoked_at);

        assert_eq!(
            validator.validate(&created.secret, Utc::now()).await.unwrap(),
            KeyValidation::RevokedOrExpired
        );
        assert!(matches!(
            service.regenerate(owner, created.key.id).await,
            Err(KeyServiceError::AlreadyRevoked)
        ));
    }
}
