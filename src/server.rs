use std::sync::Arc;
use std::time::Duration;

use crate::audit::AuditSink;
use crate::auth::{
    ApiKeyValidator, AuthResolver, CredentialExtractor, JwtKeys, RateLimiter, TokenIssuer,
    TokenValidator,
};
use crate::clock::Clock;
use crate::config::{AppConfig, ConfigError};
use crate::database::{MemoryStore, Stores};
use crate::services::{AccountService, ApiKeyService};
use crate::webhook::WebhookVerifier;

/// Everything a handler or the route gate can reach. Cloned per route; all
/// fields are shared handles.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub stores: Stores,
    pub resolver: Arc<AuthResolver>,
    pub rate_limiter: RateLimiter,
    pub api_keys: Arc<ApiKeyService>,
    pub accounts: Arc<AccountService>,
    pub audit: Arc<dyn AuditSink>,
    pub webhook: Option<WebhookVerifier>,
    pub clock: Clock,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        stores: Stores,
        audit: Arc<dyn AuditSink>,
        clock: Clock,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let keys = JwtKeys::from_config(&config.security)?;

        let valid_tokens = config
            .security
            .track_valid_tokens
            .then(|| stores.tokens.clone());
        let rate_limiter = RateLimiter::new(
            stores.rate_limits.clone(),
            config.api_keys.rate_limit_window_secs,
        );
        let resolver = AuthResolver::new(
            CredentialExtractor::new(&config.api_keys, config.debug),
            ApiKeyValidator::new(stores.api_keys.clone()),
            rate_limiter.clone(),
            TokenValidator::new(keys.clone(), valid_tokens, clock),
            clock,
        );

        let api_keys = ApiKeyService::new(stores.api_keys.clone(), config.api_keys.clone(), clock);
        let accounts = AccountService::new(
            stores.users.clone(),
            stores.tokens.clone(),
            TokenIssuer::new(keys, clock),
            &config.security,
            clock,
        );

        Ok(Self {
            webhook: WebhookVerifier::from_config(&config.webhook),
            config: Arc::new(config),
            stores,
            resolver: Arc::new(resolver),
            rate_limiter,
            api_keys: Arc::new(api_keys),
            accounts: Arc::new(accounts),
            audit,
            clock,
        })
    }

    /// State over a fresh in-memory store
    pub fn in_memory(config: AppConfig, audit: Arc<dyn AuditSink>, clock: Clock) -> Result<Self, ConfigError> {
        Self::new(config, Stores::from_backend(Arc::new(MemoryStore::new())), audit, clock)
    }
}

/// Periodically drops rate-limit counters of closed windows
pub fn spawn_rate_limit_janitor(limiter: RateLimiter, clock: Clock, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match limiter.purge_expired(clock.now()).await {
                Ok(0) => {}
                Ok(purged) => tracing::debug!("Purged {} expired rate-limit windows", purged),
                Err(e) => tracing::warn!("Rate-limit purge failed: {}", e),
            }
        }
    })
}
