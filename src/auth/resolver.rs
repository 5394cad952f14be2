use axum::http::HeaderMap;
use serde_json::{json, Map, Value};
use thiserror::Error;

use super::api_key::{ApiKeyValidator, KeyValidation};
use super::credentials::{Credential, CredentialExtractor};
use super::identity::Identity;
use super::rate_limit::{RateLimitDecision, RateLimiter};
use super::token::{TokenError, TokenValidator};
use super::{display_key, sha256_hex};
use crate::clock::Clock;
use crate::database::models::Role;
use crate::database::StoreError;
use crate::error::ApiError;

/// Which credentials an entry point accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Machine-to-machine endpoints: API key or nothing
    ApiKeyOnly,
    /// Either a session token or an API key
    Flexible,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("API key required")]
    MissingApiKey,

    #[error("Authentication token required")]
    MissingToken,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("API key has been revoked or has expired")]
    RevokedOrExpiredApiKey,

    #[error("API key lacks the '{required}' scope")]
    InsufficientScope {
        required: String,
        available: Vec<String>,
    },

    #[error("Role {} required", .required.as_str())]
    InsufficientRole { required: Role },

    #[error("Rate limit exceeded")]
    RateLimitExceeded(RateLimitDecision),

    #[error("Invalid or expired token")]
    InvalidToken(#[source] TokenError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingApiKey => "MISSING_API_KEY",
            AuthError::MissingToken => "MISSING_TOKEN",
            AuthError::InvalidApiKey => "INVALID_API_KEY",
            AuthError::RevokedOrExpiredApiKey => "REVOKED_OR_EXPIRED_API_KEY",
            AuthError::InsufficientScope { .. } | AuthError::InsufficientRole { .. } => {
                "INSUFFICIENT_PERMISSIONS"
            }
            AuthError::RateLimitExceeded(_) => "RATE_LIMIT_EXCEEDED",
            AuthError::InvalidToken(_) => "INVALID_TOKEN",
            AuthError::Store(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP form of the failure; `debug` controls whether store errors leak detail
    pub fn into_api_error(self, debug: bool) -> ApiError {
        let code = self.code();
        let message = self.to_string();
        match self {
            AuthError::MissingApiKey
            | AuthError::MissingToken
            | AuthError::InvalidApiKey
            | AuthError::RevokedOrExpiredApiKey
            | AuthError::InvalidToken(_) => ApiError::unauthorized(code, message),
            AuthError::InsufficientScope {
                required,
                available,
            } => {
                let mut context = Map::new();
                context.insert("required_scope".into(), Value::from(required));
                context.insert("available_scopes".into(), json!(available));
                ApiError::forbidden_with_context(code, message, context)
            }
            AuthError::InsufficientRole { required } => {
                let mut context = Map::new();
                context.insert("required_role".into(), Value::from(required.as_str()));
                ApiError::forbidden_with_context(code, message, context)
            }
            AuthError::RateLimitExceeded(decision) => {
                let mut context = Map::new();
                context.insert("limit".into(), Value::from(decision.limit));
                context.insert("remaining".into(), Value::from(decision.remaining));
                context.insert("reset_at".into(), Value::from(decision.reset_at.to_rfc3339()));
                ApiError::too_many_requests(message, context)
            }
            AuthError::Store(e) => ApiError::internal(&e, debug),
        }
    }
}

/// Successful resolution
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub identity: Identity,
    /// Present for API-key requests; drives the rate-limit response headers
    pub rate_limit: Option<RateLimitDecision>,
    /// Hash of the session token, present for JWT requests
    pub session_token_hash: Option<String>,
}

/// Turns request credentials into an [`Identity`]
#[derive(Clone)]
pub struct AuthResolver {
    extractor: CredentialExtractor,
    api_keys: ApiKeyValidator,
    rate_limiter: RateLimiter,
    tokens: TokenValidator,
    clock: Clock,
}

impl AuthResolver {
    pub fn new(
        extractor: CredentialExtractor,
        api_keys: ApiKeyValidator,
        rate_limiter: RateLimiter,
        tokens: TokenValidator,
        clock: Clock,
    ) -> Self {
        Self {
            extractor,
            api_keys,
            rate_limiter,
            tokens,
            clock,
        }
    }

    /// Strict entry point: only API keys are accepted
    pub async fn authenticate_api_key(
        &self,
        headers: &HeaderMap,
        query: Option<&str>,
        required_scope: Option<&str>,
    ) -> Result<Authenticated, AuthError> {
        self.resolve(headers, query, AuthMode::ApiKeyOnly, required_scope).await
    }

    /// Dual-mode entry point: session token or API key
    pub async fn authenticate_flexible(
        &self,
        headers: &HeaderMap,
        query: Option<&str>,
        required_scope: Option<&str>,
    ) -> Result<Authenticated, AuthError> {
        self.resolve(headers, query, AuthMode::Flexible, required_scope).await
    }

    /// `required_scope` only constrains API keys; sessions act with the full
    /// rights of their user.
    pub async fn resolve(
        &self,
        headers: &HeaderMap,
        query: Option<&str>,
        mode: AuthMode,
        required_scope: Option<&str>,
    ) -> Result<Authenticated, AuthError> {
        match (self.extractor.extract(headers, query), mode) {
            (Credential::ApiKey(key), _) => self.resolve_api_key(&key, required_scope).await,
            (Credential::BearerJwt(token), AuthMode::Flexible) => self.resolve_session(&token).await,
            (Credential::BearerJwt(_), AuthMode::ApiKeyOnly) | (Credential::None, AuthMode::ApiKeyOnly) => {
                Err(AuthError::MissingApiKey)
            }
            (Credential::None, AuthMode::Flexible) => Err(AuthError::MissingToken),
        }
    }

    async fn resolve_api_key(
        &self,
        raw_key: &str,
        required_scope: Option<&str>,
    ) -> Result<Authenticated, AuthError> {
        let now = self.clock.now();

        let key = match self.api_keys.validate(raw_key, now).await? {
            KeyValidation::Valid(key) => key,
            KeyValidation::NotFound => {
                tracing::warn!("Rejected unknown API key {}", display_key(raw_key));
                return Err(AuthError::InvalidApiKey);
            }
            KeyValidation::RevokedOrExpired => {
                tracing::warn!("Rejected revoked or expired API key {}", display_key(raw_key));
                return Err(AuthError::RevokedOrExpiredApiKey);
            }
        };

        if let Some(scope) = required_scope {
            if !key.has_scope(scope) {
                return Err(AuthError::InsufficientScope {
                    required: scope.to_string(),
                    available: key.scopes.iter().cloned().collect(),
                });
            }
        }

        let decision = self
            .rate_limiter
            .check(key.id, key.rate_limit_per_minute, now)
            .await?;
        if !decision.allowed {
            tracing::warn!("API key {} ({}) exceeded {} requests per window", key.name, key.id, decision.limit);
            return Err(AuthError::RateLimitExceeded(decision));
        }

        self.api_keys.record_use(key.id, now).await;

        Ok(Authenticated {
            identity: Identity::ApiKey {
                user_id: key.user_id,
                api_key_id: key.id,
                api_key_name: key.name,
                scopes: key.scopes,
                environment: key.environment,
            },
            rate_limit: Some(decision),
            session_token_hash: None,
        })
    }

    async fn resolve_session(&self, token: &str) -> Result<Authenticated, AuthError> {
        let claims = self.tokens.validate(token).await.map_err(|e| match e {
            TokenError::Store(store) => AuthError::Store(store),
            other => {
                tracing::debug!("Session token rejected: {}", other);
                AuthError::InvalidToken(other)
            }
        })?;

        Ok(Authenticated {
            identity: Identity::Jwt {
                user_id: claims.user_id,
                email: claims.email,
            },
            rate_limit: None,
            session_token_hash: Some(sha256_hex(token)),
        })
    }
}
