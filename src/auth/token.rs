use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use super::sha256_hex;
use crate::clock::Clock;
use crate::config::{ConfigError, SecurityConfig};
use crate::database::{StoreError, ValidTokenStore};

/// Largest tolerated distance between a token's `iat` and the server clock
pub const MAX_CLOCK_SKEW_SECS: i64 = 300;

/// Session token payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub iat: i64,
    pub exp: i64,
    /// Unique per issuance so two logins in the same second yield distinct tokens
    pub jti: Uuid,
}

/// What a valid session token proves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserClaims {
    pub user_id: Uuid,
    pub email: Option<String>,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Token signing secret is not configured")]
    InvalidSecret,

    #[error("Token generation failed: {0}")]
    Generation(String),

    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Token algorithm {found:?} does not match the configured {expected:?}")]
    AlgorithmMismatch {
        expected: Algorithm,
        found: Algorithm,
    },

    #[error("Invalid token signature")]
    BadSignature,

    #[error("Token expired")]
    Expired,

    #[error("Token issued in the future")]
    NotYetValid,

    #[error("Token has been invalidated")]
    Revoked,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Signing material shared by the validator and the issuer
#[derive(Clone)]
pub struct JwtKeys {
    algorithm: Algorithm,
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl JwtKeys {
    pub fn from_config(config: &SecurityConfig) -> Result<Self, ConfigError> {
        if config.jwt_secret.is_empty() {
            return Err(ConfigError::MissingJwtSecret);
        }
        let algorithm = match Algorithm::from_str(&config.jwt_algorithm) {
            Ok(alg @ (Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)) => alg,
            _ => return Err(ConfigError::UnsupportedAlgorithm(config.jwt_algorithm.clone())),
        };

        Ok(Self {
            algorithm,
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            ttl: Duration::seconds(config.jwt_ttl_seconds),
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// Verifies session tokens: signature, algorithm, lifetime and, when tracking
/// is enabled, presence in the valid-token store.
#[derive(Clone)]
pub struct TokenValidator {
    keys: JwtKeys,
    valid_tokens: Option<Arc<dyn ValidTokenStore>>,
    clock: Clock,
}

impl TokenValidator {
    /// `valid_tokens` is consulted on every call when present; results are never cached.
    pub fn new(keys: JwtKeys, valid_tokens: Option<Arc<dyn ValidTokenStore>>, clock: Clock) -> Self {
        Self {
            keys,
            valid_tokens,
            clock,
        }
    }

    pub async fn validate(&self, token: &str) -> Result<UserClaims, TokenError> {
        let header = decode_header(token).map_err(|e| TokenError::Malformed(e.to_string()))?;
        if header.alg != self.keys.algorithm {
            return Err(TokenError::AlgorithmMismatch {
                expected: self.keys.algorithm,
                found: header.alg,
            });
        }

        let mut validation = Validation::new(self.keys.algorithm);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat", "sub"]);

        let claims = decode::<SessionClaims>(token, &self.keys.decoding, &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => TokenError::BadSignature,
                _ => TokenError::Malformed(e.to_string()),
            })?
            .claims;

        // Lifetime is enforced from iat as well, so a token minted with a
        // longer exp than the configured ttl still expires on schedule.
        let now = self.clock.now().timestamp();
        if claims.iat > now + MAX_CLOCK_SKEW_SECS {
            return Err(TokenError::NotYetValid);
        }
        if now > claims.iat + self.keys.ttl.num_seconds() || now > claims.exp {
            return Err(TokenError::Expired);
        }

        if let Some(store) = &self.valid_tokens {
            if !store.is_valid(&sha256_hex(token), self.clock.now()).await? {
                return Err(TokenError::Revoked);
            }
        }

        Ok(UserClaims {
            user_id: claims.sub,
            email: claims.email,
        })
    }
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenIssuer {
    keys: JwtKeys,
    clock: Clock,
}

impl TokenIssuer {
    pub fn new(keys: JwtKeys, clock: Clock) -> Self {
        Self { keys, clock }
    }

    pub fn issue(&self, user_id: Uuid, email: Option<String>) -> Result<IssuedToken, TokenError> {
        let now = self.clock.now();
        let expires_at = now + self.keys.ttl;
        let claims = SessionClaims {
            sub: user_id,
            email,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4(),
        };
        let token = encode(&Header::new(self.keys.algorithm), &claims, &self.keys.encoding)
            .map_err(|e| TokenError::Generation(e.to_string()))?;

        Ok(IssuedToken {
            token_hash: sha256_hex(&token),
            token,
            expires_at: Utc
                .timestamp_opt(claims.exp, 0)
                .single()
                .unwrap_or(expires_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::database::MemoryStore;

    fn keys() -> JwtKeys {
        JwtKeys::from_config(&AppConfig::for_tests().security).unwrap()
    }

    fn sign(claims: &SessionClaims, alg: Algorithm, secret: &str) -> String {
        encode(&Header::new(alg), claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    fn claims_at(iat: i64, exp: i64) -> SessionClaims {
        SessionClaims {
            sub: Uuid::new_v4(),
            email: Some("ana@example.com".into()),
            iat,
            exp,
            jti: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn issued_token_validates_and_is_stable() {
        let issuer = TokenIssuer::new(keys(), Clock::System);
        let validator = TokenValidator::new(keys(), None, Clock::System);
        let user_id = Uuid::new_v4();

        let issued = issuer.issue(user_id, Some("ana@example.com".into())).unwrap();
        let first = validator.validate(&issued.token).await.unwrap();
        let second = validator.validate(&issued.token).await.unwrap();

        assert_eq!(first.user_id, user_id);
        assert_eq!(first.email.as_deref(), Some("ana@example.com"));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let validator = TokenValidator::new(keys(), None, Clock::System);
        let now = Utc::now().timestamp();
        let token = sign(&claims_at(now - 3600, now - 10), Algorithm::HS256, "test-secret");

        assert!(matches!(validator.validate(&token).await, Err(TokenError::Expired)));
    }

    #[tokio::test]
    async fn ttl_applies_even_with_generous_exp() {
        let validator = TokenValidator::new(keys(), None, Clock::System);
        let now = Utc::now().timestamp();
        let token = sign(
            &claims_at(now - 2 * 86_400, now + 86_400),
            Algorithm::HS256,
            "test-secret",
        );

        assert!(matches!(validator.validate(&token).await, Err(TokenError::Expired)));
    }

    #[tokio::test]
    async fn wrong_secret_or_algorithm_is_rejected() {
        let validator = TokenValidator::new(keys(), None, Clock::System);
        let now = Utc::now().timestamp();
        let claims = claims_at(now, now + 60);

        let forged = sign(&claims, Algorithm::HS256, "other-secret");
        assert!(matches!(validator.validate(&forged).await, Err(TokenError::BadSignature)));

        let other_alg = sign(&claims, Algorithm::HS512, "test-secret");
        assert!(matches!(
            validator.validate(&other_alg).await,
            Err(TokenError::AlgorithmMismatch { .. })
        ));

        assert!(matches!(
            validator.validate("not-a-token").await,
            Err(TokenError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn tracked_tokens_must_be_registered() {
        let store = Arc::new(MemoryStore::new());
        let issuer = TokenIssuer::new(keys(), Clock::System);
        let validator = TokenValidator::new(keys(), Some(store.clone()), Clock::System);

        let issued = issuer.issue(Uuid::new_v4(), None).unwrap();
        assert!(matches!(validator.validate(&issued.token).await, Err(TokenError::Revoked)));

        store
            .register(&issued.token_hash, Uuid::new_v4(), issued.expires_at)
            .await
            .unwrap();
        assert!(validator.validate(&issued.token).await.is_ok());

        store.revoke(&issued.token_hash).await.unwrap();
        assert!(matches!(validator.validate(&issued.token).await, Err(TokenError::Revoked)));
    }
}
