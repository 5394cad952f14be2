//! Request authentication: credential extraction, session tokens, API keys,
//! per-key rate limiting and the resolver that ties them together.

pub mod api_key;
pub mod credentials;
pub mod identity;
pub mod rate_limit;
pub mod resolver;
pub mod scopes;
pub mod token;

pub use api_key::{ApiKeyValidator, KeyData, KeyValidation};
pub use credentials::{Credential, CredentialExtractor};
pub use identity::{Identity, SessionToken};
pub use rate_limit::{RateLimitDecision, RateLimiter};
pub use resolver::{AuthError, AuthMode, AuthResolver, Authenticated};
pub use token::{IssuedToken, JwtKeys, TokenError, TokenIssuer, TokenValidator, UserClaims};

use sha2::{Digest, Sha256};

/// Lookup hash for secrets (API keys, session tokens)
pub fn sha256_hex(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Leading characters of a presented key, safe for logs
pub(crate) fn display_key(raw_key: &str) -> String {
    let shown: String = raw_key.chars().take(12).collect();
    format!("{}…", shown)
}
