use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{IssuedToken, TokenError, TokenIssuer};
use crate::clock::Clock;
use crate::config::SecurityConfig;
use crate::database::models::{Role, UserRecord};
use crate::database::{StoreError, UserStore, ValidTokenStore};
use crate::error::ApiError;

const MIN_PASSWORD_LEN: usize = 8;
/// bcrypt ignores input past 72 bytes
const MAX_PASSWORD_BYTES: usize = 72;
const MAX_NAME_LEN: usize = 100;
const UNKNOWN_ACCOUNT_PASSWORD: &str = "memoires-unknown-account";

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("{field}: {message}")]
    Validation { field: &'static str, message: String },
    #[error("An account with this email already exists")]
    EmailTaken,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Password hashing failed: {0}")]
    Hashing(String),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for AccountError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(_) => AccountError::EmailTaken,
            other => AccountError::Store(other),
        }
    }
}

impl AccountError {
    pub fn into_api_error(self, debug: bool) -> ApiError {
        match self {
            AccountError::Validation { field, message } => ApiError::invalid_field(field, message),
            AccountError::EmailTaken => ApiError::conflict("An account with this email already exists"),
            AccountError::InvalidCredentials => {
                ApiError::unauthorized("INVALID_CREDENTIALS", "Invalid email or password")
            }
            AccountError::Hashing(e) => ApiError::internal(&e, debug),
            AccountError::Token(e) => ApiError::internal(&e, debug),
            AccountError::Store(e) => ApiError::internal(&e, debug),
        }
    }
}

/// Registration, password login and logout
pub struct AccountService {
    users: Arc<dyn UserStore>,
    tokens: Arc<dyn ValidTokenStore>,
    issuer: TokenIssuer,
    bcrypt_cost: u32,
    track_valid_tokens: bool,
    auto_logout_before_login: bool,
    clock: Clock,
    /// Verified against when the email is unknown, at the configured cost
    dummy_hash: OnceCell<String>,
}

impl AccountService {
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn ValidTokenStore>,
        issuer: TokenIssuer,
        security: &SecurityConfig,
        clock: Clock,
    ) -> Self {
        Self {
            users,
            tokens,
            issuer,
            bcrypt_cost: security.bcrypt_cost,
            track_valid_tokens: security.track_valid_tokens,
            auto_logout_before_login: security.auto_logout_before_login,
            clock,
            dummy_hash: OnceCell::new(),
        }
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<UserRecord, AccountError> {
        self.create_user(request, Role::Utilisateur).await
    }

    /// Creates the administrator account unless the email is already registered
    pub async fn ensure_admin(&self, email: &str, password: &str) -> Result<bool, AccountError> {
        if self.users.find_by_email(&normalize_email(email)).await?.is_some() {
            return Ok(false);
        }
        let request = RegisterRequest {
            email: email.to_string(),
            name: "Administrateur".to_string(),
            password: password.to_string(),
        };
        self.create_user(request, Role::Administrateur).await?;
        Ok(true)
    }

    /// Returns the user and a fresh session token. Unknown emails and wrong
    /// passwords fail identically.
    pub async fn login(&self, request: LoginRequest) -> Result<(UserRecord, IssuedToken), AccountError> {
        let Some(user) = self.users.find_by_email(&normalize_email(&request.email)).await? else {
            verify_password(request.password, self.dummy_hash().await?).await?;
            return Err(AccountError::InvalidCredentials);
        };

        if !verify_password(request.password, user.password_hash.clone()).await? {
            return Err(AccountError::InvalidCredentials);
        }

        if self.auto_logout_before_login {
            let revoked = self.tokens.revoke_all_for_user(user.id).await?;
            if revoked > 0 {
                tracing::debug!("Revoked {} earlier sessions of user {}", revoked, user.id);
            }
        }

        let issued = self.issuer.issue(user.id, Some(user.email.clone()))?;
        if self.track_valid_tokens {
            self.tokens
                .register(&issued.token_hash, user.id, issued.expires_at)
                .await?;
        }

        Ok((user, issued))
    }

    /// Invalidates one session token by hash
    pub async fn logout(&self, token_hash: &str) -> Result<bool, AccountError> {
        Ok(self.tokens.revoke(token_hash).await?)
    }

    pub async fn find_user(&self, user_id: Uuid) -> Result<Option<UserRecord>, AccountError> {
        Ok(self.users.find_by_id(user_id).await?)
    }

    async fn dummy_hash(&self) -> Result<String, AccountError> {
        if let Some(hash) = self.dummy_hash.get() {
            return Ok(hash.clone());
        }
        let hash = hash_password(UNKNOWN_ACCOUNT_PASSWORD.to_string(), self.bcrypt_cost).await?;
        Ok(self.dummy_hash.get_or_init(|| hash).clone())
    }

    async fn create_user(&self, request: RegisterRequest, role: Role) -> Result<UserRecord, AccountError> {
        let email = normalize_email(&request.email);
        validate_email(&email)?;
        let name = request.name.trim().to_string();
        if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
            return Err(AccountError::Validation {
                field: "name",
                message: format!("must be between 1 and {} characters", MAX_NAME_LEN),
            });
        }
        validate_password(&request.password)?;

        let password_hash = hash_password(request.password, self.bcrypt_cost).await?;
        let user = UserRecord {
            id: Uuid::new_v4(),
            email,
            name,
            password_hash,
            role,
            created_at: self.clock.now(),
        };
        self.users.insert(user.clone()).await?;

        tracing::info!("Registered user {} with role {}", user.id, role.as_str());
        Ok(user)
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> Result<(), AccountError> {
    let invalid = || AccountError::Validation {
        field: "email",
        message: "invalid email format".to_string(),
    };
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') || !domain.contains('.') {
        return Err(invalid());
    }
    if domain.starts_with('.') || domain.ends_with('.') || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), AccountError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AccountError::Validation {
            field: "password",
            message: format!("must be at least {} characters", MIN_PASSWORD_LEN),
        });
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(AccountError::Validation {
            field: "password",
            message: format!("must not exceed {} bytes", MAX_PASSWORD_BYTES),
        });
    }
    Ok(())
}

// bcrypt is CPU-bound; keep it off the async workers
async fn hash_password(password: String, cost: u32) -> Result<String, AccountError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AccountError::Hashing(e.to_string()))?
        .map_err(|e| AccountError::Hashing(e.to_string()))
}

async fn verify_password(password: String, hash: String) -> Result<bool, AccountError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AccountError::Hashing(e.to_string()))?
        .map_err(|e| AccountError::Hashing(e.to_string()))
}
