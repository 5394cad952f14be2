pub mod account_service;
pub mod api_key_service;

pub use account_service::{AccountError, AccountService, LoginRequest, RegisterRequest};
pub use api_key_service::{ApiKeyService, CreatedApiKey, KeyServiceError, NewApiKey};
