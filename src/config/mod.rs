use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    /// Enables the `api_key` query parameter and error detail in 500 responses
    pub debug: bool,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub api_keys: ApiKeyConfig,
    pub webhook: WebhookConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres connection string; the in-memory store is used when absent
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    pub jwt_algorithm: String,
    pub jwt_ttl_seconds: i64,
    pub track_valid_tokens: bool,
    pub auto_logout_before_login: bool,
    pub bcrypt_cost: u32,
    pub cors_origins: Vec<String>,
    /// Administrator account created at startup when both are set
    pub admin_email: Option<String>,
    #[serde(skip_serializing)]
    pub admin_password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyConfig {
    pub header: String,
    pub live_prefix: String,
    pub test_prefix: String,
    pub default_rate_limit_per_minute: u32,
    pub rate_limit_window_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub secret: Option<String>,
    pub tolerance_secs: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("JWT_SECRET must be set outside development")]
    MissingJwtSecret,
    #[error("Unsupported JWT algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

const DEV_JWT_SECRET: &str = "memoires-development-secret-change-me";

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    /// Rejects configurations the server must not start with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.security.jwt_secret.is_empty()
            || (self.environment != Environment::Development
                && self.security.jwt_secret == DEV_JWT_SECRET)
        {
            return Err(ConfigError::MissingJwtSecret);
        }

        match self.security.jwt_algorithm.as_str() {
            "HS256" | "HS384" | "HS512" => Ok(()),
            other => Err(ConfigError::UnsupportedAlgorithm(other.to_string())),
        }
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = env::var("APP_DEBUG") {
            self.debug = v.parse().unwrap_or(self.debug);
        }

        // Server overrides
        if let Ok(v) = env::var("HOST") {
            self.server.host = v;
        }
        if let Some(port) = env::var("MEMOIRES_API_PORT")
            .ok()
            .or_else(|| env::var("PORT").ok())
            .and_then(|s| s.parse::<u16>().ok())
        {
            self.server.port = port;
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            if !v.trim().is_empty() {
                self.database.url = Some(v);
            }
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }

        // Security overrides
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("JWT_ALGORITHM") {
            self.security.jwt_algorithm = v.to_uppercase();
        }
        if let Ok(v) = env::var("JWT_TTL_SECONDS") {
            self.security.jwt_ttl_seconds = v.parse().unwrap_or(self.security.jwt_ttl_seconds);
        }
        if let Ok(v) = env::var("AUTH_TRACK_VALID_TOKENS") {
            self.security.track_valid_tokens = v.parse().unwrap_or(self.security.track_valid_tokens);
        }
        if let Ok(v) = env::var("AUTH_AUTO_LOGOUT_BEFORE_LOGIN") {
            self.security.auto_logout_before_login =
                v.parse().unwrap_or(self.security.auto_logout_before_login);
        }
        if let Ok(v) = env::var("BCRYPT_COST") {
            self.security.bcrypt_cost = v.parse().unwrap_or(self.security.bcrypt_cost);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = env::var("ADMIN_EMAIL") {
            self.security.admin_email = Some(v).filter(|v| !v.trim().is_empty());
        }
        if let Ok(v) = env::var("ADMIN_PASSWORD") {
            self.security.admin_password = Some(v).filter(|v| !v.is_empty());
        }

        // API key overrides
        if let Ok(v) = env::var("API_KEY_HEADER") {
            self.api_keys.header = v;
        }
        if let Ok(v) = env::var("API_KEY_LIVE_PREFIX") {
            self.api_keys.live_prefix = v;
        }
        if let Ok(v) = env::var("API_KEY_TEST_PREFIX") {
            self.api_keys.test_prefix = v;
        }
        if let Ok(v) = env::var("API_KEY_DEFAULT_RATE_LIMIT") {
            self.api_keys.default_rate_limit_per_minute =
                v.parse().unwrap_or(self.api_keys.default_rate_limit_per_minute);
        }
        if let Ok(v) = env::var("RATE_LIMIT_WINDOW_SECS") {
            self.api_keys.rate_limit_window_secs =
                v.parse().unwrap_or(self.api_keys.rate_limit_window_secs);
        }

        // Webhook overrides
        if let Ok(v) = env::var("WEBHOOK_SECRET") {
            if !v.is_empty() {
                self.webhook.secret = Some(v);
            }
        }
        if let Ok(v) = env::var("WEBHOOK_TOLERANCE_SECS") {
            self.webhook.tolerance_secs = v.parse().unwrap_or(self.webhook.tolerance_secs);
        }

        self
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            debug: true,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                connection_timeout: 30,
            },
            security: SecurityConfig {
                jwt_secret: DEV_JWT_SECRET.to_string(),
                jwt_algorithm: "HS256".to_string(),
                jwt_ttl_seconds: 24 * 3600,
                track_valid_tokens: true,
                auto_logout_before_login: false,
                bcrypt_cost: 10,
                cors_origins: vec![
                    "http://localhost:3000".to_string(),
                    "http://localhost:5173".to_string(),
                ],
                admin_email: None,
                admin_password: None,
            },
            api_keys: ApiKeyConfig::default(),
            webhook: WebhookConfig {
                secret: None,
                tolerance_secs: 300,
            },
        }
    }

    fn staging() -> Self {
        let mut config = Self::development();
        config.environment = Environment::Staging;
        config.debug = false;
        config.database.max_connections = 20;
        config.database.connection_timeout = 10;
        config.security.jwt_secret = String::new();
        config.security.bcrypt_cost = 12;
        config.security.cors_origins = vec!["https://staging.example.com".to_string()];
        config
    }

    fn production() -> Self {
        let mut config = Self::staging();
        config.environment = Environment::Production;
        config.database.max_connections = 50;
        config.database.connection_timeout = 5;
        config.security.cors_origins = vec!["https://app.example.com".to_string()];
        config
    }

    /// Development profile tuned for tests: cheap password hashing, fixed secret
    pub fn for_tests() -> Self {
        let mut config = Self::development();
        config.security.jwt_secret = "test-secret".to_string();
        config.security.bcrypt_cost = 4;
        config.webhook.secret = Some("whsec_test".to_string());
        config
    }
}

impl Default for ApiKeyConfig {
    fn default() -> Self {
        Self {
            header: "X-API-Key".to_string(),
            live_prefix: "ag_live_".to_string(),
            test_prefix: "ag_test_".to_string(),
            default_rate_limit_per_minute: 60,
            rate_limit_window_secs: 60,
        }
    }
}
