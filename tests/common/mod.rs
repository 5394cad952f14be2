#![allow(dead_code)]

use std::process::{Child, Command, Stdio};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::body::{to_bytes, Body};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use memoires_api::audit::MemoryAuditSink;
use memoires_api::clock::Clock;
use memoires_api::config::AppConfig;
use memoires_api::database::models::KeyEnvironment;
use memoires_api::services::{LoginRequest, NewApiKey, RegisterRequest};
use memoires_api::{build_router, AppState};

pub const PASSWORD: &str = "souvenirs-2024";

// ---------------------------------------------------------------------------
// Spawned server, for smoke tests over real HTTP
// ---------------------------------------------------------------------------

static SERVER: OnceLock<TestServer> = OnceLock::new();

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    child: Child,
}

impl TestServer {
    fn spawn() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        // In-memory store and cheap hashing keep the server self-contained
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_memoires-api"));
        cmd.env("MEMOIRES_API_PORT", port.to_string())
            .env("HOST", "127.0.0.1")
            .env("APP_ENV", "development")
            .env("DATABASE_URL", "")
            .env("JWT_SECRET", "smoke-test-secret")
            .env("BCRYPT_COST", "4")
            .env("RUST_LOG", "warn")
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let child = cmd.spawn().context("failed to spawn server binary")?;

        Ok(Self { port, base_url, child })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                break;
            }
            let url = format!("{}/health", self.base_url);
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status() == reqwest::StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }
}

pub async fn ensure_server() -> Result<&'static TestServer> {
    let server = SERVER.get_or_init(|| TestServer::spawn().expect("failed to spawn server binary"));
    server.wait_ready(Duration::from_secs(10)).await?;
    Ok(server)
}

// ---------------------------------------------------------------------------
// In-process app, driven with tower's oneshot
// ---------------------------------------------------------------------------

pub struct TestApp {
    pub state: AppState,
    pub audit: Arc<MemoryAuditSink>,
    pub now: DateTime<Utc>,
    router: Router,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn error_code(&self) -> &str {
        self.body["errors"]["error"].as_str().unwrap_or_default()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(AppConfig::for_tests())
    }

    /// The clock is frozen at construction, so every request shares one
    /// rate-limit window.
    pub fn with_config(config: AppConfig) -> Self {
        let audit = Arc::new(MemoryAuditSink::new());
        let now = Utc::now();
        let state = AppState::in_memory(config, audit.clone(), Clock::Fixed(now)).expect("valid test config");
        Self {
            router: build_router(state.clone()),
            state,
            audit,
            now,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        TestResponse { status, headers, body }
    }

    pub async fn get(&self, uri: &str, headers: &[(&str, &str)]) -> TestResponse {
        self.send(request(Method::GET, uri, headers, None)).await
    }

    pub async fn post(&self, uri: &str, headers: &[(&str, &str)], body: Option<Value>) -> TestResponse {
        self.send(request(Method::POST, uri, headers, body)).await
    }

    /// Registers a regular user and logs them in
    pub async fn session(&self, email: &str) -> (Uuid, String) {
        self.state
            .accounts
            .register(RegisterRequest {
                email: email.to_string(),
                name: "Camille".to_string(),
                password: PASSWORD.to_string(),
            })
            .await
            .expect("register");
        self.login(email).await
    }

    pub async fn admin_session(&self, email: &str) -> (Uuid, String) {
        self.state
            .accounts
            .ensure_admin(email, PASSWORD)
            .await
            .expect("admin");
        self.login(email).await
    }

    pub async fn login(&self, email: &str) -> (Uuid, String) {
        let (user, issued) = self
            .state
            .accounts
            .login(LoginRequest {
                email: email.to_string(),
                password: PASSWORD.to_string(),
            })
            .await
            .expect("login");
        (user.id, issued.token)
    }

    /// Creates a key for `user_id` and returns `(key id, secret)`
    pub async fn api_key(&self, user_id: Uuid, scopes: &[&str], rate_limit: u32) -> (Uuid, String) {
        let created = self
            .state
            .api_keys
            .create(
                user_id,
                NewApiKey {
                    name: "integration".to_string(),
                    scopes: scopes.iter().map(|s| s.to_string()).collect(),
                    environment: KeyEnvironment::Live,
                    rate_limit_per_minute: Some(rate_limit),
                    expires_at: None,
                },
            )
            .await
            .expect("create key");
        (created.key.id, created.secret)
    }
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

fn request(method: Method, uri: &str, headers: &[(&str, &str)], body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}
