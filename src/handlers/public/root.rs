// handlers/public/root.rs - GET / and GET /health

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::server::AppState;

/// GET / - Service banner and endpoint map
pub async fn root() -> ApiResult<Value> {
    Ok(ApiResponse::success(json!({
        "name": "Memoires API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Collective memories backend",
        "endpoints": {
            "public_auth": "/auth/register, /auth/login (public)",
            "webhooks": "/webhooks/payments (public, signed)",
            "auth": "/api/auth/whoami, /api/auth/logout (JWT or API key)",
            "keys": "/api/keys[/:id/revoke|/:id/regenerate] (JWT session)",
            "groups": "/api/groups (JWT or API key with read:groups / write:groups)",
            "external": "/api/external/groups (API key only, read:groups)",
            "admin": "/api/admin/secret (role ADMINISTRATEUR)",
        }
    })))
}

/// GET /health - Liveness plus a store round-trip
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = state.clock.now();

    match state.stores.health.ping().await {
        Ok(()) => (
            StatusCode::OK,
            ApiResponse::success(json!({
                "status": "ok",
                "timestamp": now,
                "database": "ok"
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            ApiError::service_unavailable("database unavailable").into_response()
        }
    }
}

/// Fallback for unmatched routes
pub async fn not_found() -> ApiError {
    ApiError::not_found("Route not found")
}
