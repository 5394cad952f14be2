use axum::{extract::State, Extension};
use serde_json::{json, Value};

use crate::auth::Identity;
use crate::middleware::{ApiResponse, ApiResult};
use crate::server::AppState;

/// GET /api/admin/secret - Administrator-only probe
///
/// Reaching this handler means the gate already confirmed the caller's role.
pub async fn secret_get(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Value> {
    Ok(ApiResponse::success(json!({
        "message": "Welcome, administrator",
        "user_id": identity.user_id(),
        "auth_type": identity.auth_type(),
        "environment": state.config.environment,
        "server_time": state.clock.now(),
    })))
}
