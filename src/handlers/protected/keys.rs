// handlers/protected/keys.rs - API key management for the session's user
//
// Keys can only be managed from a JWT session. An API key cannot mint,
// rotate or revoke keys, including itself.

use axum::{
    extract::{Path, State},
    Extension,
};
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditEventType, ClientInfo};
use crate::auth::Identity;
use crate::database::models::ApiKeyView;
use crate::error::ApiError;
use crate::middleware::{ApiJson, ApiResponse, ApiResult};
use crate::server::AppState;
use crate::services::{CreatedApiKey, NewApiKey};

fn session_user(identity: &Identity) -> Result<Uuid, ApiError> {
    if identity.is_session() {
        Ok(identity.user_id())
    } else {
        Err(ApiError::forbidden(
            "INSUFFICIENT_PERMISSIONS",
            "API keys cannot manage API keys; use a session token",
        ))
    }
}

fn parse_key_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::invalid_field("id", "must be a UUID"))
}

/// GET /api/keys - List the caller's keys; secrets are never included
pub async fn list_get(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Vec<ApiKeyView>> {
    let user_id = session_user(&identity)?;
    let keys = state
        .api_keys
        .list(user_id)
        .await
        .map_err(|e| e.into_api_error(state.config.debug))?;
    Ok(ApiResponse::success(keys))
}

/// POST /api/keys - Create a key
///
/// Expected Input:
/// ```json
/// {
///   "name": "nightly export",
///   "scopes": ["read:groups"],
///   "environment": "live",            // optional: live | test
///   "rate_limit_per_minute": 60,      // optional
///   "expires_at": "2026-01-01T00:00:00Z" // optional
/// }
/// ```
///
/// The response carries `secret`; it is shown this once and cannot be recovered.
pub async fn create_post(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    client: ClientInfo,
    ApiJson(request): ApiJson<NewApiKey>,
) -> ApiResult<CreatedApiKey> {
    let user_id = session_user(&identity)?;
    let created = state
        .api_keys
        .create(user_id, request)
        .await
        .map_err(|e| e.into_api_error(state.config.debug))?;

    state.audit.record(
        AuditEvent::new(AuditEventType::ApiKeyCreated, true)
            .user(user_id)
            .client(&client)
            .details(format!("key {} ({})", created.key.id, created.key.key_prefix)),
    );
    Ok(ApiResponse::created(created))
}

/// POST /api/keys/:id/revoke - Revoke a key. Revoking twice is not an error.
pub async fn revoke_post(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    client: ClientInfo,
) -> ApiResult<ApiKeyView> {
    let user_id = session_user(&identity)?;
    let id = parse_key_id(&id)?;
    let key = state
        .api_keys
        .revoke(user_id, id)
        .await
        .map_err(|e| e.into_api_error(state.config.debug))?;

    state.audit.record(
        AuditEvent::new(AuditEventType::ApiKeyRevoked, true)
            .user(user_id)
            .client(&client)
            .details(format!("key {}", id)),
    );
    Ok(ApiResponse::success(key))
}

/// POST /api/keys/:id/regenerate - Issue a new secret for an active key
///
/// The old secret stops working immediately. Revoked keys answer 409.
pub async fn regenerate_post(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    client: ClientInfo,
) -> ApiResult<CreatedApiKey> {
    let user_id = session_user(&identity)?;
    let id = parse_key_id(&id)?;
    let regenerated = state
        .api_keys
        .regenerate(user_id, id)
        .await
        .map_err(|e| e.into_api_error(state.config.debug))?;

    state.audit.record(
        AuditEvent::new(AuditEventType::ApiKeyRegenerated, true)
            .user(user_id)
            .client(&client)
            .details(format!("key {} ({})", id, regenerated.key.key_prefix)),
    );
    Ok(ApiResponse::success(regenerated))
}
