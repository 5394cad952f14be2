// handlers/protected/groups.rs - Memory groups owned by the caller
//
// Minimal resource used to exercise scoped access: reading needs
// `read:groups`, writing needs `write:groups` when the caller is an API key.

use axum::{extract::State, Extension};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::Identity;
use crate::database::models::GroupRecord;
use crate::error::ApiError;
use crate::middleware::{ApiJson, ApiResponse, ApiResult};
use crate::server::AppState;

const MAX_NAME_LEN: usize = 120;

#[derive(Debug, Deserialize)]
pub struct NewGroup {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// GET /api/groups and GET /api/external/groups
pub async fn list_get(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Vec<GroupRecord>> {
    let groups = state
        .stores
        .groups
        .list_for_user(identity.user_id())
        .await
        .map_err(|e| ApiError::internal(&e, state.config.debug))?;
    Ok(ApiResponse::success(groups))
}

/// POST /api/groups
pub async fn create_post(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiJson(request): ApiJson<NewGroup>,
) -> ApiResult<GroupRecord> {
    let name = request.name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(ApiError::invalid_field(
            "name",
            format!("must be between 1 and {} characters", MAX_NAME_LEN),
        ));
    }

    let group = GroupRecord {
        id: Uuid::new_v4(),
        owner_id: identity.user_id(),
        name: name.to_string(),
        description: request.description.filter(|d| !d.trim().is_empty()),
        created_at: state.clock.now(),
    };
    state
        .stores
        .groups
        .insert(group.clone())
        .await
        .map_err(|e| ApiError::internal(&e, state.config.debug))?;

    tracing::info!("User {} created group {} via {}", group.owner_id, group.id, identity.auth_type());
    Ok(ApiResponse::created(group))
}
