// handlers/public/auth/register.rs - POST /auth/register handler

use axum::extract::State;

use crate::database::models::UserView;
use crate::middleware::{ApiJson, ApiResponse, ApiResult};
use crate::server::AppState;
use crate::services::RegisterRequest;

/// POST /auth/register - Create a new account with role `UTILISATEUR`
///
/// Expected Input:
/// ```json
/// { "email": "camille@example.com", "name": "Camille", "password": "at least 8 chars" }
/// ```
///
/// Errors: 400 on invalid email, name or password; 409 when the email is taken.
pub async fn register_post(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> ApiResult<UserView> {
    let user = state
        .accounts
        .register(request)
        .await
        .map_err(|e| e.into_api_error(state.config.debug))?;

    Ok(ApiResponse::created(UserView::from(&user)))
}
