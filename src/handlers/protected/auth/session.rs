use axum::{extract::State, Extension};
use serde::Serialize;
use serde_json::{json, Value};

use crate::audit::{AuditEvent, AuditEventType, ClientInfo};
use crate::auth::{Identity, SessionToken};
use crate::database::models::UserView;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct WhoAmI {
    #[serde(flatten)]
    pub identity: Identity,
    pub user: Option<UserView>,
}

/// GET /api/auth/whoami - Describe the resolved caller
///
/// Works for both credential types; `auth_type` is `"jwt"` or `"api_key"`.
pub async fn whoami_get(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<WhoAmI> {
    let user = state
        .accounts
        .find_user(identity.user_id())
        .await
        .map_err(|e| e.into_api_error(state.config.debug))?;

    Ok(ApiResponse::success(WhoAmI {
        user: user.as_ref().map(UserView::from),
        identity,
    }))
}

/// POST /api/auth/logout - Invalidate the session token used for this request
///
/// API keys have no session; revoke them through `/api/keys/:id/revoke` instead.
pub async fn logout_post(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    session: Option<Extension<SessionToken>>,
    client: ClientInfo,
) -> ApiResult<Value> {
    let Some(Extension(session)) = session else {
        return Err(ApiError::bad_request_with_code(
            "NOT_A_SESSION",
            "Only session tokens can be logged out",
        ));
    };

    let revoked = state
        .accounts
        .logout(&session.hash)
        .await
        .map_err(|e| e.into_api_error(state.config.debug))?;

    state.audit.record(
        AuditEvent::new(AuditEventType::Logout, true)
            .user(identity.user_id())
            .client(&client),
    );

    Ok(ApiResponse::success(json!({ "logged_out": true, "revoked": revoked })))
}
