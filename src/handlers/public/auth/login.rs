// handlers/public/auth/login.rs - POST /auth/login handler

use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::audit::{AuditEvent, AuditEventType, ClientInfo};
use crate::database::models::UserView;
use crate::middleware::{ApiJson, ApiResponse, ApiResult};
use crate::server::AppState;
use crate::services::{AccountError, LoginRequest};

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_at: DateTime<Utc>,
    pub expires_in: i64,
    pub user: UserView,
}

/// POST /auth/login - Authenticate with email and password, receive a JWT
///
/// Expected Output (Success):
/// ```json
/// {
///   "success": true,
///   "data": {
///     "token": "eyJhbGciOiJIUzI1NiI...",
///     "token_type": "Bearer",
///     "expires_at": "2025-01-02T00:00:00Z",
///     "expires_in": 86400,
///     "user": { "id": "...", "email": "...", "name": "...", "role": "UTILISATEUR" }
///   }
/// }
/// ```
///
/// Unknown email and wrong password both yield 401 `INVALID_CREDENTIALS`.
pub async fn login_post(
    State(state): State<AppState>,
    client: ClientInfo,
    ApiJson(request): ApiJson<LoginRequest>,
) -> ApiResult<LoginResponse> {
    let email = request.email.clone();

    match state.accounts.login(request).await {
        Ok((user, issued)) => {
            state.audit.record(
                AuditEvent::new(AuditEventType::LoginAttempt, true)
                    .user(user.id)
                    .client(&client),
            );
            let expires_in = (issued.expires_at - state.clock.now()).num_seconds().max(0);
            Ok(ApiResponse::success(LoginResponse {
                token: issued.token,
                token_type: "Bearer",
                expires_at: issued.expires_at,
                expires_in,
                user: UserView::from(&user),
            }))
        }
        Err(e) => {
            if matches!(e, AccountError::InvalidCredentials) {
                tracing::warn!("Failed login for {} from {}", email, client.ip);
                state.audit.record(
                    AuditEvent::new(AuditEventType::LoginAttempt, false)
                        .client(&client)
                        .details(format!("email {}", email)),
                );
            }
            Err(e.into_api_error(state.config.debug))
        }
    }
}
