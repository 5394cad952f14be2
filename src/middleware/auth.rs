use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;

use crate::audit::{AuditEvent, AuditEventType, ClientInfo};
use crate::auth::{AuthError, AuthMode, Authenticated, Identity, SessionToken};
use crate::database::models::Role;
use crate::server::AppState;

/// Authorization requirements attached to one route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutePolicy {
    pub mode: AuthMode,
    pub scope: Option<&'static str>,
    pub role: Option<Role>,
}

impl Default for RoutePolicy {
    fn default() -> Self {
        Self {
            mode: AuthMode::Flexible,
            scope: None,
            role: None,
        }
    }
}

/// State of one gated route: shared app state plus that route's policy
#[derive(Clone)]
pub struct RouteGuard {
    pub state: AppState,
    pub policy: RoutePolicy,
}

/// Resolves the caller before the handler runs. On success the [`Identity`]
/// (and, for sessions, the [`SessionToken`]) is placed in request extensions.
/// Any failure answers immediately; the handler is never reached.
pub async fn route_gate(State(guard): State<RouteGuard>, mut request: Request, next: Next) -> Response {
    let RouteGuard { state, policy } = guard;
    let client = client_info(&request);

    // The request body is not Sync, so nothing borrowed from it may live across an await
    let headers = request.headers().clone();
    let query = request.uri().query().map(str::to_string);
    let authenticated = match state
        .resolver
        .resolve(&headers, query.as_deref(), policy.mode, policy.scope)
        .await
    {
        Ok(authenticated) => authenticated,
        Err(e) => return reject(&state, &client, e),
    };

    if let Some(required) = policy.role {
        if let Err(e) = check_role(&state, &client, &authenticated.identity, required).await {
            return reject(&state, &client, e);
        }
    }

    let Authenticated {
        identity,
        rate_limit,
        session_token_hash,
    } = authenticated;
    request.extensions_mut().insert(identity);
    if let Some(hash) = session_token_hash {
        request.extensions_mut().insert(SessionToken { hash });
    }

    let mut response = next.run(request).await;
    if let Some(decision) = rate_limit {
        decision.apply_headers(response.headers_mut());
    }
    response
}

/// Identity says who the caller is; this decides whether they may proceed.
async fn check_role(
    state: &AppState,
    client: &ClientInfo,
    identity: &Identity,
    required: Role,
) -> Result<(), AuthError> {
    let user = state.stores.users.find_by_id(identity.user_id()).await?;
    if user.map_or(false, |user| user.role.satisfies(required)) {
        return Ok(());
    }

    tracing::warn!(
        "Role check failed: user {} requires {} on {} from {}",
        identity.user_id(),
        required.as_str(),
        client.endpoint,
        client.ip
    );
    state.audit.record(
        AuditEvent::new(AuditEventType::RoleCheckFailure, false)
            .user(identity.user_id())
            .client(client)
            .attempted_role(required.as_str()),
    );
    Err(AuthError::InsufficientRole { required })
}

fn reject(state: &AppState, client: &ClientInfo, error: AuthError) -> Response {
    match &error {
        AuthError::InvalidApiKey | AuthError::RevokedOrExpiredApiKey => state.audit.record(
            AuditEvent::new(AuditEventType::AuthenticationFailure, false)
                .client(client)
                .details(error.code()),
        ),
        AuthError::RateLimitExceeded(decision) => state.audit.record(
            AuditEvent::new(AuditEventType::RateLimitViolation, false)
                .client(client)
                .details(format!("limit {} per window", decision.limit)),
        ),
        _ => {}
    }

    let decision = match &error {
        AuthError::RateLimitExceeded(decision) => Some(*decision),
        _ => None,
    };
    let mut response = error.into_api_error(state.config.debug).into_response();
    if let Some(decision) = decision {
        decision.apply_headers(response.headers_mut());
    }
    response
}

fn client_info(request: &Request) -> ClientInfo {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    ClientInfo::from_parts(request.headers(), request.method(), request.uri(), peer)
}
