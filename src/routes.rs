// Route table
//
// Every route is one `RouteSpec`: method, path, handler and its access policy.
// Routes require authentication unless marked `public()`; gated routes get the
// route gate as a route layer carrying their own policy.

use axum::{
    handler::Handler,
    http::{HeaderName, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, post, MethodRouter},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::{rate_limit, scopes, AuthMode};
use crate::database::models::Role;
use crate::handlers::{elevated, protected, public};
use crate::middleware::{route_gate, RouteGuard, RoutePolicy};
use crate::server::AppState;

pub struct RouteSpec {
    pub method: Method,
    pub path: &'static str,
    /// `None` for public routes
    pub policy: Option<RoutePolicy>,
    handler: MethodRouter<AppState>,
}

impl RouteSpec {
    pub fn get<H, T>(path: &'static str, handler: H) -> Self
    where
        H: Handler<T, AppState>,
        T: 'static,
    {
        Self::new(Method::GET, path, get(handler))
    }

    pub fn post<H, T>(path: &'static str, handler: H) -> Self
    where
        H: Handler<T, AppState>,
        T: 'static,
    {
        Self::new(Method::POST, path, post(handler))
    }

    fn new(method: Method, path: &'static str, handler: MethodRouter<AppState>) -> Self {
        Self {
            method,
            path,
            policy: Some(RoutePolicy::default()),
            handler,
        }
    }

    pub fn public(mut self) -> Self {
        self.policy = None;
        self
    }

    pub fn api_key_only(mut self) -> Self {
        self.policy_mut().mode = AuthMode::ApiKeyOnly;
        self
    }

    pub fn scope(mut self, scope: &'static str) -> Self {
        self.policy_mut().scope = Some(scope);
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.policy_mut().role = Some(role);
        self
    }

    pub fn requires_auth(&self) -> bool {
        self.policy.is_some()
    }

    fn policy_mut(&mut self) -> &mut RoutePolicy {
        self.policy.get_or_insert_with(RoutePolicy::default)
    }
}

pub fn route_table() -> Vec<RouteSpec> {
    vec![
        // Public
        RouteSpec::get("/", public::root).public(),
        RouteSpec::get("/health", public::health).public(),
        RouteSpec::post("/auth/register", public::register_post).public(),
        RouteSpec::post("/auth/login", public::login_post).public(),
        RouteSpec::post("/webhooks/payments", public::payments_post).public(),
        // Any credential
        RouteSpec::get("/api/auth/whoami", protected::whoami_get),
        RouteSpec::post("/api/auth/logout", protected::logout_post),
        // Session-only; the handlers turn API-key callers away
        RouteSpec::get("/api/keys", protected::keys::list_get),
        RouteSpec::post("/api/keys", protected::keys::create_post),
        RouteSpec::post("/api/keys/:id/revoke", protected::keys::revoke_post),
        RouteSpec::post("/api/keys/:id/regenerate", protected::keys::regenerate_post),
        // Scoped
        RouteSpec::get("/api/groups", protected::groups::list_get).scope(scopes::READ_GROUPS),
        RouteSpec::post("/api/groups", protected::groups::create_post).scope(scopes::WRITE_GROUPS),
        RouteSpec::get("/api/external/groups", protected::groups::list_get)
            .api_key_only()
            .scope(scopes::READ_GROUPS),
        // Role-gated
        RouteSpec::get("/api/admin/secret", elevated::secret_get).role(Role::Administrateur),
    ]
}

pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new();

    for spec in route_table() {
        let handler = match spec.policy {
            Some(policy) => spec.handler.route_layer(from_fn_with_state(
                RouteGuard {
                    state: state.clone(),
                    policy,
                },
                route_gate,
            )),
            None => spec.handler,
        };
        router = router.route(spec.path, handler);
    }

    router
        .fallback(public::not_found)
        .layer(cors_layer(&state.config.security.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .expose_headers([
            HeaderName::from_static(rate_limit::HEADER_LIMIT),
            HeaderName::from_static(rate_limit::HEADER_REMAINING),
            HeaderName::from_static(rate_limit::HEADER_RESET),
        ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_marks_public_and_gated_routes() {
        let table = route_table();
        let find = |method: Method, path: &str| {
            table
                .iter()
                .find(|spec| spec.method == method && spec.path == path)
                .unwrap()
        };

        assert!(!find(Method::POST, "/auth/login").requires_auth());
        assert!(!find(Method::GET, "/health").requires_auth());

        let external = find(Method::GET, "/api/external/groups").policy.unwrap();
        assert_eq!(external.mode, AuthMode::ApiKeyOnly);
        assert_eq!(external.scope, Some("read:groups"));

        let write = find(Method::POST, "/api/groups").policy.unwrap();
        assert_eq!(write.mode, AuthMode::Flexible);
        assert_eq!(write.scope, Some("write:groups"));

        let admin = find(Method::GET, "/api/admin/secret").policy.unwrap();
        assert_eq!(admin.role, Some(Role::Administrateur));
    }

    #[test]
    fn no_duplicate_method_path_pairs() {
        let table = route_table();
        for (i, a) in table.iter().enumerate() {
            for b in &table[i + 1..] {
                assert!(!(a.method == b.method && a.path == b.path), "{} {}", a.method, a.path);
            }
        }
    }
}
