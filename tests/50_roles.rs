mod common;

use axum::http::StatusCode;
use common::{bearer, TestApp};
use memoires_api::audit::AuditEventType;

#[tokio::test]
async fn regular_user_is_refused_and_audited() {
    let app = TestApp::new();
    let (user_id, token) = app.session("ana@example.com").await;

    let res = app
        .get(
            "/api/admin/secret",
            &[
                ("authorization", &bearer(&token)),
                ("x-forwarded-for", "203.0.113.9, 10.0.0.1"),
                ("user-agent", "souvenirs-cli/1.0"),
            ],
        )
        .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(res.error_code(), "INSUFFICIENT_PERMISSIONS");
    assert_eq!(res.body["errors"]["required_role"], "ADMINISTRATEUR");

    let events = app.audit.events();
    let event = events
        .iter()
        .find(|e| e.event_type == AuditEventType::RoleCheckFailure)
        .expect("role check failure recorded");
    assert!(!event.success);
    assert_eq!(event.user_id, Some(user_id));
    assert_eq!(event.client_ip.as_deref(), Some("203.0.113.9"));
    assert_eq!(event.user_agent.as_deref(), Some("souvenirs-cli/1.0"));
    assert_eq!(event.endpoint.as_deref(), Some("GET /api/admin/secret"));
    assert_eq!(event.attempted_role.as_deref(), Some("ADMINISTRATEUR"));
}

#[tokio::test]
async fn administrator_gets_through() {
    let app = TestApp::new();
    let (user_id, token) = app.admin_session("root@example.com").await;

    let res = app.get("/api/admin/secret", &[("authorization", &bearer(&token))]).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["user_id"], user_id.to_string());
    assert!(app
        .audit
        .events()
        .iter()
        .all(|e| e.event_type != AuditEventType::RoleCheckFailure));
}

#[tokio::test]
async fn role_applies_to_api_key_owner() {
    let app = TestApp::new();
    let (admin_id, _) = app.admin_session("root@example.com").await;
    let (_, secret) = app.api_key(admin_id, &["read:groups"], 10).await;

    let res = app.get("/api/admin/secret", &[("x-api-key", &secret)]).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["auth_type"], "api_key");
}

#[tokio::test]
async fn unauthenticated_callers_get_401_not_403() {
    let app = TestApp::new();

    let res = app.get("/api/admin/secret", &[]).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert!(app.audit.events().is_empty());
}
