mod common;

use axum::http::StatusCode;
use common::{bearer, TestApp};
use memoires_api::config::AppConfig;

#[tokio::test]
async fn no_credential_means_no_handler() {
    let app = TestApp::new();

    let flexible = app.get("/api/groups", &[]).await;
    assert_eq!(flexible.status, StatusCode::UNAUTHORIZED);
    assert_eq!(flexible.error_code(), "MISSING_TOKEN");
    assert_eq!(flexible.body["success"], false);

    let strict = app.get("/api/external/groups", &[]).await;
    assert_eq!(strict.status, StatusCode::UNAUTHORIZED);
    assert_eq!(strict.error_code(), "MISSING_API_KEY");
}

#[tokio::test]
async fn dedicated_header_wins_over_authorization() {
    let app = TestApp::new();
    let (user_id, token) = app.session("ana@example.com").await;
    let (key_id, secret) = app.api_key(user_id, &["read:groups"], 10).await;

    // A valid key next to a valid session: the key is what gets used
    let res = app
        .get("/api/auth/whoami", &[("x-api-key", &secret), ("authorization", &bearer(&token))])
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["auth_type"], "api_key");
    assert_eq!(res.body["data"]["api_key_id"], key_id.to_string());

    // An unknown key is not rescued by the valid session
    let res = app
        .get(
            "/api/auth/whoami",
            &[("x-api-key", "ag_live_abc123"), ("authorization", &bearer(&token))],
        )
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.error_code(), "INVALID_API_KEY");
}

#[tokio::test]
async fn bearer_carrying_a_key_prefix_is_an_api_key() {
    let app = TestApp::new();
    let (user_id, _) = app.session("ana@example.com").await;
    let (_, secret) = app.api_key(user_id, &["read:groups"], 10).await;

    let res = app
        .get("/api/external/groups", &[("authorization", &bearer(&secret))])
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.header("x-ratelimit-remaining"), Some("9"));
}

#[tokio::test]
async fn query_parameter_only_in_debug_mode() {
    let mut config = AppConfig::for_tests();
    config.debug = true;
    let debug_app = TestApp::with_config(config);
    let (user_id, _) = debug_app.session("ana@example.com").await;
    let (_, secret) = debug_app.api_key(user_id, &["read:groups"], 10).await;

    let res = debug_app
        .get(&format!("/api/external/groups?api_key={}", secret), &[])
        .await;
    assert_eq!(res.status, StatusCode::OK);

    let mut config = AppConfig::for_tests();
    config.debug = false;
    let app = TestApp::with_config(config);
    let (user_id, _) = app.session("ana@example.com").await;
    let (_, secret) = app.api_key(user_id, &["read:groups"], 10).await;

    let res = app.get(&format!("/api/external/groups?api_key={}", secret), &[]).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.error_code(), "MISSING_API_KEY");
}

#[tokio::test]
async fn strict_routes_refuse_sessions() {
    let app = TestApp::new();
    let (_, token) = app.session("ana@example.com").await;

    let res = app
        .get("/api/external/groups", &[("authorization", &bearer(&token))])
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.error_code(), "MISSING_API_KEY");
}
