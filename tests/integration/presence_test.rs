//! Integration tests for the JOIN / LEAVE REST surface.

mod helpers;

use axum::body::Body;
use http::{Request, StatusCode};

use beacon_core::traits::cache::CacheProvider;

use helpers::TestApp;

#[tokio::test]
async fn join_accepts_and_writes_a_record_with_mode_ttl() {
    let app = TestApp::new().await;

    let response = app
        .request(
            "POST",
            "/presence/join",
            Some(TestApp::join_body("acme", "s1", "t1")),
            &[],
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body.get("success").unwrap(), true);

    let ttl = app.state.store.get_key_ttl("acme", "s1").await.unwrap();
    assert_eq!(ttl, 600);
}

#[tokio::test]
async fn join_with_passive_mode_gets_the_shorter_ttl() {
    let app = TestApp::new().await;

    let mut body = TestApp::join_body("acme", "s1", "t1");
    body["session_mode"] = serde_json::json!("passive_active");
    let response = app.request("POST", "/presence/join", Some(body), &[]).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(app.state.store.get_key_ttl("acme", "s1").await.unwrap(), 300);
}

#[tokio::test]
async fn join_without_identifiers_is_rejected() {
    let app = TestApp::new().await;

    let response = app
        .request(
            "POST",
            "/presence/join",
            Some(serde_json::json!({"customerId": "acme"})),
            &[],
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        response.body.get("error").unwrap(),
        "Missing required fields"
    );
}

#[tokio::test]
async fn leave_removes_the_record() {
    let app = TestApp::new().await;
    app.request(
        "POST",
        "/presence/join",
        Some(TestApp::join_body("acme", "s1", "t1")),
        &[],
    )
    .await;

    let response = app
        .request(
            "POST",
            "/presence/leave",
            Some(serde_json::json!({
                "customerId": "acme",
                "sessionId": "s1",
                "tabId": "t1",
                "mode": "final",
                "reason": "external",
            })),
            &[],
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(app.state.store.get("acme", "s1").await.unwrap().is_none());
}

#[tokio::test]
async fn leave_accepts_a_text_plain_beacon_body() {
    let app = TestApp::new().await;
    app.request(
        "POST",
        "/presence/join",
        Some(TestApp::join_body("acme", "s1", "t1")),
        &[],
    )
    .await;

    let body = r#"{"customerId":"acme","sessionId":"s1","tabId":"t1","mode":"pending","reason":"unknown"}"#;
    let request = Request::builder()
        .method("POST")
        .uri("/presence/leave")
        .header("Content-Type", "text/plain")
        .body(Body::from(body))
        .unwrap();

    let response = app.send(request).await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(app.state.store.get("acme", "s1").await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_leave_id_collapses_to_no_content() {
    let app = TestApp::new().await;
    app.request(
        "POST",
        "/presence/join",
        Some(TestApp::join_body("acme", "s1", "t1")),
        &[],
    )
    .await;

    let leave = serde_json::json!({
        "customerId": "acme",
        "sessionId": "s1",
        "tabId": "t1",
    });
    let first = app
        .request(
            "POST",
            "/presence/leave",
            Some(leave.clone()),
            &[("X-Leave-Id", "leave-1")],
        )
        .await;
    assert_eq!(first.status, StatusCode::OK);

    let second = app
        .request(
            "POST",
            "/presence/leave",
            Some(leave),
            &[("X-Leave-Id", "leave-1")],
        )
        .await;
    assert_eq!(second.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn unparseable_leave_is_dismissal_safe() {
    let app = TestApp::new().await;

    let request = Request::builder()
        .method("POST")
        .uri("/presence/leave")
        .header("Content-Type", "text/plain")
        .body(Body::from("not json at all"))
        .unwrap();

    let response = app.send(request).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn leave_without_identifiers_is_dismissal_safe() {
    let app = TestApp::new().await;
    let response = app
        .request(
            "POST",
            "/presence/leave",
            Some(serde_json::json!({"mode": "pending"})),
            &[],
        )
        .await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn late_join_after_leave_is_suppressed_for_the_same_tab() {
    let app = TestApp::new().await;

    // LEAVE for an already-absent record plants the tombstone.
    app.request(
        "POST",
        "/presence/leave",
        Some(serde_json::json!({
            "customerId": "acme",
            "sessionId": "s1",
            "tabId": "t1",
        })),
        &[],
    )
    .await;

    let response = app
        .request(
            "POST",
            "/presence/join",
            Some(TestApp::join_body("acme", "s1", "t1")),
            &[],
        )
        .await;

    // The surface stays a friendly 200, but no record reappears.
    assert_eq!(response.status, StatusCode::OK);
    assert!(app.state.store.get("acme", "s1").await.unwrap().is_none());
}

#[tokio::test]
async fn thin_join_preserves_device_fields() {
    let app = TestApp::new().await;

    let mut body = TestApp::join_body("acme", "s1", "t1");
    body["device"] = serde_json::json!("mobile");
    body["total_tab_quantity"] = serde_json::json!(3);
    app.request("POST", "/presence/join", Some(body), &[]).await;

    // A polling-mode refresh arrives without the device fields.
    app.request(
        "POST",
        "/presence/join",
        Some(TestApp::join_body("acme", "s1", "t1")),
        &[],
    )
    .await;

    let record = app.state.store.get("acme", "s1").await.unwrap().unwrap();
    assert_eq!(serde_json::to_value(record.device).unwrap(), "mobile");
    assert_eq!(record.total_tab_quantity, 3);
}

#[tokio::test]
async fn legacy_beat_updates_without_resetting_ttl() {
    let app = TestApp::new().await;
    app.request(
        "POST",
        "/presence/join",
        Some(TestApp::join_body("acme", "s1", "t1")),
        &[],
    )
    .await;
    let created = app
        .state
        .store
        .get("acme", "s1")
        .await
        .unwrap()
        .unwrap()
        .created_at;

    let response = app
        .request(
            "POST",
            "/presence/beat",
            Some(TestApp::join_body("acme", "s1", "t2")),
            &[],
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let record = app.state.store.get("acme", "s1").await.unwrap().unwrap();
    assert_eq!(record.tab_id, "t2");
    assert_eq!(record.created_at, created);
}

#[tokio::test]
async fn legacy_beat_creates_a_missing_record() {
    let app = TestApp::new().await;
    let response = app
        .request(
            "POST",
            "/presence/beat",
            Some(TestApp::join_body("acme", "ghost", "t1")),
            &[],
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(app.state.store.get_key_ttl("acme", "ghost").await.unwrap(), 600);
}

#[tokio::test]
async fn rate_limit_headers_are_present_on_every_response() {
    let app = TestApp::new().await;
    let response = app.request("GET", "/health", None, &[]).await;

    assert_eq!(response.status, StatusCode::OK);
    for header in ["X-RateLimit-Limit", "X-RateLimit-Remaining", "X-RateLimit-Reset"] {
        assert!(
            response.headers.contains_key(header),
            "missing header {header}"
        );
    }
}

#[tokio::test]
async fn health_reports_cache_state() {
    let app = TestApp::new().await;
    assert!(app.state.cache.health_check().await.unwrap());

    let response = app.request("GET", "/health", None, &[]).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body.get("status").unwrap(), "ok");
    assert_eq!(response.body.get("cache").unwrap(), true);
}
