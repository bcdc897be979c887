//! Integration tests for the polling metrics endpoint.

mod helpers;

use http::StatusCode;

use helpers::TestApp;

#[tokio::test]
async fn metrics_requires_a_customer_id() {
    let app = TestApp::new().await;
    let response = app.request("GET", "/active-users/metrics", None, &[]).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn metrics_reports_count_and_ema() {
    let app = TestApp::new().await;
    for session in ["s1", "s2", "s3"] {
        app.request(
            "POST",
            "/presence/join",
            Some(TestApp::join_body("acme", session, "t1")),
            &[],
        )
        .await;
    }

    let response = app
        .request("GET", "/active-users/metrics?customerId=acme", None, &[])
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body.get("customerId").unwrap(), "acme");
    assert_eq!(response.body.get("count").unwrap(), 3);
    // No EMA tick has run yet: the raw count stands in.
    assert_eq!(response.body.get("ema").unwrap(), 3.0);
    assert!(response.body.get("timestamp").is_some());
}

#[tokio::test]
async fn metrics_isolates_customers() {
    let app = TestApp::new().await;
    app.request(
        "POST",
        "/presence/join",
        Some(TestApp::join_body("acme", "s1", "t1")),
        &[],
    )
    .await;
    app.request(
        "POST",
        "/presence/join",
        Some(TestApp::join_body("globex", "s9", "t1")),
        &[],
    )
    .await;

    let response = app
        .request("GET", "/active-users/metrics?customerId=globex", None, &[])
        .await;
    assert_eq!(response.body.get("count").unwrap(), 1);
}

#[tokio::test]
async fn metrics_reads_the_smoothed_value_once_sampled() {
    let app = TestApp::new().await;
    app.request(
        "POST",
        "/presence/join",
        Some(TestApp::join_body("acme", "s1", "t1")),
        &[],
    )
    .await;

    // Drive one sampling tick directly.
    app.state.realtime.ema.tick("acme").await.unwrap();

    let response = app
        .request("GET", "/active-users/metrics?customerId=acme", None, &[])
        .await;
    assert_eq!(response.body.get("count").unwrap(), 1);
    assert_eq!(response.body.get("ema").unwrap(), 1.0);
}
