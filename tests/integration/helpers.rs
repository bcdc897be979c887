//! Shared test helpers for integration tests.

use axum::Router;
use axum::body::Body;
use http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use beacon_api::state::AppState;
use beacon_core::config::AppConfig;

/// Test application context.
pub struct TestApp {
    /// The Axum router for making test requests.
    pub router: Router,
    /// Full application state for direct store access.
    pub state: AppState,
}

impl TestApp {
    /// Create a new test application over the in-memory cache provider.
    pub async fn new() -> Self {
        let config = AppConfig::default();
        let state = beacon_api::build_state(config)
            .await
            .expect("Failed to build app state");
        let router = beacon_api::build_router(state.clone());

        Self { router, state }
    }

    /// Make an HTTP request to the test app.
    pub async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let body_str = body
            .map(|b| serde_json::to_string(&b).expect("Failed to serialize body"))
            .unwrap_or_default();

        let mut req = Request::builder()
            .method(method)
            .uri(path)
            .header("Content-Type", "application/json");

        for (name, value) in headers {
            req = req.header(*name, *value);
        }

        let req = req
            .body(Body::from(body_str))
            .expect("Failed to build request");

        self.send(req).await
    }

    /// Send a raw request (for beacon-style bodies).
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body_bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("Failed to read body");

        let body: Value = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);

        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// A minimal valid JOIN body.
    pub fn join_body(customer: &str, session: &str, tab: &str) -> Value {
        serde_json::json!({
            "customerId": customer,
            "sessionId": session,
            "tabId": tab,
            "timestamp": 1_700_000_000_000i64,
        })
    }
}

/// Response from a test request.
#[derive(Debug)]
pub struct TestResponse {
    /// HTTP status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: http::HeaderMap,
    /// Parsed JSON body (Null when empty or not JSON).
    pub body: Value,
}
