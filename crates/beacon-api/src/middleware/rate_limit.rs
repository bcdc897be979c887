//! Token bucket rate limiter middleware.
//!
//! Every response carries `X-RateLimit-Limit` / `-Remaining` / `-Reset`;
//! blocked requests get a 429 with `Retry-After`. Buckets are keyed by the
//! forwarded client address and bounded in number so memory stays flat.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use parking_lot::Mutex;
use tracing::warn;

use crate::state::AppState;

/// Maximum tracked buckets before stale ones are evicted.
const MAX_BUCKETS: usize = 10_000;

/// Buckets idle past this age are evictable.
const BUCKET_MAX_AGE: Duration = Duration::from_secs(3600);

/// Burst size per client.
const BURST: u32 = 300;

/// Token refill rate per second per client.
const REFILL_PER_SECOND: f64 = 5.0;

/// Outcome of one rate-limit check.
#[derive(Debug, Clone, Copy)]
pub struct RateDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// The bucket's burst capacity.
    pub limit: u32,
    /// Whole tokens left after this request.
    pub remaining: u32,
    /// Seconds until the bucket refills completely.
    pub reset_seconds: u64,
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new() -> Self {
        Self {
            tokens: BURST as f64,
            last_update: Instant::now(),
        }
    }

    fn check(&mut self) -> RateDecision {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.last_update = now;
        self.tokens = (self.tokens + elapsed * REFILL_PER_SECOND).min(BURST as f64);

        let allowed = self.tokens >= 1.0;
        if allowed {
            self.tokens -= 1.0;
        }

        let reset_seconds = ((BURST as f64 - self.tokens) / REFILL_PER_SECOND).ceil() as u64;
        RateDecision {
            allowed,
            limit: BURST,
            remaining: self.tokens as u32,
            reset_seconds,
        }
    }
}

/// In-memory token bucket rate limiter with bounded memory.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, TokenBucket>>,
}

impl RateLimiter {
    /// Creates an empty limiter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks one request for the given key.
    pub fn check(&self, key: &str) -> RateDecision {
        let mut buckets = self.buckets.lock();

        if buckets.len() >= MAX_BUCKETS && !buckets.contains_key(key) {
            let now = Instant::now();
            let before = buckets.len();
            buckets.retain(|_, bucket| now.duration_since(bucket.last_update) < BUCKET_MAX_AGE);
            if before != buckets.len() {
                warn!(
                    evicted = before - buckets.len(),
                    remaining = buckets.len(),
                    "Evicted stale rate limit buckets"
                );
            }
        }

        buckets
            .entry(key.to_string())
            .or_insert_with(TokenBucket::new)
            .check()
    }
}

/// Axum middleware applying the limiter and stamping the headers.
pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let key = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .map(|raw| raw.split(',').next().unwrap_or(raw).trim().to_string())
        .unwrap_or_else(|| "direct".to_string());

    let decision = state.rate_limiter.check(&key);

    if !decision.allowed {
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            axum::Json(serde_json::json!({"error": "Too many requests"})),
        )
            .into_response();
        stamp_headers(&mut response, decision);
        if let Ok(retry) = HeaderValue::from_str(&decision.reset_seconds.to_string()) {
            response.headers_mut().insert("Retry-After", retry);
        }
        return response;
    }

    let mut response = next.run(request).await;
    stamp_headers(&mut response, decision);
    response
}

fn stamp_headers(response: &mut Response, decision: RateDecision) {
    let headers = response.headers_mut();
    let pairs = [
        ("X-RateLimit-Limit", decision.limit.to_string()),
        ("X-RateLimit-Remaining", decision.remaining.to_string()),
        ("X-RateLimit-Reset", decision.reset_seconds.to_string()),
    ];
    for (name, value) in pairs {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_deplete_and_block() {
        let limiter = RateLimiter::new();
        for _ in 0..BURST {
            assert!(limiter.check("client").allowed);
        }
        let decision = limiter.check("client");
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert!(decision.reset_seconds > 0);
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new();
        for _ in 0..BURST {
            limiter.check("a");
        }
        assert!(!limiter.check("a").allowed);
        assert!(limiter.check("b").allowed);
    }
}
