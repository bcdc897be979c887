//! REST transport: JOIN posts and metrics polling.

use async_trait::async_trait;

use beacon_core::error::{AppError, ErrorKind};
use beacon_core::result::AppResult;
use beacon_core::types::wire::{JoinRequest, MetricsPayload};

/// The agent's REST surface against the presence server.
#[async_trait]
pub trait PresenceApi: Send + Sync + std::fmt::Debug {
    /// `POST /presence/join`.
    async fn join(&self, request: &JoinRequest) -> AppResult<()>;

    /// `GET /active-users/metrics?customerId=…`.
    async fn fetch_metrics(&self, customer_id: &str) -> AppResult<MetricsPayload>;
}

/// Reqwest-backed implementation.
#[derive(Debug)]
pub struct HttpPresenceApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPresenceApi {
    /// Creates a client against the given base URL.
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn map_err(context: &str, e: reqwest::Error) -> AppError {
        AppError::with_source(
            ErrorKind::ServiceUnavailable,
            format!("{context}: {e}"),
            e,
        )
    }
}

#[async_trait]
impl PresenceApi for HttpPresenceApi {
    async fn join(&self, request: &JoinRequest) -> AppResult<()> {
        let url = format!("{}/presence/join", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| Self::map_err("JOIN failed", e))?;

        if !response.status().is_success() {
            return Err(AppError::service_unavailable(format!(
                "JOIN rejected with status {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn fetch_metrics(&self, customer_id: &str) -> AppResult<MetricsPayload> {
        let url = format!(
            "{}/active-users/metrics?customerId={customer_id}",
            self.base_url
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Self::map_err("Metrics poll failed", e))?;

        if !response.status().is_success() {
            return Err(AppError::service_unavailable(format!(
                "Metrics poll rejected with status {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Self::map_err("Metrics response parse failed", e))
    }
}
