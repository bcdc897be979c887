//! Exponential smoothing of the per-customer live count.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashSet;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use beacon_core::types::wire::MetricsPayload;

use crate::store::PresenceStore;

/// Fan-out target for freshly computed metrics.
///
/// Implemented by the WebSocket fleet; tests substitute a recorder.
#[async_trait]
pub trait MetricsSink: Send + Sync + std::fmt::Debug + 'static {
    /// Delivers a metrics sample to every local client of the customer.
    async fn broadcast_metrics(&self, payload: &MetricsPayload);
}

/// One smoothing step.
///
/// The first sample seeds the average; afterwards
/// `ema = alpha * count + (1 - alpha) * prev`.
pub fn smooth(prev: Option<f64>, count: f64, alpha: f64) -> f64 {
    match prev {
        None => count,
        Some(prev) => alpha * count + (1.0 - alpha) * prev,
    }
}

/// Periodically samples active counts and publishes smoothed values.
#[derive(Debug)]
pub struct EmaEngine {
    /// Record store (counts in, EMA out).
    store: Arc<PresenceStore>,
    /// Local fan-out.
    sink: Arc<dyn MetricsSink>,
    /// Customers currently being sampled.
    subscriptions: DashSet<String>,
    /// Smoothing factor.
    alpha: f64,
    /// Tick interval.
    interval: Duration,
}

impl EmaEngine {
    /// Creates an engine with the store's configured alpha and interval.
    pub fn new(store: Arc<PresenceStore>, sink: Arc<dyn MetricsSink>) -> Self {
        let alpha = store.config().ema_alpha;
        let interval = store.config().ema_interval();
        Self {
            store,
            sink,
            subscriptions: DashSet::new(),
            alpha,
            interval,
        }
    }

    /// Starts sampling a customer. Idempotent.
    pub fn subscribe(&self, customer_id: &str) {
        if self.subscriptions.insert(customer_id.to_string()) {
            debug!(customer_id = %customer_id, "EMA sampling subscribed");
        }
    }

    /// Stops sampling a customer.
    pub fn unsubscribe(&self, customer_id: &str) {
        self.subscriptions.remove(customer_id);
    }

    /// Number of customers currently sampled.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Runs the sampling loop until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        // The immediate first tick would publish before any data exists.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick_all().await;
                }
                _ = shutdown.recv() => {
                    debug!("EMA engine stopped");
                    return;
                }
            }
        }
    }

    /// Samples every subscribed customer once.
    pub async fn tick_all(&self) {
        let customers: Vec<String> = self
            .subscriptions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        for customer_id in customers {
            if let Err(e) = self.tick(&customer_id).await {
                warn!(customer_id = %customer_id, error = %e, "EMA tick failed");
            }
        }
    }

    /// Samples one customer: read count, smooth, persist, fan out.
    pub async fn tick(&self, customer_id: &str) -> beacon_core::AppResult<MetricsPayload> {
        let count = self.store.get_active_count(customer_id).await?;
        let prev = self.store.get_ema(customer_id).await?;
        let ema = smooth(prev, count as f64, self.alpha);
        self.store.set_ema(customer_id, ema).await?;

        let payload = MetricsPayload {
            customer_id: customer_id.to_string(),
            timestamp: Utc::now().timestamp_millis(),
            count,
            ema,
        };

        self.sink.broadcast_metrics(&payload).await;
        self.store.publish_metrics(customer_id, &payload).await?;

        debug!(
            customer_id = %customer_id,
            count,
            ema,
            "Metrics sampled"
        );
        Ok(payload)
    }
}
