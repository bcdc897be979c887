//! Top-level real-time engine tying the fleet to the EMA sampler.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

use beacon_core::config::realtime::RealtimeConfig;
use beacon_core::error::AppError;
use beacon_presence::ema::{EmaEngine, MetricsSink};
use beacon_presence::service::PresenceService;
use beacon_presence::store::PresenceStore;

use crate::connection::manager::ClientFleet;

/// Central real-time engine coordinating the WebSocket subsystems.
#[derive(Clone)]
pub struct RealtimeEngine {
    /// Client fleet.
    pub fleet: Arc<ClientFleet>,
    /// EMA sampler.
    pub ema: Arc<EmaEngine>,
    /// Shutdown signal sender.
    shutdown_tx: broadcast::Sender<()>,
}

impl std::fmt::Debug for RealtimeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeEngine").finish()
    }
}

impl RealtimeEngine {
    /// Creates the engine and wires the fleet in as the metrics sink.
    pub fn new(
        config: RealtimeConfig,
        store: Arc<PresenceStore>,
        service: Arc<PresenceService>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        let fleet = Arc::new(ClientFleet::new(config, Arc::clone(&store), service));
        let ema = Arc::new(EmaEngine::new(
            store,
            Arc::clone(&fleet) as Arc<dyn MetricsSink>,
        ));

        info!("Real-time engine initialized");

        Self {
            fleet,
            ema,
            shutdown_tx,
        }
    }

    /// Spawns the EMA sampling loop.
    pub fn start(&self) {
        let ema = Arc::clone(&self.ema);
        let shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            ema.run(shutdown).await;
        });
    }

    /// Returns a shutdown receiver for graceful shutdown coordination.
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Initiates a graceful shutdown of the real-time engine.
    pub async fn shutdown(&self) -> Result<(), AppError> {
        info!("Shutting down real-time engine");

        let _ = self.shutdown_tx.send(());
        self.fleet.close_all().await;

        info!("Real-time engine shut down");
        Ok(())
    }
}
