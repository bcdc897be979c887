//! The hybrid connection: WebSocket or polling, selected by session mode
//! and visibility.
//!
//! Selection rule (re-evaluated on every mode/visibility change):
//! - `passive_active` → polling at the passive interval
//! - `active` + foreground → WebSocket (when enabled)
//! - `active` + background → polling at the standard interval
//!
//! Switching off the socket closes it fully (no auto-reconnect) and starts
//! polling after a short settle delay; switching on stops polling first and
//! authenticates on open. Only the leader refreshes the record TTL: over the
//! socket as `ttl_refresh` messages, in polling mode as the JOIN body each
//! poll carries.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use beacon_core::config::agent::AgentConfig;
use beacon_core::types::mode::SessionMode;
use beacon_core::types::wire::{ClientMessage, JoinRequest, MetricsPayload, ServerMessage};

use crate::identity::AgentIdentity;

use super::api::PresenceApi;
use super::backoff::ReconnectBackoff;
use super::socket::{Socket, SocketConnector};

/// Which transport the selection rule picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Live socket.
    WebSocket,
    /// Periodic polling at the given interval.
    Polling(Duration),
}

/// The selection rule as a pure function.
pub fn select_transport(mode: SessionMode, foreground: bool, config: &AgentConfig) -> TransportKind {
    match mode {
        SessionMode::PassiveActive => TransportKind::Polling(config.polling_interval(true)),
        SessionMode::Active if foreground && config.websocket_enabled => TransportKind::WebSocket,
        SessionMode::Active => TransportKind::Polling(config.polling_interval(false)),
    }
}

/// Commands from the tab runtime.
#[derive(Debug)]
pub enum ConnectionCommand {
    /// Session mode or visibility changed; re-select the transport.
    ModeChanged {
        /// Current session mode.
        mode: SessionMode,
        /// Whether the tab is foregrounded.
        foreground: bool,
    },
    /// This tab won or lost the leadership.
    LeadershipChanged {
        /// New leadership state.
        is_leader: bool,
    },
    /// Send a JOIN (debounced to one per cooldown).
    Join(JoinRequest),
    /// The session entered `removed`: stop every transport and refresh until
    /// a new `ModeChanged` revives it.
    Suspend,
    /// Tear everything down.
    Shutdown,
}

/// The connection driver task state.
#[derive(Debug)]
pub struct HybridConnection {
    config: AgentConfig,
    identity: AgentIdentity,
    api: Arc<dyn PresenceApi>,
    connector: Arc<dyn SocketConnector>,
    commands: mpsc::Receiver<ConnectionCommand>,
    metrics_tx: mpsc::Sender<MetricsPayload>,

    mode: SessionMode,
    foreground: bool,
    is_leader: bool,

    socket: Option<Box<dyn Socket>>,
    backoff: ReconnectBackoff,

    next_poll: Option<Instant>,
    next_ttl_refresh: Option<Instant>,
    next_reconnect: Option<Instant>,

    last_join: Option<Instant>,
    pending_join: Option<JoinRequest>,
    /// Last full JOIN payload, replayed as the polling-mode TTL refresh so
    /// the server never loses device or tab-count fields.
    last_join_payload: Option<JoinRequest>,
}

impl HybridConnection {
    /// Creates the driver. It stays idle until the first command.
    pub fn new(
        config: AgentConfig,
        identity: AgentIdentity,
        api: Arc<dyn PresenceApi>,
        connector: Arc<dyn SocketConnector>,
        commands: mpsc::Receiver<ConnectionCommand>,
        metrics_tx: mpsc::Sender<MetricsPayload>,
    ) -> Self {
        let backoff = ReconnectBackoff::new(
            Duration::from_millis(config.reconnect_base_ms),
            Duration::from_millis(config.reconnect_cap_ms),
            config.max_reconnect_attempts,
        );
        Self {
            config,
            identity,
            api,
            connector,
            commands,
            metrics_tx,
            mode: SessionMode::Active,
            foreground: true,
            is_leader: false,
            socket: None,
            backoff,
            next_poll: None,
            next_ttl_refresh: None,
            next_reconnect: None,
            last_join: None,
            pending_join: None,
            last_join_payload: None,
        }
    }

    /// Runs the driver until shutdown or command channel closure.
    pub async fn run(mut self) {
        loop {
            let wake = self.next_wake();

            if let Some(mut socket) = self.socket.take() {
                tokio::select! {
                    command = self.commands.recv() => {
                        self.socket = Some(socket);
                        match command {
                            Some(command) => {
                                if self.handle_command(command).await {
                                    return;
                                }
                            }
                            None => return,
                        }
                    }
                    message = socket.recv() => {
                        match message {
                            Some(message) => {
                                self.socket = Some(socket);
                                self.handle_server_message(message).await;
                            }
                            None => {
                                warn!("WebSocket closed unexpectedly, falling back to polling");
                                self.fall_back_to_polling();
                            }
                        }
                    }
                    _ = sleep_until_or_forever(wake) => {
                        self.socket = Some(socket);
                        self.handle_deadlines().await;
                    }
                }
            } else {
                tokio::select! {
                    command = self.commands.recv() => {
                        match command {
                            Some(command) => {
                                if self.handle_command(command).await {
                                    return;
                                }
                            }
                            None => return,
                        }
                    }
                    _ = sleep_until_or_forever(wake) => {
                        self.handle_deadlines().await;
                    }
                }
            }
        }
    }

    /// Returns `true` on shutdown.
    async fn handle_command(&mut self, command: ConnectionCommand) -> bool {
        match command {
            ConnectionCommand::ModeChanged { mode, foreground } => {
                self.mode = mode;
                self.foreground = foreground;
                self.apply_selection().await;
                false
            }
            ConnectionCommand::LeadershipChanged { is_leader } => {
                self.is_leader = is_leader;
                if is_leader && self.socket.is_some() {
                    self.schedule_ttl_refresh();
                } else if !is_leader {
                    self.next_ttl_refresh = None;
                }
                false
            }
            ConnectionCommand::Join(request) => {
                self.queue_join(request).await;
                false
            }
            ConnectionCommand::Suspend => {
                if let Some(mut socket) = self.socket.take() {
                    socket.close().await;
                }
                self.backoff.reset();
                self.next_poll = None;
                self.next_ttl_refresh = None;
                self.next_reconnect = None;
                self.pending_join = None;
                debug!("Transport suspended");
                false
            }
            ConnectionCommand::Shutdown => {
                if let Some(mut socket) = self.socket.take() {
                    socket.close().await;
                }
                true
            }
        }
    }

    /// Applies the selection rule to the current state.
    async fn apply_selection(&mut self) {
        match select_transport(self.mode, self.foreground, &self.config) {
            TransportKind::WebSocket => {
                if self.socket.is_none() {
                    // Stop polling first, then open the socket.
                    self.next_poll = None;
                    self.connect_socket().await;
                }
            }
            TransportKind::Polling(interval) => {
                self.next_ttl_refresh = None;
                self.next_reconnect = None;
                if let Some(mut socket) = self.socket.take() {
                    // Intentional disconnect: full close, no auto-reconnect,
                    // short settle before the first poll.
                    socket.close().await;
                    self.backoff.reset();
                    self.next_poll =
                        Some(Instant::now() + Duration::from_millis(self.config.switch_settle_ms));
                    debug!("Switched WebSocket → polling");
                } else {
                    self.next_poll = Some(Instant::now() + interval);
                }
            }
        }
    }

    async fn connect_socket(&mut self) {
        match self.connector.connect().await {
            Ok(mut socket) => {
                let auth = ClientMessage::Auth {
                    customer_id: self.identity.customer_id.clone(),
                    session_id: self.identity.session_id.clone(),
                    tab_id: self.identity.tab_id.as_str().to_string(),
                };
                if let Err(e) = socket.send(&auth).await {
                    warn!(error = %e, "Auth send failed");
                    self.fall_back_to_polling();
                    return;
                }

                info!("WebSocket connected");
                self.backoff.reset();
                self.next_reconnect = None;
                self.next_poll = None;
                self.socket = Some(socket);
                if self.is_leader {
                    self.schedule_ttl_refresh();
                }
            }
            Err(e) => {
                warn!(error = %e, "WebSocket connect failed");
                self.fall_back_to_polling();
            }
        }
    }

    /// Polling takes over immediately; a reconnect is scheduled while the
    /// backoff budget lasts.
    fn fall_back_to_polling(&mut self) {
        self.socket = None;
        self.next_ttl_refresh = None;
        self.next_poll =
            Some(Instant::now() + Duration::from_millis(self.config.switch_settle_ms));

        if select_transport(self.mode, self.foreground, &self.config) == TransportKind::WebSocket {
            match self.backoff.next_delay() {
                Some(delay) => {
                    self.next_reconnect = Some(Instant::now() + delay);
                    debug!(delay_ms = delay.as_millis() as u64, "Reconnect scheduled");
                }
                None => {
                    warn!("Reconnect budget exhausted, staying on polling");
                    self.next_reconnect = None;
                }
            }
        } else {
            self.next_reconnect = None;
        }
    }

    fn schedule_ttl_refresh(&mut self) {
        let interval = self.config.ttl_refresh_interval(self.mode.is_passive());
        self.next_ttl_refresh = Some(Instant::now() + interval);
    }

    async fn handle_server_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::MetricsUpdate { data } => {
                let _ = self.metrics_tx.send(data).await;
            }
            ServerMessage::Hello { session_id, .. } => {
                debug!(session_id = %session_id, "Socket authenticated");
            }
            ServerMessage::Pong { .. } => {}
            ServerMessage::Error { message, code } => {
                warn!(message = %message, code = ?code, "Server error");
            }
        }
    }

    async fn handle_deadlines(&mut self) {
        let now = Instant::now();

        if self.next_reconnect.is_some_and(|at| at <= now) {
            self.next_reconnect = None;
            if self.socket.is_none()
                && select_transport(self.mode, self.foreground, &self.config)
                    == TransportKind::WebSocket
            {
                self.connect_socket().await;
            }
        }

        if self.next_poll.is_some_and(|at| at <= now) {
            self.do_poll().await;
        }

        if self.next_ttl_refresh.is_some_and(|at| at <= now) {
            self.do_ttl_refresh().await;
        }

        if self.pending_join.is_some() && self.join_ready_at().is_some_and(|at| at <= now) {
            if let Some(request) = self.pending_join.take() {
                self.send_join(request).await;
            }
        }
    }

    async fn do_poll(&mut self) {
        // The leader's poll doubles as the TTL refresh: a JOIN carrying the
        // full payload so device and tab counts survive the merge.
        if self.is_leader {
            if let Some(mut payload) = self.last_join_payload.clone() {
                payload.timestamp = Some(Utc::now().timestamp_millis());
                payload.session_mode = Some(self.mode);
                if let Err(e) = self.api.join(&payload).await {
                    warn!(error = %e, "Polling JOIN failed, retrying next tick");
                }
            }
        }

        match self.api.fetch_metrics(&self.identity.customer_id).await {
            Ok(metrics) => {
                let _ = self.metrics_tx.send(metrics).await;
            }
            Err(e) => {
                warn!(error = %e, "Metrics poll failed, retrying next tick");
            }
        }

        let interval = self.config.polling_interval(self.mode.is_passive());
        self.next_poll = Some(Instant::now() + interval);
    }

    async fn do_ttl_refresh(&mut self) {
        self.schedule_ttl_refresh();
        if !self.is_leader {
            return;
        }

        let refresh = ClientMessage::TtlRefresh {
            customer_id: self.identity.customer_id.clone(),
            session_id: self.identity.session_id.clone(),
            tab_id: self.identity.tab_id.as_str().to_string(),
            timestamp: Utc::now().timestamp_millis(),
            session_mode: Some(self.mode),
        };

        let result = match self.socket.as_mut() {
            Some(socket) => socket.send(&refresh).await,
            None => return,
        };
        if let Err(e) = result {
            warn!(error = %e, "TTL refresh send failed");
            self.fall_back_to_polling();
        }
    }

    /// Queues a JOIN, enforcing the cooldown and single-flight discipline.
    async fn queue_join(&mut self, request: JoinRequest) {
        self.last_join_payload = Some(request.clone());

        let cooldown = Duration::from_millis(self.config.join_cooldown_ms);
        let ready = self
            .last_join
            .map_or(true, |last| last.elapsed() >= cooldown);

        if ready {
            self.send_join(request).await;
        } else {
            // Newest payload wins; the cooldown deadline flushes it.
            self.pending_join = Some(request);
        }
    }

    async fn send_join(&mut self, request: JoinRequest) {
        self.last_join = Some(Instant::now());
        if let Err(e) = self.api.join(&request).await {
            warn!(error = %e, "JOIN failed, retrying on next refresh");
        }
    }

    fn join_ready_at(&self) -> Option<Instant> {
        let cooldown = Duration::from_millis(self.config.join_cooldown_ms);
        self.last_join.map(|last| last + cooldown)
    }

    fn next_wake(&self) -> Option<Instant> {
        let mut wake = self.next_poll;
        for candidate in [self.next_ttl_refresh, self.next_reconnect] {
            wake = earliest(wake, candidate);
        }
        if self.pending_join.is_some() {
            wake = earliest(wake, self.join_ready_at());
        }
        wake
    }
}

fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

async fn sleep_until_or_forever(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
