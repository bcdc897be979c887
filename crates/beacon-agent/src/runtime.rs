//! The per-tab event loop.
//!
//! One task per tab multiplexes gossip, embedder signals (visibility,
//! activity, unload), and timers over the owned state machines: the tab
//! registry, the leader elector, the visibility tracker, the session-mode
//! machine, and the unload classifier. Cross-tab coordination is
//! message-passing only; nothing here is shared.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, info};

use beacon_core::config::agent::AgentConfig;
use beacon_core::types::mode::SessionMode;
use beacon_core::types::wire::{JoinRequest, LeaveMode, LeaveReason};

use crate::gossip::bus::GossipBus;
use crate::gossip::message::{GossipEnvelope, GossipMessage, TabState};
use crate::identity::AgentIdentity;
use crate::mode::{visibility_mode, FsmEffect, FsmEvent, SessionModeFsm};
use crate::tabs::leader::{ElectionOutcome, LeaderElector};
use crate::tabs::registry::{TabCounts, TabRegistry};
use crate::transport::hybrid::ConnectionCommand;
use crate::unload::classifier::{DecisionPoint, LeaveDispatcher, UnloadClassifier, UnloadOutcome};
use crate::unload::intent::NavIntent;
use crate::visibility::{VisibilityEvent, VisibilityTracker};

/// Signals from the embedder (the browser glue).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabInput {
    /// Raw visibility/focus flags.
    Visibility {
        /// `!document.hidden`.
        visible: bool,
        /// Window focus.
        focused: bool,
    },
    /// User input: click, key, touch, scroll.
    Activity,
    /// A navigation intent signal.
    Intent(NavIntent),
    /// A shutdown-sequence decision point fired.
    UnloadSignal(DecisionPoint),
    /// `pageshow` with `persisted` (BFCache restore).
    Restored,
    /// Graceful tab close.
    Close,
}

/// Interval between peer-registry prunes.
const PRUNE_INTERVAL: Duration = Duration::from_secs(10);

/// The per-tab coordinator task.
pub struct TabRuntime {
    config: AgentConfig,
    identity: AgentIdentity,

    bus: Arc<dyn GossipBus>,
    bus_rx: broadcast::Receiver<GossipEnvelope>,
    inputs: mpsc::Receiver<TabInput>,
    commands: mpsc::Sender<ConnectionCommand>,
    dispatcher: Arc<LeaveDispatcher>,

    registry: TabRegistry,
    elector: LeaderElector,
    visibility: VisibilityTracker,
    /// Present on desktop devices only.
    fsm: Option<SessionModeFsm>,
    classifier: UnloadClassifier,

    /// Pending fast-path election check after foregrounding.
    fast_election_at: Option<Instant>,
    /// Next leader beat, while leading.
    next_beat: Option<Instant>,
    /// Next staleness check, while following.
    next_stale_check: Instant,
    next_prune: Instant,

    last_counts: TabCounts,
}

impl TabRuntime {
    /// Creates the runtime for one tab.
    pub fn new(
        config: AgentConfig,
        identity: AgentIdentity,
        bus: Arc<dyn GossipBus>,
        inputs: mpsc::Receiver<TabInput>,
        commands: mpsc::Sender<ConnectionCommand>,
        dispatcher: Arc<LeaveDispatcher>,
    ) -> Self {
        let now = Instant::now();
        let bus_rx = bus.subscribe();
        let registry = TabRegistry::new(config.peer_ttl());
        let elector = LeaderElector::new(identity.tab_id.clone());
        let visibility = VisibilityTracker::new(config.visibility_debounce());
        let fsm = (!identity.device.is_handheld())
            .then(|| SessionModeFsm::new(config.idle_to_passive(), config.passive_to_removed(), now));
        let last_counts = registry.counts();

        Self {
            config,
            identity,
            bus,
            bus_rx,
            inputs,
            commands,
            dispatcher,
            registry,
            elector,
            visibility,
            fsm,
            classifier: UnloadClassifier::new(),
            fast_election_at: None,
            next_beat: None,
            next_stale_check: now + Duration::from_secs(1),
            next_prune: now + PRUNE_INTERVAL,
            last_counts,
        }
    }

    /// Runs the loop until the tab closes.
    pub async fn run(mut self) {
        self.startup().await;

        loop {
            let wake = self.next_wake();
            tokio::select! {
                envelope = self.bus_rx.recv() => {
                    match envelope {
                        Ok(envelope) => {
                            // Echo suppression: ignore own messages.
                            if envelope.tab_id != self.identity.tab_id {
                                self.handle_gossip(envelope).await;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => {
                            // Best-effort bus: ask peers to re-announce.
                            self.gossip(GossipMessage::WhoIsHere);
                        }
                        Err(broadcast::error::RecvError::Closed) => return,
                    }
                }
                input = self.inputs.recv() => {
                    match input {
                        Some(input) => {
                            if self.handle_input(input).await {
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

    async fn startup(&mut self) {
        self.gossip(GossipMessage::WhoIsHere);
        self.gossip(GossipMessage::TabState {
            state: self.registry.own_state(),
        });
        self.open_election();
        let _ = self
            .commands
            .send(ConnectionCommand::ModeChanged {
                mode: self.current_mode(),
                foreground: self.registry.own_state().is_foreground(),
            })
            .await;
    }

    // ── Gossip ─────────────────────────────────────────────

    fn gossip(&self, message: GossipMessage) {
        self.bus
            .send(GossipEnvelope::new(self.identity.tab_id.clone(), message));
    }

    async fn handle_gossip(&mut self, envelope: GossipEnvelope) {
        let now = Instant::now();
        let sender = envelope.tab_id;

        match envelope.message {
            GossipMessage::WhoIsHere => {
                // Until the sender announces a state, assume background.
                self.registry.observe(sender, TabState::Background, now);
                self.gossip(GossipMessage::IAmHere {
                    state: self.registry.own_state(),
                });
            }
            GossipMessage::IAmHere { state } | GossipMessage::TabState { state } => {
                self.registry.observe(sender, state, now);
            }
            GossipMessage::TabClosed => {
                self.registry.remove(&sender);
            }
            GossipMessage::LeaderElection => {
                let was_open = self.elector.election_open();
                self.elector.join_election(
                    now,
                    self.config.election_window(),
                    self.registry.own_state().is_foreground(),
                );
                if !was_open && self.registry.own_state().is_foreground() {
                    self.gossip(GossipMessage::LeaderCandidate {
                        timestamp: Utc::now().timestamp_millis(),
                    });
                }
            }
            GossipMessage::LeaderCandidate { .. } => {
                self.elector.on_candidate(sender);
            }
            GossipMessage::LeaderBeat => {
                if self.elector.on_leader_beat(&sender, now) {
                    info!(tab_id = %self.identity.tab_id, "Resigning leadership");
                    self.next_beat = None;
                    let _ = self
                        .commands
                        .send(ConnectionCommand::LeadershipChanged { is_leader: false })
                        .await;
                }
            }
        }

        self.maybe_report_counts().await;
    }

    // ── Embedder inputs ────────────────────────────────────

    /// Returns `true` when the tab is done.
    async fn handle_input(&mut self, input: TabInput) -> bool {
        let now = Instant::now();
        match input {
            TabInput::Visibility { visible, focused } => {
                self.visibility.set_visible(visible, now);
                self.visibility.set_focused(focused, now);
                false
            }
            TabInput::Activity => {
                let effects = match self.fsm.as_mut() {
                    Some(fsm) => fsm.on_event(FsmEvent::Activity, now),
                    None => Vec::new(),
                };
                self.apply_fsm_effects(effects).await;
                false
            }
            TabInput::Intent(intent) => {
                self.classifier.mark(intent);
                false
            }
            TabInput::UnloadSignal(point) => {
                match self.classifier.decide(point) {
                    UnloadOutcome::EmitFinal(reason) => {
                        self.dispatcher
                            .dispatch(&self.identity, LeaveMode::Final, reason);
                    }
                    UnloadOutcome::EmitPending => {
                        self.dispatcher.dispatch(
                            &self.identity,
                            LeaveMode::Pending,
                            LeaveReason::Unknown,
                        );
                    }
                    UnloadOutcome::Suppress => {}
                }
                false
            }
            TabInput::Restored => {
                // Back from the BFCache: re-arm the classifier, rediscover
                // peers, and make sure someone leads.
                self.classifier.reset();
                self.gossip(GossipMessage::WhoIsHere);
                if self
                    .elector
                    .beat_stale(now, self.config.leader_beat_timeout())
                {
                    self.open_election();
                }
                false
            }
            TabInput::Close => {
                self.gossip(GossipMessage::TabClosed);
                let _ = self.commands.send(ConnectionCommand::Shutdown).await;
                true
            }
        }
    }

    // ── Timers ─────────────────────────────────────────────

    async fn handle_deadlines(&mut self) {
        let now = Instant::now();

        for event in self.visibility.poll(now) {
            self.handle_visibility_event(event, now).await;
        }

        if self.fast_election_at.is_some_and(|at| at <= now) {
            self.fast_election_at = None;
            if !self.elector.is_leader() && !self.elector.election_open() {
                let stale = self
                    .elector
                    .beat_stale(now, self.config.leader_beat_timeout());
                if stale || self.leader_backgrounded() {
                    self.open_election();
                }
            }
        }

        if self
            .elector
            .window_deadline()
            .is_some_and(|deadline| deadline <= now)
        {
            self.finish_election().await;
        }

        if self.next_beat.is_some_and(|at| at <= now) {
            if self.elector.is_leader() {
                self.gossip(GossipMessage::LeaderBeat);
                self.elector.on_own_beat(now);
                self.next_beat = Some(now + self.config.leader_beat_interval());
            } else {
                self.next_beat = None;
            }
        }

        if self.next_stale_check <= now {
            self.next_stale_check = now + Duration::from_secs(1);
            if !self.elector.is_leader()
                && !self.elector.election_open()
                && self
                    .elector
                    .beat_stale(now, self.config.leader_beat_timeout())
            {
                self.open_election();
            }
        }

        if self.next_prune <= now {
            self.next_prune = now + PRUNE_INTERVAL;
            if self.registry.prune(now) {
                self.maybe_report_counts().await;
            }
        }

        if let Some(deadline) = self.fsm.as_ref().and_then(|fsm| fsm.next_deadline()) {
            if deadline <= now {
                let effects = match self.fsm.as_mut() {
                    Some(fsm) => fsm.on_event(FsmEvent::Deadline, now),
                    None => Vec::new(),
                };
                self.apply_fsm_effects(effects).await;
            }
        }
    }

    async fn handle_visibility_event(&mut self, event: VisibilityEvent, now: Instant) {
        match event {
            VisibilityEvent::State(state) => {
                self.registry.set_own_state(state);
                self.gossip(GossipMessage::TabState { state });
                self.maybe_report_counts().await;

                let effects = match (state, self.fsm.as_mut()) {
                    (TabState::Background, Some(fsm)) => fsm.on_event(FsmEvent::Background, now),
                    _ => Vec::new(),
                };
                self.apply_fsm_effects(effects).await;
                self.report_mode().await;
            }
            VisibilityEvent::BecameForeground => {
                let effects = match self.fsm.as_mut() {
                    Some(fsm) => fsm.on_event(FsmEvent::BecameForeground, now),
                    None => Vec::new(),
                };
                self.apply_fsm_effects(effects).await;

                // Fast path: take over quickly instead of waiting out the
                // staleness timeout.
                self.fast_election_at =
                    Some(now + Duration::from_millis(self.config.fast_election_delay_ms));
            }
        }
    }

    // ── Elections ──────────────────────────────────────────

    fn open_election(&mut self) {
        let now = Instant::now();
        let foreground = self.registry.own_state().is_foreground();
        if !self
            .elector
            .start_election(now, self.config.election_window(), foreground)
        {
            return;
        }
        self.gossip(GossipMessage::LeaderElection);
        if foreground {
            self.gossip(GossipMessage::LeaderCandidate {
                timestamp: Utc::now().timestamp_millis(),
            });
        }
        debug!(tab_id = %self.identity.tab_id, "Election opened");
    }

    async fn finish_election(&mut self) {
        let Some(outcome) = self.elector.close_election() else {
            return;
        };
        let now = Instant::now();

        match outcome {
            ElectionOutcome::Won => {
                info!(tab_id = %self.identity.tab_id, "Won leader election");
                self.gossip(GossipMessage::LeaderBeat);
                self.elector.on_own_beat(now);
                self.next_beat = Some(now + self.config.leader_beat_interval());

                let _ = self
                    .commands
                    .send(ConnectionCommand::LeadershipChanged { is_leader: true })
                    .await;
                // The leader owns the record: write it now.
                self.send_join().await;
            }
            ElectionOutcome::Lost => {
                self.next_beat = None;
                let _ = self
                    .commands
                    .send(ConnectionCommand::LeadershipChanged { is_leader: false })
                    .await;
            }
        }
    }

    fn leader_backgrounded(&self) -> bool {
        self.elector
            .current_leader()
            .and_then(|leader| self.registry.peer_state(leader))
            .is_some_and(|state| !state.is_foreground())
    }

    // ── Server updates ─────────────────────────────────────

    fn current_mode(&self) -> SessionMode {
        match self.fsm.as_ref() {
            Some(fsm) => fsm.mode().unwrap_or(SessionMode::Active),
            None => visibility_mode(self.registry.own_state()),
        }
    }

    async fn report_mode(&mut self) {
        let _ = self
            .commands
            .send(ConnectionCommand::ModeChanged {
                mode: self.current_mode(),
                foreground: self.registry.own_state().is_foreground(),
            })
            .await;
    }

    async fn apply_fsm_effects(&mut self, effects: Vec<FsmEffect>) {
        for effect in effects {
            match effect {
                FsmEffect::Join(_mode) => {
                    if self.elector.is_leader() {
                        self.send_join().await;
                    }
                    self.report_mode().await;
                }
                FsmEffect::ForcedLeave => {
                    // The session decayed to removed: force the LEAVE past
                    // the per-pass guard and stop refreshing.
                    self.classifier.note_forced_leave();
                    self.dispatcher
                        .dispatch(&self.identity, LeaveMode::Final, LeaveReason::Unknown);
                    let _ = self.commands.send(ConnectionCommand::Suspend).await;
                }
                FsmEffect::Rejoin(_mode) => {
                    self.classifier.reset();
                    if self.elector.is_leader() {
                        self.send_join().await;
                    }
                    self.report_mode().await;
                }
            }
        }
    }

    async fn maybe_report_counts(&mut self) {
        let counts = self.registry.counts();
        if counts != self.last_counts {
            self.last_counts = counts;
            if self.elector.is_leader() {
                self.send_join().await;
            }
        }
    }

    async fn send_join(&mut self) {
        let counts = self.registry.counts();
        let request = JoinRequest {
            customer_id: Some(self.identity.customer_id.clone()),
            session_id: Some(self.identity.session_id.clone()),
            tab_id: Some(self.identity.tab_id.as_str().to_string()),
            timestamp: Some(Utc::now().timestamp_millis()),
            platform: self.identity.platform.clone(),
            browser: self.identity.browser.clone(),
            device: Some(self.identity.device),
            user_agent: None,
            desktop_mode: Some(self.identity.desktop_mode),
            total_tab_quantity: Some(counts.total),
            total_background_tab_quantity: Some(counts.background),
            session_mode: Some(self.current_mode()),
        };
        let _ = self.commands.send(ConnectionCommand::Join(request)).await;
    }

    fn next_wake(&self) -> Option<Instant> {
        let mut wake = Some(self.next_stale_check.min(self.next_prune));
        for candidate in [
            self.visibility.next_deadline(),
            self.fast_election_at,
            self.elector.window_deadline(),
            self.next_beat,
            self.fsm.as_ref().and_then(|fsm| fsm.next_deadline()),
        ] {
            wake = match (wake, candidate) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, None) => a,
                (None, b) => b,
            };
        }
        wake
    }
}

async fn sleep_until_or_forever(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
