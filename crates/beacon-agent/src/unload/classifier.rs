//! The unload decision engine and LEAVE dispatch.
//!
//! Decision points (`visibilitychange → hidden` after a short delay,
//! `pagehide`, `freeze`, and `beforeunload`/`unload` as a late guard) all
//! funnel into one pure `decide` call against the intent slot. At most one
//! decision resolves per unload pass, and at most one LEAVE is emitted;
//! the forced LEAVE from the session-mode machine is the only bypass.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use beacon_core::types::wire::{LeaveMode, LeaveReason, LeaveRequest};

use crate::identity::AgentIdentity;

use super::intent::{IntentSlot, NavIntent};

/// Where in the shutdown sequence a decision is being made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionPoint {
    /// `visibilitychange → hidden`, evaluated after a ~10 ms delay so a
    /// racing `pagehide` can win.
    HiddenDelay,
    /// `pagehide`, with the BFCache `persisted` flag.
    PageHide {
        /// Whether the page is entering the back/forward cache.
        persisted: bool,
    },
    /// `freeze` (page lifecycle).
    Freeze,
    /// `beforeunload` late guard.
    BeforeUnload,
    /// `unload` last chance.
    Unload,
}

/// The classifier's verdict at a decision point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnloadOutcome {
    /// Emit a FINAL leave with the given reason.
    EmitFinal(LeaveReason),
    /// Emit a PENDING leave (intent unknown).
    EmitPending,
    /// Do nothing.
    Suppress,
}

/// Per-tab unload state.
#[derive(Debug, Default)]
pub struct UnloadClassifier {
    slot: IntentSlot,
    /// Set once a LEAVE was emitted this pass.
    leave_sent: bool,
    /// Set once any decision point resolved this pass.
    decided: bool,
}

impl UnloadClassifier {
    /// Creates a fresh classifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds an intent signal.
    pub fn mark(&mut self, intent: NavIntent) {
        self.slot.mark(intent);
    }

    /// Whether a LEAVE has gone out this pass.
    pub fn leave_sent(&self) -> bool {
        self.leave_sent
    }

    /// Resolves a decision point.
    pub fn decide(&mut self, point: DecisionPoint) -> UnloadOutcome {
        if self.decided || self.leave_sent {
            return UnloadOutcome::Suppress;
        }

        let outcome = match self.slot.effective() {
            NavIntent::Reload => {
                self.slot.clear_reload();
                UnloadOutcome::Suppress
            }
            NavIntent::Internal => UnloadOutcome::Suppress,
            NavIntent::External => UnloadOutcome::EmitFinal(LeaveReason::External),
            NavIntent::Unknown => {
                if matches!(point, DecisionPoint::PageHide { persisted: true }) {
                    // Entering the BFCache with no intent: the tab will be
                    // back.
                    UnloadOutcome::Suppress
                } else {
                    UnloadOutcome::EmitPending
                }
            }
        };

        self.decided = true;
        if matches!(
            outcome,
            UnloadOutcome::EmitFinal(_) | UnloadOutcome::EmitPending
        ) {
            self.leave_sent = true;
        }

        debug!(?point, ?outcome, "Unload decision");
        outcome
    }

    /// Marks the forced LEAVE the session-mode machine sends on `removed`.
    ///
    /// Bypasses the per-pass guard but records the send so a subsequent real
    /// unload does not duplicate it.
    pub fn note_forced_leave(&mut self) {
        self.leave_sent = true;
    }

    /// Re-arms after a BFCache restore or a session revival.
    pub fn reset(&mut self) {
        self.slot.reset();
        self.leave_sent = false;
        self.decided = false;
    }
}

/// Queue-and-forget LEAVE transport (the beacon primitive).
///
/// Implementations must hand the request off synchronously; the unload path
/// cannot await anything.
pub trait BeaconTransport: Send + Sync + std::fmt::Debug {
    /// Queues a `text/plain` POST with the given body and idempotency id.
    fn queue(&self, url: &str, body: String, leave_id: &str);
}

/// Reqwest-backed beacon transport.
#[derive(Debug)]
pub struct HttpBeacon {
    client: reqwest::Client,
}

impl HttpBeacon {
    /// Creates the transport.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpBeacon {
    fn default() -> Self {
        Self::new()
    }
}

impl BeaconTransport for HttpBeacon {
    fn queue(&self, url: &str, body: String, leave_id: &str) {
        let request = self
            .client
            .post(url)
            .header("Content-Type", "text/plain")
            .header("X-Leave-Id", leave_id)
            .body(body);
        // sendBeacon semantics: the POST is queued and survives the caller;
        // the outcome is deliberately ignored.
        tokio::spawn(async move {
            let _ = request.send().await;
        });
    }
}

/// Builds and queues LEAVE requests.
#[derive(Debug)]
pub struct LeaveDispatcher {
    endpoint: String,
    transport: Arc<dyn BeaconTransport>,
}

impl LeaveDispatcher {
    /// Creates a dispatcher posting to `{base_url}/presence/leave`.
    pub fn new(base_url: &str, transport: Arc<dyn BeaconTransport>) -> Self {
        Self {
            endpoint: format!("{}/presence/leave", base_url.trim_end_matches('/')),
            transport,
        }
    }

    /// Queues a LEAVE with a fresh idempotency id.
    pub fn dispatch(&self, identity: &AgentIdentity, mode: LeaveMode, reason: LeaveReason) {
        let request = LeaveRequest {
            customer_id: Some(identity.customer_id.clone()),
            session_id: Some(identity.session_id.clone()),
            tab_id: Some(identity.tab_id.as_str().to_string()),
            timestamp: Some(Utc::now().timestamp_millis()),
            mode: Some(mode),
            reason: Some(reason),
        };
        let leave_id = Uuid::new_v4().to_string();

        match serde_json::to_string(&request) {
            Ok(body) => self.transport.queue(&self.endpoint, body, &leave_id),
            Err(e) => debug!(error = %e, "Failed to serialize LEAVE"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_suppresses_the_whole_pass() {
        let mut classifier = UnloadClassifier::new();
        classifier.mark(NavIntent::Reload);

        assert_eq!(
            classifier.decide(DecisionPoint::PageHide { persisted: false }),
            UnloadOutcome::Suppress
        );
        // The late guard must not emit after a reload-suppress.
        assert_eq!(
            classifier.decide(DecisionPoint::BeforeUnload),
            UnloadOutcome::Suppress
        );
        assert!(!classifier.leave_sent());
    }

    #[test]
    fn internal_navigation_suppresses() {
        let mut classifier = UnloadClassifier::new();
        classifier.mark(NavIntent::Internal);
        assert_eq!(
            classifier.decide(DecisionPoint::HiddenDelay),
            UnloadOutcome::Suppress
        );
    }

    #[test]
    fn external_emits_final() {
        let mut classifier = UnloadClassifier::new();
        classifier.mark(NavIntent::External);
        assert_eq!(
            classifier.decide(DecisionPoint::PageHide { persisted: false }),
            UnloadOutcome::EmitFinal(LeaveReason::External)
        );
        assert!(classifier.leave_sent());
    }

    #[test]
    fn external_dominates_a_late_reload_mark() {
        let mut classifier = UnloadClassifier::new();
        classifier.mark(NavIntent::External);
        classifier.mark(NavIntent::Reload);
        assert_eq!(
            classifier.decide(DecisionPoint::Unload),
            UnloadOutcome::EmitFinal(LeaveReason::External)
        );
    }

    #[test]
    fn unknown_intent_emits_pending_once() {
        let mut classifier = UnloadClassifier::new();
        assert_eq!(
            classifier.decide(DecisionPoint::PageHide { persisted: false }),
            UnloadOutcome::EmitPending
        );
        // Cross-event re-entry is guarded.
        assert_eq!(
            classifier.decide(DecisionPoint::BeforeUnload),
            UnloadOutcome::Suppress
        );
        assert_eq!(
            classifier.decide(DecisionPoint::Unload),
            UnloadOutcome::Suppress
        );
    }

    #[test]
    fn bfcache_entry_with_unknown_intent_suppresses() {
        let mut classifier = UnloadClassifier::new();
        assert_eq!(
            classifier.decide(DecisionPoint::PageHide { persisted: true }),
            UnloadOutcome::Suppress
        );
    }

    #[test]
    fn late_guard_fires_when_nothing_else_did() {
        let mut classifier = UnloadClassifier::new();
        assert_eq!(
            classifier.decide(DecisionPoint::BeforeUnload),
            UnloadOutcome::EmitPending
        );
    }

    #[test]
    fn restore_rearms_the_classifier() {
        let mut classifier = UnloadClassifier::new();
        classifier.mark(NavIntent::External);
        classifier.decide(DecisionPoint::PageHide { persisted: false });
        assert!(classifier.leave_sent());

        classifier.reset();
        assert!(!classifier.leave_sent());
        assert_eq!(
            classifier.decide(DecisionPoint::BeforeUnload),
            UnloadOutcome::EmitPending
        );
    }
}
