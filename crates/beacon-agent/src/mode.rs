//! The desktop session-mode state machine.
//!
//! `active ↔ passive_active → removed`, driven by user activity, visibility,
//! and two idle budgets (F while foreground-active, P while passive). The
//! machine is state plus a pure transition function; the event loop feeds it
//! events and executes the effects it returns.
//!
//! Handheld devices skip the machine entirely and map visibility straight to
//! a mode via [`visibility_mode`].

use std::time::Duration;

use tokio::time::Instant;

use beacon_core::types::mode::SessionMode;

use crate::gossip::message::TabState;

/// Events the machine consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsmEvent {
    /// User input: click, key, touch, scroll.
    Activity,
    /// The tab committed to background.
    Background,
    /// Background → foreground edge.
    BecameForeground,
    /// An idle deadline fired.
    Deadline,
}

/// Effects the caller must execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsmEffect {
    /// Send a JOIN carrying the new mode so the server recomputes the TTL.
    Join(SessionMode),
    /// Send a forced LEAVE and stop TTL refresh.
    ForcedLeave,
    /// Reset the leave guard and re-JOIN with the given mode.
    Rejoin(SessionMode),
}

/// Machine states. `Removed` means the server record is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsmState {
    /// Present and recently active.
    Active,
    /// Idle or backgrounded; reduced refresh.
    PassiveActive,
    /// Forcibly left; revived by activity or foregrounding.
    Removed,
}

/// The session-mode machine for one desktop tab.
#[derive(Debug)]
pub struct SessionModeFsm {
    state: FsmState,
    foreground: bool,
    /// Foreground idle budget (F).
    idle_to_passive: Duration,
    /// Passive idle budget (P).
    passive_to_removed: Duration,
    deadline: Option<Instant>,
}

impl SessionModeFsm {
    /// Starts the machine in `Active` with a full F budget.
    pub fn new(idle_to_passive: Duration, passive_to_removed: Duration, now: Instant) -> Self {
        Self {
            state: FsmState::Active,
            foreground: true,
            idle_to_passive,
            passive_to_removed,
            deadline: Some(now + idle_to_passive),
        }
    }

    /// Current machine state.
    pub fn state(&self) -> FsmState {
        self.state
    }

    /// The session mode to report, when a record should exist.
    pub fn mode(&self) -> Option<SessionMode> {
        match self.state {
            FsmState::Active => Some(SessionMode::Active),
            FsmState::PassiveActive => Some(SessionMode::PassiveActive),
            FsmState::Removed => None,
        }
    }

    /// Deadline of the running idle timer, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Feeds one event; returns the effects to execute.
    pub fn on_event(&mut self, event: FsmEvent, now: Instant) -> Vec<FsmEffect> {
        match event {
            FsmEvent::Background => {
                self.foreground = false;
                if self.state == FsmState::Active {
                    self.enter_passive(now)
                } else {
                    Vec::new()
                }
            }
            FsmEvent::BecameForeground => {
                self.foreground = true;
                match self.state {
                    FsmState::PassiveActive => self.enter_active(now),
                    FsmState::Removed => self.revive(now),
                    FsmState::Active => Vec::new(),
                }
            }
            FsmEvent::Activity => match self.state {
                FsmState::Active => {
                    // Reset the F budget; the mode is unchanged.
                    self.deadline = Some(now + self.idle_to_passive);
                    Vec::new()
                }
                FsmState::PassiveActive if self.foreground => self.enter_active(now),
                FsmState::PassiveActive => Vec::new(),
                FsmState::Removed => self.revive(now),
            },
            FsmEvent::Deadline => {
                if self.deadline.is_some_and(|d| d <= now) {
                    match self.state {
                        FsmState::Active => self.enter_passive(now),
                        FsmState::PassiveActive => self.enter_removed(),
                        FsmState::Removed => Vec::new(),
                    }
                } else {
                    Vec::new()
                }
            }
        }
    }

    fn enter_active(&mut self, now: Instant) -> Vec<FsmEffect> {
        self.state = FsmState::Active;
        self.deadline = Some(now + self.idle_to_passive);
        vec![FsmEffect::Join(SessionMode::Active)]
    }

    fn enter_passive(&mut self, now: Instant) -> Vec<FsmEffect> {
        self.state = FsmState::PassiveActive;
        self.deadline = Some(now + self.passive_to_removed);
        vec![FsmEffect::Join(SessionMode::PassiveActive)]
    }

    fn enter_removed(&mut self) -> Vec<FsmEffect> {
        self.state = FsmState::Removed;
        self.deadline = None;
        vec![FsmEffect::ForcedLeave]
    }

    fn revive(&mut self, now: Instant) -> Vec<FsmEffect> {
        // Re-enter via the current visibility-derived mode.
        let mode = if self.foreground {
            self.state = FsmState::Active;
            self.deadline = Some(now + self.idle_to_passive);
            SessionMode::Active
        } else {
            self.state = FsmState::PassiveActive;
            self.deadline = Some(now + self.passive_to_removed);
            SessionMode::PassiveActive
        };
        vec![FsmEffect::Rejoin(mode)]
    }
}

/// The simple mapping used on handheld devices: foreground means active.
pub fn visibility_mode(state: TabState) -> SessionMode {
    if state.is_foreground() {
        SessionMode::Active
    } else {
        SessionMode::PassiveActive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const F: Duration = Duration::from_secs(300);
    const P: Duration = Duration::from_secs(240);

    fn machine(now: Instant) -> SessionModeFsm {
        SessionModeFsm::new(F, P, now)
    }

    #[tokio::test(start_paused = true)]
    async fn idle_foreground_decays_to_passive() {
        let t0 = Instant::now();
        let mut fsm = machine(t0);

        let effects = fsm.on_event(FsmEvent::Deadline, t0 + F);
        assert_eq!(effects, vec![FsmEffect::Join(SessionMode::PassiveActive)]);
        assert_eq!(fsm.state(), FsmState::PassiveActive);
    }

    #[tokio::test(start_paused = true)]
    async fn activity_resets_the_foreground_budget() {
        let t0 = Instant::now();
        let mut fsm = machine(t0);

        let mid = t0 + F / 2;
        assert!(fsm.on_event(FsmEvent::Activity, mid).is_empty());

        // The original deadline passes without a transition.
        assert!(fsm.on_event(FsmEvent::Deadline, t0 + F).is_empty());
        assert_eq!(fsm.state(), FsmState::Active);

        // The reset one fires.
        let effects = fsm.on_event(FsmEvent::Deadline, mid + F);
        assert_eq!(effects, vec![FsmEffect::Join(SessionMode::PassiveActive)]);
    }

    #[tokio::test(start_paused = true)]
    async fn backgrounding_enters_passive_immediately() {
        let t0 = Instant::now();
        let mut fsm = machine(t0);

        let effects = fsm.on_event(FsmEvent::Background, t0);
        assert_eq!(effects, vec![FsmEffect::Join(SessionMode::PassiveActive)]);
    }

    #[tokio::test(start_paused = true)]
    async fn foregrounding_reactivates_passive() {
        let t0 = Instant::now();
        let mut fsm = machine(t0);
        fsm.on_event(FsmEvent::Background, t0);

        let effects = fsm.on_event(FsmEvent::BecameForeground, t0 + Duration::from_secs(10));
        assert_eq!(effects, vec![FsmEffect::Join(SessionMode::Active)]);
        assert_eq!(fsm.state(), FsmState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn passive_idle_removes_the_session() {
        let t0 = Instant::now();
        let mut fsm = machine(t0);
        fsm.on_event(FsmEvent::Background, t0);

        let effects = fsm.on_event(FsmEvent::Deadline, t0 + P);
        assert_eq!(effects, vec![FsmEffect::ForcedLeave]);
        assert_eq!(fsm.state(), FsmState::Removed);
        assert_eq!(fsm.mode(), None);
        assert!(fsm.next_deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn activity_revives_a_removed_session() {
        let t0 = Instant::now();
        let mut fsm = machine(t0);
        fsm.on_event(FsmEvent::Background, t0);
        fsm.on_event(FsmEvent::Deadline, t0 + P);
        assert_eq!(fsm.state(), FsmState::Removed);

        // Foregrounding revives via the visibility-derived mode.
        let effects = fsm.on_event(FsmEvent::BecameForeground, t0 + P + Duration::from_secs(5));
        assert_eq!(effects, vec![FsmEffect::Rejoin(SessionMode::Active)]);
        assert_eq!(fsm.state(), FsmState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn background_activity_does_not_reactivate() {
        let t0 = Instant::now();
        let mut fsm = machine(t0);
        fsm.on_event(FsmEvent::Background, t0);

        // Scroll restoration and the like while hidden must not flip modes.
        assert!(fsm.on_event(FsmEvent::Activity, t0 + Duration::from_secs(1)).is_empty());
        assert_eq!(fsm.state(), FsmState::PassiveActive);
    }

    #[test]
    fn handheld_mapping_is_visibility_driven() {
        assert_eq!(visibility_mode(TabState::Foreground), SessionMode::Active);
        assert_eq!(
            visibility_mode(TabState::Background),
            SessionMode::PassiveActive
        );
    }
}
