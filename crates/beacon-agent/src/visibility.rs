//! Debounced foreground/background tracking.
//!
//! A tab is foreground iff the document is visible AND the window has
//! focus. Transitions are debounced to absorb transient blurs (devtools
//! focus, OS overlays). The initial state is foreground regardless of the
//! load-time signals; the first real event corrects it.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::gossip::message::TabState;

/// Events emitted when a debounced transition commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityEvent {
    /// The committed state changed.
    State(TabState),
    /// Background → foreground edge (fired alongside `State`).
    BecameForeground,
}

/// Visibility tracker for one tab.
#[derive(Debug)]
pub struct VisibilityTracker {
    visible: bool,
    focused: bool,
    state: TabState,
    /// A not-yet-committed transition and its commit deadline.
    pending: Option<(TabState, Instant)>,
    debounce: Duration,
}

impl VisibilityTracker {
    /// Creates a tracker in the initial foreground state.
    pub fn new(debounce: Duration) -> Self {
        Self {
            visible: true,
            focused: true,
            state: TabState::Foreground,
            pending: None,
            debounce,
        }
    }

    /// The committed state.
    pub fn state(&self) -> TabState {
        self.state
    }

    /// Feeds a document-visibility signal.
    pub fn set_visible(&mut self, visible: bool, now: Instant) {
        self.visible = visible;
        self.reconcile(now);
    }

    /// Feeds a window-focus signal.
    pub fn set_focused(&mut self, focused: bool, now: Instant) {
        self.focused = focused;
        self.reconcile(now);
    }

    /// Deadline at which a pending transition commits.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.map(|(_, deadline)| deadline)
    }

    /// Commits a due transition, returning the events it produced.
    pub fn poll(&mut self, now: Instant) -> Vec<VisibilityEvent> {
        let Some((target, deadline)) = self.pending else {
            return Vec::new();
        };
        if deadline > now {
            return Vec::new();
        }
        self.pending = None;

        let previous = self.state;
        self.state = target;

        let mut events = vec![VisibilityEvent::State(target)];
        if previous == TabState::Background && target == TabState::Foreground {
            events.push(VisibilityEvent::BecameForeground);
        }
        events
    }

    fn reconcile(&mut self, now: Instant) {
        let desired = if self.visible && self.focused {
            TabState::Foreground
        } else {
            TabState::Background
        };

        if desired == self.state {
            // A flip-back inside the debounce window: absorb it.
            self.pending = None;
        } else {
            // Restart the debounce on every change of target.
            self.pending = Some((desired, now + self.debounce));
        }
    }
}

/// Heuristic devtools detector, for logging only.
///
/// A docked devtools pane shows up as a large gap between the outer and
/// inner window dimensions.
pub fn devtools_suspected(outer_width: u32, inner_width: u32, outer_height: u32, inner_height: u32) -> bool {
    const GAP: u32 = 160;
    let suspected = outer_width.saturating_sub(inner_width) > GAP
        || outer_height.saturating_sub(inner_height) > GAP;
    if suspected {
        debug!(
            outer_width,
            inner_width, outer_height, inner_height, "Devtools suspected"
        );
    }
    suspected
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEBOUNCE: Duration = Duration::from_millis(500);

    #[tokio::test(start_paused = true)]
    async fn starts_foreground() {
        let tracker = VisibilityTracker::new(DEBOUNCE);
        assert_eq!(tracker.state(), TabState::Foreground);
    }

    #[tokio::test(start_paused = true)]
    async fn blur_commits_after_the_debounce() {
        let mut tracker = VisibilityTracker::new(DEBOUNCE);
        let t0 = Instant::now();
        tracker.set_focused(false, t0);

        assert!(tracker.poll(t0 + Duration::from_millis(499)).is_empty());
        let events = tracker.poll(t0 + Duration::from_millis(500));
        assert_eq!(events, vec![VisibilityEvent::State(TabState::Background)]);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_blur_is_absorbed() {
        let mut tracker = VisibilityTracker::new(DEBOUNCE);
        let t0 = Instant::now();
        tracker.set_focused(false, t0);
        tracker.set_focused(true, t0 + Duration::from_millis(200));

        assert!(tracker.next_deadline().is_none());
        assert!(tracker.poll(t0 + Duration::from_secs(1)).is_empty());
        assert_eq!(tracker.state(), TabState::Foreground);
    }

    #[tokio::test(start_paused = true)]
    async fn refocus_emits_became_foreground() {
        let mut tracker = VisibilityTracker::new(DEBOUNCE);
        let t0 = Instant::now();
        tracker.set_visible(false, t0);
        tracker.poll(t0 + DEBOUNCE);
        assert_eq!(tracker.state(), TabState::Background);

        let t1 = t0 + Duration::from_secs(5);
        tracker.set_visible(true, t1);
        let events = tracker.poll(t1 + DEBOUNCE);
        assert_eq!(
            events,
            vec![
                VisibilityEvent::State(TabState::Foreground),
                VisibilityEvent::BecameForeground,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn foreground_needs_both_visible_and_focused() {
        let mut tracker = VisibilityTracker::new(DEBOUNCE);
        let t0 = Instant::now();
        tracker.set_visible(false, t0);
        tracker.poll(t0 + DEBOUNCE);

        // Focus alone does not foreground a hidden tab.
        tracker.set_focused(true, t0 + Duration::from_secs(1));
        assert!(tracker.next_deadline().is_none());
        assert_eq!(tracker.state(), TabState::Background);
    }

    #[test]
    fn devtools_gap_detection() {
        assert!(devtools_suspected(1920, 1500, 1080, 1080));
        assert!(!devtools_suspected(1920, 1904, 1080, 1040));
    }
}
