//! Deterministic leader election among a session's tabs.
//!
//! Protocol: a tab that has seen no leader beat for the timeout (or that
//! foregrounds while the leader is backgrounded) broadcasts `leader_election`
//! and collects `leader_candidate` announcements for a short window. Only
//! foreground tabs announce candidacy; the lexicographically smallest
//! candidate id wins, and a starter with no candidates elects itself. Ties
//! are impossible by construction; a lost message at worst delays the next
//! election round.

use std::collections::BTreeSet;
use std::time::Duration;

use tokio::time::Instant;

use crate::identity::TabId;

/// Result of closing an election window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionOutcome {
    /// This tab won and must start beating immediately.
    Won,
    /// Another candidate won.
    Lost,
}

/// Election state for one tab.
#[derive(Debug)]
pub struct LeaderElector {
    own: TabId,
    is_leader: bool,
    /// Who we currently believe leads the session.
    current_leader: Option<TabId>,
    last_beat_seen: Option<Instant>,
    /// Candidates collected during the open window.
    candidates: BTreeSet<TabId>,
    /// Deadline of the open election window, if any.
    window_deadline: Option<Instant>,
}

impl LeaderElector {
    /// Creates the elector for a tab.
    pub fn new(own: TabId) -> Self {
        Self {
            own,
            is_leader: false,
            current_leader: None,
            last_beat_seen: None,
            candidates: BTreeSet::new(),
            window_deadline: None,
        }
    }

    /// Whether this tab currently leads the session.
    pub fn is_leader(&self) -> bool {
        self.is_leader
    }

    /// The tab we last saw beating (or elected).
    pub fn current_leader(&self) -> Option<&TabId> {
        self.current_leader.as_ref()
    }

    /// Whether an election window is open.
    pub fn election_open(&self) -> bool {
        self.window_deadline.is_some()
    }

    /// Deadline of the open election window.
    pub fn window_deadline(&self) -> Option<Instant> {
        self.window_deadline
    }

    /// Records a beat from another tab.
    ///
    /// Returns `true` when this tab was leader and must resign: two leaders
    /// can only coexist transiently, and the beat proves the other one.
    pub fn on_leader_beat(&mut self, from: &TabId, now: Instant) -> bool {
        if *from == self.own {
            return false;
        }
        self.last_beat_seen = Some(now);
        self.current_leader = Some(from.clone());
        if self.is_leader {
            self.is_leader = false;
            return true;
        }
        false
    }

    /// Whether the leader has been silent past the timeout.
    ///
    /// A tab that has never seen a beat treats the leader as stale.
    pub fn beat_stale(&self, now: Instant, timeout: Duration) -> bool {
        if self.is_leader {
            return false;
        }
        match self.last_beat_seen {
            None => true,
            Some(seen) => now.duration_since(seen) > timeout,
        }
    }

    /// Opens an election window. Foreground tabs enter their own candidacy.
    ///
    /// Returns `false` when a window is already open (duplicate elections
    /// are idempotent).
    pub fn start_election(&mut self, now: Instant, window: Duration, foreground: bool) -> bool {
        if self.election_open() {
            return false;
        }
        self.candidates.clear();
        if foreground {
            self.candidates.insert(self.own.clone());
        }
        self.window_deadline = Some(now + window);
        true
    }

    /// Joins an election another tab announced.
    pub fn join_election(&mut self, now: Instant, window: Duration, foreground: bool) {
        if !self.election_open() {
            self.start_election(now, window, foreground);
        }
    }

    /// Records a candidate announcement.
    pub fn on_candidate(&mut self, tab_id: TabId) {
        if self.election_open() {
            self.candidates.insert(tab_id);
        }
    }

    /// Closes the window and resolves the winner.
    ///
    /// The smallest candidate id wins; with no candidates at all, the tab
    /// that held the window elects itself so a sole background tab still has
    /// a writer.
    pub fn close_election(&mut self) -> Option<ElectionOutcome> {
        self.window_deadline.take()?;
        let winner = self
            .candidates
            .iter()
            .next()
            .cloned()
            .unwrap_or_else(|| self.own.clone());
        self.candidates.clear();

        let won = winner == self.own;
        self.is_leader = won;
        self.current_leader = Some(winner);
        Some(if won {
            ElectionOutcome::Won
        } else {
            ElectionOutcome::Lost
        })
    }

    /// Marks a beat from self (keeps followers from calling us stale).
    pub fn on_own_beat(&mut self, now: Instant) {
        self.last_beat_seen = Some(now);
    }
}
