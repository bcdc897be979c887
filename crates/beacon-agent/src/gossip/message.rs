//! Gossip message envelopes exchanged between same-session tabs.

use serde::{Deserialize, Serialize};

use crate::identity::TabId;

/// Foreground/background state of a tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TabState {
    /// Visible and focused.
    Foreground,
    /// Hidden or blurred.
    Background,
}

impl TabState {
    /// Whether the tab is foregrounded.
    pub fn is_foreground(&self) -> bool {
        matches!(self, Self::Foreground)
    }
}

/// Typed gossip payloads.
///
/// Delivery is best-effort: duplicates are tolerated and there is no
/// ordering across senders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GossipMessage {
    /// New tab asks peers to announce themselves.
    WhoIsHere,
    /// Reply to `who_is_here`.
    IAmHere {
        /// Current foreground/background state.
        state: TabState,
    },
    /// Announce an own state change.
    TabState {
        /// New state.
        state: TabState,
    },
    /// Announce a graceful close.
    TabClosed,
    /// Trigger an election round.
    LeaderElection,
    /// Announce self as a candidate.
    LeaderCandidate {
        /// Candidate timestamp in epoch milliseconds.
        timestamp: i64,
    },
    /// Current leader heartbeat.
    LeaderBeat,
}

/// A gossip message plus its sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GossipEnvelope {
    /// Sending tab.
    #[serde(rename = "tabId")]
    pub tab_id: TabId,
    /// Payload.
    #[serde(flatten)]
    pub message: GossipMessage,
}

impl GossipEnvelope {
    /// Wraps a message with its sender.
    pub fn new(tab_id: TabId, message: GossipMessage) -> Self {
        Self { tab_id, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_tags_match_the_protocol() {
        let envelope = GossipEnvelope::new(
            TabId("t1".to_string()),
            GossipMessage::IAmHere {
                state: TabState::Background,
            },
        );
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value.get("type").unwrap(), "i_am_here");
        assert_eq!(value.get("state").unwrap(), "background");
        assert_eq!(value.get("tabId").unwrap(), "t1");

        let beat: GossipEnvelope =
            serde_json::from_str(r#"{"tabId":"t2","type":"leader_beat"}"#).unwrap();
        assert_eq!(beat.message, GossipMessage::LeaderBeat);
    }
}
