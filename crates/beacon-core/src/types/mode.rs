//! Session mode — the client-driven refresh posture of a session.

use serde::{Deserialize, Serialize};

/// The mode a live session is in.
///
/// `removed` is deliberately not a variant: a removed session has no record,
/// so absence of the key is the representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// The user is present and recently active.
    Active,
    /// The session is known to exist but the user is idle or backgrounded.
    PassiveActive,
}

impl SessionMode {
    /// Wire representation of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::PassiveActive => "passive_active",
        }
    }

    /// Whether this is the reduced-refresh posture.
    pub fn is_passive(&self) -> bool {
        matches!(self, Self::PassiveActive)
    }
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
