//! Navigation intent: an ordered enum with a monotonic update rule.
//!
//! Intent signals arrive from many listeners in no guaranteed order. Keeping
//! one slot and only ever upgrading (`external > reload > internal >
//! unknown`) makes the composition deterministic: once `external` is marked,
//! later `internal` or `reload` signals cannot downgrade it.

use url::Url;

/// What the user is about to do, most specific wins.
///
/// The derive order defines the priority: later variants dominate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NavIntent {
    /// No signal captured.
    Unknown,
    /// Same-site navigation, SPA route change, or a click that opens a new
    /// tab (the current tab is not leaving).
    Internal,
    /// A reload is in flight.
    Reload,
    /// Confirmed navigation to a foreign origin.
    External,
}

/// The single session-local slot holding the effective intent.
#[derive(Debug, Default)]
pub struct IntentSlot {
    current: Option<NavIntent>,
}

impl IntentSlot {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Upgrades the slot; downgrades are ignored.
    pub fn mark(&mut self, intent: NavIntent) {
        self.current = Some(match self.current {
            Some(current) => current.max(intent),
            None => intent,
        });
    }

    /// The effective intent.
    pub fn effective(&self) -> NavIntent {
        self.current.unwrap_or(NavIntent::Unknown)
    }

    /// Clears a consumed reload flag. Higher intents are untouched.
    pub fn clear_reload(&mut self) {
        if self.current == Some(NavIntent::Reload) {
            self.current = None;
        }
    }

    /// Resets the slot (new navigation pass).
    pub fn reset(&mut self) {
        self.current = None;
    }
}

/// Extracts the ASCII origin of an href (`scheme://host[:port]`).
pub fn origin_of(href: &str) -> Option<String> {
    let url = Url::parse(href).ok()?;
    let origin = url.origin();
    if origin.is_tuple() {
        Some(origin.ascii_serialization())
    } else {
        None
    }
}

/// Classifies a navigation destination against the allowed origins.
///
/// Unparseable destinations stay `Unknown`: better a PENDING leave than a
/// wrong FINAL one.
pub fn classify_destination(href: &str, allowed_origins: &[String]) -> NavIntent {
    match origin_of(href) {
        Some(origin) => {
            if allowed_origins.iter().any(|allowed| *allowed == origin) {
                NavIntent::Internal
            } else {
                NavIntent::External
            }
        }
        None => NavIntent::Unknown,
    }
}

/// Classifies a link click at capture time.
///
/// `target="_blank"` and modified clicks (ctrl/cmd/shift/middle) open
/// elsewhere, so the current tab is not leaving.
pub fn classify_link_click(
    href: &str,
    target_blank: bool,
    modified: bool,
    allowed_origins: &[String],
) -> NavIntent {
    if target_blank || modified {
        return NavIntent::Internal;
    }
    classify_destination(href, allowed_origins)
}
