//! Key builders for all Beacon store entries.
//!
//! Centralising key construction prevents typos and makes it easy
//! to find every key the application uses.

// ── Presence keys ──────────────────────────────────────────

/// Key for the presence record of a `(customer, session)` pair.
pub fn presence(customer_id: &str, session_id: &str) -> String {
    format!("presence:{customer_id}:{session_id}")
}

/// Scan pattern matching every presence record of a customer.
pub fn presence_pattern(customer_id: &str) -> String {
    format!("presence:{customer_id}:*")
}

/// Extracts the session id from a presence key produced by [`presence`].
pub fn session_from_presence_key(key: &str) -> Option<&str> {
    let rest = key.strip_prefix("presence:")?;
    let (_customer, session) = rest.split_once(':')?;
    if session.is_empty() {
        None
    } else {
        Some(session)
    }
}

// ── Metrics keys ───────────────────────────────────────────

/// Key for the stored EMA value of a customer.
pub fn ema(customer_id: &str) -> String {
    format!("ema:{customer_id}")
}

/// Pub/sub channel carrying metrics updates for a customer.
pub fn metrics_channel(customer_id: &str) -> String {
    format!("metrics:{customer_id}")
}

// ── Leave idempotency keys ─────────────────────────────────

/// Marker suppressing a duplicate LEAVE carrying the same `X-Leave-Id`.
pub fn seen_leave(leave_id: &str) -> String {
    format!("SEEN_LEAVE:{leave_id}")
}

/// Tombstone suppressing a late JOIN from the tab that just left.
pub fn leave_tombstone(customer_id: &str, session_id: &str, tab_id: &str) -> String {
    format!("LEAVE_TOMBSTONE:presence:{customer_id}:{session_id}:{tab_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_key_layout() {
        assert_eq!(presence("acme", "s-1"), "presence:acme:s-1");
        assert_eq!(presence_pattern("acme"), "presence:acme:*");
    }

    #[test]
    fn session_extraction() {
        assert_eq!(
            session_from_presence_key("presence:acme:s-1"),
            Some("s-1")
        );
        assert_eq!(session_from_presence_key("ema:acme"), None);
        assert_eq!(session_from_presence_key("presence:acme:"), None);
    }

    #[test]
    fn leave_key_layout() {
        assert_eq!(seen_leave("abc"), "SEEN_LEAVE:abc");
        assert_eq!(
            leave_tombstone("acme", "s-1", "t-9"),
            "LEAVE_TOMBSTONE:presence:acme:s-1:t-9"
        );
    }
}
