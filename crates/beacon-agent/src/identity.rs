//! Session and tab identity.
//!
//! All tabs of a customer share one persisted session id for up to 24 h of
//! idleness; every page load mints a fresh tab id. Writes are idempotent
//! last-write-wins: concurrent tab opens all persist the same value inside
//! the idle window, so races are harmless.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use beacon_core::types::device::DeviceClass;

/// Storage key for the persisted session identity.
const SESSION_SLOT: &str = "beacon_session";

/// A tab identifier, fresh on every load.
///
/// Elections pick the lexicographically smallest id, so ordering on the
/// underlying string is the tie-breaker that makes them deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TabId(pub String);

impl TabId {
    /// Mints a fresh tab id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TabId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TabId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Minimal persistent storage interface (a `localStorage` stand-in).
pub trait SessionStorage: Send + Sync + std::fmt::Debug {
    /// Reads a slot.
    fn load(&self, key: &str) -> Option<String>;
    /// Writes a slot, replacing any existing value.
    fn store(&self, key: &str, value: String);
}

/// In-memory storage for tests and embedders without real persistence.
#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    slots: DashMap<String, String>,
}

impl MemorySessionStorage {
    /// Creates empty storage.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemorySessionStorage {
    fn load(&self, key: &str) -> Option<String> {
        self.slots.get(key).map(|entry| entry.value().clone())
    }

    fn store(&self, key: &str, value: String) {
        self.slots.insert(key.to_string(), value);
    }
}

/// Returns the session id shared by this customer's tabs.
///
/// Reuses the persisted id while its idle timestamp is inside the window,
/// stamping it with `now`; otherwise mints a fresh id. A malformed slot is
/// treated as absent.
pub fn acquire_session_id(
    storage: &dyn SessionStorage,
    now: DateTime<Utc>,
    idle_window: std::time::Duration,
) -> String {
    if let Some(raw) = storage.load(SESSION_SLOT) {
        if let Some((id, stamp)) = parse_slot(&raw) {
            let idle = now.signed_duration_since(stamp);
            if idle >= chrono::Duration::zero()
                && idle.num_milliseconds() as u128 <= idle_window.as_millis()
            {
                storage.store(SESSION_SLOT, format_slot(&id, now));
                return id;
            }
        }
    }

    let id = Uuid::new_v4().to_string();
    storage.store(SESSION_SLOT, format_slot(&id, now));
    id
}

/// Refreshes the idle timestamp of the current session id.
pub fn touch_session(storage: &dyn SessionStorage, now: DateTime<Utc>) {
    if let Some(raw) = storage.load(SESSION_SLOT) {
        if let Some((id, _)) = parse_slot(&raw) {
            storage.store(SESSION_SLOT, format_slot(&id, now));
        }
    }
}

fn format_slot(id: &str, stamp: DateTime<Utc>) -> String {
    format!("{id}|{}", stamp.timestamp_millis())
}

fn parse_slot(raw: &str) -> Option<(String, DateTime<Utc>)> {
    let (id, stamp) = raw.split_once('|')?;
    if id.is_empty() {
        return None;
    }
    let millis: i64 = stamp.parse().ok()?;
    let stamp = DateTime::from_timestamp_millis(millis)?;
    Some((id.to_string(), stamp))
}

/// Everything a tab needs to identify itself to the server.
#[derive(Debug, Clone)]
pub struct AgentIdentity {
    /// Tenant identifier.
    pub customer_id: String,
    /// Session shared across tabs.
    pub session_id: String,
    /// This tab.
    pub tab_id: TabId,
    /// Device class tag from the embedder.
    pub device: DeviceClass,
    /// Platform tag.
    pub platform: Option<String>,
    /// Browser tag.
    pub browser: Option<String>,
    /// Desktop-site toggle on a handheld browser.
    pub desktop_mode: bool,
}

impl AgentIdentity {
    /// Builds an identity with a fresh tab id.
    pub fn new(customer_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            session_id: session_id.into(),
            tab_id: TabId::new(),
            device: DeviceClass::Desktop,
            platform: None,
            browser: None,
            desktop_mode: false,
        }
    }
}
