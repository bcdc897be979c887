//! The presence record persisted per `(customer, session)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::device::DeviceClass;
use super::mode::SessionMode;
use super::wire::JoinRequest;

/// One presence record per `(customer, session)` pair.
///
/// Written only by the session's current leader tab; destroyed by explicit
/// LEAVE, TTL expiry, or the disconnect resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceRecord {
    /// Tenant whose site hosts the agent.
    #[serde(rename = "customerId")]
    pub customer_id: String,
    /// Logical user instance across same-origin tabs.
    #[serde(rename = "sessionId")]
    pub session_id: String,
    /// Tab currently acting as the session's leader.
    #[serde(rename = "tabId")]
    pub tab_id: String,
    /// Always true: followers never write.
    #[serde(rename = "isLeader", default = "default_true")]
    pub is_leader: bool,
    /// Operating system tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    /// Browser tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
    /// Device class (external tag).
    #[serde(default)]
    pub device: DeviceClass,
    /// Whether a handheld browser requested the desktop site.
    #[serde(default)]
    pub desktop_mode: bool,
    /// Total tabs known to the session, leader included.
    #[serde(default = "default_one")]
    pub total_tab_quantity: u32,
    /// Backgrounded tabs among the total.
    #[serde(rename = "total_backgroundTab_quantity", default)]
    pub total_background_tab_quantity: u32,
    /// Current session mode; drives the server-side TTL.
    #[serde(default = "default_mode")]
    pub session_mode: SessionMode,
    /// When the record was first created. Immutable for the record's life.
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    /// Refreshed on every write.
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    /// Human-readable last activity marker.
    #[serde(rename = "lastActivity")]
    pub last_activity: String,
}

impl PresenceRecord {
    /// Builds a fresh record from a JOIN payload.
    ///
    /// Callers must have validated that the identifier fields are present.
    pub fn from_join(join: &JoinRequest, now: DateTime<Utc>) -> Self {
        Self {
            customer_id: join.customer_id.clone().unwrap_or_default(),
            session_id: join.session_id.clone().unwrap_or_default(),
            tab_id: join.tab_id.clone().unwrap_or_default(),
            is_leader: true,
            platform: join.platform.clone(),
            browser: join.browser.clone(),
            device: join.device.unwrap_or_default(),
            desktop_mode: join.desktop_mode.unwrap_or(false),
            total_tab_quantity: join.total_tab_quantity.unwrap_or(1),
            total_background_tab_quantity: join.total_background_tab_quantity.unwrap_or(0),
            session_mode: join.session_mode.unwrap_or(SessionMode::Active),
            created_at: now,
            updated_at: now,
            last_activity: "just now".to_string(),
        }
    }

    /// Merges a JOIN payload over this record.
    ///
    /// Fields the payload omits keep their stored values; polling-mode TTL
    /// refreshes arrive as thin JOINs and must not wipe device or tab-count
    /// data. `createdAt` is never touched.
    pub fn merge_join(&mut self, join: &JoinRequest, now: DateTime<Utc>) {
        if let Some(tab_id) = &join.tab_id {
            self.tab_id = tab_id.clone();
        }
        if let Some(platform) = &join.platform {
            self.platform = Some(platform.clone());
        }
        if let Some(browser) = &join.browser {
            self.browser = Some(browser.clone());
        }
        if let Some(device) = join.device {
            self.device = device;
        }
        if let Some(desktop_mode) = join.desktop_mode {
            self.desktop_mode = desktop_mode;
        }
        if let Some(total) = join.total_tab_quantity {
            self.total_tab_quantity = total;
        }
        if let Some(background) = join.total_background_tab_quantity {
            self.total_background_tab_quantity = background;
        }
        if let Some(mode) = join.session_mode {
            self.session_mode = mode;
        }
        self.touch(now);
    }

    /// Stamps the write-tracking fields.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.last_activity = "just now".to_string();
    }
}

fn default_true() -> bool {
    true
}

fn default_one() -> u32 {
    1
}

fn default_mode() -> SessionMode {
    SessionMode::Active
}
