//! Presence service — JOIN / BEAT / LEAVE / TTL-refresh semantics.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use beacon_core::error::AppError;
use beacon_core::result::AppResult;
use beacon_core::types::device::DeviceClass;
use beacon_core::types::mode::SessionMode;
use beacon_core::types::record::PresenceRecord;
use beacon_core::types::wire::{JoinRequest, LeaveRequest};

use crate::disconnect::DisconnectResolver;
use crate::store::PresenceStore;

/// What happened to a JOIN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The record was written.
    Accepted,
    /// A live leave tombstone for this tab suppressed the write.
    SuppressedByTombstone,
}

/// What happened to a LEAVE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The record was removed, or a tombstone was written for a missing one.
    Processed,
    /// The same `X-Leave-Id` was already seen.
    Duplicate,
    /// Identifiers were missing; nothing to do.
    Dismissed,
}

/// Coordinates the presence store, idempotency markers, and the disconnect
/// resolver behind the REST and WebSocket surfaces.
#[derive(Debug)]
pub struct PresenceService {
    /// Record store.
    store: Arc<PresenceStore>,
    /// Handheld disconnect timers.
    resolver: Arc<DisconnectResolver>,
}

impl PresenceService {
    /// Creates the service.
    pub fn new(store: Arc<PresenceStore>, resolver: Arc<DisconnectResolver>) -> Self {
        Self { store, resolver }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<PresenceStore> {
        &self.store
    }

    /// Handles a JOIN: merge over any existing record, cancel pending
    /// disconnect verification, write with a fresh mode TTL.
    pub async fn join(&self, join: &JoinRequest) -> AppResult<JoinOutcome> {
        let (customer_id, session_id, tab_id) = join
            .ids()
            .ok_or_else(|| AppError::validation("Missing required fields"))?;

        if self
            .store
            .has_leave_tombstone(customer_id, session_id, tab_id)
            .await?
        {
            info!(
                customer_id = %customer_id,
                session_id = %session_id,
                tab_id = %tab_id,
                "JOIN suppressed by leave tombstone"
            );
            return Ok(JoinOutcome::SuppressedByTombstone);
        }

        self.resolver.cancel(customer_id, session_id);

        let now = Utc::now();
        let record = match self.store.get(customer_id, session_id).await? {
            Some(mut existing) => {
                existing.merge_join(join, now);
                existing
            }
            None => PresenceRecord::from_join(join, now),
        };

        self.store.set(record).await?;
        Ok(JoinOutcome::Accepted)
    }

    /// Handles a legacy BEAT: update in place keeping the TTL, or create a
    /// fresh record when none exists.
    pub async fn beat(&self, beat: &JoinRequest) -> AppResult<()> {
        let (customer_id, session_id, _) = beat
            .ids()
            .ok_or_else(|| AppError::validation("Missing required fields"))?;

        let now = Utc::now();
        match self.store.get(customer_id, session_id).await? {
            Some(mut existing) => {
                existing.merge_join(beat, now);
                self.store.update(existing).await
            }
            None => {
                warn!(
                    customer_id = %customer_id,
                    session_id = %session_id,
                    "BEAT for missing record, creating anew"
                );
                self.store.set(PresenceRecord::from_join(beat, now)).await
            }
        }
    }

    /// Handles a LEAVE, deduplicated by the optional `X-Leave-Id`.
    pub async fn leave(
        &self,
        leave: &LeaveRequest,
        leave_id: Option<&str>,
    ) -> AppResult<LeaveOutcome> {
        if let Some(id) = leave_id {
            if !self.store.mark_seen_leave(id).await? {
                debug!(leave_id = %id, "Duplicate LEAVE absorbed");
                return Ok(LeaveOutcome::Duplicate);
            }
        }

        let Some((customer_id, session_id)) = leave.ids() else {
            return Ok(LeaveOutcome::Dismissed);
        };

        self.resolver.cancel(customer_id, session_id);

        if self.store.get(customer_id, session_id).await?.is_some() {
            self.store.remove(customer_id, session_id).await?;
            info!(
                customer_id = %customer_id,
                session_id = %session_id,
                mode = ?leave.mode,
                reason = ?leave.reason,
                "Session left"
            );
            return Ok(LeaveOutcome::Processed);
        }

        // Record already gone; leave a tombstone so a stale tab's JOIN
        // arriving inside the grace window does not resurrect the session.
        if let Some(tab_id) = leave.tab_id.as_deref() {
            self.store
                .write_leave_tombstone(customer_id, session_id, tab_id)
                .await?;
        }
        Ok(LeaveOutcome::Processed)
    }

    /// Extends a record's TTL, persisting a changed mode first.
    ///
    /// Only the leader should call this; leadership is not enforced here.
    pub async fn refresh_ttl(
        &self,
        customer_id: &str,
        session_id: &str,
        mode: Option<SessionMode>,
    ) -> AppResult<()> {
        self.store.refresh_ttl(customer_id, session_id, mode).await
    }

    /// Applies the platform-aware disconnect policy after a socket close.
    pub fn handle_disconnect(
        self: &Arc<Self>,
        customer_id: &str,
        session_id: &str,
        device: DeviceClass,
    ) {
        if device.is_handheld() {
            self.resolver.schedule(customer_id, session_id);
        } else {
            // Desktop closes are covered by TTL plus explicit LEAVE.
            debug!(
                customer_id = %customer_id,
                session_id = %session_id,
                "Desktop disconnect, relying on TTL"
            );
        }
    }

    /// Cancels a pending disconnect timer (socket re-auth).
    pub fn cancel_disconnect(&self, customer_id: &str, session_id: &str) {
        self.resolver.cancel(customer_id, session_id);
    }
}
