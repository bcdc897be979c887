//! Connection pool — tracks all active connections indexed by customer.

use std::sync::Arc;

use dashmap::DashMap;

use super::handle::{ClientHandle, ConnectionId, SessionBinding};

/// Thread-safe pool of all active WebSocket connections.
///
/// Connections enter the by-customer index only once they authenticate.
/// Lookups return snapshots so broadcasts never iterate a map that a
/// concurrent open or close is mutating.
#[derive(Debug, Default)]
pub struct ClientPool {
    /// Connection ID → handle for direct lookup.
    by_id: DashMap<ConnectionId, Arc<ClientHandle>>,
    /// Customer ID → list of authenticated handles.
    by_customer: DashMap<String, Vec<Arc<ClientHandle>>>,
}

impl ClientPool {
    /// Creates a new empty connection pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an unauthenticated connection to the pool.
    pub fn add(&self, handle: Arc<ClientHandle>) {
        self.by_id.insert(handle.id, handle);
    }

    /// Indexes a connection under its customer once it authenticates.
    pub fn bind(&self, conn_id: &ConnectionId, binding: SessionBinding) -> Option<Arc<ClientHandle>> {
        let handle = self.by_id.get(conn_id).map(|entry| entry.value().clone())?;
        handle.bind(binding.clone());
        self.by_customer
            .entry(binding.customer_id)
            .or_default()
            .push(handle.clone());
        Some(handle)
    }

    /// Removes a connection from the pool.
    pub fn remove(&self, conn_id: &ConnectionId) -> Option<Arc<ClientHandle>> {
        let (_, handle) = self.by_id.remove(conn_id)?;
        if let Some(binding) = handle.binding() {
            if let Some(mut connections) = self.by_customer.get_mut(&binding.customer_id) {
                connections.retain(|c| c.id != *conn_id);
                if connections.is_empty() {
                    drop(connections);
                    self.by_customer.remove(&binding.customer_id);
                }
            }
        }
        Some(handle)
    }

    /// Gets a specific connection by ID.
    pub fn get(&self, conn_id: &ConnectionId) -> Option<Arc<ClientHandle>> {
        self.by_id.get(conn_id).map(|entry| entry.value().clone())
    }

    /// Snapshot of all authenticated connections for a customer.
    pub fn customer_handles(&self, customer_id: &str) -> Vec<Arc<ClientHandle>> {
        self.by_customer
            .get(customer_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Whether a customer has at least one authenticated connection.
    pub fn has_customer(&self, customer_id: &str) -> bool {
        self.by_customer.contains_key(customer_id)
    }

    /// Returns total number of active connections.
    pub fn connection_count(&self) -> usize {
        self.by_id.len()
    }

    /// Snapshot of all connection handles.
    pub fn all_connections(&self) -> Vec<Arc<ClientHandle>> {
        self.by_id
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::types::device::DeviceClass;
    use tokio::sync::mpsc;

    fn make_handle() -> Arc<ClientHandle> {
        let (tx, _rx) = mpsc::channel(8);
        Arc::new(ClientHandle::new(tx))
    }

    fn binding(customer: &str) -> SessionBinding {
        SessionBinding {
            customer_id: customer.to_string(),
            session_id: "s1".to_string(),
            tab_id: "t1".to_string(),
            device: DeviceClass::Desktop,
            platform: None,
        }
    }

    #[test]
    fn bind_indexes_by_customer() {
        let pool = ClientPool::new();
        let handle = make_handle();
        let id = handle.id;
        pool.add(handle);

        assert!(pool.customer_handles("acme").is_empty());
        pool.bind(&id, binding("acme"));
        assert_eq!(pool.customer_handles("acme").len(), 1);
    }

    #[test]
    fn remove_clears_both_indexes() {
        let pool = ClientPool::new();
        let handle = make_handle();
        let id = handle.id;
        pool.add(handle);
        pool.bind(&id, binding("acme"));

        let removed = pool.remove(&id).unwrap();
        assert_eq!(removed.id, id);
        assert!(pool.customer_handles("acme").is_empty());
        assert!(!pool.has_customer("acme"));
        assert_eq!(pool.connection_count(), 0);
    }

    #[test]
    fn unbound_removal_is_clean() {
        let pool = ClientPool::new();
        let handle = make_handle();
        let id = handle.id;
        pool.add(handle);
        assert!(pool.remove(&id).is_some());
        assert!(pool.remove(&id).is_none());
    }
}
