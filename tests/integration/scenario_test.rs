//! End-to-end scenarios across the store, fleet, and EMA engine.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use beacon_cache::memory::MemoryCacheProvider;
use beacon_cache::provider::CacheManager;
use beacon_core::config::presence::PresenceConfig;
use beacon_core::config::realtime::RealtimeConfig;
use beacon_core::types::device::DeviceClass;
use beacon_core::types::mode::SessionMode;
use beacon_core::types::record::PresenceRecord;
use beacon_core::types::wire::{JoinRequest, ServerMessage};
use beacon_presence::disconnect::DisconnectResolver;
use beacon_presence::service::PresenceService;
use beacon_presence::store::PresenceStore;
use beacon_realtime::server::RealtimeEngine;

struct Stack {
    memory: Arc<MemoryCacheProvider>,
    store: Arc<PresenceStore>,
    service: Arc<PresenceService>,
    realtime: RealtimeEngine,
}

fn build_stack() -> Stack {
    let memory = Arc::new(MemoryCacheProvider::default());
    let cache = Arc::new(CacheManager::from_provider(
        Arc::clone(&memory) as Arc<dyn beacon_core::traits::cache::CacheProvider>
    ));
    let store = Arc::new(PresenceStore::new(cache, PresenceConfig::default()));
    let resolver = Arc::new(DisconnectResolver::new(
        Arc::clone(&store),
        RealtimeConfig::default(),
    ));
    let service = Arc::new(PresenceService::new(Arc::clone(&store), resolver));
    let realtime = RealtimeEngine::new(
        RealtimeConfig::default(),
        Arc::clone(&store),
        Arc::clone(&service),
    );

    Stack {
        memory,
        store,
        service,
        realtime,
    }
}

fn record(customer: &str, session: &str, device: DeviceClass) -> PresenceRecord {
    let join = JoinRequest {
        customer_id: Some(customer.to_string()),
        session_id: Some(session.to_string()),
        tab_id: Some("t1".to_string()),
        device: Some(device),
        session_mode: Some(SessionMode::Active),
        ..Default::default()
    };
    PresenceRecord::from_join(&join, Utc::now())
}

async fn seed_sessions(store: &PresenceStore, customer: &str, count: usize) {
    for i in 0..count {
        store
            .set(record(customer, &format!("s{i}"), DeviceClass::Desktop))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn ema_stream_reaches_pubsub_subscribers() {
    let stack = build_stack();
    let mut metrics_rx = stack.memory.subscribe("metrics:acme");
    stack.realtime.ema.subscribe("acme");

    let expected = [
        (10usize, 10.0f64),
        (10, 10.0),
        (10, 10.0),
        (20, 12.0),
        (20, 13.6),
    ];

    for (count, want_ema) in expected {
        seed_sessions(&stack.store, "acme", count).await;
        stack.realtime.ema.tick("acme").await.unwrap();

        let raw = metrics_rx.recv().await.unwrap();
        let message: ServerMessage = serde_json::from_str(&raw).unwrap();
        match message {
            ServerMessage::MetricsUpdate { data } => {
                assert_eq!(data.customer_id, "acme");
                assert_eq!(data.count, count as u64);
                assert!(
                    (data.ema - want_ema).abs() < 1e-9,
                    "expected ema {want_ema}, got {}",
                    data.ema
                );
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn mobile_disconnect_removes_a_near_expiry_session() {
    let stack = build_stack();
    stack
        .store
        .set(record("acme", "s1", DeviceClass::Mobile))
        .await
        .unwrap();

    // Socket authenticates against the record, then dies near expiry.
    let fleet = Arc::clone(&stack.realtime.fleet);
    let (handle, _rx) = fleet.connect();
    fleet
        .handle_inbound(
            &handle.id,
            r#"{"type":"auth","customerId":"acme","sessionId":"s1","tabId":"t1"}"#,
        )
        .await;

    tokio::time::advance(Duration::from_secs(588)).await;
    fleet.disconnect(&handle.id);

    // Grace (0.5 s) + verify (10 s): TTL is under the 15 s floor, so the
    // resolver removes the record before natural expiry at the 12 s mark.
    tokio::time::sleep(Duration::from_millis(10_700)).await;
    tokio::task::yield_now().await;

    assert!(stack.store.get("acme", "s1").await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn mobile_reconnect_within_the_window_survives() {
    let stack = build_stack();
    stack
        .store
        .set(record("acme", "s1", DeviceClass::Mobile))
        .await
        .unwrap();

    let fleet = Arc::clone(&stack.realtime.fleet);
    let (handle, _rx) = fleet.connect();
    fleet
        .handle_inbound(
            &handle.id,
            r#"{"type":"auth","customerId":"acme","sessionId":"s1","tabId":"t1"}"#,
        )
        .await;

    tokio::time::advance(Duration::from_secs(588)).await;
    fleet.disconnect(&handle.id);

    // The client reconnects and JOINs inside the verification window; the
    // JOIN cancels the timer and resets the TTL.
    tokio::time::sleep(Duration::from_secs(5)).await;
    let join = JoinRequest {
        customer_id: Some("acme".to_string()),
        session_id: Some("s1".to_string()),
        tab_id: Some("t1".to_string()),
        device: Some(DeviceClass::Mobile),
        session_mode: Some(SessionMode::Active),
        ..Default::default()
    };
    stack.service.join(&join).await.unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    tokio::task::yield_now().await;

    assert!(stack.store.get("acme", "s1").await.unwrap().is_some());
    assert!(stack.store.get_key_ttl("acme", "s1").await.unwrap() > 500);
}

#[tokio::test]
async fn desktop_disconnect_relies_on_ttl() {
    let stack = build_stack();
    stack
        .store
        .set(record("acme", "s1", DeviceClass::Desktop))
        .await
        .unwrap();

    let fleet = Arc::clone(&stack.realtime.fleet);
    let (handle, _rx) = fleet.connect();
    fleet
        .handle_inbound(
            &handle.id,
            r#"{"type":"auth","customerId":"acme","sessionId":"s1","tabId":"t1"}"#,
        )
        .await;
    fleet.disconnect(&handle.id);

    // No resolver involvement: the record stays until TTL expiry.
    assert!(stack.store.get("acme", "s1").await.unwrap().is_some());
}
