use chrono::Utc;
use std::sync::Arc;

use super::common::{host, policy, registry, FakeNetwork};
use crate::core::registry::ConnectionRegistry;
use crate::error::ControllerError;
use crate::services::MemoryStatusStore;
use crate::traits::{Connector, MockStatusStore, StatusStore};
use shared::{HostId, HostStatus};

#[tokio::test]
async fn test_register_connects_and_persists() {
    let network = FakeNetwork::new();
    let record = host("eu-1", 1);
    network.agent(&record);
    let store = Arc::new(MemoryStatusStore::with_hosts([record.clone()]));
    let registry = registry(&network, &store);

    let conn = registry.register(record.clone()).await.unwrap();

    assert_eq!(conn.status().await, HostStatus::Online);
    assert_eq!(registry.count().await, 1);
    assert_eq!(registry.count_online().await, 1);
    let stored = store.get(record.id).await.unwrap();
    assert_eq!(stored.status, HostStatus::Online);
    assert!(stored.last_seen.is_some());
}

#[tokio::test]
async fn test_register_is_idempotent() {
    let network = FakeNetwork::new();
    let record = host("eu-1", 1);
    network.agent(&record);
    let store = Arc::new(MemoryStatusStore::with_hosts([record.clone()]));
    let registry = registry(&network, &store);

    let first = registry.register(record.clone()).await.unwrap();
    let second = registry.register(record.clone()).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(network.dials(), 1);
    assert_eq!(registry.count().await, 1);
}

#[tokio::test]
async fn test_concurrent_registers_dial_once() {
    let network = FakeNetwork::new();
    let record = host("eu-1", 1);
    network.agent(&record);
    let store = Arc::new(MemoryStatusStore::with_hosts([record.clone()]));
    let registry = registry(&network, &store);

    let (a, b) = tokio::join!(registry.register(record.clone()), registry.register(record.clone()));

    assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
    assert_eq!(network.dials(), 1);
}

#[tokio::test]
async fn test_failed_dial_stays_registered_in_error() {
    let network = FakeNetwork::new();
    let record = host("eu-1", 1);
    let agent = network.agent(&record);
    agent.set_reachable(false);
    let store = Arc::new(MemoryStatusStore::with_hosts([record.clone()]));
    let registry = registry(&network, &store);

    let result = registry.register(record.clone()).await;

    assert!(matches!(result, Err(ControllerError::DialFailed { .. })));
    let conn = registry.get(record.id).await.unwrap();
    assert_eq!(conn.status().await, HostStatus::Error);
    assert_eq!(store.get(record.id).await.unwrap().status, HostStatus::Error);

    // Registering again retries the dial
    agent.set_reachable(true);
    registry.register(record.clone()).await.unwrap();
    assert_eq!(conn.status().await, HostStatus::Online);
    assert_eq!(network.dials(), 2);
}

#[tokio::test]
async fn test_unregister() {
    let network = FakeNetwork::new();
    let record = host("eu-1", 1);
    network.agent(&record);
    let store = Arc::new(MemoryStatusStore::with_hosts([record.clone()]));
    let registry = registry(&network, &store);
    let conn = registry.register(record.clone()).await.unwrap();

    registry.unregister(record.id).await.unwrap();

    assert!(registry.get(record.id).await.is_none());
    assert!(!conn.is_connected().await);
    assert_eq!(store.get(record.id).await.unwrap().status, HostStatus::Offline);
    assert!(matches!(
        registry.unregister(record.id).await,
        Err(ControllerError::HostNotFound { .. })
    ));
}

#[tokio::test]
async fn test_healthy_excludes_failed_hosts() {
    let network = FakeNetwork::new();
    let up = host("eu-1", 1);
    let down = host("eu-2", 2);
    network.agent(&up);
    network.agent(&down).set_reachable(false);
    let store = Arc::new(MemoryStatusStore::with_hosts([up.clone(), down.clone()]));
    let registry = registry(&network, &store);

    registry.register(up.clone()).await.unwrap();
    let _ = registry.register(down.clone()).await;

    let healthy = registry.healthy().await;
    assert_eq!(healthy.len(), 1);
    assert_eq!(healthy[0].id(), up.id);
    assert_eq!(registry.count().await, 2);
    assert_eq!(registry.count_online().await, 1);
}

#[tokio::test]
async fn test_load_from_store_filters_hosts() {
    let network = FakeNetwork::new();
    let mut was_online = host("eu-1", 1);
    was_online.status = HostStatus::Online;
    was_online.last_seen = Some(Utc::now());
    let never_seen = host("eu-2", 2);
    let mut went_offline = host("eu-3", 3);
    went_offline.last_seen = Some(Utc::now());
    let mut unreachable = host("eu-4", 4);
    unreachable.status = HostStatus::Online;

    for record in [&was_online, &never_seen, &went_offline, &unreachable] {
        network.agent(record);
    }
    network.agent(&unreachable).set_reachable(false);

    let store = Arc::new(MemoryStatusStore::with_hosts([
        was_online.clone(),
        never_seen.clone(),
        went_offline.clone(),
        unreachable.clone(),
    ]));
    let registry = registry(&network, &store);

    let connected = registry.load_from_store().await.unwrap();

    assert_eq!(connected, 2);
    assert_eq!(registry.count().await, 3);
    assert!(registry.get(went_offline.id).await.is_none());
    let failed = registry.get(unreachable.id).await.unwrap();
    assert_eq!(failed.status().await, HostStatus::Error);
}

#[tokio::test]
async fn test_store_failures_are_not_registry_errors() {
    let network = FakeNetwork::new();
    let record = host("eu-1", 1);
    network.agent(&record);

    let mut store = MockStatusStore::new();
    store
        .expect_update_status()
        .returning(|_, _| Err(ControllerError::storage("database unavailable")));
    store
        .expect_update_last_seen()
        .returning(|_, _| Err(ControllerError::storage("database unavailable")));

    let registry = ConnectionRegistry::new(
        Arc::clone(&network) as Arc<dyn Connector>,
        Arc::new(store) as Arc<dyn StatusStore>,
        policy(),
    );

    let conn = registry.register(record.clone()).await.unwrap();
    assert_eq!(conn.status().await, HostStatus::Online);
    registry.unregister(record.id).await.unwrap();
}

#[tokio::test]
async fn test_status_mirroring_targets_the_host() {
    let network = FakeNetwork::new();
    let id = HostId::new();

    let mut store = MockStatusStore::new();
    store
        .expect_update_status()
        .withf(move |host_id, status| *host_id == id && *status == HostStatus::Offline)
        .times(1)
        .returning(|_, _| Ok(()));

    let registry = ConnectionRegistry::new(
        Arc::clone(&network) as Arc<dyn Connector>,
        Arc::new(store) as Arc<dyn StatusStore>,
        policy(),
    );
    registry.update_status(id, HostStatus::Offline).await;
}

#[tokio::test]
async fn test_shutdown_disconnects_everything() {
    let network = FakeNetwork::new();
    let a = host("eu-1", 1);
    let b = host("eu-2", 2);
    network.agent(&a);
    network.agent(&b);
    let store = Arc::new(MemoryStatusStore::with_hosts([a.clone(), b.clone()]));
    let registry = registry(&network, &store);
    let conn_a = registry.register(a).await.unwrap();
    let conn_b = registry.register(b).await.unwrap();

    registry.shutdown().await;

    assert_eq!(registry.count().await, 0);
    assert_eq!(conn_a.status().await, HostStatus::Offline);
    assert_eq!(conn_b.status().await, HostStatus::Offline);
}
