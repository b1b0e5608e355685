use std::sync::Arc;
use std::time::Duration;

use super::common::{host, policy, FakeNetwork};
use crate::core::connection::RemoteConnection;
use crate::error::ControllerError;
use crate::traits::{Connector, HostRecord};
use shared::{AgentRequest, HostStatus};

fn connection(network: &Arc<FakeNetwork>, host: HostRecord) -> RemoteConnection {
    RemoteConnection::new(host, Arc::clone(network) as Arc<dyn Connector>, policy())
}

#[tokio::test]
async fn test_new_connection_is_offline_and_unhealthy() {
    let network = FakeNetwork::new();
    let conn = connection(&network, host("eu-1", 1));

    assert_eq!(conn.status().await, HostStatus::Offline);
    assert!(!conn.is_connected().await);
    assert!(!conn.is_healthy().await);
    assert!(conn.last_seen().await.is_none());
}

#[tokio::test]
async fn test_connect_populates_info() {
    let network = FakeNetwork::new();
    let record = host("eu-1", 1);
    network.agent(&record).set_active_servers(2);
    let conn = connection(&network, record);

    conn.connect().await.unwrap();

    assert_eq!(conn.status().await, HostStatus::Online);
    assert_eq!(conn.consecutive_failures().await, 0);
    assert!(conn.is_healthy().await);
    let info = conn.info().await.unwrap();
    assert_eq!(info.agent_id, "agent-eu-1");
    assert_eq!(conn.metrics().await.active_servers, 2);
    assert_eq!(conn.metrics().await.max_servers, 10);
}

#[tokio::test]
async fn test_failed_connect_sets_error() {
    let network = FakeNetwork::new();
    let record = host("eu-1", 1);
    network.agent(&record).set_reachable(false);
    let conn = connection(&network, record);

    let result = conn.connect().await;

    assert!(matches!(result, Err(ControllerError::DialFailed { .. })));
    assert_eq!(conn.status().await, HostStatus::Error);
    assert!(!conn.is_healthy().await);
}

#[tokio::test]
async fn test_dial_claim_is_exclusive() {
    let network = FakeNetwork::new();
    let conn = connection(&network, host("eu-1", 1));

    assert!(conn.try_claim_dial(&[HostStatus::Offline]).await);
    assert_eq!(conn.status().await, HostStatus::Connecting);
    assert!(!conn.try_claim_dial(&[HostStatus::Offline, HostStatus::Error]).await);
    assert!(matches!(conn.connect().await, Err(ControllerError::ConnectInProgress { .. })));
}

#[tokio::test]
async fn test_two_failures_then_success_resets_counter() {
    let network = FakeNetwork::new();
    let record = host("eu-1", 1);
    let agent = network.agent(&record);
    let conn = connection(&network, record);
    conn.connect().await.unwrap();

    agent.set_reachable(false);
    assert!(conn.probe().await.is_err());
    assert!(conn.probe().await.is_err());
    assert_eq!(conn.consecutive_failures().await, 2);
    // Probe failures alone never change the status
    assert_eq!(conn.status().await, HostStatus::Online);

    agent.set_reachable(true);
    conn.probe().await.unwrap();
    assert_eq!(conn.consecutive_failures().await, 0);
    assert_eq!(conn.status().await, HostStatus::Online);
}

#[tokio::test]
async fn test_threshold_failures_make_host_unhealthy() {
    let network = FakeNetwork::new();
    let record = host("eu-1", 1);
    let agent = network.agent(&record);
    let conn = connection(&network, record);
    conn.connect().await.unwrap();

    agent.set_reachable(false);
    for _ in 0..3 {
        let _ = conn.probe().await;
    }

    assert_eq!(conn.status().await, HostStatus::Online);
    assert!(!conn.is_healthy().await);
}

#[tokio::test]
async fn test_probe_without_channel_counts_as_failure() {
    let network = FakeNetwork::new();
    let conn = connection(&network, host("eu-1", 1));

    let result = conn.probe().await;

    assert!(matches!(result, Err(ControllerError::NotConnected { .. })));
    assert_eq!(conn.consecutive_failures().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_stale_contact_is_unhealthy() {
    let network = FakeNetwork::new();
    let record = host("eu-1", 1);
    network.agent(&record);
    let conn = connection(&network, record);
    conn.connect().await.unwrap();
    assert!(conn.is_healthy().await);

    tokio::time::advance(policy().recency_window() + Duration::from_secs(1)).await;
    assert!(!conn.is_healthy().await);

    conn.probe().await.unwrap();
    assert!(conn.is_healthy().await);
}

#[tokio::test]
async fn test_metrics_failure_leaves_counter_alone() {
    let network = FakeNetwork::new();
    let record = host("eu-1", 1);
    let agent = network.agent(&record);
    let conn = connection(&network, record);
    conn.connect().await.unwrap();

    let metrics = conn.update_metrics().await.unwrap();
    assert_eq!(metrics.cpu_percent, 37.5);
    assert!(conn.metrics().await.updated_at.is_some());

    agent.set_reachable(false);
    assert!(conn.update_metrics().await.is_err());
    assert_eq!(conn.consecutive_failures().await, 0);
    assert_eq!(conn.metrics().await.system.cpu_percent, 37.5);
}

#[tokio::test]
async fn test_invoke_maps_agent_errors() {
    let network = FakeNetwork::new();
    let record = host("eu-1", 1);
    let agent = network.agent(&record);
    let conn = connection(&network, record);
    conn.connect().await.unwrap();

    let refused = conn.invoke(AgentRequest::ListServers, Duration::from_secs(1)).await;
    assert!(matches!(refused, Err(ControllerError::RemoteError { .. })));
    assert_eq!(conn.consecutive_failures().await, 0);

    agent.set_reachable(false);
    let lost = conn.invoke(AgentRequest::Ping, Duration::from_secs(1)).await;
    assert!(matches!(lost, Err(ControllerError::Timeout { .. })));
    assert_eq!(conn.consecutive_failures().await, 1);
}

#[tokio::test]
async fn test_disconnect() {
    let network = FakeNetwork::new();
    let record = host("eu-1", 1);
    network.agent(&record);
    let conn = connection(&network, record);
    conn.connect().await.unwrap();

    conn.disconnect().await;

    assert_eq!(conn.status().await, HostStatus::Offline);
    assert!(!conn.is_connected().await);
    assert!(matches!(
        conn.invoke(AgentRequest::Ping, Duration::from_secs(1)).await,
        Err(ControllerError::NotConnected { .. })
    ));
}
