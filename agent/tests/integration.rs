//! End-to-end tests of the agent public API against real processes
#![cfg(unix)]

use std::time::Duration;
use tempfile::TempDir;

use agent::AgentError;
use shared::ServerStatus;

mod common;
use common::{AgentBuilder, TestFixtures};

/// Concurrent starts never admit more servers than the host allows
#[tokio::test]
async fn test_concurrent_starts_respect_capacity() {
    let dir = TempDir::new().unwrap();
    let agent = AgentBuilder::new(dir.path()).with_max_servers(3).build();

    let mut tasks = Vec::new();
    for i in 0..8 {
        let agent = agent.clone();
        tasks.push(tokio::spawn(async move {
            agent.registry().start(TestFixtures::start_request(&format!("s{i}"))).await
        }));
    }

    let mut admitted = 0;
    let mut refused = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(AgentError::CapacityExceeded { max_servers: 3 }) => refused += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(admitted, 3);
    assert_eq!(refused, 5);
    assert_eq!(agent.registry().supervisor().count().await, 3);

    agent.shutdown().await;
    assert_eq!(agent.registry().supervisor().count().await, 0);
}

/// Concurrent starts of one id admit exactly one
#[tokio::test]
async fn test_concurrent_duplicate_starts() {
    let dir = TempDir::new().unwrap();
    let agent = AgentBuilder::new(dir.path()).build();

    let (a, b) = tokio::join!(
        agent.registry().start(TestFixtures::start_request("same")),
        agent.registry().start(TestFixtures::start_request("same")),
    );

    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    assert!(matches!(a.err().or(b.err()), Some(AgentError::DuplicateServer { .. })));

    agent.shutdown().await;
}

/// A crash frees the slot for a new server
#[tokio::test]
async fn test_crash_frees_capacity() {
    let dir = TempDir::new().unwrap();
    let agent = AgentBuilder::new(dir.path())
        .with_max_servers(1)
        .with_script(TestFixtures::CRASHER)
        .build();

    agent.registry().start(TestFixtures::start_request("doomed")).await.unwrap();

    let mut freed = false;
    for _ in 0..100 {
        if agent.registry().count().await == 0 {
            freed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(freed, "crashed server still holds its slot");
    assert_eq!(
        agent.registry().get("doomed").await.unwrap().status,
        ServerStatus::Crashed
    );

    agent.registry().start(TestFixtures::start_request("next")).await.unwrap();
    agent.shutdown().await;
}
