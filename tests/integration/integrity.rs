//! Integration test: integrity across peers.
//!
//! Corrupted, missing and out-of-bound branches are isolated on the
//! receiving peer without disturbing what it already holds.

use std::sync::Arc;
use std::time::{Duration, Instant};

use strand_integration_tests::{TestNetwork, fast_sync_config};
use strand_log::EntryStatus;
use strand_store::{FaultyStore, MemoryStore};
use strand_sync::SyncConfig;

const TIMEOUT: Duration = Duration::from_secs(10);

fn faulty_network(n: usize, config: SyncConfig) -> (Arc<FaultyStore>, TestNetwork) {
    let faulty = Arc::new(FaultyStore::new(Arc::new(MemoryStore::new())));
    let net = TestNetwork::with_store(n, faulty.clone(), config);
    (faulty, net)
}

/// A posts "x" and "y"; "y" is corrupted in the store before B fetches it.
/// B keeps "x" and never adopts the corrupted head.
#[tokio::test]
#[ntest::timeout(30000)]
async fn test_corrupted_entry_is_not_replicated() {
    let (faulty, net) = faulty_network(2, fast_sync_config());

    let x = net.post(0, "x").await;
    assert!(net.wait_for_len(1, 1, TIMEOUT).await);

    net.partition(0);
    let y = net.post(0, "y").await;
    faulty.tamper(y.id(), b"definitely not y".to_vec());
    net.heal(0);

    // Several announce rounds go by.
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(net.feed(1), vec!["x"]);
    assert_eq!(net.log(1).head(&net.identity(0)), Some(x.id()));
    assert!(!net.log(1).contains(&y.id()));

    // The author still holds its own entry.
    assert_eq!(net.feed(0), vec!["x", "y"]);

    net.shutdown().await;
}

/// An entry whose parent is not in the store yet waits as pending and is
/// resolved once the parent shows up.
#[tokio::test]
#[ntest::timeout(30000)]
async fn test_missing_parent_resolves_later() {
    let (faulty, net) = faulty_network(2, fast_sync_config());

    net.partition(0);
    let a = net.post(0, "a").await;
    let b = net.post(0, "b").await;
    faulty.hide(a.id());
    net.heal(0);

    let deadline = Instant::now() + TIMEOUT;
    while net.log(1).pending_count() == 0 {
        assert!(Instant::now() < deadline, "b never became pending");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(net.log(1).is_empty());
    assert_eq!(net.log(1).status(&b.id()), Some(EntryStatus::Pending));
    assert_eq!(net.log(1).head(&net.identity(0)), None);

    faulty.reveal(a.id());

    assert!(net.wait_for_convergence(2, TIMEOUT).await);
    assert_eq!(net.feed(1), vec!["a", "b"]);
    assert_eq!(net.log(1).pending_count(), 0);
    assert_eq!(net.log(1).status(&b.id()), Some(EntryStatus::Resolved));

    net.shutdown().await;
}

/// A branch longer than the resolve bound is dropped; a short one from
/// another author still replicates.
#[tokio::test]
#[ntest::timeout(30000)]
async fn test_resolve_bound_limits_each_branch() {
    let config = SyncConfig {
        max_resolve_depth: Some(3),
        ..fast_sync_config()
    };
    let (_faulty, net) = faulty_network(3, config);

    net.partition(0);
    for i in 0..10 {
        net.post(0, &format!("long-{i}")).await;
    }
    net.post(2, "short").await;
    net.heal(0);

    assert!(net.wait_for_len(1, 1, TIMEOUT).await);
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(net.feed(1), vec!["short"]);
    assert_eq!(net.log(1).head(&net.identity(0)), None);

    net.shutdown().await;
}
