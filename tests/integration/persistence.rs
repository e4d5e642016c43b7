//! Integration test: persistence.
//!
//! Peers restore from the root manifest after a restart and catch up with
//! what they missed while stopped.

use std::sync::Arc;
use std::time::Duration;

use strand_integration_tests::{LOG_NAME, TestNetwork, fast_sync_config};
use strand_log::{Log, LogConfig};
use strand_store::FileStore;
use strand_types::events::EventBus;

const TIMEOUT: Duration = Duration::from_secs(10);

/// Stop a peer, keep posting elsewhere, restart it: it restores from the
/// store and then replicates the rest.
#[tokio::test]
#[ntest::timeout(30000)]
async fn test_restarted_peer_catches_up() {
    let mut net = TestNetwork::new(3);

    for peer in 0..3 {
        net.post(peer, &format!("before-{peer}")).await;
        net.post(peer, &format!("again-{peer}")).await;
    }
    assert!(net.wait_for_convergence(6, TIMEOUT).await);

    net.stop(2).await;

    for peer in 0..2 {
        net.post(peer, &format!("while-stopped-{peer}")).await;
    }
    assert!(net.wait_for_len(0, 8, TIMEOUT).await);
    assert!(net.wait_for_len(1, 8, TIMEOUT).await);

    let restored = net.restart(2).await;
    assert!(restored >= 6, "restored only {restored} entries");

    assert!(net.wait_for_convergence(8, TIMEOUT).await);
    assert_eq!(net.feed(2), net.feed(0));

    net.shutdown().await;
}

/// Everything replicated over a file store is still there for a fresh
/// process reopening the directory.
#[tokio::test]
#[ntest::timeout(30000)]
async fn test_file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();

    let feed = {
        let store = Arc::new(FileStore::new(dir.path()).unwrap());
        let net = TestNetwork::with_store(2, store, fast_sync_config());

        net.post(0, "hi").await;
        net.post(1, "hello").await;
        net.post(0, "bye").await;
        assert!(net.wait_for_convergence(3, TIMEOUT).await);

        let feed = net.feed(0);
        net.shutdown().await;
        feed
    };

    let store = Arc::new(FileStore::new(dir.path()).unwrap());
    let log = Log::open(LOG_NAME, store, LogConfig::default(), EventBus::new());
    assert_eq!(log.load().await.unwrap(), 3);

    let reopened: Vec<_> = log
        .materialize(-1)
        .iter()
        .map(|e| e.payload_str().into_owned())
        .collect();
    assert_eq!(reopened, feed);
}
