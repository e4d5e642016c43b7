//! Chaos test: slow and failing stores.
//!
//! Replication keeps its guarantees when every fetch is delayed and when
//! the store drops out for stretches of time.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strand_integration_tests::{TestNetwork, fast_sync_config};
use strand_store::{ContentStore, FaultyStore, MemoryStore, SlowStore};

const TIMEOUT: Duration = Duration::from_secs(30);

/// Random per-operation latency interleaves walks and commits differently
/// on every peer; they still converge on one feed.
#[tokio::test]
#[ntest::timeout(60000)]
async fn test_slow_store_converges() {
    let slow: Arc<dyn ContentStore> = Arc::new(
        SlowStore::new(Arc::new(MemoryStore::new()))
            .read_latency(1, 5)
            .write_latency(1, 3)
            .seed(42),
    );
    let net = Arc::new(TestNetwork::with_store(4, slow, fast_sync_config()));

    let mut tasks = Vec::new();
    for peer in 0..4 {
        let net = net.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..10 {
                net.post(peer, &format!("p{peer}-{i}")).await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert!(net.wait_for_convergence(40, TIMEOUT).await);
    for peer in 1..4 {
        assert_eq!(net.feed(peer), net.feed(0));
    }
}

/// Reads fail on and off while peers post. Merges retry with backoff and
/// periodic announcements cover what the retries could not; once the store
/// is stable everyone converges.
#[tokio::test]
#[ntest::timeout(60000)]
async fn test_store_outages_heal() {
    let faulty = Arc::new(FaultyStore::new(Arc::new(MemoryStore::new())));
    let net = TestNetwork::with_store(3, faulty.clone(), fast_sync_config());
    let mut rng = StdRng::seed_from_u64(7);

    for i in 0..20 {
        faulty.set_fail_reads(rng.random_bool(0.4));
        let peer = rng.random_range(0..3);
        net.post(peer, &format!("{i}-{peer}")).await;
        tokio::time::sleep(Duration::from_millis(rng.random_range(0..15))).await;
    }
    faulty.set_fail_reads(false);

    assert!(net.wait_for_convergence(20, TIMEOUT).await);
    for peer in 1..3 {
        assert_eq!(net.feed(peer), net.feed(0));
    }

    net.shutdown().await;
}
