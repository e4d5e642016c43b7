//! Chaos test: network partition.
//!
//! 6 peers. Half of them are cut off, both sides keep posting, the
//! partition heals, and every peer converges on the union.

use std::time::Duration;

use strand_integration_tests::TestNetwork;

const TIMEOUT: Duration = Duration::from_secs(20);

/// Peers 3-5 are cut off while everyone posts. After healing, periodic
/// announcements bring all 6 peers to the same 60 entries.
#[tokio::test]
#[ntest::timeout(60000)]
async fn test_network_partition_and_heal() {
    let net = TestNetwork::new(6);

    // --- Phase 1: healthy network ---
    for peer in 0..6 {
        net.post(peer, &format!("pre-{peer}")).await;
    }
    assert!(net.wait_for_convergence(6, TIMEOUT).await);

    // --- Phase 2: partition ---
    for peer in 3..6 {
        net.partition(peer);
    }

    for round in 0..9 {
        for peer in 0..6 {
            net.post(peer, &format!("during-{round}-{peer}")).await;
        }
    }

    // The connected side keeps replicating among itself.
    for peer in 0..3 {
        assert!(net.wait_for_len(peer, 6 + 27, TIMEOUT).await);
    }
    // The isolated side sees only its own posts.
    tokio::time::sleep(Duration::from_millis(300)).await;
    for peer in 3..6 {
        assert_eq!(net.log(peer).len(), 6 + 9, "peer {peer} leaked through");
    }

    // --- Phase 3: heal ---
    for peer in 3..6 {
        net.heal(peer);
    }

    assert!(net.wait_for_convergence(60, TIMEOUT).await);
    let reference = net.feed(0);
    for peer in 1..6 {
        assert_eq!(net.feed(peer), reference, "peer {peer} feed differs");
    }

    net.shutdown().await;
}

/// Repeatedly cutting one peer off and reconnecting it never loses or
/// duplicates entries.
#[tokio::test]
#[ntest::timeout(60000)]
async fn test_flapping_peer() {
    let net = TestNetwork::new(3);

    for i in 0..10 {
        if i % 2 == 0 {
            net.partition(2);
        } else {
            net.heal(2);
        }
        for peer in 0..3 {
            net.post(peer, &format!("{i}-{peer}")).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    net.heal(2);

    assert!(net.wait_for_convergence(30, TIMEOUT).await);
    let feed = net.feed(2);
    let mut unique = feed.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 30);

    net.shutdown().await;
}
