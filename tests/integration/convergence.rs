//! Integration test: convergence.
//!
//! Peers post independently and every peer ends up with the same entries,
//! the same heads and the same materialized feed.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use strand_integration_tests::TestNetwork;
use strand_types::events::EventKind;

const TIMEOUT: Duration = Duration::from_secs(10);

/// A posts "hi"; B sees it in its feed.
#[tokio::test]
#[ntest::timeout(30000)]
async fn test_hi_reaches_second_peer() {
    let net = TestNetwork::new(2);

    let entry = net.post(0, "hi").await;

    assert!(net.wait_for_len(1, 1, TIMEOUT).await, "B never saw the entry");
    assert_eq!(net.feed(1), vec!["hi"]);
    assert_eq!(net.log(1).head(&net.identity(0)), Some(entry.id()));

    net.shutdown().await;
}

/// 5 peers post 10 messages each in rounds; all feeds end up identical.
#[tokio::test]
#[ntest::timeout(30000)]
async fn test_five_peers_converge() {
    let net = TestNetwork::new(5);

    for round in 0..10 {
        for peer in 0..5 {
            net.post(peer, &format!("m{round}-p{peer}")).await;
        }
    }

    assert!(net.wait_for_convergence(50, TIMEOUT).await);

    let reference = net.feed(0);
    assert_eq!(reference.len(), 50);
    for peer in 1..5 {
        assert_eq!(net.feed(peer), reference, "peer {peer} feed differs");
    }

    // Each author's own entries keep their posting order.
    for peer in 0..5 {
        let suffix = format!("-p{peer}");
        let own: Vec<_> = reference.iter().filter(|m| m.ends_with(&suffix)).collect();
        let expected: Vec<_> = (0..10).map(|r| format!("m{r}-p{peer}")).collect();
        assert_eq!(own, expected.iter().collect::<Vec<_>>());
    }

    net.shutdown().await;
}

/// Peers post at the same time from separate tasks.
#[tokio::test]
#[ntest::timeout(30000)]
async fn test_concurrent_posts_converge() {
    let net = Arc::new(TestNetwork::new(4));

    let mut tasks = Vec::new();
    for peer in 0..4 {
        let net = net.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..25 {
                net.post(peer, &format!("p{peer}-{i}")).await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert!(net.wait_for_convergence(100, TIMEOUT).await);
    for peer in 1..4 {
        assert_eq!(net.feed(peer), net.feed(0));
    }
}

/// Replies build on what a peer has already seen.
#[tokio::test]
#[ntest::timeout(30000)]
async fn test_reply_follows_replicated_head() {
    let net = TestNetwork::new(2);

    let question = net.post(0, "anyone there?").await;
    assert!(net.wait_for_len(1, 1, TIMEOUT).await);

    let answer = net.post(1, "yes").await;
    assert!(answer.parents().contains(&question.id()));

    assert!(net.wait_for_convergence(2, TIMEOUT).await);
    assert_eq!(net.feed(0), vec!["anyone there?", "yes"]);
    assert_eq!(net.feed(1), vec!["anyone there?", "yes"]);

    net.shutdown().await;
}

/// Replicated events fire on the receiving peer, write events on the
/// author.
#[tokio::test]
#[ntest::timeout(30000)]
async fn test_events_fire_on_both_sides() {
    let net = TestNetwork::new(2);

    let writes = Arc::new(AtomicUsize::new(0));
    let replicated = Arc::new(AtomicUsize::new(0));

    let w = writes.clone();
    net.log(0).events().on(EventKind::Write, move |_| {
        w.fetch_add(1, Ordering::SeqCst);
    });
    let r = replicated.clone();
    let author = net.identity(0);
    net.log(1).events().on(EventKind::Replicated, move |event| {
        if event.identity == author {
            r.fetch_add(1, Ordering::SeqCst);
        }
    });

    net.post(0, "one").await;
    net.post(0, "two").await;

    assert!(net.wait_for_convergence(2, TIMEOUT).await);
    assert_eq!(writes.load(Ordering::SeqCst), 2);
    let seen = replicated.load(Ordering::SeqCst);
    assert!((1..=2).contains(&seen), "replicated events: {seen}");

    net.shutdown().await;
}
