//! Tests for the log crate.


use std::sync::{Arc, Mutex};

use bytes::Bytes;
use strand_store::{ContentStore, MemoryStore};
use strand_types::events::{EventBus, EventKind, LogEvent};
use strand_types::PeerId;

use crate::entry::{Entry, encode};
use crate::log::{Log, LogConfig};

fn alice() -> PeerId {
    PeerId::from_name("alice")
}

fn bob() -> PeerId {
    PeerId::from_name("bob")
}

fn carol() -> PeerId {
    PeerId::from_name("carol")
}

/// A fresh log named "hello" over `store` with default config.
fn test_log(store: Arc<dyn ContentStore>) -> Log {
    Log::open("hello", store, LogConfig::default(), EventBus::new())
}

/// Two logs sharing one in-memory store, as two peers would.
fn peer_pair() -> (Arc<MemoryStore>, Log, Log) {
    let store = Arc::new(MemoryStore::new());
    let a = test_log(store.clone());
    let b = test_log(store.clone());
    (store, a, b)
}

/// Store an entry built by hand, bypassing `append`.
async fn put_entry(store: &dyn ContentStore, entry: &Entry) {
    let id = store.put(Bytes::from(encode(entry))).await.unwrap();
    assert_eq!(id, entry.id());
}

/// Record every event of `kind` emitted on the log's bus.
fn record(log: &Log, kind: EventKind) -> Arc<Mutex<Vec<LogEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    log.events().on(kind, move |event| {
        sink.lock().unwrap().push(event.clone());
    });
    seen
}
