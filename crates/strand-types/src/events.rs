//! In-process event bus for log notifications.
//!
//! The [`EventBus`] carries two kinds of [`LogEvent`]s: `write` (a local
//! append committed) and `replicated` (a merge added entries). Components
//! react to them in one of two ways:
//!
//! - **Handlers** registered with [`EventBus::on`] are called synchronously,
//!   in registration order, on the emitting task. The log emits only after a
//!   mutation is committed and its locks are released, so a handler always
//!   observes the new state and may read the log again.
//! - **Receivers** obtained with [`EventBus::subscribe`] get every event over
//!   a `tokio::broadcast` channel, for async consumers that should not run
//!   on the emitting task.
//!
//! Delivery is transient: nothing is buffered across process restarts.
//!
//! # Example
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use strand_types::PeerId;
//! use strand_types::events::{EventBus, EventKind, LogEvent};
//!
//! let bus = EventBus::new();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//!
//! let sink = seen.clone();
//! bus.on(EventKind::Write, move |event| sink.lock().unwrap().push(event.identity));
//!
//! bus.emit(LogEvent::write("hello", PeerId::from_name("alice")));
//! assert_eq!(seen.lock().unwrap().as_slice(), &[PeerId::from_name("alice")]);
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::{trace, warn};

use crate::PeerId;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// Name of a log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A local append was committed.
    Write,
    /// Entries received from peers were merged.
    Replicated,
}

impl EventKind {
    /// Wire/display name of the event.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Write => "write",
            Self::Replicated => "replicated",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = UnknownEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "write" => Ok(Self::Write),
            "replicated" => Ok(Self::Replicated),
            other => Err(UnknownEvent(other.to_string())),
        }
    }
}

/// Error for an event name other than `write` or `replicated`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event name: {0}")]
pub struct UnknownEvent(pub String);

/// A notification that a log changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    /// What happened.
    pub kind: EventKind,
    /// Address (name) of the log that changed.
    pub address: String,
    /// The identity whose entries changed.
    pub identity: PeerId,
}

impl LogEvent {
    /// A `write` event for `identity` on log `address`.
    pub fn write(address: impl Into<String>, identity: PeerId) -> Self {
        Self {
            kind: EventKind::Write,
            address: address.into(),
            identity,
        }
    }

    /// A `replicated` event for `identity` on log `address`.
    pub fn replicated(address: impl Into<String>, identity: PeerId) -> Self {
        Self {
            kind: EventKind::Replicated,
            address: address.into(),
            identity,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default broadcast channel capacity.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Handle returned by [`EventBus::on`], used to unregister a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Handler = Arc<dyn Fn(&LogEvent) + Send + Sync>;

struct Registration {
    id: HandlerId,
    kind: EventKind,
    handler: Handler,
}

struct EventBusInner {
    handlers: Mutex<Vec<Registration>>,
    next_id: AtomicU64,
    sender: broadcast::Sender<LogEvent>,
}

/// Publish/subscribe bus for [`LogEvent`]s.
///
/// Clonable (`Arc` inside). Thread-safe. Emitting never blocks on slow
/// async receivers.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<EventBusInner>,
}

impl EventBus {
    /// Create a new empty event bus.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(EventBusInner {
                handlers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
                sender,
            }),
        }
    }

    /// Register a synchronous handler for events of `kind`.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(&LogEvent) + Send + Sync + 'static,
    {
        let id = HandlerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let mut handlers = self.inner.handlers.lock().expect("event bus lock poisoned");

        handlers.push(Registration {
            id,
            kind,
            handler: Arc::new(handler),
        });

        id
    }

    /// Remove a handler. Returns `false` if it was not registered.
    pub fn off(&self, id: HandlerId) -> bool {
        let mut handlers = self.inner.handlers.lock().expect("event bus lock poisoned");
        let before = handlers.len();
        handlers.retain(|r| r.id != id);
        handlers.len() != before
    }

    /// Deliver an event to every matching handler, then to async receivers.
    ///
    /// Handlers run outside the registry lock, so a handler may register or
    /// remove handlers without deadlocking.
    pub fn emit(&self, event: LogEvent) {
        let matching: Vec<Handler> = {
            let handlers = self.inner.handlers.lock().expect("event bus lock poisoned");
            handlers
                .iter()
                .filter(|r| r.kind == event.kind)
                .map(|r| r.handler.clone())
                .collect()
        };

        trace!(
            kind = %event.kind,
            identity = %event.identity,
            handlers = matching.len(),
            "emitting log event"
        );

        for handler in &matching {
            handler(&event);
        }

        // No active receivers is the common case; the event is dropped.
        let _ = self.inner.sender.send(event);
    }

    /// Subscribe to all events as an async stream.
    ///
    /// Only events emitted after this call are received.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            rx: self.inner.sender.subscribe(),
        }
    }

    /// Number of registered handlers for `kind`.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        let handlers = self.inner.handlers.lock().expect("event bus lock poisoned");
        handlers.iter().filter(|r| r.kind == kind).count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.inner.handlers.lock().expect("event bus lock poisoned");
        f.debug_struct("EventBus")
            .field("handlers", &handlers.len())
            .field("receivers", &self.inner.sender.receiver_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// EventReceiver
// ---------------------------------------------------------------------------

/// Async receiver of [`LogEvent`]s.
pub struct EventReceiver {
    rx: broadcast::Receiver<LogEvent>,
}

impl EventReceiver {
    /// Wait for the next event.
    ///
    /// Returns `None` once every clone of the bus is dropped. Skips over
    /// lagged events with a warning.
    pub async fn recv(&mut self) -> Option<LogEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "event receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
