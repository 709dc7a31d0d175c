//! Subscription support
//!
//! The core dispatches subscription procedures through the same pipeline as
//! queries and mutations; the call's value is a registration token the
//! transport uses to wire the actual event stream. This module supplies the
//! pieces both sides need: time-ordered [`SubscriptionId`]s, a
//! [`SubscriptionContext`] with a cancellation signal the transport flips on
//! disconnect, and [`Event`]/[`event_channel`] for moving events from the
//! handler's producer task to the transport.
//!
//! # Example
//! ```rust,ignore
//! let def = Procedure::subscription("ticks").handler(|_: NoInput, _ctx| async move {
//!     let sub = SubscriptionContext::new(None);
//!     let (tx, rx) = event_channel::<u64>(32);
//!     let signal = sub.signal();
//!
//!     tokio::spawn(async move {
//!         let mut tick = 0u64;
//!         while !signal.is_cancelled() {
//!             if tx.send(Event::new(tick)).await.is_err() {
//!                 break;
//!             }
//!             tick += 1;
//!         }
//!     });
//!
//!     // Hand rx to the transport out of band, return the token.
//!     Ok(serde_json::json!({ "subscription": sub.id().to_string() }))
//! });
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Notify, mpsc};
use uuid::Uuid;

// =============================================================================
// Subscription ID
// =============================================================================

/// A unique, time-ordered subscription identifier based on UUID v7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new subscription ID.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Parse a subscription ID from a string.
    ///
    /// Accepts both the prefixed (`sub_...`) and the bare UUID form.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        let uuid_str = s.strip_prefix("sub_").unwrap_or(s);
        Uuid::parse_str(uuid_str).map(Self)
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub_{}", self.0)
    }
}

// =============================================================================
// Cancellation
// =============================================================================

/// Cancellation signal shared between transport and producer task.
#[derive(Debug, Default)]
pub struct CancellationSignal {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationSignal {
    /// Create a new, uncancelled signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the signal; wakes every waiter.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Whether the signal has been flipped.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Wait until the signal is flipped.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            self.notify.notified().await;
        }
    }
}

// =============================================================================
// Subscription context
// =============================================================================

/// Per-subscription state handed to the producer side.
#[derive(Debug, Clone)]
pub struct SubscriptionContext {
    id: SubscriptionId,
    last_event_id: Option<String>,
    signal: Arc<CancellationSignal>,
}

impl SubscriptionContext {
    /// Create a context for a fresh subscription.
    ///
    /// `last_event_id` carries the client's resumption point, if any.
    pub fn new(last_event_id: Option<String>) -> Self {
        Self {
            id: SubscriptionId::new(),
            last_event_id,
            signal: Arc::new(CancellationSignal::new()),
        }
    }

    /// The registration token for this subscription.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The client's resumption point, if any.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Whether the transport has cancelled the subscription.
    pub fn is_cancelled(&self) -> bool {
        self.signal.is_cancelled()
    }

    /// The shared cancellation signal, for producer tasks.
    pub fn signal(&self) -> Arc<CancellationSignal> {
        self.signal.clone()
    }
}

// =============================================================================
// Events
// =============================================================================

/// Event carried on a subscription stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event<T> {
    /// The event data
    pub data: T,
    /// Optional event ID for resumption
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Optional retry interval in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<u64>,
}

impl<T> Event<T> {
    /// Create an event with just data.
    pub fn new(data: T) -> Self {
        Self {
            data,
            id: None,
            retry: None,
        }
    }

    /// Create an event with a resumption ID.
    pub fn with_id(data: T, id: impl Into<String>) -> Self {
        Self {
            data,
            id: Some(id.into()),
            retry: None,
        }
    }

    /// Apply metadata to an event.
    pub fn with_meta(mut self, meta: EventMeta) -> Self {
        self.id = meta.id;
        self.retry = meta.retry;
        self
    }
}

/// Event metadata: resumption ID and retry interval.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventMeta {
    /// Event ID for resumption
    pub id: Option<String>,
    /// Retry interval in milliseconds
    pub retry: Option<u64>,
}

impl EventMeta {
    /// Create metadata with an ID.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            retry: None,
        }
    }

    /// Create metadata with a retry interval.
    pub fn with_retry(retry: u64) -> Self {
        Self {
            id: None,
            retry: Some(retry),
        }
    }
}

/// Sender half of a subscription event channel.
pub type EventSender<T> = mpsc::Sender<Event<T>>;

/// Receiver half of a subscription event channel.
pub type EventReceiver<T> = mpsc::Receiver<Event<T>>;

/// Create a bounded channel for moving events to the transport.
pub fn event_channel<T>(buffer: usize) -> (EventSender<T>, EventReceiver<T>) {
    mpsc::channel(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_round_trips_through_display() {
        let id = SubscriptionId::new();
        let shown = id.to_string();
        assert!(shown.starts_with("sub_"));
        assert_eq!(SubscriptionId::parse(&shown).unwrap(), id);
    }

    #[tokio::test]
    async fn cancellation_wakes_waiters() {
        let signal = Arc::new(CancellationSignal::new());
        assert!(!signal.is_cancelled());

        let waiter = signal.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });
        signal.cancel();
        task.await.unwrap();
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn events_flow_through_channel() {
        let (tx, mut rx) = event_channel::<u32>(4);
        tx.send(Event::with_id(7, "e-1")).await.unwrap();
        drop(tx);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.data, 7);
        assert_eq!(event.id.as_deref(), Some("e-1"));
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn meta_sets_id_and_retry() {
        let event = Event::new("tick").with_meta(EventMeta::with_id("e-9"));
        assert_eq!(event.id.as_deref(), Some("e-9"));
        assert_eq!(event.retry, None);

        let event = Event::new("tick").with_meta(EventMeta::with_retry(1_500));
        assert_eq!(event.id, None);
        assert_eq!(event.retry, Some(1_500));

        let value = serde_json::to_value(Event::with_id(1, "e-1")).unwrap();
        assert_eq!(value, serde_json::json!({"data": 1, "id": "e-1"}));
    }
}
