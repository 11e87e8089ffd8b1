//! Queue notifications and the in-process hub that fans them out.
//!
//! [`EventBus`] is the publish/subscribe hub for [`QueueEvent`]s. It is
//! designed to be shared via `Arc<EventBus>`; downstream relays (client
//! push, audit) subscribe independently.

use chrono::{DateTime, Utc};
use karaoke_core::types::DbId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

/// A queue entry changed state (added, playing, held, released, sung, skipped).
pub const EVENT_QUEUE_CHANGED: &str = "queue.changed";

/// A singer's presence flags changed.
pub const EVENT_SINGER_STATUS_CHANGED: &str = "singer.status_changed";

/// A reorder plan was applied. One event per plan, not per move.
pub const EVENT_QUEUE_REORDERED: &str = "queue.reordered";

// ---------------------------------------------------------------------------
// QueueAction
// ---------------------------------------------------------------------------

/// What happened to a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueAction {
    Added,
    Playing,
    Held,
    Released,
    Sung,
    Skipped,
}

impl QueueAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "Added",
            Self::Playing => "Playing",
            Self::Held => "Held",
            Self::Released => "Released",
            Self::Sung => "Sung",
            Self::Skipped => "Skipped",
        }
    }
}

// ---------------------------------------------------------------------------
// QueueEvent
// ---------------------------------------------------------------------------

/// A change notification for one karaoke event.
///
/// Constructed via [`QueueEvent::new`] and enriched with
/// [`with_subject`](QueueEvent::with_subject) and
/// [`with_payload`](QueueEvent::with_payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEvent {
    /// Dot-separated event name, e.g. `"queue.changed"`.
    pub event_type: String,

    /// The karaoke event whose queue or presence changed.
    pub event_id: DbId,

    /// Optional subject kind (`"queue_entry"`, `"singer"`).
    pub subject_type: Option<String>,

    /// Optional subject key (queue id or user name).
    pub subject_id: Option<String>,

    /// Free-form JSON payload carrying event-specific data.
    pub payload: serde_json::Value,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl QueueEvent {
    /// Create a new event with only the required fields.
    pub fn new(event_type: impl Into<String>, event_id: DbId) -> Self {
        Self {
            event_type: event_type.into(),
            event_id,
            subject_type: None,
            subject_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    /// Attach the subject the event is about.
    pub fn with_subject(mut self, subject_type: impl Into<String>, subject_id: impl ToString) -> Self {
        self.subject_type = Some(subject_type.into());
        self.subject_id = Some(subject_id.to_string());
        self
    }

    /// Replace the payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Events buffered per subscriber before the slowest one starts lagging.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Fan-out hub for queue and presence notifications of every event.
///
/// ```rust
/// use karaoke_events::bus::{EventBus, QueueEvent, EVENT_QUEUE_CHANGED};
///
/// let bus = EventBus::new(16);
/// let mut relay = bus.subscribe();
/// bus.publish(QueueEvent::new(EVENT_QUEUE_CHANGED, 42));
/// assert!(relay.try_recv().is_ok());
/// ```
pub struct EventBus {
    sender: broadcast::Sender<QueueEvent>,
}

impl EventBus {
    /// A relay that falls more than `capacity` events behind skips ahead
    /// and sees `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Fan `event` out to every relay. Nothing listening is not an error.
    pub fn publish(&self, event: QueueEvent) {
        let event_type = event.event_type.clone();
        if self.sender.send(event).is_err() {
            tracing::trace!(event_type = %event_type, "No relays subscribed, notification dropped");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::RecvError;

    #[tokio::test]
    async fn relay_receives_queue_change() {
        let bus = EventBus::new(8);
        let mut relay = bus.subscribe();

        bus.publish(
            QueueEvent::new(EVENT_QUEUE_CHANGED, 42)
                .with_subject("queue_entry", 100)
                .with_payload(serde_json::json!({"action": QueueAction::Held.as_str()})),
        );

        let got = relay.recv().await.unwrap();
        assert_eq!(got.event_type, EVENT_QUEUE_CHANGED);
        assert_eq!(got.event_id, 42);
        assert_eq!(got.subject_type.as_deref(), Some("queue_entry"));
        assert_eq!(got.subject_id.as_deref(), Some("100"));
        assert_eq!(got.payload["action"], "Held");
    }

    #[tokio::test]
    async fn every_relay_sees_the_reorder() {
        let bus = EventBus::default();
        let mut screen = bus.subscribe();
        let mut dj_console = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(QueueEvent::new(EVENT_QUEUE_REORDERED, 7));

        assert_eq!(screen.recv().await.unwrap().event_type, EVENT_QUEUE_REORDERED);
        assert_eq!(dj_console.recv().await.unwrap().event_id, 7);
    }

    #[tokio::test]
    async fn slow_relay_lags_instead_of_blocking() {
        let bus = EventBus::new(2);
        let mut slow = bus.subscribe();

        for queue_id in 0..5 {
            bus.publish(QueueEvent::new(EVENT_QUEUE_CHANGED, 42).with_subject("queue_entry", queue_id));
        }

        assert!(matches!(slow.recv().await, Err(RecvError::Lagged(3))));
        assert_eq!(slow.recv().await.unwrap().subject_id.as_deref(), Some("3"));
    }

    #[test]
    fn publishing_without_relays_is_silent() {
        let bus = EventBus::new(0);
        bus.publish(QueueEvent::new(EVENT_SINGER_STATUS_CHANGED, 1));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn new_event_has_no_subject_and_empty_payload() {
        let event = QueueEvent::new(EVENT_QUEUE_CHANGED, 3);
        assert_eq!((event.subject_type, event.subject_id), (None, None));
        assert_eq!(event.payload, serde_json::json!({}));
    }
}
