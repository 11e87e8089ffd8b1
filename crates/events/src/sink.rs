//! The one-way publishing boundary used by the queue engine.
//!
//! Callers treat every publish as fire-and-forget: a returned
//! [`PublishError`] is logged by the caller and never rolls back the state
//! change that triggered it.

use karaoke_core::presence::SingerFlags;
use karaoke_core::types::{DbId, QueueVersion};
use serde_json::json;

use crate::bus::{
    EventBus, QueueAction, QueueEvent, EVENT_QUEUE_CHANGED, EVENT_QUEUE_REORDERED,
    EVENT_SINGER_STATUS_CHANGED,
};

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Broadcast channel closed")]
    Closed,

    #[error("Publish failed: {0}")]
    Failed(String),
}

/// Destination for queue and presence notifications.
pub trait BroadcastSink: Send + Sync {
    fn publish(&self, event: QueueEvent) -> Result<(), PublishError>;

    /// A queue entry changed; `entry` is the fully resolved entry payload.
    fn publish_queue_changed(
        &self,
        event_id: DbId,
        entry: serde_json::Value,
        action: QueueAction,
    ) -> Result<(), PublishError> {
        let queue_id = entry.get("queue_id").cloned().unwrap_or_default();
        let mut event = QueueEvent::new(EVENT_QUEUE_CHANGED, event_id).with_payload(json!({
            "action": action.as_str(),
            "entry": entry,
        }));
        if !queue_id.is_null() {
            event = event.with_subject("queue_entry", queue_id);
        }
        self.publish(event)
    }

    fn publish_singer_status_changed(
        &self,
        event_id: DbId,
        user_name: &str,
        flags: SingerFlags,
    ) -> Result<(), PublishError> {
        self.publish(
            QueueEvent::new(EVENT_SINGER_STATUS_CHANGED, event_id)
                .with_subject("singer", user_name)
                .with_payload(json!({
                    "user_name": user_name,
                    "is_logged_in": flags.is_logged_in,
                    "is_joined": flags.is_joined,
                    "is_on_break": flags.is_on_break,
                })),
        )
    }

    /// One batch event for a whole applied plan.
    fn publish_reorder_applied(
        &self,
        event_id: DbId,
        version: QueueVersion,
        moved_ids: &[DbId],
    ) -> Result<(), PublishError> {
        self.publish(QueueEvent::new(EVENT_QUEUE_REORDERED, event_id).with_payload(json!({
            "version": version,
            "moved_count": moved_ids.len(),
            "moved_ids": moved_ids,
        })))
    }
}

impl BroadcastSink for EventBus {
    fn publish(&self, event: QueueEvent) -> Result<(), PublishError> {
        EventBus::publish(self, event);
        Ok(())
    }
}
