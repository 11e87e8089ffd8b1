//! Per-event cache of the last computed hold reason for each entry.
//!
//! Hold reasons are derived, not stored: autoplay records why it passed an
//! entry over, a manual hold records `OnHold`, and any action that moves an
//! entry out of the held state clears its reason. The resolver reads a
//! snapshot so status reads never wait on writers.

use std::collections::HashMap;

use karaoke_core::queue::HoldReason;
use karaoke_core::types::DbId;
use tokio::sync::RwLock;

/// Cached reasons for one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventHolds {
    reasons: HashMap<DbId, HoldReason>,
}

impl EventHolds {
    pub fn get(&self, queue_id: DbId) -> Option<HoldReason> {
        self.reasons.get(&queue_id).copied()
    }

    pub fn len(&self) -> usize {
        self.reasons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reasons.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct HoldReasonCache {
    events: RwLock<HashMap<DbId, EventHolds>>,
}

impl HoldReasonCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the event's cached reasons.
    pub async fn snapshot(&self, event_id: DbId) -> EventHolds {
        self.events
            .read()
            .await
            .get(&event_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn get(&self, event_id: DbId, queue_id: DbId) -> Option<HoldReason> {
        self.events
            .read()
            .await
            .get(&event_id)
            .and_then(|holds| holds.get(queue_id))
    }

    /// Record a reason, returning the one it replaced.
    pub async fn record(
        &self,
        event_id: DbId,
        queue_id: DbId,
        reason: HoldReason,
    ) -> Option<HoldReason> {
        self.events
            .write()
            .await
            .entry(event_id)
            .or_default()
            .reasons
            .insert(queue_id, reason)
    }

    /// Drop an entry's reason, returning it if one was cached.
    pub async fn clear(&self, event_id: DbId, queue_id: DbId) -> Option<HoldReason> {
        let mut events = self.events.write().await;
        let holds = events.get_mut(&event_id)?;
        let removed = holds.reasons.remove(&queue_id);
        if holds.is_empty() {
            events.remove(&event_id);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_returns_previous_reason() {
        let cache = HoldReasonCache::new();

        assert_eq!(cache.record(42, 100, HoldReason::NotJoined).await, None);
        assert_eq!(
            cache.record(42, 100, HoldReason::NotLoggedIn).await,
            Some(HoldReason::NotJoined)
        );
        assert_eq!(cache.get(42, 100).await, Some(HoldReason::NotLoggedIn));
    }

    #[tokio::test]
    async fn events_are_isolated() {
        let cache = HoldReasonCache::new();
        cache.record(42, 100, HoldReason::OnHold).await;

        assert_eq!(cache.get(7, 100).await, None);
        assert!(cache.snapshot(7).await.is_empty());
        assert_eq!(cache.snapshot(42).await.get(100), Some(HoldReason::OnHold));
    }

    #[tokio::test]
    async fn clear_removes_single_entry_and_empty_events() {
        let cache = HoldReasonCache::new();
        cache.record(42, 100, HoldReason::OnBreak).await;
        cache.record(42, 101, HoldReason::OnHold).await;

        assert_eq!(cache.clear(42, 100).await, Some(HoldReason::OnBreak));
        assert_eq!(cache.clear(42, 100).await, None);
        assert_eq!(cache.snapshot(42).await.len(), 1);

        cache.clear(42, 101).await;
        assert!(cache.snapshot(42).await.is_empty());
    }
}
