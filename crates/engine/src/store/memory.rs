//! In-process [`QueueStore`] used by tests and single-node embeddings.
//!
//! Writers lock the event's mutex first and the shared entry map second,
//! always in that order. Reads take only the entry map (or the event mutex
//! for presence rows).

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use karaoke_core::error::CoreError;
use karaoke_core::event::Event;
use karaoke_core::presence::{AttendanceState, EventAttendance, SingerFlags, SingerStatus};
use karaoke_core::queue::{sort_in_play_order, QueueEntry, QueueFilter};
use karaoke_core::reorder::{validate_moves, PositionMove};
use karaoke_core::singer::Singer;
use karaoke_core::types::{DbId, QueueVersion, Timestamp};
use tokio::sync::{Mutex, RwLock};

use super::{
    entry_is_playing, entry_not_found, event_not_found, presence_row_vanished,
    request_limit_reached, FinishOutcome, QueueStore,
};
use crate::error::EngineResult;

#[derive(Debug)]
struct EventRecord {
    event: Event,
    singer_statuses: HashMap<String, SingerStatus>,
    attendance: HashMap<String, EventAttendance>,
}

impl EventRecord {
    fn new(event: Event) -> Self {
        Self {
            event,
            singer_statuses: HashMap::new(),
            attendance: HashMap::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    events: RwLock<HashMap<DbId, Arc<Mutex<EventRecord>>>>,
    entries: RwLock<HashMap<DbId, QueueEntry>>,
    next_entry_id: AtomicI64,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Seeding ──────────────────────────────────────────────────────

    /// Register an event, replacing any previous record with the same id.
    pub async fn insert_event(&self, event: Event) {
        self.events
            .write()
            .await
            .insert(event.id, Arc::new(Mutex::new(EventRecord::new(event))));
    }

    /// Store an entry as-is. Later appends get ids above every seeded id.
    pub async fn insert_entry(&self, entry: QueueEntry) {
        self.next_entry_id.fetch_max(entry.id, Ordering::SeqCst);
        self.entries.write().await.insert(entry.id, entry);
    }

    pub async fn insert_singer_status(&self, status: SingerStatus) -> EngineResult<()> {
        let record = self.record(status.event_id).await?;
        let mut record = record.lock().await;
        record.singer_statuses.insert(status.user_name.clone(), status);
        Ok(())
    }

    pub async fn insert_attendance(&self, attendance: EventAttendance) -> EngineResult<()> {
        let record = self.record(attendance.event_id).await?;
        let mut record = record.lock().await;
        record.attendance.insert(attendance.user_name.clone(), attendance);
        Ok(())
    }

    async fn record(&self, event_id: DbId) -> EngineResult<Arc<Mutex<EventRecord>>> {
        let record = self
            .events
            .read()
            .await
            .get(&event_id)
            .cloned()
            .ok_or_else(|| event_not_found(event_id))?;
        Ok(record)
    }
}

/// A timestamp strictly after `previous`, so compare-and-swap tokens
/// always change on write.
fn next_stamp(previous: Timestamp) -> Timestamp {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

fn entry_in_event(
    entries: &mut HashMap<DbId, QueueEntry>,
    event_id: DbId,
    queue_id: DbId,
) -> Result<&mut QueueEntry, CoreError> {
    entries
        .get_mut(&queue_id)
        .filter(|e| e.event_id == event_id)
        .ok_or_else(|| entry_not_found(queue_id))
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn get_event(&self, event_id: DbId) -> EngineResult<Option<Event>> {
        let Some(record) = self.events.read().await.get(&event_id).cloned() else {
            return Ok(None);
        };
        let record = record.lock().await;
        Ok(Some(record.event.clone()))
    }

    async fn get_queue_entries(
        &self,
        event_id: DbId,
        filter: QueueFilter,
    ) -> EngineResult<Vec<QueueEntry>> {
        let mut entries: Vec<QueueEntry> = self
            .entries
            .read()
            .await
            .values()
            .filter(|e| e.event_id == event_id && filter.matches(e))
            .cloned()
            .collect();
        sort_in_play_order(&mut entries);
        Ok(entries)
    }

    async fn get_queue_entry(&self, queue_id: DbId) -> EngineResult<Option<QueueEntry>> {
        Ok(self.entries.read().await.get(&queue_id).cloned())
    }

    async fn get_singer_statuses(
        &self,
        event_id: DbId,
        user_names: &[String],
    ) -> EngineResult<Vec<SingerStatus>> {
        let record = self.record(event_id).await?;
        let record = record.lock().await;
        Ok(user_names
            .iter()
            .filter_map(|name| record.singer_statuses.get(name).cloned())
            .collect())
    }

    async fn get_attendance(
        &self,
        event_id: DbId,
        user_names: &[String],
    ) -> EngineResult<Vec<EventAttendance>> {
        let record = self.record(event_id).await?;
        let record = record.lock().await;
        Ok(user_names
            .iter()
            .filter_map(|name| record.attendance.get(name).cloned())
            .collect())
    }

    async fn append_entry(
        &self,
        event_id: DbId,
        requestor: &str,
        song_id: &str,
        singers: &[Singer],
    ) -> EngineResult<QueueEntry> {
        let record = self.record(event_id).await?;
        let mut record = record.lock().await;
        record.event.require_live()?;

        let mut entries = self.entries.write().await;
        let pending = entries
            .values()
            .filter(|e| e.event_id == event_id && e.requestor == requestor && !e.is_terminal())
            .count();
        if !record.event.accepts_request(pending) {
            return Err(request_limit_reached(&record.event, requestor, pending).into());
        }

        let position = entries
            .values()
            .filter(|e| e.event_id == event_id)
            .map(|e| e.position)
            .max()
            .unwrap_or(0)
            + 1;
        let id = self.next_entry_id.fetch_add(1, Ordering::SeqCst) + 1;
        let entry = QueueEntry {
            id,
            event_id,
            song_id: song_id.to_string(),
            requestor: requestor.to_string(),
            singers: singers.to_vec(),
            position,
            is_active: true,
            is_currently_playing: false,
            was_skipped: false,
            sung_at: None,
            is_on_break: false,
            updated_at: Utc::now(),
        };
        entries.insert(id, entry.clone());
        record.event.queue_version += 1;
        Ok(entry)
    }

    async fn set_hold(
        &self,
        event_id: DbId,
        queue_id: DbId,
        on_hold: bool,
    ) -> EngineResult<QueueEntry> {
        let record = self.record(event_id).await?;
        let mut record = record.lock().await;
        record.event.require_live()?;

        let mut entries = self.entries.write().await;
        let entry = entry_in_event(&mut entries, event_id, queue_id)?;
        entry.require_mutable()?;
        if entry.is_currently_playing {
            return Err(entry_is_playing(queue_id).into());
        }

        let changed = entry.is_on_break != on_hold;
        entry.is_on_break = on_hold;
        entry.updated_at = next_stamp(entry.updated_at);
        let updated = entry.clone();
        if changed {
            record.event.queue_version += 1;
        }
        Ok(updated)
    }

    async fn clear_and_set_playing(
        &self,
        event_id: DbId,
        queue_id: DbId,
    ) -> EngineResult<QueueEntry> {
        let record = self.record(event_id).await?;
        let mut record = record.lock().await;
        record.event.require_live()?;

        let mut entries = self.entries.write().await;
        entry_in_event(&mut entries, event_id, queue_id)?.require_mutable()?;

        for other in entries
            .values_mut()
            .filter(|e| e.event_id == event_id && e.is_currently_playing && e.id != queue_id)
        {
            other.is_currently_playing = false;
            other.updated_at = next_stamp(other.updated_at);
        }

        let target = entry_in_event(&mut entries, event_id, queue_id)?;
        target.is_currently_playing = true;
        target.is_on_break = false;
        target.updated_at = next_stamp(target.updated_at);
        let updated = target.clone();
        record.event.queue_version += 1;
        Ok(updated)
    }

    async fn finish_entry(
        &self,
        event_id: DbId,
        queue_id: DbId,
        outcome: FinishOutcome,
    ) -> EngineResult<QueueEntry> {
        let record = self.record(event_id).await?;
        let mut record = record.lock().await;
        record.event.require_live()?;

        let mut entries = self.entries.write().await;
        let entry = entry_in_event(&mut entries, event_id, queue_id)?;
        entry.require_mutable()?;

        let now = next_stamp(entry.updated_at);
        entry.sung_at = Some(now);
        entry.was_skipped = outcome.is_skipped();
        entry.is_currently_playing = false;
        entry.is_on_break = false;
        entry.updated_at = now;
        let updated = entry.clone();

        if !outcome.is_skipped() {
            record.event.songs_completed += 1;
        }
        record.event.queue_version += 1;
        Ok(updated)
    }

    async fn apply_reorder(
        &self,
        event_id: DbId,
        expected_version: QueueVersion,
        moves: &[PositionMove],
    ) -> EngineResult<QueueVersion> {
        let record = self.record(event_id).await?;
        let mut record = record.lock().await;
        record.event.require_live()?;
        if record.event.queue_version != expected_version {
            return Err(CoreError::StaleVersion {
                expected: expected_version,
                current: record.event.queue_version,
            }
            .into());
        }

        let mut entries = self.entries.write().await;
        let referenced: Vec<QueueEntry> = entries
            .values()
            .filter(|e| e.event_id == event_id || moves.iter().any(|m| m.queue_id == e.id))
            .cloned()
            .collect();
        validate_moves(event_id, &referenced, moves)?;

        for m in moves {
            if let Some(entry) = entries.get_mut(&m.queue_id) {
                entry.position = m.new_position;
                entry.updated_at = next_stamp(entry.updated_at);
            }
        }
        record.event.queue_version += 1;
        Ok(record.event.queue_version)
    }

    async fn save_singer_status(
        &self,
        event_id: DbId,
        user_name: &str,
        flags: SingerFlags,
        expected: Option<Timestamp>,
    ) -> EngineResult<SingerStatus> {
        let record = self.record(event_id).await?;
        let mut record = record.lock().await;

        let updated_at = match (record.singer_statuses.get(user_name), expected) {
            (None, None) => Utc::now(),
            (Some(current), Some(ts)) if current.updated_at == ts => next_stamp(ts),
            (Some(current), _) => {
                return Err(CoreError::SingerStatusConflict {
                    current: Box::new(current.clone()),
                }
                .into())
            }
            (None, Some(_)) => {
                return Err(presence_row_vanished("Singer status", user_name).into())
            }
        };

        let status = SingerStatus {
            event_id,
            user_name: user_name.to_string(),
            is_logged_in: flags.is_logged_in,
            is_joined: flags.is_joined,
            is_on_break: flags.is_on_break,
            updated_at,
        };
        record
            .singer_statuses
            .insert(user_name.to_string(), status.clone());
        Ok(status)
    }

    async fn save_attendance(
        &self,
        event_id: DbId,
        user_name: &str,
        state: AttendanceState,
        expected: Option<Timestamp>,
        entries_active: Option<bool>,
    ) -> EngineResult<EventAttendance> {
        let record = self.record(event_id).await?;
        let mut record = record.lock().await;

        let updated_at = match (record.attendance.get(user_name), expected) {
            (None, None) => Utc::now(),
            (Some(current), Some(ts)) if current.updated_at == ts => next_stamp(ts),
            (Some(current), _) => {
                return Err(CoreError::AttendanceConflict {
                    current: Box::new(current.clone()),
                }
                .into())
            }
            (None, Some(_)) => return Err(presence_row_vanished("Attendance", user_name).into()),
        };

        let attendance = EventAttendance {
            event_id,
            user_name: user_name.to_string(),
            is_checked_in: state.is_checked_in,
            is_on_break: state.is_on_break,
            break_start_at: state.break_start_at,
            break_end_at: state.break_end_at,
            updated_at,
        };
        record
            .attendance
            .insert(user_name.to_string(), attendance.clone());

        if let Some(active) = entries_active {
            let mut entries = self.entries.write().await;
            let mut changed = false;
            for entry in entries.values_mut().filter(|e| {
                e.event_id == event_id
                    && e.requestor == user_name
                    && !e.is_terminal()
                    && e.is_active != active
            }) {
                entry.is_active = active;
                entry.updated_at = next_stamp(entry.updated_at);
                changed = true;
            }
            if changed {
                record.event.queue_version += 1;
            }
        }

        Ok(attendance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use karaoke_core::event::EventStatus;

    fn live_event(id: DbId, request_limit: i32) -> Event {
        Event {
            id,
            name: format!("Event {id}"),
            status: EventStatus::Live,
            request_limit,
            songs_completed: 0,
            queue_version: 1,
        }
    }

    async fn store_with_event(request_limit: i32) -> MemoryQueueStore {
        let store = MemoryQueueStore::new();
        store.insert_event(live_event(42, request_limit)).await;
        store
    }

    fn alice() -> Vec<Singer> {
        vec![Singer::Named("alice".into())]
    }

    // -----------------------------------------------------------------------
    // Appends
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn append_assigns_increasing_positions_and_bumps_version() {
        let store = store_with_event(0).await;

        let first = store.append_entry(42, "alice", "s1", &alice()).await.unwrap();
        let second = store.append_entry(42, "alice", "s2", &alice()).await.unwrap();

        assert_eq!(first.position, 1);
        assert_eq!(second.position, 2);
        assert!(second.id > first.id);
        let event = store.get_event(42).await.unwrap().unwrap();
        assert_eq!(event.queue_version, 3);
    }

    #[tokio::test]
    async fn append_enforces_request_limit() {
        let store = store_with_event(1).await;
        store.append_entry(42, "alice", "s1", &alice()).await.unwrap();

        let err = store
            .append_entry(42, "alice", "s2", &alice())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        // Other requestors are unaffected.
        store
            .append_entry(42, "bob", "s3", &[Singer::Named("bob".into())])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn seeded_ids_are_never_reused() {
        let store = store_with_event(0).await;
        let seeded = store.append_entry(42, "alice", "s1", &alice()).await.unwrap();
        let mut copy = seeded.clone();
        copy.id = 500;
        store.insert_entry(copy).await;

        let next = store.append_entry(42, "alice", "s2", &alice()).await.unwrap();
        assert_eq!(next.id, 501);
    }

    // -----------------------------------------------------------------------
    // Holds and play state
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn hold_bumps_version_only_on_change() {
        let store = store_with_event(0).await;
        let entry = store.append_entry(42, "alice", "s1", &alice()).await.unwrap();

        let held = store.set_hold(42, entry.id, true).await.unwrap();
        let again = store.set_hold(42, entry.id, true).await.unwrap();

        assert!(again.updated_at > held.updated_at);
        let event = store.get_event(42).await.unwrap().unwrap();
        assert_eq!(event.queue_version, 3);
    }

    #[tokio::test]
    async fn playing_entry_in_other_event_is_not_found() {
        let store = store_with_event(0).await;
        store.insert_event(live_event(7, 0)).await;
        let foreign = store.append_entry(7, "alice", "s1", &alice()).await.unwrap();

        let err = store.clear_and_set_playing(42, foreign.id).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn finished_entries_reject_play_state_changes() {
        let store = store_with_event(0).await;
        let entry = store.append_entry(42, "alice", "s1", &alice()).await.unwrap();
        store
            .finish_entry(42, entry.id, FinishOutcome::Sung)
            .await
            .unwrap();

        for result in [
            store.clear_and_set_playing(42, entry.id).await,
            store.set_hold(42, entry.id, true).await,
            store.finish_entry(42, entry.id, FinishOutcome::Skipped).await,
        ] {
            assert_eq!(result.unwrap_err().code(), "VALIDATION_ERROR");
        }
        let event = store.get_event(42).await.unwrap().unwrap();
        assert_eq!(event.songs_completed, 1);
    }

    // -----------------------------------------------------------------------
    // Presence
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn attendance_check_out_deactivates_requestor_entries() {
        let store = store_with_event(0).await;
        let entry = store.append_entry(42, "alice", "s1", &alice()).await.unwrap();

        store
            .save_attendance(42, "alice", AttendanceState::default(), None, Some(false))
            .await
            .unwrap();

        let reread = store.get_queue_entry(entry.id).await.unwrap().unwrap();
        assert!(!reread.is_active);
    }

    #[tokio::test]
    async fn create_fails_when_row_exists() {
        let store = store_with_event(0).await;
        store
            .save_singer_status(42, "alice", SingerFlags::default(), None)
            .await
            .unwrap();

        let err = store
            .save_singer_status(42, "alice", SingerFlags::default(), None)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }
}
