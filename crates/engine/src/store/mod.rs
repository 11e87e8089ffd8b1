//! Transactional repository boundary for the queue engine.
//!
//! [`QueueStore`] is everything the orchestrator needs from storage. Each
//! mutating method is one atomic unit: it either commits fully (including
//! the queue version bump) or changes nothing.
//!
//! - [`memory::MemoryQueueStore`] serialises writers with a per-event mutex.
//! - [`postgres::PgQueueStore`] locks the event row `FOR UPDATE`.

use async_trait::async_trait;
use karaoke_core::error::CoreError;
use karaoke_core::event::Event;
use karaoke_core::presence::{AttendanceState, EventAttendance, SingerFlags, SingerStatus};
use karaoke_core::queue::{QueueEntry, QueueFilter};
use karaoke_core::reorder::PositionMove;
use karaoke_core::singer::Singer;
use karaoke_core::types::{DbId, QueueVersion, Timestamp};

use crate::error::EngineResult;

pub mod memory;
pub mod postgres;

pub use memory::MemoryQueueStore;
pub use postgres::PgQueueStore;

/// How a finished entry left the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishOutcome {
    Sung,
    Skipped,
}

impl FinishOutcome {
    pub fn is_skipped(self) -> bool {
        self == Self::Skipped
    }
}

#[async_trait]
pub trait QueueStore: Send + Sync {
    // ── Reads ────────────────────────────────────────────────────────

    async fn get_event(&self, event_id: DbId) -> EngineResult<Option<Event>>;

    /// Entries of one event matching `filter`, in play order.
    async fn get_queue_entries(
        &self,
        event_id: DbId,
        filter: QueueFilter,
    ) -> EngineResult<Vec<QueueEntry>>;

    /// Look up an entry by id in any event.
    async fn get_queue_entry(&self, queue_id: DbId) -> EngineResult<Option<QueueEntry>>;

    /// Bulk fetch; users without a row are absent from the result.
    async fn get_singer_statuses(
        &self,
        event_id: DbId,
        user_names: &[String],
    ) -> EngineResult<Vec<SingerStatus>>;

    async fn get_attendance(
        &self,
        event_id: DbId,
        user_names: &[String],
    ) -> EngineResult<Vec<EventAttendance>>;

    // ── Queue mutations ──────────────────────────────────────────────

    /// Append a request at `max(position) + 1`.
    ///
    /// Fails with `Validation` when the event is not live or the requestor
    /// already has `request_limit` unfinished requests.
    async fn append_entry(
        &self,
        event_id: DbId,
        requestor: &str,
        song_id: &str,
        singers: &[Singer],
    ) -> EngineResult<QueueEntry>;

    /// Set or clear the hold flag, touching `updated_at` either way. The
    /// version advances only when the flag actually changes.
    async fn set_hold(&self, event_id: DbId, queue_id: DbId, on_hold: bool)
        -> EngineResult<QueueEntry>;

    /// Clear `is_currently_playing` on every other entry of the event and
    /// set it on `queue_id`, as one unit.
    async fn clear_and_set_playing(&self, event_id: DbId, queue_id: DbId)
        -> EngineResult<QueueEntry>;

    /// Stamp `sung_at` (and `was_skipped` for skips). Completing a song
    /// also counts it on the event.
    async fn finish_entry(
        &self,
        event_id: DbId,
        queue_id: DbId,
        outcome: FinishOutcome,
    ) -> EngineResult<QueueEntry>;

    /// Write every move if the queue is still at `expected_version`.
    ///
    /// Returns the new version. A version mismatch is
    /// `CoreError::StaleVersion` and writes nothing.
    async fn apply_reorder(
        &self,
        event_id: DbId,
        expected_version: QueueVersion,
        moves: &[PositionMove],
    ) -> EngineResult<QueueVersion>;

    // ── Presence (compare-and-swap on updated_at) ────────────────────

    /// `expected = None` creates the row and fails if one already exists;
    /// `Some(ts)` overwrites only if the stored `updated_at` equals `ts`.
    async fn save_singer_status(
        &self,
        event_id: DbId,
        user_name: &str,
        flags: SingerFlags,
        expected: Option<Timestamp>,
    ) -> EngineResult<SingerStatus>;

    /// Same contract as [`QueueStore::save_singer_status`]. When
    /// `entries_active` is set, the requestor's unfinished entries take
    /// that `is_active` value in the same unit.
    async fn save_attendance(
        &self,
        event_id: DbId,
        user_name: &str,
        state: AttendanceState,
        expected: Option<Timestamp>,
        entries_active: Option<bool>,
    ) -> EngineResult<EventAttendance>;
}

// ---------------------------------------------------------------------------
// Shared failure constructors
// ---------------------------------------------------------------------------

pub(crate) fn event_not_found(event_id: DbId) -> CoreError {
    CoreError::NotFound {
        entity: "Event",
        id: event_id,
    }
}

pub(crate) fn entry_not_found(queue_id: DbId) -> CoreError {
    CoreError::NotFound {
        entity: "QueueEntry",
        id: queue_id,
    }
}

pub(crate) fn request_limit_reached(event: &Event, requestor: &str, pending: usize) -> CoreError {
    CoreError::Validation(format!(
        "Requestor '{requestor}' already has {pending} pending requests (limit {})",
        event.request_limit
    ))
}

pub(crate) fn entry_is_playing(queue_id: DbId) -> CoreError {
    CoreError::Validation(format!(
        "Queue entry {queue_id} is currently playing and cannot be held"
    ))
}

pub(crate) fn presence_row_vanished(kind: &str, user_name: &str) -> CoreError {
    CoreError::Conflict(format!("{kind} for '{user_name}' no longer exists"))
}
