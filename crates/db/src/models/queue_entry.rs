//! Queue entry row model and DTOs.

use karaoke_core::queue::QueueEntry;
use karaoke_core::singer::parse_singer_list;
use karaoke_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `queue_entries` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QueueEntryRow {
    pub id: DbId,
    pub event_id: DbId,
    pub song_id: String,
    pub requestor: String,
    /// JSON array of user names and group tokens.
    pub singers: serde_json::Value,
    pub position: i32,
    pub is_active: bool,
    pub is_currently_playing: bool,
    pub was_skipped: bool,
    pub sung_at: Option<Timestamp>,
    pub is_on_break: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<QueueEntryRow> for QueueEntry {
    fn from(row: QueueEntryRow) -> Self {
        let singers = parse_singer_list(&row.singers);
        if singers.is_empty() && !is_empty_list(&row.singers) {
            tracing::warn!(
                queue_id = row.id,
                event_id = row.event_id,
                raw = %row.singers,
                "Malformed singer list, treating entry as having no singers",
            );
        }
        Self {
            id: row.id,
            event_id: row.event_id,
            song_id: row.song_id,
            requestor: row.requestor,
            singers,
            position: row.position,
            is_active: row.is_active,
            is_currently_playing: row.is_currently_playing,
            was_skipped: row.was_skipped,
            sung_at: row.sung_at,
            is_on_break: row.is_on_break,
            updated_at: row.updated_at,
        }
    }
}

fn is_empty_list(value: &serde_json::Value) -> bool {
    value.as_array().is_some_and(|items| items.is_empty())
}

/// DTO for inserting a queue entry at an explicit position.
///
/// Normal request intake goes through `QueueEntryRepo::append`, which
/// assigns the next position itself.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateQueueEntry {
    pub event_id: DbId,
    pub song_id: String,
    pub requestor: String,
    pub singers: serde_json::Value,
    pub position: i32,
}
