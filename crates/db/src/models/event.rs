//! Event row model and DTOs.

use karaoke_core::error::CoreError;
use karaoke_core::event::{Event, EventStatus};
use karaoke_core::types::{DbId, QueueVersion, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `events` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct EventRow {
    pub id: DbId,
    pub name: String,
    pub status: String,
    pub request_limit: i32,
    pub songs_completed: i32,
    pub queue_version: QueueVersion,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl EventRow {
    pub fn into_domain(self) -> Result<Event, CoreError> {
        Ok(Event {
            id: self.id,
            name: self.name,
            status: EventStatus::from_str_value(&self.status)?,
            request_limit: self.request_limit,
            songs_completed: self.songs_completed,
            queue_version: self.queue_version,
        })
    }
}

/// DTO for creating an event.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateEvent {
    pub name: String,
    /// Defaults to `upcoming` when omitted.
    pub status: Option<String>,
    /// Defaults to 0 (unlimited) when omitted.
    pub request_limit: Option<i32>,
}
