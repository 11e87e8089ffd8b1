//! Karaoke event lifecycle state as seen by the queue engine.
//!
//! Event lifecycle transitions are driven elsewhere; the engine only reads
//! the status to gate queue mutation.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, QueueVersion};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const STATUS_UPCOMING: &str = "upcoming";
pub const STATUS_LIVE: &str = "live";
pub const STATUS_ARCHIVED: &str = "archived";

/// All valid event status strings.
pub const VALID_EVENT_STATUSES: &[&str] = &[STATUS_UPCOMING, STATUS_LIVE, STATUS_ARCHIVED];

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Upcoming,
    Live,
    Archived,
}

impl EventStatus {
    /// Convert from a database string value.
    pub fn from_str_value(s: &str) -> Result<Self, CoreError> {
        match s {
            STATUS_UPCOMING => Ok(Self::Upcoming),
            STATUS_LIVE => Ok(Self::Live),
            STATUS_ARCHIVED => Ok(Self::Archived),
            _ => Err(CoreError::Validation(format!(
                "Invalid event status '{s}'. Must be one of: {}",
                VALID_EVENT_STATUSES.join(", ")
            ))),
        }
    }

    /// Convert to the database string value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upcoming => STATUS_UPCOMING,
            Self::Live => STATUS_LIVE,
            Self::Archived => STATUS_ARCHIVED,
        }
    }
}

/// A karaoke event that owns a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: DbId,
    pub name: String,
    pub status: EventStatus,
    /// Maximum pending requests per requestor. Zero means unlimited.
    pub request_limit: i32,
    pub songs_completed: i32,
    pub queue_version: QueueVersion,
}

impl Event {
    pub fn is_live(&self) -> bool {
        self.status == EventStatus::Live
    }

    /// Reject queue mutation on events that are not live.
    pub fn require_live(&self) -> Result<(), CoreError> {
        if self.is_live() {
            Ok(())
        } else {
            Err(CoreError::Validation(format!(
                "Event {} is {}, queue changes require a live event",
                self.id,
                self.status.as_str()
            )))
        }
    }

    /// Whether a requestor with `pending` unfinished requests may add one more.
    pub fn accepts_request(&self, pending: usize) -> bool {
        self.request_limit <= 0 || pending < self.request_limit as usize
    }
}
