//! Queue entry model, observable statuses and hold reasons.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;
use crate::singer::Singer;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// User-visible status of a queue entry. Derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueueStatus {
    Unplayed,
    Playing,
    Held,
    Sung,
    Skipped,
}

impl QueueStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unplayed => "Unplayed",
            Self::Playing => "Playing",
            Self::Held => "Held",
            Self::Sung => "Sung",
            Self::Skipped => "Skipped",
        }
    }
}

/// Why an entry is held back from play.
///
/// The absence of a reason is modelled as `Option::None` and rendered as
/// an empty string on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HoldReason {
    NotLoggedIn,
    NotJoined,
    OnBreak,
    /// Manual hold placed by the DJ.
    OnHold,
}

impl HoldReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotLoggedIn => "NotLoggedIn",
            Self::NotJoined => "NotJoined",
            Self::OnBreak => "OnBreak",
            Self::OnHold => "OnHold",
        }
    }
}

/// Wire form of an optional hold reason (`""` when there is none).
pub fn hold_reason_str(reason: Option<HoldReason>) -> &'static str {
    reason.map(HoldReason::as_str).unwrap_or("")
}

/// Which entries of an event a queue read should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueFilter {
    /// Every entry, terminal ones included.
    All,
    /// Entries that are not terminal and not currently playing.
    Unplayed,
    /// Entries that are not terminal (unplayed plus the playing one).
    Pending,
}

impl QueueFilter {
    pub fn matches(self, entry: &QueueEntry) -> bool {
        match self {
            Self::All => true,
            Self::Unplayed => entry.is_unplayed(),
            Self::Pending => !entry.is_terminal(),
        }
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// A song request in an event's queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: DbId,
    pub event_id: DbId,
    pub song_id: String,
    pub requestor: String,
    pub singers: Vec<Singer>,
    pub position: i32,
    /// Requestor is currently checked in.
    pub is_active: bool,
    pub is_currently_playing: bool,
    pub was_skipped: bool,
    /// Set exactly once, when the entry is sung or skipped.
    pub sung_at: Option<Timestamp>,
    /// Hold flag (presence based or manual).
    pub is_on_break: bool,
    pub updated_at: Timestamp,
}

impl QueueEntry {
    /// Sung or skipped. Play-state fields no longer change.
    pub fn is_terminal(&self) -> bool {
        self.sung_at.is_some() || self.was_skipped
    }

    pub fn is_unplayed(&self) -> bool {
        !self.is_terminal() && !self.is_currently_playing
    }

    /// Reject play-state changes on terminal entries.
    pub fn require_mutable(&self) -> Result<(), CoreError> {
        if self.is_terminal() {
            Err(CoreError::Validation(format!(
                "Queue entry {} is already {} and cannot change play state",
                self.id,
                if self.was_skipped { "skipped" } else { "sung" }
            )))
        } else {
            Ok(())
        }
    }

    /// Sort key for play order: position, then insertion order.
    pub fn play_order(&self) -> (i32, DbId) {
        (self.position, self.id)
    }
}

/// Sort entries into play order in place.
pub fn sort_in_play_order(entries: &mut [QueueEntry]) {
    entries.sort_by_key(QueueEntry::play_order);
}

/// DTO for a new song request.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewQueueEntry {
    #[validate(length(min = 1, max = 200))]
    pub song_id: String,
    #[validate(length(min = 1, max = 100))]
    pub requestor: String,
    /// Requested singers. The requestor is added when missing unless a
    /// group token is present.
    #[serde(default)]
    pub singers: Vec<Singer>,
}
