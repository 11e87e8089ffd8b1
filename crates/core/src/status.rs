//! Status resolution for queue entries.
//!
//! [`resolve`] is the single place that turns entry flags plus presence
//! facts into a user-visible [`QueueStatus`] and hold reason. The batch
//! form shares the exact same rule set, so list views and single-entry
//! responses can never disagree.

use serde::Serialize;

use crate::presence::PresenceLookup;
use crate::queue::{HoldReason, QueueEntry, QueueStatus};
use crate::singer::named_singers;
use crate::types::DbId;

/// Outcome of resolving one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub status: QueueStatus,
    pub hold_reason: Option<HoldReason>,
}

impl Resolution {
    fn plain(status: QueueStatus) -> Self {
        Self {
            status,
            hold_reason: None,
        }
    }

    fn held(reason: HoldReason) -> Self {
        Self {
            status: QueueStatus::Held,
            hold_reason: Some(reason),
        }
    }
}

/// Resolve the status of a single entry.
///
/// Rules, first match wins:
/// 1. skipped
/// 2. currently playing
/// 3. sung
/// 4. held: a named singer is on break per attendance (`OnBreak`), or the
///    entry carries the hold flag / a cached reason (cached reason, else
///    `OnHold`)
/// 5. unplayed
pub fn resolve<P: PresenceLookup + ?Sized>(
    entry: &QueueEntry,
    presence: &P,
    cached_reason: Option<HoldReason>,
) -> Resolution {
    if entry.was_skipped {
        return Resolution::plain(QueueStatus::Skipped);
    }
    if entry.is_currently_playing {
        return Resolution::plain(QueueStatus::Playing);
    }
    if entry.sung_at.is_some() {
        return Resolution::plain(QueueStatus::Sung);
    }

    if named_singers(&entry.singers).any(|name| presence.is_on_break_by_attendance(name)) {
        return Resolution::held(HoldReason::OnBreak);
    }
    if entry.is_on_break || cached_reason.is_some() {
        return Resolution::held(cached_reason.unwrap_or(HoldReason::OnHold));
    }

    Resolution::plain(QueueStatus::Unplayed)
}

/// Resolve a whole queue against one presence snapshot.
///
/// `cached_reason` is consulted per entry id. The result is aligned with
/// `entries`.
pub fn resolve_batch<P, F>(entries: &[QueueEntry], presence: &P, cached_reason: F) -> Vec<Resolution>
where
    P: PresenceLookup + ?Sized,
    F: Fn(DbId) -> Option<HoldReason>,
{
    entries
        .iter()
        .map(|entry| resolve(entry, presence, cached_reason(entry.id)))
        .collect()
}
