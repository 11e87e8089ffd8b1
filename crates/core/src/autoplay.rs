//! Autoplay queue walk.
//!
//! Decides, without side effects, which entries get held and which entry
//! plays next. The orchestrator turns the result into writes and
//! broadcast events.

use serde::Serialize;

use crate::eligibility::{is_eligible, EligibilityMode};
use crate::presence::PresenceLookup;
use crate::queue::{HoldReason, QueueEntry};
use crate::types::DbId;

/// An entry passed over during the walk, and why.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HoldDecision {
    pub queue_id: DbId,
    pub reason: HoldReason,
}

/// Result of walking the unplayed queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AutoplayWalk {
    /// Entries visited before the winner, in play order.
    pub holds: Vec<HoldDecision>,
    /// First eligible entry, if any.
    pub selected: Option<DbId>,
}

/// Walk unplayed entries in play order and stop at the first eligible one.
///
/// Entries that are terminal or already playing are ignored. Every entry
/// visited before the winner yields a [`HoldDecision`]; entries after the
/// winner are not evaluated.
pub fn walk_queue<P: PresenceLookup + ?Sized>(
    entries: &[QueueEntry],
    presence: &P,
    mode: EligibilityMode,
) -> AutoplayWalk {
    let mut ordered: Vec<&QueueEntry> = entries.iter().filter(|e| e.is_unplayed()).collect();
    ordered.sort_by_key(|e| e.play_order());

    let mut walk = AutoplayWalk::default();
    for entry in ordered {
        let eligibility = is_eligible(entry, presence, mode);
        if eligibility.eligible {
            walk.selected = Some(entry.id);
            break;
        }
        walk.holds.push(HoldDecision {
            queue_id: entry.id,
            reason: eligibility.hold_reason.unwrap_or(HoldReason::OnHold),
        });
    }
    walk
}
