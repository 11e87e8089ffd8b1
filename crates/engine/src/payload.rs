//! Fully resolved queue entries, as returned to callers and broadcast.

use karaoke_core::eligibility::{is_eligible, EligibilityMode};
use karaoke_core::presence::PresenceLookup;
use karaoke_core::queue::{hold_reason_str, QueueEntry, QueueStatus};
use karaoke_core::singer::Singer;
use karaoke_core::status::{resolve_batch, Resolution};
use karaoke_core::types::{DbId, Timestamp};
use serde::Serialize;

use crate::hold_cache::EventHolds;
use crate::identity::{display_name, IdentityMap};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SingerView {
    pub name: String,
    pub display_name: String,
    pub is_group: bool,
}

/// A queue entry with its derived status, hold reason and eligibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedEntry {
    pub queue_id: DbId,
    pub event_id: DbId,
    pub song_id: String,
    pub position: i32,
    pub requestor: String,
    pub requestor_display_name: String,
    pub singers: Vec<SingerView>,
    pub status: QueueStatus,
    /// Empty when the entry is not held.
    pub hold_reason: &'static str,
    pub is_eligible: bool,
    pub is_active: bool,
    pub is_currently_playing: bool,
    pub was_skipped: bool,
    pub sung_at: Option<Timestamp>,
    pub is_on_break: bool,
    pub updated_at: Timestamp,
}

impl ResolvedEntry {
    pub fn new(
        entry: &QueueEntry,
        resolution: Resolution,
        eligible: bool,
        identities: &IdentityMap,
    ) -> Self {
        let singers = entry
            .singers
            .iter()
            .map(|singer| match singer {
                Singer::Named(name) => SingerView {
                    name: name.clone(),
                    display_name: display_name(identities, name).to_string(),
                    is_group: false,
                },
                Singer::Group(token) => SingerView {
                    name: token.as_str().to_string(),
                    display_name: token.as_str().to_string(),
                    is_group: true,
                },
            })
            .collect();

        Self {
            queue_id: entry.id,
            event_id: entry.event_id,
            song_id: entry.song_id.clone(),
            position: entry.position,
            requestor: entry.requestor.clone(),
            requestor_display_name: display_name(identities, &entry.requestor).to_string(),
            singers,
            status: resolution.status,
            hold_reason: hold_reason_str(resolution.hold_reason),
            is_eligible: eligible,
            is_active: entry.is_active,
            is_currently_playing: entry.is_currently_playing,
            was_skipped: entry.was_skipped,
            sung_at: entry.sung_at,
            is_on_break: entry.is_on_break,
            updated_at: entry.updated_at,
        }
    }

    pub fn to_payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Resolve a whole queue against one set of presence facts.
pub fn resolve_entries<P: PresenceLookup + ?Sized>(
    entries: &[QueueEntry],
    presence: &P,
    holds: &EventHolds,
    identities: &IdentityMap,
    mode: EligibilityMode,
) -> Vec<ResolvedEntry> {
    resolve_batch(entries, presence, |queue_id| holds.get(queue_id))
        .into_iter()
        .zip(entries)
        .map(|(resolution, entry)| {
            let eligible = is_eligible(entry, presence, mode).eligible;
            ResolvedEntry::new(entry, resolution, eligible, identities)
        })
        .collect()
}
