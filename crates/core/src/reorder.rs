//! Bulk reorder plans: fairness balancing, validation and the plan state
//! machine.
//!
//! A plan is computed against a queue version and later applied as a
//! whole. Computation lives here; version checks and writes happen in the
//! storage layer inside one transaction.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::CoreError;
use crate::presence::PresenceLookup;
use crate::queue::{HoldReason, QueueEntry, QueueStatus};
use crate::singer::named_singers;
use crate::status::resolve;
use crate::types::{DbId, QueueVersion, Timestamp};

/// Opaque plan identifier.
pub type PlanId = Uuid;

// ---------------------------------------------------------------------------
// Plan types
// ---------------------------------------------------------------------------

/// Move one entry to a new position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct PositionMove {
    pub queue_id: DbId,
    #[validate(range(min = 1))]
    pub new_position: i32,
}

/// Advisory findings attached to a plan. They never block apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ReorderWarning {
    /// The same named singer performs in two consecutive slots.
    SingerBackToBack {
        singer: String,
        queue_id: DbId,
        next_queue_id: DbId,
    },
    /// Held entries were left where they are and not balanced.
    HeldEntriesExcluded { queue_ids: Vec<DbId> },
    /// The balanced order equals the current one.
    AlreadyBalanced,
}

impl ReorderWarning {
    pub fn message(&self) -> String {
        match self {
            Self::SingerBackToBack {
                singer,
                queue_id,
                next_queue_id,
            } => format!(
                "Singer {singer} sings entry {queue_id} and again right after in entry {next_queue_id}"
            ),
            Self::HeldEntriesExcluded { queue_ids } => format!(
                "{} held entr{} not balanced",
                queue_ids.len(),
                if queue_ids.len() == 1 { "y was" } else { "ies were" }
            ),
            Self::AlreadyBalanced => "Queue order is already balanced".to_string(),
        }
    }
}

/// A versioned batch of position changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ReorderPlan {
    pub plan_id: PlanId,
    pub event_id: DbId,
    /// Queue version the plan was computed against.
    pub version: QueueVersion,
    #[validate(length(min = 1, message = "Reorder plan contains no moves"), nested)]
    pub moves: Vec<PositionMove>,
    pub warnings: Vec<ReorderWarning>,
    pub created_at: Timestamp,
}

impl ReorderPlan {
    pub fn new(
        event_id: DbId,
        version: QueueVersion,
        moves: Vec<PositionMove>,
        warnings: Vec<ReorderWarning>,
    ) -> Self {
        Self {
            plan_id: Uuid::now_v7(),
            event_id,
            version,
            moves,
            warnings,
            created_at: chrono::Utc::now(),
        }
    }

    /// A plan with warnings is still applicable, just not ideal.
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn moved_ids(&self) -> Vec<DbId> {
        self.moves.iter().map(|m| m.queue_id).collect()
    }
}

/// Outcome of a successful apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedReorder {
    pub plan_id: PlanId,
    pub event_id: DbId,
    pub applied_version: QueueVersion,
    pub moved_count: usize,
    pub moved_ids: Vec<DbId>,
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Lifecycle of a reorder plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanState {
    Drafting,
    Proposed,
    Applied,
    Rejected,
}

pub mod state_machine {
    use super::PlanState;

    /// Valid target states from `from`. Terminal states return an empty slice.
    pub fn valid_transitions(from: PlanState) -> &'static [PlanState] {
        match from {
            PlanState::Drafting => &[PlanState::Proposed, PlanState::Rejected],
            PlanState::Proposed => &[PlanState::Applied, PlanState::Rejected],
            PlanState::Applied | PlanState::Rejected => &[],
        }
    }

    pub fn can_transition(from: PlanState, to: PlanState) -> bool {
        valid_transitions(from).contains(&to)
    }

    /// Validate a state transition, returning an error message for invalid ones.
    pub fn validate_transition(from: PlanState, to: PlanState) -> Result<(), String> {
        if can_transition(from, to) {
            Ok(())
        } else {
            Err(format!("Invalid plan transition: {from:?} -> {to:?}"))
        }
    }
}

// ---------------------------------------------------------------------------
// Balancing
// ---------------------------------------------------------------------------

/// Moves and warnings for a proposed reorder, before a plan id is minted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Proposal {
    pub moves: Vec<PositionMove>,
    pub warnings: Vec<ReorderWarning>,
}

/// Compute a round-robin order across requestors.
///
/// Only entries that resolve to `Unplayed` take part; held entries keep
/// their positions. Each requestor's entries keep their relative order and
/// requestors take turns in order of their earliest entry. The new order
/// is laid onto the position slots the candidates already occupy.
pub fn propose_balanced<P, F>(entries: &[QueueEntry], presence: &P, cached_reason: F) -> Proposal
where
    P: PresenceLookup + ?Sized,
    F: Fn(DbId) -> Option<HoldReason>,
{
    let mut pending: Vec<&QueueEntry> = entries.iter().filter(|e| e.is_unplayed()).collect();
    pending.sort_by_key(|e| e.play_order());

    let mut candidates = Vec::with_capacity(pending.len());
    let mut held = Vec::new();
    let mut held_slots = HashSet::new();
    for entry in pending {
        match resolve(entry, presence, cached_reason(entry.id)).status {
            QueueStatus::Unplayed => candidates.push(entry),
            _ => {
                held.push(entry.id);
                held_slots.insert(entry.position);
            }
        }
    }

    let balanced = round_robin(&candidates);
    let slots = distinct_slots(candidates.iter().map(|e| e.position).collect(), &held_slots);

    let moves: Vec<PositionMove> = balanced
        .iter()
        .zip(&slots)
        .filter(|(entry, slot)| entry.position != **slot)
        .map(|(entry, slot)| PositionMove {
            queue_id: entry.id,
            new_position: *slot,
        })
        .collect();

    let mut warnings = back_to_back_warnings(&balanced);
    if !held.is_empty() {
        warnings.push(ReorderWarning::HeldEntriesExcluded { queue_ids: held });
    }
    if moves.is_empty() {
        warnings.push(ReorderWarning::AlreadyBalanced);
    }

    Proposal { moves, warnings }
}

fn round_robin<'a>(candidates: &[&'a QueueEntry]) -> Vec<&'a QueueEntry> {
    let mut requestor_order: Vec<&str> = Vec::new();
    let mut by_requestor: HashMap<&str, Vec<&'a QueueEntry>> = HashMap::new();
    for entry in candidates {
        let key = entry.requestor.as_str();
        by_requestor
            .entry(key)
            .or_insert_with(|| {
                requestor_order.push(key);
                Vec::new()
            })
            .push(entry);
    }

    let rounds = by_requestor.values().map(Vec::len).max().unwrap_or(0);
    let mut out = Vec::with_capacity(candidates.len());
    for round in 0..rounds {
        for requestor in &requestor_order {
            if let Some(entry) = by_requestor.get(requestor).and_then(|v| v.get(round)) {
                out.push(*entry);
            }
        }
    }
    out
}

/// Sort slots and nudge duplicates upward so every slot is distinct and
/// none lands on a position a held entry occupies.
fn distinct_slots(mut slots: Vec<i32>, taken: &HashSet<i32>) -> Vec<i32> {
    slots.sort_unstable();
    let mut floor = i32::MIN;
    for slot in &mut slots {
        let mut next = (*slot).max(floor);
        while taken.contains(&next) {
            next += 1;
        }
        *slot = next;
        floor = next + 1;
    }
    slots
}

fn back_to_back_warnings(order: &[&QueueEntry]) -> Vec<ReorderWarning> {
    let mut warnings = Vec::new();
    for pair in order.windows(2) {
        let next: HashSet<&str> = named_singers(&pair[1].singers).collect();
        if let Some(singer) = named_singers(&pair[0].singers).find(|s| next.contains(s)) {
            warnings.push(ReorderWarning::SingerBackToBack {
                singer: singer.to_string(),
                queue_id: pair[0].id,
                next_queue_id: pair[1].id,
            });
        }
    }
    warnings
}

// ---------------------------------------------------------------------------
// Manual moves
// ---------------------------------------------------------------------------

/// Validate a move list against the full queue of `event_id`.
///
/// Every referenced entry must exist in the event and must not be
/// terminal; an entry may be moved once per plan.
pub fn validate_moves(
    event_id: DbId,
    entries: &[QueueEntry],
    moves: &[PositionMove],
) -> Result<(), CoreError> {
    if moves.is_empty() {
        return Err(CoreError::Validation("Reorder plan contains no moves".into()));
    }

    let by_id: HashMap<DbId, &QueueEntry> = entries.iter().map(|e| (e.id, e)).collect();
    let mut seen = HashSet::with_capacity(moves.len());
    for m in moves {
        if m.new_position < 1 {
            return Err(CoreError::Validation(format!(
                "Queue entry {} has invalid position {}",
                m.queue_id, m.new_position
            )));
        }
        if !seen.insert(m.queue_id) {
            return Err(CoreError::Validation(format!(
                "Queue entry {} appears more than once in the plan",
                m.queue_id
            )));
        }
        match by_id.get(&m.queue_id) {
            None => {
                return Err(CoreError::Validation(format!(
                    "Queue entry {} does not exist in event {event_id}",
                    m.queue_id
                )))
            }
            Some(entry) if entry.event_id != event_id => {
                return Err(CoreError::Validation(format!(
                    "Queue entry {} belongs to event {}, not {event_id}",
                    m.queue_id, entry.event_id
                )))
            }
            Some(entry) if entry.is_terminal() => {
                return Err(CoreError::Validation(format!(
                    "Queue entry {} is finished and cannot be moved",
                    m.queue_id
                )))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Warnings for the order that results from applying `moves`.
pub fn warnings_for_moves(entries: &[QueueEntry], moves: &[PositionMove]) -> Vec<ReorderWarning> {
    let targets: HashMap<DbId, i32> = moves.iter().map(|m| (m.queue_id, m.new_position)).collect();
    let mut projected: Vec<(i32, DbId, &QueueEntry)> = entries
        .iter()
        .filter(|e| e.is_unplayed())
        .map(|e| (targets.get(&e.id).copied().unwrap_or(e.position), e.id, e))
        .collect();
    projected.sort_by_key(|(position, id, _)| (*position, *id));
    let order: Vec<&QueueEntry> = projected.into_iter().map(|(_, _, e)| e).collect();
    back_to_back_warnings(&order)
}
