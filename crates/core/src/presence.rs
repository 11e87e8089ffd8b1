//! Presence model: who is logged in, joined, checked in or on break.
//!
//! Two fact sources exist side by side. [`SingerStatus`] is tracked for any
//! named singer; [`EventAttendance`] is tracked per requestor. Both are
//! consulted to decide whether a singer named inside someone else's entry
//! can perform. Values here are snapshots loaded in bulk by the caller;
//! nothing in this module touches storage.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::queue::QueueEntry;
use crate::singer::named_singers;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Singer status
// ---------------------------------------------------------------------------

/// Presence flags of one singer at one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingerFlags {
    pub is_logged_in: bool,
    pub is_joined: bool,
    pub is_on_break: bool,
}

impl SingerFlags {
    /// Logged in, joined and not on break.
    pub fn is_available(&self) -> bool {
        self.is_logged_in && self.is_joined && !self.is_on_break
    }
}

/// Stored singer status, keyed by `(event_id, user_name)`.
///
/// `updated_at` doubles as the optimistic-concurrency token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingerStatus {
    pub event_id: DbId,
    pub user_name: String,
    pub is_logged_in: bool,
    pub is_joined: bool,
    pub is_on_break: bool,
    pub updated_at: Timestamp,
}

impl SingerStatus {
    pub fn flags(&self) -> SingerFlags {
        SingerFlags {
            is_logged_in: self.is_logged_in,
            is_joined: self.is_joined,
            is_on_break: self.is_on_break,
        }
    }
}

/// Partial update of a singer's flags. `None` keeps the current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct SingerStatusPatch {
    pub is_logged_in: Option<bool>,
    pub is_joined: Option<bool>,
    pub is_on_break: Option<bool>,
}

impl SingerStatusPatch {
    /// Apply the patch on top of the current flags (all `false` when the
    /// singer has no status row yet).
    pub fn apply(&self, current: Option<SingerFlags>) -> SingerFlags {
        let base = current.unwrap_or_default();
        SingerFlags {
            is_logged_in: self.is_logged_in.unwrap_or(base.is_logged_in),
            is_joined: self.is_joined.unwrap_or(base.is_joined),
            is_on_break: self.is_on_break.unwrap_or(base.is_on_break),
        }
    }
}

// ---------------------------------------------------------------------------
// Attendance
// ---------------------------------------------------------------------------

/// Stored attendance of a requestor, keyed by `(event_id, user_name)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAttendance {
    pub event_id: DbId,
    pub user_name: String,
    pub is_checked_in: bool,
    pub is_on_break: bool,
    pub break_start_at: Option<Timestamp>,
    pub break_end_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

/// Mutable part of an attendance row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceState {
    pub is_checked_in: bool,
    pub is_on_break: bool,
    pub break_start_at: Option<Timestamp>,
    pub break_end_at: Option<Timestamp>,
}

impl EventAttendance {
    pub fn state(&self) -> AttendanceState {
        AttendanceState {
            is_checked_in: self.is_checked_in,
            is_on_break: self.is_on_break,
            break_start_at: self.break_start_at,
            break_end_at: self.break_end_at,
        }
    }
}

/// Requestor-level presence changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceChange {
    CheckIn,
    CheckOut,
    StartBreak,
    EndBreak,
}

impl AttendanceChange {
    /// Compute the attendance state after this change.
    ///
    /// Starting a break that is already running keeps the original start
    /// time; ending a break stamps `break_end_at`.
    pub fn apply(self, current: Option<&EventAttendance>, now: Timestamp) -> AttendanceState {
        let mut state = current.map(EventAttendance::state).unwrap_or_default();
        match self {
            Self::CheckIn => state.is_checked_in = true,
            Self::CheckOut => state.is_checked_in = false,
            Self::StartBreak => {
                if !state.is_on_break {
                    state.break_start_at = Some(now);
                    state.break_end_at = None;
                }
                state.is_on_break = true;
            }
            Self::EndBreak => {
                if state.is_on_break {
                    state.break_end_at = Some(now);
                }
                state.is_on_break = false;
            }
        }
        state
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CheckIn => "check_in",
            Self::CheckOut => "check_out",
            Self::StartBreak => "start_break",
            Self::EndBreak => "end_break",
        }
    }
}

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

/// Read access to presence facts for a single event.
pub trait PresenceLookup {
    fn singer_status(&self, user_name: &str) -> Option<&SingerStatus>;

    fn attendance(&self, user_name: &str) -> Option<&EventAttendance>;

    /// Whether attendance records `user_name` as on break.
    fn is_on_break_by_attendance(&self, user_name: &str) -> bool {
        self.attendance(user_name).is_some_and(|a| a.is_on_break)
    }
}

/// Presence facts for one event, loaded with one bulk fetch per source.
#[derive(Debug, Clone, Default)]
pub struct PresenceFacts {
    singer_statuses: HashMap<String, SingerStatus>,
    attendance: HashMap<String, EventAttendance>,
}

impl PresenceFacts {
    pub fn new(statuses: Vec<SingerStatus>, attendance: Vec<EventAttendance>) -> Self {
        Self {
            singer_statuses: statuses
                .into_iter()
                .map(|s| (s.user_name.clone(), s))
                .collect(),
            attendance: attendance
                .into_iter()
                .map(|a| (a.user_name.clone(), a))
                .collect(),
        }
    }
}

impl PresenceLookup for PresenceFacts {
    fn singer_status(&self, user_name: &str) -> Option<&SingerStatus> {
        self.singer_statuses.get(user_name)
    }

    fn attendance(&self, user_name: &str) -> Option<&EventAttendance> {
        self.attendance.get(user_name)
    }
}

/// Every user name whose presence matters for `entries`: named singers
/// plus requestors, sorted and de-duplicated for a single bulk fetch.
pub fn relevant_user_names<'a>(entries: impl IntoIterator<Item = &'a QueueEntry>) -> Vec<String> {
    let mut names: BTreeSet<&str> = BTreeSet::new();
    for entry in entries {
        names.insert(entry.requestor.as_str());
        names.extend(named_singers(&entry.singers));
    }
    names.into_iter().map(str::to_string).collect()
}
