use crate::presence::{EventAttendance, SingerStatus};
use crate::types::{DbId, QueueVersion};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// The queue moved on since the caller read it.
    #[error("Conflict: plan built against queue version {expected}, current version is {current}")]
    StaleVersion {
        expected: QueueVersion,
        current: QueueVersion,
    },

    /// A compare-and-swap write on a singer status lost the race.
    #[error("Conflict: singer status for '{}' changed concurrently", current.user_name)]
    SingerStatusConflict { current: Box<SingerStatus> },

    /// A compare-and-swap write on an attendance row lost the race.
    #[error("Conflict: attendance for '{}' changed concurrently", current.user_name)]
    AttendanceConflict { current: Box<EventAttendance> },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether this error belongs to the conflict family (caller should
    /// re-read and retry on its own terms).
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::Conflict(_)
                | Self::StaleVersion { .. }
                | Self::SingerStatusConflict { .. }
                | Self::AttendanceConflict { .. }
        )
    }
}
