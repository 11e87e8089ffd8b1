//! Singer status and attendance row models.

use karaoke_core::presence::{EventAttendance, SingerStatus};
use karaoke_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `singer_statuses` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SingerStatusRow {
    pub event_id: DbId,
    pub user_name: String,
    pub is_logged_in: bool,
    pub is_joined: bool,
    pub is_on_break: bool,
    pub updated_at: Timestamp,
}

impl From<SingerStatusRow> for SingerStatus {
    fn from(row: SingerStatusRow) -> Self {
        Self {
            event_id: row.event_id,
            user_name: row.user_name,
            is_logged_in: row.is_logged_in,
            is_joined: row.is_joined,
            is_on_break: row.is_on_break,
            updated_at: row.updated_at,
        }
    }
}

/// A row from the `event_attendance` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AttendanceRow {
    pub event_id: DbId,
    pub user_name: String,
    pub is_checked_in: bool,
    pub is_on_break: bool,
    pub break_start_at: Option<Timestamp>,
    pub break_end_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

impl From<AttendanceRow> for EventAttendance {
    fn from(row: AttendanceRow) -> Self {
        Self {
            event_id: row.event_id,
            user_name: row.user_name,
            is_checked_in: row.is_checked_in,
            is_on_break: row.is_on_break,
            break_start_at: row.break_start_at,
            break_end_at: row.break_end_at,
            updated_at: row.updated_at,
        }
    }
}
