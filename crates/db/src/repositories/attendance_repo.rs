//! Repository for the `event_attendance` table.

use karaoke_core::presence::AttendanceState;
use karaoke_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::presence::AttendanceRow;

const COLUMNS: &str = "event_id, user_name, is_checked_in, is_on_break, break_start_at, \
    break_end_at, updated_at";

pub struct AttendanceRepo;

impl AttendanceRepo {
    pub async fn find(
        pool: &PgPool,
        event_id: DbId,
        user_name: &str,
    ) -> Result<Option<AttendanceRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM event_attendance WHERE event_id = $1 AND user_name = $2"
        );
        sqlx::query_as::<_, AttendanceRow>(&query)
            .bind(event_id)
            .bind(user_name)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_for_users(
        pool: &PgPool,
        event_id: DbId,
        user_names: &[String],
    ) -> Result<Vec<AttendanceRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM event_attendance
             WHERE event_id = $1 AND user_name = ANY($2)"
        );
        sqlx::query_as::<_, AttendanceRow>(&query)
            .bind(event_id)
            .bind(user_names)
            .fetch_all(pool)
            .await
    }

    /// Insert a first attendance row. Returns `None` if one already exists.
    pub async fn insert_if_absent(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        event_id: DbId,
        user_name: &str,
        state: &AttendanceState,
    ) -> Result<Option<AttendanceRow>, sqlx::Error> {
        let query = format!(
            "INSERT INTO event_attendance
                (event_id, user_name, is_checked_in, is_on_break, break_start_at, break_end_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (event_id, user_name) DO NOTHING
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AttendanceRow>(&query)
            .bind(event_id)
            .bind(user_name)
            .bind(state.is_checked_in)
            .bind(state.is_on_break)
            .bind(state.break_start_at)
            .bind(state.break_end_at)
            .fetch_optional(&mut **tx)
            .await
    }

    /// Overwrite the attendance state if `updated_at` still equals `expected`.
    pub async fn update_if_unchanged(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        event_id: DbId,
        user_name: &str,
        state: &AttendanceState,
        expected: Timestamp,
    ) -> Result<Option<AttendanceRow>, sqlx::Error> {
        let query = format!(
            "UPDATE event_attendance
             SET is_checked_in = $3, is_on_break = $4, break_start_at = $5, break_end_at = $6,
                 updated_at = GREATEST(clock_timestamp(), updated_at + INTERVAL '1 microsecond')
             WHERE event_id = $1 AND user_name = $2 AND updated_at = $7
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AttendanceRow>(&query)
            .bind(event_id)
            .bind(user_name)
            .bind(state.is_checked_in)
            .bind(state.is_on_break)
            .bind(state.break_start_at)
            .bind(state.break_end_at)
            .bind(expected)
            .fetch_optional(&mut **tx)
            .await
    }
}
