//! Repository for the `singer_statuses` table.
//!
//! Writes are compare-and-swap on `updated_at`: an update only lands when
//! the row still carries the timestamp the caller read.

use karaoke_core::presence::SingerFlags;
use karaoke_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::presence::SingerStatusRow;

const COLUMNS: &str = "event_id, user_name, is_logged_in, is_joined, is_on_break, updated_at";

pub struct SingerStatusRepo;

impl SingerStatusRepo {
    pub async fn find(
        pool: &PgPool,
        event_id: DbId,
        user_name: &str,
    ) -> Result<Option<SingerStatusRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM singer_statuses WHERE event_id = $1 AND user_name = $2"
        );
        sqlx::query_as::<_, SingerStatusRow>(&query)
            .bind(event_id)
            .bind(user_name)
            .fetch_optional(pool)
            .await
    }

    /// Bulk fetch for a set of users within one event.
    pub async fn list_for_users(
        pool: &PgPool,
        event_id: DbId,
        user_names: &[String],
    ) -> Result<Vec<SingerStatusRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM singer_statuses
             WHERE event_id = $1 AND user_name = ANY($2)"
        );
        sqlx::query_as::<_, SingerStatusRow>(&query)
            .bind(event_id)
            .bind(user_names)
            .fetch_all(pool)
            .await
    }

    /// Insert a first status row. Returns `None` if one already exists.
    pub async fn insert_if_absent(
        pool: &PgPool,
        event_id: DbId,
        user_name: &str,
        flags: SingerFlags,
    ) -> Result<Option<SingerStatusRow>, sqlx::Error> {
        let query = format!(
            "INSERT INTO singer_statuses (event_id, user_name, is_logged_in, is_joined, is_on_break)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (event_id, user_name) DO NOTHING
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SingerStatusRow>(&query)
            .bind(event_id)
            .bind(user_name)
            .bind(flags.is_logged_in)
            .bind(flags.is_joined)
            .bind(flags.is_on_break)
            .fetch_optional(pool)
            .await
    }

    /// Overwrite the flags if `updated_at` still equals `expected`.
    ///
    /// Returns `None` when the row changed (or vanished) underneath.
    pub async fn update_if_unchanged(
        pool: &PgPool,
        event_id: DbId,
        user_name: &str,
        flags: SingerFlags,
        expected: Timestamp,
    ) -> Result<Option<SingerStatusRow>, sqlx::Error> {
        let query = format!(
            "UPDATE singer_statuses
             SET is_logged_in = $3, is_joined = $4, is_on_break = $5,
                 updated_at = GREATEST(clock_timestamp(), updated_at + INTERVAL '1 microsecond')
             WHERE event_id = $1 AND user_name = $2 AND updated_at = $6
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SingerStatusRow>(&query)
            .bind(event_id)
            .bind(user_name)
            .bind(flags.is_logged_in)
            .bind(flags.is_joined)
            .bind(flags.is_on_break)
            .bind(expected)
            .fetch_optional(pool)
            .await
    }
}
