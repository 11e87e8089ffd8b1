//! Repository for the `events` table.

use karaoke_core::event::STATUS_UPCOMING;
use karaoke_core::types::{DbId, QueueVersion};
use sqlx::PgPool;

use crate::models::event::{CreateEvent, EventRow};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, name, status, request_limit, songs_completed, queue_version, \
    created_at, updated_at";

/// Provides event lookups and the queue version counter.
pub struct EventRepo;

impl EventRepo {
    /// Insert a new event. Status defaults to `upcoming`.
    pub async fn create(pool: &PgPool, input: &CreateEvent) -> Result<EventRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO events (name, status, request_limit)
             VALUES ($1, $2, COALESCE($3, 0))
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, EventRow>(&query)
            .bind(&input.name)
            .bind(input.status.as_deref().unwrap_or(STATUS_UPCOMING))
            .bind(input.request_limit)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<EventRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM events WHERE id = $1");
        sqlx::query_as::<_, EventRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Update an event's lifecycle status.
    pub async fn set_status(
        pool: &PgPool,
        id: DbId,
        status: &str,
    ) -> Result<Option<EventRow>, sqlx::Error> {
        let query = format!(
            "UPDATE events SET status = $2, updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, EventRow>(&query)
            .bind(id)
            .bind(status)
            .fetch_optional(pool)
            .await
    }

    // ── Transaction steps ────────────────────────────────────────────

    /// Lock the event row for the rest of the transaction.
    ///
    /// Every queue mutation takes this lock first, which serialises writers
    /// per event and makes the version check in reorder apply race-free.
    pub async fn lock_for_update(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: DbId,
    ) -> Result<Option<EventRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM events WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, EventRow>(&query)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
    }

    /// Advance the queue version and return the new value.
    pub async fn bump_version(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: DbId,
    ) -> Result<QueueVersion, sqlx::Error> {
        let row: (QueueVersion,) = sqlx::query_as(
            "UPDATE events SET queue_version = queue_version + 1, updated_at = NOW() \
             WHERE id = $1 RETURNING queue_version",
        )
        .bind(id)
        .fetch_one(&mut **tx)
        .await?;
        Ok(row.0)
    }

    pub async fn increment_songs_completed(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE events SET songs_completed = songs_completed + 1 WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}
