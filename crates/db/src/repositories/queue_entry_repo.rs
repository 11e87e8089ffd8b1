//! Repository for the `queue_entries` table.

use karaoke_core::reorder::PositionMove;
use karaoke_core::types::DbId;
use sqlx::PgPool;

use crate::models::queue_entry::{CreateQueueEntry, QueueEntryRow};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, event_id, song_id, requestor, singers, position, is_active, \
    is_currently_playing, was_skipped, sung_at, is_on_break, created_at, updated_at";

/// Guard shared by every play-state write: sung or skipped rows are frozen.
const NOT_TERMINAL: &str = "sung_at IS NULL AND was_skipped = false";

/// Provides queue reads and the transactional steps behind queue mutations.
pub struct QueueEntryRepo;

impl QueueEntryRepo {
    // ── Standard reads ───────────────────────────────────────────────

    /// Insert a row at an explicit position without touching the queue
    /// version. Used for seeding and imports.
    pub async fn create(
        pool: &PgPool,
        input: &CreateQueueEntry,
    ) -> Result<QueueEntryRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO queue_entries (event_id, song_id, requestor, singers, position)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, QueueEntryRow>(&query)
            .bind(input.event_id)
            .bind(&input.song_id)
            .bind(&input.requestor)
            .bind(&input.singers)
            .bind(input.position)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<QueueEntryRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM queue_entries WHERE id = $1");
        sqlx::query_as::<_, QueueEntryRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// All entries of an event in play order.
    pub async fn list_by_event(
        pool: &PgPool,
        event_id: DbId,
    ) -> Result<Vec<QueueEntryRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM queue_entries
             WHERE event_id = $1
             ORDER BY position ASC, id ASC"
        );
        sqlx::query_as::<_, QueueEntryRow>(&query)
            .bind(event_id)
            .fetch_all(pool)
            .await
    }

    // ── Transaction steps ────────────────────────────────────────────

    /// Unfinished requests of one requestor.
    pub async fn count_pending_for_requestor(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        event_id: DbId,
        requestor: &str,
    ) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as(&format!(
            "SELECT COUNT(*) FROM queue_entries \
             WHERE event_id = $1 AND requestor = $2 AND {NOT_TERMINAL}"
        ))
        .bind(event_id)
        .bind(requestor)
        .fetch_one(&mut **tx)
        .await?;
        Ok(row.0)
    }

    /// Append a request after the current last position.
    pub async fn append(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        event_id: DbId,
        song_id: &str,
        requestor: &str,
        singers: &serde_json::Value,
    ) -> Result<QueueEntryRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO queue_entries (event_id, song_id, requestor, singers, position)
             VALUES (
                $1, $2, $3, $4,
                (SELECT COALESCE(MAX(position), 0) + 1 FROM queue_entries WHERE event_id = $1)
             )
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, QueueEntryRow>(&query)
            .bind(event_id)
            .bind(song_id)
            .bind(requestor)
            .bind(singers)
            .fetch_one(&mut **tx)
            .await
    }

    /// Lock one entry regardless of event, so callers can tell a foreign
    /// id from a missing one.
    pub async fn find_for_update(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: DbId,
    ) -> Result<Option<QueueEntryRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM queue_entries WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, QueueEntryRow>(&query)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
    }

    /// Lock the event's queue plus any extra ids referenced by a plan.
    pub async fn list_for_reorder(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        event_id: DbId,
        ids: &[DbId],
    ) -> Result<Vec<QueueEntryRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM queue_entries
             WHERE event_id = $1 OR id = ANY($2)
             ORDER BY position ASC, id ASC
             FOR UPDATE"
        );
        sqlx::query_as::<_, QueueEntryRow>(&query)
            .bind(event_id)
            .bind(ids)
            .fetch_all(&mut **tx)
            .await
    }

    /// Clear the playing flag on every entry of the event except `keep_id`.
    pub async fn clear_playing(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        event_id: DbId,
        keep_id: DbId,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE queue_entries SET is_currently_playing = false, updated_at = NOW() \
             WHERE event_id = $1 AND is_currently_playing = true AND id <> $2",
        )
        .bind(event_id)
        .bind(keep_id)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }

    /// Mark the entry playing and lift any hold on it.
    ///
    /// Returns `None` when the entry is missing, belongs to another event,
    /// or is already finished.
    pub async fn set_playing(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        event_id: DbId,
        id: DbId,
    ) -> Result<Option<QueueEntryRow>, sqlx::Error> {
        let query = format!(
            "UPDATE queue_entries
             SET is_currently_playing = true, is_on_break = false, updated_at = NOW()
             WHERE id = $1 AND event_id = $2 AND {NOT_TERMINAL}
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, QueueEntryRow>(&query)
            .bind(id)
            .bind(event_id)
            .fetch_optional(&mut **tx)
            .await
    }

    /// Set or clear the hold flag. Always touches `updated_at`.
    pub async fn set_hold(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        event_id: DbId,
        id: DbId,
        on_hold: bool,
    ) -> Result<Option<QueueEntryRow>, sqlx::Error> {
        let query = format!(
            "UPDATE queue_entries
             SET is_on_break = $3, updated_at = NOW()
             WHERE id = $1 AND event_id = $2 AND is_currently_playing = false AND {NOT_TERMINAL}
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, QueueEntryRow>(&query)
            .bind(id)
            .bind(event_id)
            .bind(on_hold)
            .fetch_optional(&mut **tx)
            .await
    }

    /// Record the entry as sung or skipped.
    pub async fn finish(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        event_id: DbId,
        id: DbId,
        skipped: bool,
    ) -> Result<Option<QueueEntryRow>, sqlx::Error> {
        let query = format!(
            "UPDATE queue_entries
             SET sung_at = NOW(), was_skipped = $3, is_currently_playing = false,
                 is_on_break = false, updated_at = NOW()
             WHERE id = $1 AND event_id = $2 AND {NOT_TERMINAL}
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, QueueEntryRow>(&query)
            .bind(id)
            .bind(event_id)
            .bind(skipped)
            .fetch_optional(&mut **tx)
            .await
    }

    /// Write every move of a plan in one statement.
    pub async fn update_positions(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        event_id: DbId,
        moves: &[PositionMove],
    ) -> Result<u64, sqlx::Error> {
        let ids: Vec<DbId> = moves.iter().map(|m| m.queue_id).collect();
        let positions: Vec<i32> = moves.iter().map(|m| m.new_position).collect();
        let result = sqlx::query(
            "UPDATE queue_entries AS q \
             SET position = m.position, updated_at = NOW() \
             FROM UNNEST($2::BIGINT[], $3::INTEGER[]) AS m(id, position) \
             WHERE q.id = m.id AND q.event_id = $1",
        )
        .bind(event_id)
        .bind(&ids)
        .bind(&positions)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }

    /// Flip `is_active` on every unfinished request of a requestor.
    pub async fn set_active_for_requestor(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        event_id: DbId,
        requestor: &str,
        active: bool,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(&format!(
            "UPDATE queue_entries SET is_active = $3, updated_at = NOW() \
             WHERE event_id = $1 AND requestor = $2 AND is_active <> $3 AND {NOT_TERMINAL}"
        ))
        .bind(event_id)
        .bind(requestor)
        .bind(active)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }
}
