//! [`QueueStore`] over the `karaoke-db` repositories.
//!
//! Every queue mutation opens a transaction and locks the event row first.
//! Returning early with `?` drops the transaction, which rolls it back.

use async_trait::async_trait;
use karaoke_core::error::CoreError;
use karaoke_core::event::Event;
use karaoke_core::presence::{AttendanceState, EventAttendance, SingerFlags, SingerStatus};
use karaoke_core::queue::{QueueEntry, QueueFilter};
use karaoke_core::reorder::{validate_moves, PositionMove};
use karaoke_core::singer::{singers_to_json, Singer};
use karaoke_core::types::{DbId, QueueVersion, Timestamp};
use karaoke_db::repositories::{AttendanceRepo, EventRepo, QueueEntryRepo, SingerStatusRepo};
use karaoke_db::DbPool;

use super::{
    entry_is_playing, entry_not_found, event_not_found, presence_row_vanished,
    request_limit_reached, FinishOutcome, QueueStore,
};
use crate::config::EngineConfig;
use crate::error::EngineResult;

type Tx<'a> = sqlx::Transaction<'a, sqlx::Postgres>;

#[derive(Debug, Clone)]
pub struct PgQueueStore {
    pool: DbPool,
}

impl PgQueueStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Connect, verify and migrate the database named by `config`.
    pub async fn connect(config: &EngineConfig) -> EngineResult<Self> {
        let database_url = config.database_url.as_deref().ok_or_else(|| {
            CoreError::Validation("DATABASE_URL must be set to use the Postgres store".into())
        })?;

        let pool = karaoke_db::create_pool(database_url, config.db_max_connections).await?;
        tracing::info!(
            max_connections = config.db_max_connections,
            "Database connection pool created"
        );

        karaoke_db::health_check(&pool).await?;
        tracing::info!("Database health check passed");

        karaoke_db::run_migrations(&pool)
            .await
            .map_err(|e| sqlx::Error::Migrate(Box::new(e)))?;
        tracing::info!("Database migrations applied");

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

/// Lock the event row and require it to be live.
async fn lock_live_event(tx: &mut Tx<'_>, event_id: DbId) -> EngineResult<Event> {
    let event = EventRepo::lock_for_update(tx, event_id)
        .await?
        .ok_or_else(|| event_not_found(event_id))?
        .into_domain()?;
    event.require_live()?;
    Ok(event)
}

/// Lock an entry and require it to belong to `event_id` and be unfinished.
async fn lock_mutable_entry(
    tx: &mut Tx<'_>,
    event_id: DbId,
    queue_id: DbId,
) -> EngineResult<QueueEntry> {
    let entry: QueueEntry = QueueEntryRepo::find_for_update(tx, queue_id)
        .await?
        .filter(|row| row.event_id == event_id)
        .ok_or_else(|| entry_not_found(queue_id))?
        .into();
    entry.require_mutable()?;
    Ok(entry)
}

/// The row was locked and checked above, so a guarded update that still
/// matches nothing means the schema guard and the domain check disagree.
fn guard_mismatch(queue_id: DbId) -> CoreError {
    CoreError::Internal(format!("Queue entry {queue_id} failed its update guard"))
}

#[async_trait]
impl QueueStore for PgQueueStore {
    async fn get_event(&self, event_id: DbId) -> EngineResult<Option<Event>> {
        match EventRepo::find_by_id(&self.pool, event_id).await? {
            Some(row) => Ok(Some(row.into_domain()?)),
            None => Ok(None),
        }
    }

    async fn get_queue_entries(
        &self,
        event_id: DbId,
        filter: QueueFilter,
    ) -> EngineResult<Vec<QueueEntry>> {
        let rows = QueueEntryRepo::list_by_event(&self.pool, event_id).await?;
        Ok(rows
            .into_iter()
            .map(QueueEntry::from)
            .filter(|e| filter.matches(e))
            .collect())
    }

    async fn get_queue_entry(&self, queue_id: DbId) -> EngineResult<Option<QueueEntry>> {
        Ok(QueueEntryRepo::find_by_id(&self.pool, queue_id)
            .await?
            .map(QueueEntry::from))
    }

    async fn get_singer_statuses(
        &self,
        event_id: DbId,
        user_names: &[String],
    ) -> EngineResult<Vec<SingerStatus>> {
        let rows = SingerStatusRepo::list_for_users(&self.pool, event_id, user_names).await?;
        Ok(rows.into_iter().map(SingerStatus::from).collect())
    }

    async fn get_attendance(
        &self,
        event_id: DbId,
        user_names: &[String],
    ) -> EngineResult<Vec<EventAttendance>> {
        let rows = AttendanceRepo::list_for_users(&self.pool, event_id, user_names).await?;
        Ok(rows.into_iter().map(EventAttendance::from).collect())
    }

    async fn append_entry(
        &self,
        event_id: DbId,
        requestor: &str,
        song_id: &str,
        singers: &[Singer],
    ) -> EngineResult<QueueEntry> {
        let mut tx = self.pool.begin().await?;
        let event = lock_live_event(&mut tx, event_id).await?;

        let pending =
            QueueEntryRepo::count_pending_for_requestor(&mut tx, event_id, requestor).await?;
        let pending = usize::try_from(pending).unwrap_or(usize::MAX);
        if !event.accepts_request(pending) {
            return Err(request_limit_reached(&event, requestor, pending).into());
        }

        let row = QueueEntryRepo::append(
            &mut tx,
            event_id,
            song_id,
            requestor,
            &singers_to_json(singers),
        )
        .await?;
        EventRepo::bump_version(&mut tx, event_id).await?;
        tx.commit().await?;
        Ok(row.into())
    }

    async fn set_hold(
        &self,
        event_id: DbId,
        queue_id: DbId,
        on_hold: bool,
    ) -> EngineResult<QueueEntry> {
        let mut tx = self.pool.begin().await?;
        lock_live_event(&mut tx, event_id).await?;
        let before = lock_mutable_entry(&mut tx, event_id, queue_id).await?;
        if before.is_currently_playing {
            return Err(entry_is_playing(queue_id).into());
        }

        let row = QueueEntryRepo::set_hold(&mut tx, event_id, queue_id, on_hold)
            .await?
            .ok_or_else(|| guard_mismatch(queue_id))?;
        if before.is_on_break != on_hold {
            EventRepo::bump_version(&mut tx, event_id).await?;
        }
        tx.commit().await?;
        Ok(row.into())
    }

    async fn clear_and_set_playing(
        &self,
        event_id: DbId,
        queue_id: DbId,
    ) -> EngineResult<QueueEntry> {
        let mut tx = self.pool.begin().await?;
        lock_live_event(&mut tx, event_id).await?;
        lock_mutable_entry(&mut tx, event_id, queue_id).await?;

        let cleared = QueueEntryRepo::clear_playing(&mut tx, event_id, queue_id).await?;
        let row = QueueEntryRepo::set_playing(&mut tx, event_id, queue_id)
            .await?
            .ok_or_else(|| guard_mismatch(queue_id))?;
        EventRepo::bump_version(&mut tx, event_id).await?;
        tx.commit().await?;

        tracing::debug!(event_id, queue_id, cleared, "Playing flag moved");
        Ok(row.into())
    }

    async fn finish_entry(
        &self,
        event_id: DbId,
        queue_id: DbId,
        outcome: FinishOutcome,
    ) -> EngineResult<QueueEntry> {
        let mut tx = self.pool.begin().await?;
        lock_live_event(&mut tx, event_id).await?;
        lock_mutable_entry(&mut tx, event_id, queue_id).await?;

        let row = QueueEntryRepo::finish(&mut tx, event_id, queue_id, outcome.is_skipped())
            .await?
            .ok_or_else(|| guard_mismatch(queue_id))?;
        if !outcome.is_skipped() {
            EventRepo::increment_songs_completed(&mut tx, event_id).await?;
        }
        EventRepo::bump_version(&mut tx, event_id).await?;
        tx.commit().await?;
        Ok(row.into())
    }

    async fn apply_reorder(
        &self,
        event_id: DbId,
        expected_version: QueueVersion,
        moves: &[PositionMove],
    ) -> EngineResult<QueueVersion> {
        let mut tx = self.pool.begin().await?;
        let event = lock_live_event(&mut tx, event_id).await?;
        if event.queue_version != expected_version {
            return Err(CoreError::StaleVersion {
                expected: expected_version,
                current: event.queue_version,
            }
            .into());
        }

        let ids: Vec<DbId> = moves.iter().map(|m| m.queue_id).collect();
        let referenced: Vec<QueueEntry> = QueueEntryRepo::list_for_reorder(&mut tx, event_id, &ids)
            .await?
            .into_iter()
            .map(QueueEntry::from)
            .collect();
        validate_moves(event_id, &referenced, moves)?;

        QueueEntryRepo::update_positions(&mut tx, event_id, moves).await?;
        let version = EventRepo::bump_version(&mut tx, event_id).await?;
        tx.commit().await?;
        Ok(version)
    }

    async fn save_singer_status(
        &self,
        event_id: DbId,
        user_name: &str,
        flags: SingerFlags,
        expected: Option<Timestamp>,
    ) -> EngineResult<SingerStatus> {
        let written = match expected {
            None => SingerStatusRepo::insert_if_absent(&self.pool, event_id, user_name, flags).await?,
            Some(ts) => {
                SingerStatusRepo::update_if_unchanged(&self.pool, event_id, user_name, flags, ts)
                    .await?
            }
        };
        if let Some(row) = written {
            return Ok(row.into());
        }

        match SingerStatusRepo::find(&self.pool, event_id, user_name).await? {
            Some(current) => Err(CoreError::SingerStatusConflict {
                current: Box::new(current.into()),
            }
            .into()),
            None => Err(presence_row_vanished("Singer status", user_name).into()),
        }
    }

    async fn save_attendance(
        &self,
        event_id: DbId,
        user_name: &str,
        state: AttendanceState,
        expected: Option<Timestamp>,
        entries_active: Option<bool>,
    ) -> EngineResult<EventAttendance> {
        let mut tx = self.pool.begin().await?;
        EventRepo::lock_for_update(&mut tx, event_id)
            .await?
            .ok_or_else(|| event_not_found(event_id))?;

        let written = match expected {
            None => AttendanceRepo::insert_if_absent(&mut tx, event_id, user_name, &state).await?,
            Some(ts) => {
                AttendanceRepo::update_if_unchanged(&mut tx, event_id, user_name, &state, ts)
                    .await?
            }
        };
        let Some(row) = written else {
            drop(tx);
            return match AttendanceRepo::find(&self.pool, event_id, user_name).await? {
                Some(current) => Err(CoreError::AttendanceConflict {
                    current: Box::new(current.into()),
                }
                .into()),
                None => Err(presence_row_vanished("Attendance", user_name).into()),
            };
        };

        if let Some(active) = entries_active {
            let changed =
                QueueEntryRepo::set_active_for_requestor(&mut tx, event_id, user_name, active)
                    .await?;
            if changed > 0 {
                EventRepo::bump_version(&mut tx, event_id).await?;
            }
        }

        tx.commit().await?;
        Ok(row.into())
    }
}
