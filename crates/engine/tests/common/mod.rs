#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::Utc;
use karaoke_core::event::{Event, EventStatus};
use karaoke_core::presence::{EventAttendance, SingerStatus};
use karaoke_core::queue::QueueEntry;
use karaoke_core::singer::Singer;
use karaoke_core::types::DbId;
use karaoke_engine::{EngineConfig, MemoryQueueStore, QueueOrchestrator, StaticIdentities};
use karaoke_events::{BroadcastSink, PublishError, QueueEvent};

pub const EVENT_ID: DbId = 42;

/// Route engine logs to the test writer. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "karaoke_engine=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Keeps every published event, in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<QueueEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<QueueEvent> {
        self.events.lock().unwrap().clone()
    }

    /// `(action, queue_id)` for each `queue.changed` event.
    pub fn queue_actions(&self) -> Vec<(String, DbId)> {
        self.events()
            .iter()
            .filter(|e| e.event_type == "queue.changed")
            .map(|e| {
                (
                    e.payload["action"].as_str().unwrap_or_default().to_string(),
                    e.payload["entry"]["queue_id"].as_i64().unwrap_or_default(),
                )
            })
            .collect()
    }

    pub fn of_type(&self, event_type: &str) -> Vec<QueueEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl BroadcastSink for RecordingSink {
    fn publish(&self, event: QueueEvent) -> Result<(), PublishError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// Refuses every publish.
#[derive(Debug, Default)]
pub struct FailingSink;

impl BroadcastSink for FailingSink {
    fn publish(&self, _event: QueueEvent) -> Result<(), PublishError> {
        Err(PublishError::Failed("subscriber gone".into()))
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn live_event(id: DbId) -> Event {
    Event {
        id,
        name: format!("Karaoke night {id}"),
        status: EventStatus::Live,
        request_limit: 0,
        songs_completed: 0,
        queue_version: 1,
    }
}

pub fn entry(id: DbId, position: i32, requestor: &str, singers: &[&str]) -> QueueEntry {
    QueueEntry {
        id,
        event_id: EVENT_ID,
        song_id: format!("song-{id}"),
        requestor: requestor.to_string(),
        singers: singers.iter().map(|s| Singer::from(s.to_string())).collect(),
        position,
        is_active: true,
        is_currently_playing: false,
        was_skipped: false,
        sung_at: None,
        is_on_break: false,
        updated_at: Utc::now(),
    }
}

/// An entry sung only by its requestor.
pub fn solo(id: DbId, position: i32, requestor: &str) -> QueueEntry {
    entry(id, position, requestor, &[requestor])
}

pub fn status(user_name: &str, logged_in: bool, joined: bool, on_break: bool) -> SingerStatus {
    SingerStatus {
        event_id: EVENT_ID,
        user_name: user_name.to_string(),
        is_logged_in: logged_in,
        is_joined: joined,
        is_on_break: on_break,
        updated_at: Utc::now(),
    }
}

pub fn ready(user_name: &str) -> SingerStatus {
    status(user_name, true, true, false)
}

pub fn not_logged_in(user_name: &str) -> SingerStatus {
    status(user_name, false, true, false)
}

pub fn on_break_attendance(user_name: &str) -> EventAttendance {
    let now = Utc::now();
    EventAttendance {
        event_id: EVENT_ID,
        user_name: user_name.to_string(),
        is_checked_in: true,
        is_on_break: true,
        break_start_at: Some(now),
        break_end_at: None,
        updated_at: now,
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub store: Arc<MemoryQueueStore>,
    pub sink: Arc<RecordingSink>,
    pub engine: QueueOrchestrator,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(EngineConfig::default()).await
    }

    pub async fn with_config(config: EngineConfig) -> Self {
        init_tracing();
        let store = Arc::new(MemoryQueueStore::new());
        store.insert_event(live_event(EVENT_ID)).await;
        let sink = Arc::new(RecordingSink::default());
        let engine = QueueOrchestrator::new(
            store.clone(),
            sink.clone(),
            Arc::new(StaticIdentities::new().with_user("alice", "Alice A.")),
            config,
        );
        Self {
            store,
            sink,
            engine,
        }
    }

    pub async fn seed(&self, entries: Vec<QueueEntry>) {
        for entry in entries {
            self.store.insert_entry(entry).await;
        }
    }

    pub async fn seed_statuses(&self, statuses: Vec<SingerStatus>) {
        for status in statuses {
            self.store.insert_singer_status(status).await.unwrap();
        }
    }

    pub async fn positions(&self) -> Vec<(DbId, i32)> {
        let mut positions: Vec<(DbId, i32)> = self
            .engine
            .queue_snapshot(EVENT_ID)
            .await
            .unwrap()
            .iter()
            .map(|e| (e.queue_id, e.position))
            .collect();
        positions.sort();
        positions
    }
}
