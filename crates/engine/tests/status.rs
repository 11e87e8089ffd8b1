//! Integration tests for status resolution, request intake and publish
//! failure handling.

mod common;

use std::sync::Arc;

use chrono::Utc;
use common::{
    entry, live_event, not_logged_in, on_break_attendance, ready, solo, FailingSink, Harness,
    EVENT_ID,
};
use karaoke_core::queue::{NewQueueEntry, QueueFilter, QueueStatus};
use karaoke_core::singer::{GroupToken, Singer};
use karaoke_engine::{EngineConfig, MemoryQueueStore, QueueOrchestrator, QueueStore, StaticIdentities};

// ---------------------------------------------------------------------------
// Test: status precedence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn skipped_dominates_every_other_signal() {
    let h = Harness::new().await;
    let mut skipped = solo(100, 1, "alice");
    skipped.was_skipped = true;
    skipped.sung_at = Some(Utc::now());
    skipped.is_on_break = true;
    h.seed(vec![skipped]).await;
    h.store
        .insert_attendance(on_break_attendance("alice"))
        .await
        .unwrap();

    let resolved = h.engine.get_entry(EVENT_ID, 100).await.unwrap();

    assert_eq!(resolved.status, QueueStatus::Skipped);
    assert_eq!(resolved.hold_reason, "");
}

#[tokio::test]
async fn single_and_batch_resolution_agree() {
    let h = Harness::new().await;
    h.seed(vec![
        solo(100, 1, "alice"),
        solo(101, 2, "bob"),
        entry(102, 3, "carol", &["carol", "dave"]),
        solo(103, 4, "erin"),
    ])
    .await;
    h.seed_statuses(vec![not_logged_in("alice"), ready("bob")]).await;
    h.store
        .insert_attendance(on_break_attendance("dave"))
        .await
        .unwrap();
    h.engine.autoplay_next(EVENT_ID, None).await.unwrap();
    h.engine.hold_entry(EVENT_ID, 103).await.unwrap();

    let batch = h.engine.queue_snapshot(EVENT_ID).await.unwrap();
    let mut single = Vec::new();
    for resolved in &batch {
        single.push(h.engine.get_entry(EVENT_ID, resolved.queue_id).await.unwrap());
    }

    assert_eq!(batch, single);
    let statuses: Vec<(QueueStatus, &str)> =
        batch.iter().map(|e| (e.status, e.hold_reason)).collect();
    assert_eq!(
        statuses,
        vec![
            (QueueStatus::Held, "NotLoggedIn"),
            (QueueStatus::Playing, ""),
            (QueueStatus::Held, "OnBreak"),
            (QueueStatus::Held, "OnHold"),
        ]
    );
}

#[tokio::test]
async fn resolution_is_idempotent() {
    let h = Harness::new().await;
    h.seed(vec![solo(100, 1, "alice"), solo(101, 2, "bob")]).await;
    h.seed_statuses(vec![not_logged_in("alice")]).await;
    h.engine.autoplay_next(EVENT_ID, None).await.unwrap();

    let first = h.engine.queue_snapshot(EVENT_ID).await.unwrap();
    let second = h.engine.queue_snapshot(EVENT_ID).await.unwrap();

    assert_eq!(first, second);
}

// ---------------------------------------------------------------------------
// Test: request intake
// ---------------------------------------------------------------------------

#[tokio::test]
async fn added_request_includes_requestor_and_goes_last() {
    let h = Harness::new().await;
    h.seed(vec![solo(100, 4, "bob")]).await;

    let added = h
        .engine
        .add_entry(
            EVENT_ID,
            NewQueueEntry {
                song_id: "song-new".into(),
                requestor: "alice".into(),
                singers: vec![Singer::Named("bob".into())],
            },
        )
        .await
        .unwrap();

    assert_eq!(added.position, 5);
    assert_eq!(added.status, QueueStatus::Unplayed);
    let names: Vec<&str> = added.singers.iter().map(|s| s.name.as_str()).collect();
    assert!(names.contains(&"alice") && names.contains(&"bob"));
    assert_eq!(h.sink.queue_actions(), vec![("Added".to_string(), added.queue_id)]);
}

#[tokio::test]
async fn group_request_keeps_only_the_group() {
    let h = Harness::new().await;

    let added = h
        .engine
        .add_entry(
            EVENT_ID,
            NewQueueEntry {
                song_id: "song-group".into(),
                requestor: "alice".into(),
                singers: vec![Singer::Group(GroupToken::AllSing)],
            },
        )
        .await
        .unwrap();

    assert_eq!(added.singers.len(), 1);
    assert!(added.singers[0].is_group);
    assert!(added.is_eligible);
}

#[tokio::test]
async fn request_limit_is_enforced() {
    let h = Harness::new().await;
    h.store
        .insert_event(karaoke_core::event::Event {
            request_limit: 1,
            ..live_event(EVENT_ID)
        })
        .await;
    let request = || NewQueueEntry {
        song_id: "song-x".into(),
        requestor: "alice".into(),
        singers: Vec::new(),
    };

    h.engine.add_entry(EVENT_ID, request()).await.unwrap();
    let err = h.engine.add_entry(EVENT_ID, request()).await.unwrap_err();

    assert_eq!(err.code(), "VALIDATION_ERROR");
}

#[tokio::test]
async fn blank_song_is_rejected() {
    let h = Harness::new().await;

    let err = h
        .engine
        .add_entry(
            EVENT_ID,
            NewQueueEntry {
                song_id: String::new(),
                requestor: "alice".into(),
                singers: Vec::new(),
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.code(), "VALIDATION_ERROR");
    assert!(h.sink.events().is_empty());
}

// ---------------------------------------------------------------------------
// Test: publish failures never undo committed changes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn publish_failure_is_swallowed() {
    common::init_tracing();
    let store = Arc::new(MemoryQueueStore::new());
    store.insert_event(live_event(EVENT_ID)).await;
    store.insert_entry(solo(100, 1, "alice")).await;
    let engine = QueueOrchestrator::new(
        store.clone(),
        Arc::new(FailingSink),
        Arc::new(StaticIdentities::new()),
        EngineConfig::default(),
    );

    let outcome = engine
        .autoplay_next(EVENT_ID, Some(karaoke_core::eligibility::EligibilityMode::Simplified))
        .await
        .unwrap();
    assert_eq!(outcome.selected().map(|e| e.queue_id), Some(100));

    let playing: Vec<i64> = store
        .get_queue_entries(EVENT_ID, QueueFilter::All)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.is_currently_playing)
        .map(|e| e.id)
        .collect();
    assert_eq!(playing, vec![100]);

    engine.complete_entry(EVENT_ID, 100).await.unwrap();
    engine.check_in(EVENT_ID, "alice").await.unwrap();
}
