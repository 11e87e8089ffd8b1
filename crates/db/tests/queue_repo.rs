//! Repository tests against a real Postgres.
//!
//! `#[sqlx::test]` reads `DATABASE_URL` and creates a scratch database per
//! test.

use karaoke_core::presence::{AttendanceChange, EventAttendance, SingerFlags};
use karaoke_core::queue::QueueEntry;
use karaoke_core::reorder::PositionMove;
use karaoke_db::models::event::CreateEvent;
use karaoke_db::models::queue_entry::CreateQueueEntry;
use karaoke_db::models::user::CreateUser;
use karaoke_db::repositories::{
    AttendanceRepo, EventRepo, QueueEntryRepo, SingerStatusRepo, UserRepo,
};
use serde_json::json;
use sqlx::PgPool;

async fn live_event(pool: &PgPool) -> i64 {
    EventRepo::create(
        pool,
        &CreateEvent {
            name: "Friday Night".into(),
            status: Some("live".into()),
            request_limit: None,
        },
    )
    .await
    .unwrap()
    .id
}

async fn seed_entry(pool: &PgPool, event_id: i64, requestor: &str, position: i32) -> i64 {
    QueueEntryRepo::create(
        pool,
        &CreateQueueEntry {
            event_id,
            song_id: format!("song-{position}"),
            requestor: requestor.into(),
            singers: json!([requestor]),
            position,
        },
    )
    .await
    .unwrap()
    .id
}

#[sqlx::test(migrations = "./migrations")]
async fn test_bootstrap(pool: PgPool) {
    karaoke_db::health_check(&pool).await.unwrap();

    let event = EventRepo::find_by_id(&pool, live_event(&pool).await)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.queue_version, 1);
    assert_eq!(event.status, "live");
}

#[sqlx::test(migrations = "./migrations")]
async fn test_append_assigns_next_position(pool: PgPool) {
    let event_id = live_event(&pool).await;
    seed_entry(&pool, event_id, "alice", 4).await;

    let mut tx = pool.begin().await.unwrap();
    let row = QueueEntryRepo::append(&mut tx, event_id, "song-x", "bob", &json!(["bob"]))
        .await
        .unwrap();
    let version = EventRepo::bump_version(&mut tx, event_id).await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(row.position, 5);
    assert_eq!(version, 2);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_only_one_entry_plays(pool: PgPool) {
    let event_id = live_event(&pool).await;
    let first = seed_entry(&pool, event_id, "alice", 1).await;
    let second = seed_entry(&pool, event_id, "bob", 2).await;

    for id in [first, second] {
        let mut tx = pool.begin().await.unwrap();
        QueueEntryRepo::clear_playing(&mut tx, event_id, id).await.unwrap();
        let row = QueueEntryRepo::set_playing(&mut tx, event_id, id).await.unwrap();
        assert!(row.is_some());
        tx.commit().await.unwrap();
    }

    let playing: Vec<i64> = QueueEntryRepo::list_by_event(&pool, event_id)
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.is_currently_playing)
        .map(|r| r.id)
        .collect();
    assert_eq!(playing, vec![second]);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_finished_entries_are_frozen(pool: PgPool) {
    let event_id = live_event(&pool).await;
    let id = seed_entry(&pool, event_id, "alice", 1).await;

    let mut tx = pool.begin().await.unwrap();
    let done = QueueEntryRepo::finish(&mut tx, event_id, id, true).await.unwrap();
    assert!(done.is_some());
    let again = QueueEntryRepo::set_playing(&mut tx, event_id, id).await.unwrap();
    assert!(again.is_none());
    tx.commit().await.unwrap();

    let entry: QueueEntry = QueueEntryRepo::find_by_id(&pool, id).await.unwrap().unwrap().into();
    assert!(entry.was_skipped);
    assert!(entry.sung_at.is_some());
}

#[sqlx::test(migrations = "./migrations")]
async fn test_update_positions_in_one_statement(pool: PgPool) {
    let event_id = live_event(&pool).await;
    let a = seed_entry(&pool, event_id, "alice", 1).await;
    let b = seed_entry(&pool, event_id, "bob", 2).await;

    let mut tx = pool.begin().await.unwrap();
    let moved = QueueEntryRepo::update_positions(
        &mut tx,
        event_id,
        &[
            PositionMove { queue_id: a, new_position: 2 },
            PositionMove { queue_id: b, new_position: 1 },
        ],
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(moved, 2);
    let order: Vec<i64> = QueueEntryRepo::list_by_event(&pool, event_id)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(order, vec![b, a]);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_malformed_singers_read_as_empty(pool: PgPool) {
    let event_id = live_event(&pool).await;
    let row = QueueEntryRepo::create(
        &pool,
        &CreateQueueEntry {
            event_id,
            song_id: "song".into(),
            requestor: "alice".into(),
            singers: json!({"not": "a list"}),
            position: 1,
        },
    )
    .await
    .unwrap();

    let entry: QueueEntry = row.into();
    assert!(entry.singers.is_empty());
}

#[sqlx::test(migrations = "./migrations")]
async fn test_singer_status_compare_and_swap(pool: PgPool) {
    let event_id = live_event(&pool).await;
    let flags = SingerFlags {
        is_logged_in: true,
        is_joined: true,
        is_on_break: false,
    };

    let first = SingerStatusRepo::insert_if_absent(&pool, event_id, "alice", flags)
        .await
        .unwrap()
        .unwrap();
    assert!(SingerStatusRepo::insert_if_absent(&pool, event_id, "alice", flags)
        .await
        .unwrap()
        .is_none());

    let on_break = SingerFlags { is_on_break: true, ..flags };
    let second =
        SingerStatusRepo::update_if_unchanged(&pool, event_id, "alice", on_break, first.updated_at)
            .await
            .unwrap()
            .unwrap();
    assert!(second.updated_at > first.updated_at);

    // A writer still holding the first timestamp loses.
    let stale =
        SingerStatusRepo::update_if_unchanged(&pool, event_id, "alice", flags, first.updated_at)
            .await
            .unwrap();
    assert!(stale.is_none());

    let rows = SingerStatusRepo::list_for_users(&pool, event_id, &["alice".into(), "bob".into()])
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].is_on_break);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_attendance_check_in_then_break(pool: PgPool) {
    let event_id = live_event(&pool).await;
    let now = chrono::Utc::now();

    let mut tx = pool.begin().await.unwrap();
    let checked_in = AttendanceRepo::insert_if_absent(
        &mut tx,
        event_id,
        "alice",
        &AttendanceChange::CheckIn.apply(None, now),
    )
    .await
    .unwrap()
    .unwrap();
    tx.commit().await.unwrap();

    let current: EventAttendance = checked_in.clone().into();
    let mut tx = pool.begin().await.unwrap();
    let on_break = AttendanceRepo::update_if_unchanged(
        &mut tx,
        event_id,
        "alice",
        &AttendanceChange::StartBreak.apply(Some(&current), now),
        checked_in.updated_at,
    )
    .await
    .unwrap()
    .unwrap();
    tx.commit().await.unwrap();

    assert!(on_break.is_checked_in);
    assert!(on_break.is_on_break);
    assert!(on_break.break_start_at.is_some());
}

#[sqlx::test(migrations = "./migrations")]
async fn test_archived_event_is_not_live(pool: PgPool) {
    let event_id = live_event(&pool).await;

    let archived = EventRepo::set_status(&pool, event_id, "archived")
        .await
        .unwrap()
        .unwrap();

    let event = archived.into_domain().unwrap();
    assert!(event.require_live().is_err());
    assert!(EventRepo::set_status(&pool, event_id, "paused").await.is_err());
}

#[sqlx::test(migrations = "./migrations")]
async fn test_user_upsert_and_bulk_lookup(pool: PgPool) {
    for (user_name, display_name) in [("alice", "Alice"), ("alice", "Alice A."), ("bob", "Bob")] {
        UserRepo::upsert(
            &pool,
            &CreateUser {
                user_name: user_name.into(),
                display_name: display_name.into(),
            },
        )
        .await
        .unwrap();
    }

    let mut rows = UserRepo::find_by_names(&pool, &["alice".into(), "carol".into()])
        .await
        .unwrap();
    rows.sort_by(|a, b| a.user_name.cmp(&b.user_name));

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].display_name, "Alice A.");
}
