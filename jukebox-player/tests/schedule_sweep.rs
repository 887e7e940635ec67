//! Schedule sweep behavior: due entries fire and preempt, failures are
//! recorded without blocking the rest of the sweep, and nothing fires twice.

mod helpers;

use chrono::{Duration as ChronoDuration, Utc};
use helpers::{add_speaker, test_system, track};
use jukebox_common::db::schedules::{self, NewSchedule};
use jukebox_player::schedule::{run_sweep, ScheduleTimer};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn url_schedule(url: &str, speaker_guid: Option<String>) -> NewSchedule {
    NewSchedule {
        speaker_guid,
        url: Some(url.to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_due_schedule_fires_on_its_speaker() {
    let sys = test_system().await;
    let speaker = add_speaker(&sys.db, "Kitchen", true).await;
    let player = sys.fake_player(speaker);

    let row = schedules::insert_schedule(
        &sys.db,
        &url_schedule("http://m/alarm.mp3", Some(speaker.to_string())),
        Utc::now() - ChronoDuration::minutes(1),
    )
    .await
    .unwrap();

    run_sweep(&sys.db, &sys.manager).await.unwrap();

    let row = schedules::get_schedule(&sys.db, &row.guid).await.unwrap();
    assert_eq!(row.status, "fired");
    assert_eq!(player.commands()[1]["url"], json!("http://m/alarm.mp3"));
}

#[tokio::test]
async fn test_fired_schedule_preempts_current_playback() {
    let sys = test_system().await;
    let speaker = add_speaker(&sys.db, "Kitchen", true).await;
    let player = sys.fake_player(speaker);

    let item = sys.queue.enqueue(speaker, &track("http://m/old")).await.unwrap();
    sys.manager.play_from_queue(&item.guid).await.unwrap();

    schedules::insert_schedule(
        &sys.db,
        &url_schedule("http://m/alarm.mp3", None),
        Utc::now() - ChronoDuration::minutes(1),
    )
    .await
    .unwrap();

    run_sweep(&sys.db, &sys.manager).await.unwrap();

    // The interrupted queue item is discarded, not left dangling
    assert!(sys.queue.active(speaker).await.unwrap().is_none());
    let status = sys.manager.status(speaker).await.unwrap();
    assert_eq!(status.url.as_deref(), Some("http://m/alarm.mp3"));

    let loads: Vec<_> = player
        .commands()
        .into_iter()
        .filter(|c| c["cmd"] == json!("load"))
        .collect();
    assert_eq!(loads.last().unwrap()["url"], json!("http://m/alarm.mp3"));
}

#[tokio::test]
async fn test_failures_are_recorded_and_do_not_block_the_sweep() {
    let sys = test_system().await;
    let speaker = add_speaker(&sys.db, "Kitchen", false).await;
    let player = sys.fake_player(speaker);
    let due = Utc::now() - ChronoDuration::minutes(2);

    // No binding and no default speaker exists: this one must fail
    let doomed = schedules::insert_schedule(&sys.db, &url_schedule("http://m/a", None), due)
        .await
        .unwrap();
    // Explicit binding: this one must still fire
    let bound = schedules::insert_schedule(
        &sys.db,
        &url_schedule("http://m/b", Some(speaker.to_string())),
        due + ChronoDuration::minutes(1),
    )
    .await
    .unwrap();

    run_sweep(&sys.db, &sys.manager).await.unwrap();

    let doomed = schedules::get_schedule(&sys.db, &doomed.guid).await.unwrap();
    assert_eq!(doomed.status, "failed");
    assert!(doomed.error.as_deref().unwrap().contains("no target speaker"));

    let bound = schedules::get_schedule(&sys.db, &bound.guid).await.unwrap();
    assert_eq!(bound.status, "fired");
    assert_eq!(player.commands()[1]["url"], json!("http://m/b"));
}

#[tokio::test]
async fn test_query_schedules_resolve_at_fire_time() {
    let sys = test_system().await;
    let speaker = add_speaker(&sys.db, "Kitchen", true).await;
    let player = sys.fake_player(speaker);

    schedules::insert_schedule(
        &sys.db,
        &NewSchedule {
            query: Some("morning mix".to_string()),
            ..Default::default()
        },
        Utc::now() - ChronoDuration::minutes(1),
    )
    .await
    .unwrap();

    run_sweep(&sys.db, &sys.manager).await.unwrap();

    assert_eq!(
        player.commands()[1]["url"],
        json!("http://resolved.local/morning-mix")
    );
}

#[tokio::test]
async fn test_future_schedules_stay_pending_and_fired_do_not_repeat() {
    let sys = test_system().await;
    let speaker = add_speaker(&sys.db, "Kitchen", true).await;
    let player = sys.fake_player(speaker);

    let future = schedules::insert_schedule(
        &sys.db,
        &url_schedule("http://m/later", None),
        Utc::now() + ChronoDuration::hours(1),
    )
    .await
    .unwrap();
    let due = schedules::insert_schedule(
        &sys.db,
        &url_schedule("http://m/now", None),
        Utc::now() - ChronoDuration::minutes(1),
    )
    .await
    .unwrap();

    run_sweep(&sys.db, &sys.manager).await.unwrap();
    run_sweep(&sys.db, &sys.manager).await.unwrap();

    let future = schedules::get_schedule(&sys.db, &future.guid).await.unwrap();
    assert_eq!(future.status, "pending");
    let due = schedules::get_schedule(&sys.db, &due.guid).await.unwrap();
    assert_eq!(due.status, "fired");

    // One load despite two sweeps
    let loads = player
        .command_names()
        .into_iter()
        .filter(|n| n == "load")
        .count();
    assert_eq!(loads, 1);
}

#[tokio::test]
async fn test_timer_stop_is_idempotent() {
    let sys = test_system().await;

    let timer = ScheduleTimer::start(
        sys.db.clone(),
        Arc::clone(&sys.manager),
        Duration::from_millis(50),
    );
    tokio::time::sleep(Duration::from_millis(120)).await;

    timer.stop();
    timer.stop();
}
