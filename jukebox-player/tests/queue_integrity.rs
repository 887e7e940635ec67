//! Queue ordering invariants through mixed operations: positions stay
//! dense and zero-based, at most one item is active per speaker, and the
//! advance policy follows the speaker's play mode.

mod helpers;

use helpers::{add_speaker, test_system, track};
use jukebox_common::db::models::{PlayMode, QueueItemStatus};

fn positions(rows: &[jukebox_common::db::models::QueueRow]) -> Vec<i64> {
    rows.iter().map(|r| r.position).collect()
}

#[tokio::test]
async fn test_positions_stay_dense_through_mixed_operations() {
    let sys = test_system().await;
    let speaker = add_speaker(&sys.db, "Kitchen", true).await;

    for i in 0..5 {
        sys.queue
            .enqueue(speaker, &track(&format!("http://m/{}", i)))
            .await
            .unwrap();
    }
    let pending = sys.queue.pending(speaker).await.unwrap();
    assert_eq!(positions(&pending), vec![0, 1, 2, 3, 4]);

    // Remove from the middle; everything after shifts down
    sys.queue.remove(&pending[2].guid).await.unwrap();
    let pending = sys.queue.pending(speaker).await.unwrap();
    assert_eq!(positions(&pending), vec![0, 1, 2, 3]);
    assert_eq!(pending[2].url, "http://m/3");

    // Move the last item to the front
    sys.queue.reorder(&pending[3].guid, 0).await.unwrap();
    let pending = sys.queue.pending(speaker).await.unwrap();
    assert_eq!(positions(&pending), vec![0, 1, 2, 3]);
    assert_eq!(pending[0].url, "http://m/4");

    // Out-of-range target clamps to the end instead of failing
    sys.queue.reorder(&pending[0].guid, 999).await.unwrap();
    let pending = sys.queue.pending(speaker).await.unwrap();
    assert_eq!(positions(&pending), vec![0, 1, 2, 3]);
    assert_eq!(pending[3].url, "http://m/4");
}

#[tokio::test]
async fn test_promote_leaves_one_active_and_renumbers() {
    let sys = test_system().await;
    let speaker = add_speaker(&sys.db, "Kitchen", true).await;

    let rows = sys
        .queue
        .bulk_enqueue(
            speaker,
            &[track("http://m/a"), track("http://m/b"), track("http://m/c")],
        )
        .await
        .unwrap();

    let (owner, promoted) = sys.queue.promote(&rows[1].guid).await.unwrap();
    assert_eq!(owner, speaker);
    assert_eq!(promoted.url, "http://m/b");

    let active = sys.queue.active(speaker).await.unwrap().unwrap();
    assert_eq!(active.url, "http://m/b");
    assert_eq!(active.status, QueueItemStatus::Playing.as_str());

    // Remaining pending items renumber densely
    let pending = sys.queue.pending(speaker).await.unwrap();
    assert_eq!(positions(&pending), vec![0, 1]);

    // Promoting another replaces the active item; the old one is gone
    let (_, second) = sys.queue.promote(&pending[1].guid).await.unwrap();
    assert_eq!(second.url, "http://m/c");
    let active = sys.queue.active(speaker).await.unwrap().unwrap();
    assert_eq!(active.url, "http://m/c");
    assert_eq!(sys.queue.list(speaker).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_active_item_cannot_be_removed() {
    let sys = test_system().await;
    let speaker = add_speaker(&sys.db, "Kitchen", true).await;

    let row = sys.queue.enqueue(speaker, &track("http://m/a")).await.unwrap();
    sys.queue.promote(&row.guid).await.unwrap();

    let err = sys.queue.remove(&row.guid).await.unwrap_err();
    assert_eq!(err.code(), "invalid_state");
    assert!(sys.queue.active(speaker).await.unwrap().is_some());
}

#[tokio::test]
async fn test_shuffle_preserves_items_and_active() {
    let sys = test_system().await;
    let speaker = add_speaker(&sys.db, "Kitchen", true).await;

    let rows = sys
        .queue
        .bulk_enqueue(
            speaker,
            &(0..6)
                .map(|i| track(&format!("http://m/{}", i)))
                .collect::<Vec<_>>(),
        )
        .await
        .unwrap();
    sys.queue.promote(&rows[0].guid).await.unwrap();

    sys.queue.shuffle(speaker).await.unwrap();

    let active = sys.queue.active(speaker).await.unwrap().unwrap();
    assert_eq!(active.url, "http://m/0");

    let pending = sys.queue.pending(speaker).await.unwrap();
    assert_eq!(positions(&pending), vec![0, 1, 2, 3, 4]);

    let mut urls: Vec<String> = pending.into_iter().map(|r| r.url).collect();
    urls.sort();
    assert_eq!(
        urls,
        vec!["http://m/1", "http://m/2", "http://m/3", "http://m/4", "http://m/5"]
    );
}

#[tokio::test]
async fn test_sequential_advance_consumes_the_queue() {
    let sys = test_system().await;
    let speaker = add_speaker(&sys.db, "Kitchen", true).await;

    let rows = sys
        .queue
        .bulk_enqueue(speaker, &[track("http://m/a"), track("http://m/b")])
        .await
        .unwrap();
    sys.queue.promote(&rows[0].guid).await.unwrap();

    let next = sys.queue.advance_after_end(speaker).await.unwrap().unwrap();
    assert_eq!(next.url, "http://m/b");

    // Queue exhausted after the second track ends
    assert!(sys.queue.advance_after_end(speaker).await.unwrap().is_none());
    assert!(sys.queue.list(speaker).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_repeat_all_cycles_finished_items_to_the_end() {
    let sys = test_system().await;
    let speaker = add_speaker(&sys.db, "Kitchen", true).await;
    sys.queue
        .set_play_mode(speaker, PlayMode::RepeatAll)
        .await
        .unwrap();

    let rows = sys
        .queue
        .bulk_enqueue(speaker, &[track("http://m/a"), track("http://m/b")])
        .await
        .unwrap();
    sys.queue.promote(&rows[0].guid).await.unwrap();

    // a ends -> b plays, a goes to the back
    let next = sys.queue.advance_after_end(speaker).await.unwrap().unwrap();
    assert_eq!(next.url, "http://m/b");
    let pending = sys.queue.pending(speaker).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].url, "http://m/a");

    // b ends -> a plays again; nothing is ever lost
    let next = sys.queue.advance_after_end(speaker).await.unwrap().unwrap();
    assert_eq!(next.url, "http://m/a");
    assert_eq!(sys.queue.list(speaker).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_repeat_one_replays_the_same_item() {
    let sys = test_system().await;
    let speaker = add_speaker(&sys.db, "Kitchen", true).await;
    sys.queue
        .set_play_mode(speaker, PlayMode::RepeatOne)
        .await
        .unwrap();

    let rows = sys
        .queue
        .bulk_enqueue(speaker, &[track("http://m/a"), track("http://m/b")])
        .await
        .unwrap();
    sys.queue.promote(&rows[0].guid).await.unwrap();

    for _ in 0..3 {
        let next = sys.queue.advance_after_end(speaker).await.unwrap().unwrap();
        assert_eq!(next.url, "http://m/a");
    }
    // The pending item never moves
    assert_eq!(sys.queue.pending(speaker).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_clear_pending_keeps_the_active_item() {
    let sys = test_system().await;
    let speaker = add_speaker(&sys.db, "Kitchen", true).await;

    let rows = sys
        .queue
        .bulk_enqueue(
            speaker,
            &[track("http://m/a"), track("http://m/b"), track("http://m/c")],
        )
        .await
        .unwrap();
    sys.queue.promote(&rows[0].guid).await.unwrap();

    let cleared = sys.queue.clear_pending(speaker).await.unwrap();
    assert_eq!(cleared, 2);

    let remaining = sys.queue.list(speaker).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].url, "http://m/a");
}

#[tokio::test]
async fn test_queues_are_isolated_per_speaker() {
    let sys = test_system().await;
    let kitchen = add_speaker(&sys.db, "Kitchen", true).await;
    let bedroom = add_speaker(&sys.db, "Bedroom", false).await;

    sys.queue.enqueue(kitchen, &track("http://m/k0")).await.unwrap();
    sys.queue.enqueue(bedroom, &track("http://m/b0")).await.unwrap();
    sys.queue.enqueue(bedroom, &track("http://m/b1")).await.unwrap();

    // Each speaker numbers its own pending set from zero
    assert_eq!(positions(&sys.queue.pending(kitchen).await.unwrap()), vec![0]);
    assert_eq!(
        positions(&sys.queue.pending(bedroom).await.unwrap()),
        vec![0, 1]
    );

    sys.queue.clear_pending(bedroom).await.unwrap();
    assert_eq!(sys.queue.pending(kitchen).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_paused_position_is_recorded_and_cleared() {
    let sys = test_system().await;
    let speaker = add_speaker(&sys.db, "Kitchen", true).await;

    let row = sys.queue.enqueue(speaker, &track("http://m/a")).await.unwrap();
    sys.queue.promote(&row.guid).await.unwrap();

    sys.queue.record_paused(speaker, 42_000).await.unwrap();
    let active = sys.queue.active(speaker).await.unwrap().unwrap();
    assert_eq!(active.status, QueueItemStatus::Paused.as_str());
    assert_eq!(active.paused_position_ms, Some(42_000));

    sys.queue.record_resumed(speaker).await.unwrap();
    let active = sys.queue.active(speaker).await.unwrap().unwrap();
    assert_eq!(active.status, QueueItemStatus::Playing.as_str());
    assert_eq!(active.paused_position_ms, None);
}
