//! Status Broadcaster
//!
//! Fans out per-speaker `Status` snapshots to long-lived observers. New
//! subscribers get the current snapshot immediately, then changes only.
//! Delivery uses `tokio::sync::broadcast`, so a slow or gone subscriber
//! lags or drops on its own receiver and never blocks the others.

use jukebox_common::Status;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;
use uuid::Uuid;

pub struct StatusBroadcaster {
    capacity: usize,
    global_tx: broadcast::Sender<Status>,
    inner: Mutex<Inner>,
}

struct Inner {
    per_speaker: HashMap<Uuid, broadcast::Sender<Status>>,
    latest: HashMap<Uuid, Status>,
}

impl StatusBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (global_tx, _) = broadcast::channel(capacity);
        Self {
            capacity,
            global_tx,
            inner: Mutex::new(Inner {
                per_speaker: HashMap::new(),
                latest: HashMap::new(),
            }),
        }
    }

    /// Push a new snapshot to the speaker's subscribers and the global set.
    /// No receivers is fine; the send result is ignored. Per-speaker
    /// channels whose subscribers are all gone are dropped here, so the
    /// map only holds entries someone is listening to.
    pub fn publish(&self, status: Status) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.latest.insert(status.speaker_id, status.clone());
            if let Some(tx) = inner.per_speaker.get(&status.speaker_id) {
                let _ = tx.send(status.clone());
            }
            inner.per_speaker.retain(|_, tx| tx.receiver_count() > 0);
        }
        let _ = self.global_tx.send(status);
    }

    /// Subscribe to one speaker: current snapshot (if one exists) plus a
    /// live receiver for subsequent changes.
    pub fn subscribe(&self, speaker_id: Uuid) -> (Option<Status>, broadcast::Receiver<Status>) {
        let mut inner = self.inner.lock().unwrap();
        let rx = inner
            .per_speaker
            .entry(speaker_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();
        (inner.latest.get(&speaker_id).cloned(), rx)
    }

    /// Subscribe to all speakers: every current snapshot plus a live
    /// receiver for all subsequent changes.
    pub fn subscribe_all(&self) -> (Vec<Status>, broadcast::Receiver<Status>) {
        let inner = self.inner.lock().unwrap();
        let mut snapshot: Vec<Status> = inner.latest.values().cloned().collect();
        snapshot.sort_by(|a, b| a.speaker_name.cmp(&b.speaker_name));
        (snapshot, self.global_tx.subscribe())
    }

    /// Latest known snapshot for a speaker without subscribing
    pub fn latest(&self, speaker_id: Uuid) -> Option<Status> {
        self.inner.lock().unwrap().latest.get(&speaker_id).cloned()
    }

    /// Number of per-speaker channels currently held
    pub fn channel_count(&self) -> usize {
        self.inner.lock().unwrap().per_speaker.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(speaker_id: Uuid, url: &str) -> Status {
        let mut s = Status::empty(speaker_id, "Test", 50);
        s.playing = true;
        s.url = Some(url.to_string());
        s
    }

    #[tokio::test]
    async fn test_subscriber_gets_snapshot_then_changes() {
        let broadcaster = StatusBroadcaster::new(16);
        let id = Uuid::new_v4();

        broadcaster.publish(status(id, "http://m/1"));

        let (snapshot, mut rx) = broadcaster.subscribe(id);
        assert_eq!(snapshot.unwrap().url.as_deref(), Some("http://m/1"));

        broadcaster.publish(status(id, "http://m/2"));
        let next = rx.recv().await.unwrap();
        assert_eq!(next.url.as_deref(), Some("http://m/2"));
    }

    #[tokio::test]
    async fn test_no_snapshot_before_first_publish() {
        let broadcaster = StatusBroadcaster::new(16);
        let (snapshot, _rx) = broadcaster.subscribe(Uuid::new_v4());
        assert!(snapshot.is_none());
    }

    #[tokio::test]
    async fn test_global_subscriber_sees_all_speakers() {
        let broadcaster = StatusBroadcaster::new(16);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        broadcaster.publish(status(a, "http://m/a"));
        let (snapshot, mut rx) = broadcaster.subscribe_all();
        assert_eq!(snapshot.len(), 1);

        broadcaster.publish(status(b, "http://m/b"));
        let next = rx.recv().await.unwrap();
        assert_eq!(next.speaker_id, b);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_fine() {
        let broadcaster = StatusBroadcaster::new(16);
        broadcaster.publish(status(Uuid::new_v4(), "http://m/1"));
    }

    #[tokio::test]
    async fn test_abandoned_channels_are_pruned() {
        let broadcaster = StatusBroadcaster::new(16);
        let live = Uuid::new_v4();

        // Subscribers that connect and leave must not accumulate channels
        for _ in 0..50 {
            let (_, rx) = broadcaster.subscribe(Uuid::new_v4());
            drop(rx);
        }
        let (_, _live_rx) = broadcaster.subscribe(live);
        assert_eq!(broadcaster.channel_count(), 51);

        broadcaster.publish(status(live, "http://m/1"));
        assert_eq!(broadcaster.channel_count(), 1);
        assert!(broadcaster.latest(live).is_some());
    }
}
