//! Playback Engine
//!
//! One engine per speaker. Wraps that speaker's control channel, caches the
//! last-known `Status`, and owns the per-speaker critical section: every
//! state-mutating operation (play, stop, pause, seek, volume, auto-advance)
//! runs under one lock so a user command can never race the advance
//! triggered by an end-of-media event.
//!
//! State machine: Uninitialized → Starting → Ready ⇄ {Playing, Paused},
//! any state → Failed on unrecoverable channel error, Failed → Starting on
//! the next command.

use crate::channel::{socket_path, ChannelEvent, ControlChannel, PlayerCommand, StatusReport};
use crate::config::EngineSettings;
use crate::queue::QueueCoordinator;
use crate::status::StatusBroadcaster;
use chrono::Utc;
use jukebox_common::db::models::SpeakerRow;
use jukebox_common::{Error, PlayerState, Result, Status, Track};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct PlaybackEngine {
    speaker_id: Uuid,
    settings: EngineSettings,
    channel: ControlChannel,
    queue: Arc<QueueCoordinator>,
    broadcaster: Arc<StatusBroadcaster>,

    /// Per-speaker critical section for commands and auto-advance
    cmd_lock: Mutex<()>,
    state: std::sync::Mutex<PlayerState>,
    status: std::sync::Mutex<Status>,
    event_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackEngine {
    /// Build the engine and start its event loop. No connection is made
    /// yet; the channel is dialed on the first command.
    pub fn spawn(
        speaker: &SpeakerRow,
        queue: Arc<QueueCoordinator>,
        broadcaster: Arc<StatusBroadcaster>,
        settings: EngineSettings,
    ) -> Result<Arc<Self>> {
        let speaker_id = crate::queue::parse_guid(&speaker.guid)?;
        let volume = speaker.volume.clamp(0, 100) as u8;
        let (channel, event_rx) = ControlChannel::new(
            socket_path(&settings.socket_dir, speaker_id),
            settings.send_timeout,
        );

        let engine = Arc::new(Self {
            speaker_id,
            settings,
            channel,
            queue,
            broadcaster,
            cmd_lock: Mutex::new(()),
            state: std::sync::Mutex::new(PlayerState::Uninitialized),
            status: std::sync::Mutex::new(Status::empty(speaker_id, &speaker.name, volume)),
            event_task: std::sync::Mutex::new(None),
        });

        let task = tokio::spawn(Self::event_loop(Arc::clone(&engine), event_rx));
        *engine.event_task.lock().unwrap() = Some(task);

        Ok(engine)
    }

    pub fn speaker_id(&self) -> Uuid {
        self.speaker_id
    }

    pub fn state(&self) -> PlayerState {
        *self.state.lock().unwrap()
    }

    /// Last-known status snapshot
    pub fn status(&self) -> Status {
        self.status.lock().unwrap().clone()
    }

    /// Keep the cached snapshot in step with a speaker rename
    pub fn set_speaker_name(&self, name: &str) {
        self.status.lock().unwrap().speaker_name = name.to_string();
    }

    /// Stop whatever is loaded and play this track, discarding any active
    /// queue item it replaces. Status is updated optimistically from the
    /// track metadata; position and the playing flag are confirmed by the
    /// next status event.
    pub async fn play_now(&self, track: &Track) -> Result<Track> {
        let _guard = self.cmd_lock.lock().await;
        self.queue.discard_active(self.speaker_id).await?;
        self.play_locked(track).await?;
        Ok(track.clone())
    }

    /// Promote a pending queue item and play it, with the promotion inside
    /// the critical section so it cannot interleave with an auto-advance.
    /// If the play fails the promoted item is removed.
    pub async fn play_queue_item(&self, item_guid: &str) -> Result<Track> {
        let _guard = self.cmd_lock.lock().await;

        let (owner, track) = self.queue.promote(item_guid).await?;
        if owner != self.speaker_id {
            return Err(Error::InvalidState(format!(
                "queue item {} belongs to another speaker",
                item_guid
            )));
        }

        match self.play_locked(&track).await {
            Ok(()) => Ok(track),
            Err(e) => {
                if let Err(discard_err) = self.queue.discard_active(self.speaker_id).await {
                    warn!(speaker = %self.speaker_id, "could not discard failed item: {}", discard_err);
                }
                Err(e)
            }
        }
    }

    /// Idempotent: stopping with nothing loaded is a successful no-op.
    /// Any active queue item is discarded along with the stop.
    pub async fn stop(&self) -> Result<()> {
        let _guard = self.cmd_lock.lock().await;
        self.stop_locked().await?;
        self.queue.discard_active(self.speaker_id).await
    }

    /// Idempotent: pausing when already paused or nothing loaded succeeds
    pub async fn pause(&self) -> Result<()> {
        let _guard = self.cmd_lock.lock().await;

        let (playing, paused, position_ms) = {
            let status = self.status.lock().unwrap();
            (status.playing, status.paused, status.position_ms)
        };
        if !playing || paused {
            return Ok(());
        }

        self.channel.send(&PlayerCommand::Pause).await?;
        self.set_state(PlayerState::Paused);
        self.mutate_status(|s| s.paused = true);

        if let Err(e) = self.queue.record_paused(self.speaker_id, position_ms).await {
            debug!(speaker = %self.speaker_id, "could not record pause position: {}", e);
        }
        Ok(())
    }

    /// Idempotent: resuming when not paused succeeds without effect
    pub async fn resume(&self) -> Result<()> {
        let _guard = self.cmd_lock.lock().await;

        let (playing, paused) = {
            let status = self.status.lock().unwrap();
            (status.playing, status.paused)
        };
        if !playing || !paused {
            return Ok(());
        }

        self.channel.send(&PlayerCommand::Resume).await?;
        self.set_state(PlayerState::Playing);
        self.mutate_status(|s| s.paused = false);

        if let Err(e) = self.queue.record_resumed(self.speaker_id).await {
            debug!(speaker = %self.speaker_id, "could not record resume: {}", e);
        }
        Ok(())
    }

    /// Seek to a position, clamped to `[0, duration]`. Out-of-range input
    /// is clamped, not rejected. Returns the effective position.
    pub async fn seek(&self, position_ms: i64) -> Result<u64> {
        let _guard = self.cmd_lock.lock().await;

        let (playing, duration_ms) = {
            let status = self.status.lock().unwrap();
            (status.playing, status.duration_ms)
        };
        if !playing {
            return Ok(0);
        }

        let mut clamped = position_ms.max(0) as u64;
        if let Some(duration) = duration_ms {
            clamped = clamped.min(duration);
        }

        self.channel
            .send(&PlayerCommand::Seek {
                position_ms: clamped,
            })
            .await?;
        self.mutate_status(|s| s.position_ms = clamped);
        Ok(clamped)
    }

    /// Set volume, clamped to `[0, 100]`. Returns the effective volume.
    pub async fn set_volume(&self, volume: i64) -> Result<u8> {
        let _guard = self.cmd_lock.lock().await;

        let clamped = volume.clamp(0, 100) as u8;
        self.ensure_connected_locked().await?;
        self.channel
            .send(&PlayerCommand::SetVolume { volume: clamped })
            .await?;
        self.mutate_status(|s| s.volume = clamped);
        Ok(clamped)
    }

    /// Close the channel and abort in-flight work. Safe to call even if the
    /// engine never successfully connected, and safe to call twice.
    pub async fn destroy(&self) {
        if let Some(task) = self.event_task.lock().unwrap().take() {
            task.abort();
        }
        self.channel.close().await;
        self.set_state(PlayerState::Uninitialized);
        self.mutate_status(clear_media);
        info!(speaker = %self.speaker_id, "engine destroyed");
    }

    // Command internals; cmd_lock held by every caller below.

    async fn play_locked(&self, track: &Track) -> Result<()> {
        self.ensure_connected_locked().await?;

        // Stop is idempotent on the player side; clears anything loaded
        self.channel.send(&PlayerCommand::Stop).await?;

        // A load failure (unplayable resource) surfaces to the caller
        self.channel
            .send(&PlayerCommand::Load {
                url: track.url.clone(),
            })
            .await?;

        // Re-apply our cached volume so the player matches after reconnects
        let volume = self.status.lock().unwrap().volume;
        self.channel
            .send(&PlayerCommand::SetVolume { volume })
            .await?;

        self.set_state(PlayerState::Playing);
        self.mutate_status(|s| {
            s.playing = true;
            s.paused = false;
            s.title = track.title.clone();
            s.url = Some(track.url.clone());
            s.duration_ms = track.duration_ms;
            s.position_ms = 0;
        });
        info!(speaker = %self.speaker_id, url = %track.url, "playing");
        Ok(())
    }

    async fn stop_locked(&self) -> Result<()> {
        if !self.channel.is_connected() {
            // Nothing can be loaded; stopping is a no-op
            self.mutate_status(clear_media);
            return Ok(());
        }

        self.channel.send(&PlayerCommand::Stop).await?;
        self.set_state(PlayerState::Ready);
        self.mutate_status(clear_media);
        Ok(())
    }

    /// Dial the channel with bounded backoff. `Failed → Starting` happens
    /// here, making every command a self-healing retry point.
    async fn ensure_connected_locked(&self) -> Result<()> {
        if self.channel.is_connected() {
            return Ok(());
        }

        self.set_state(PlayerState::Starting);
        let mut backoff = self.settings.connect_backoff;
        let mut last_error = Error::ChannelUnavailable("no attempt made".to_string());

        for attempt in 0..self.settings.connect_attempts.max(1) {
            if attempt > 0 {
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            match self.channel.connect().await {
                Ok(()) => {
                    self.set_state(PlayerState::Ready);
                    return Ok(());
                }
                Err(e) => {
                    debug!(speaker = %self.speaker_id, attempt = attempt + 1, "connect failed: {}", e);
                    last_error = e;
                }
            }
        }

        self.set_state(PlayerState::Failed);
        self.mutate_status(clear_media);
        Err(Error::Playback(format!(
            "player for speaker {} is unreachable: {}",
            self.speaker_id, last_error
        )))
    }

    // Event loop

    async fn event_loop(engine: Arc<Self>, mut event_rx: mpsc::Receiver<ChannelEvent>) {
        while let Some(event) = event_rx.recv().await {
            match event {
                ChannelEvent::Status(report) => engine.apply_status_report(report),
                ChannelEvent::EndOfMedia => {
                    // Advance inside the critical section so it cannot race
                    // a user command on the same speaker
                    let _guard = engine.cmd_lock.lock().await;
                    engine.advance_locked().await;
                }
                ChannelEvent::Closed => {
                    warn!(speaker = %engine.speaker_id, "control channel closed");
                    engine.set_state(PlayerState::Failed);
                    engine.mutate_status(clear_media);
                }
            }
        }
        debug!(speaker = %engine.speaker_id, "engine event loop ended");
    }

    /// Status events are applied in receipt order, in place
    fn apply_status_report(&self, report: StatusReport) {
        self.mutate_status(|s| {
            s.playing = report.playing;
            s.paused = report.paused;
            s.position_ms = report.position_ms;
            if report.duration_ms.is_some() {
                s.duration_ms = report.duration_ms;
            }
            if report.title.is_some() {
                s.title = report.title.clone();
            }
        });
    }

    /// The only auto-advance path: end-of-media asks the coordinator for
    /// the next pending item and plays it through this same engine.
    async fn advance_locked(&self) {
        match self.queue.advance_after_end(self.speaker_id).await {
            Ok(Some(track)) => {
                if let Err(e) = self.play_locked(&track).await {
                    warn!(speaker = %self.speaker_id, "auto-advance play failed: {}", e);
                    // The promoted item cannot play; drop it so the queue
                    // does not wedge on it
                    if let Err(e) = self.queue.discard_active(self.speaker_id).await {
                        warn!(speaker = %self.speaker_id, "could not discard failed item: {}", e);
                    }
                }
            }
            Ok(None) => {
                if let Err(e) = self.stop_locked().await {
                    debug!(speaker = %self.speaker_id, "stop after queue end failed: {}", e);
                }
            }
            Err(e) => warn!(speaker = %self.speaker_id, "auto-advance failed: {}", e),
        }
    }

    // State/status helpers

    fn set_state(&self, state: PlayerState) {
        *self.state.lock().unwrap() = state;
    }

    /// Mutate the cached status and publish the new snapshot
    fn mutate_status(&self, f: impl FnOnce(&mut Status)) {
        let snapshot = {
            let mut status = self.status.lock().unwrap();
            f(&mut status);
            status.updated_at = Utc::now();
            status.clone()
        };
        self.broadcaster.publish(snapshot);
    }
}

fn clear_media(status: &mut Status) {
    status.playing = false;
    status.paused = false;
    status.title = None;
    status.url = None;
    status.duration_ms = None;
    status.position_ms = 0;
}
