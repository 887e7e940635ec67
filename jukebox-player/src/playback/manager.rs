//! Playback Manager
//!
//! Registry of engines keyed by speaker id, and the single entry point the
//! rest of the system uses to reach a speaker's engine. The registry lock
//! guards registration and removal only; command execution runs on the
//! per-engine critical section.

use crate::config::EngineSettings;
use crate::playback::engine::PlaybackEngine;
use crate::queue::{parse_guid, QueueCoordinator};
use crate::resolver::MediaResolver;
use crate::status::StatusBroadcaster;
use jukebox_common::db::speakers;
use jukebox_common::{Error, MediaSelector, PlayRequest, Result, Status, Track};
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

pub struct PlaybackManager {
    db: Pool<Sqlite>,
    queue: Arc<QueueCoordinator>,
    broadcaster: Arc<StatusBroadcaster>,
    resolver: Arc<dyn MediaResolver>,
    settings: EngineSettings,
    /// Holding the lock across engine construction is what makes
    /// get-or-create single-flight per speaker id
    engines: Mutex<HashMap<Uuid, Arc<PlaybackEngine>>>,
}

impl PlaybackManager {
    pub fn new(
        db: Pool<Sqlite>,
        queue: Arc<QueueCoordinator>,
        broadcaster: Arc<StatusBroadcaster>,
        resolver: Arc<dyn MediaResolver>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            db,
            queue,
            broadcaster,
            resolver,
            settings,
            engines: Mutex::new(HashMap::new()),
        }
    }

    pub fn queue(&self) -> &Arc<QueueCoordinator> {
        &self.queue
    }

    pub fn resolver(&self) -> &Arc<dyn MediaResolver> {
        &self.resolver
    }

    /// Return the existing engine or atomically construct and register a
    /// new one. Concurrent calls for the same speaker yield one engine.
    pub async fn get_or_create_engine(&self, speaker_id: Uuid) -> Result<Arc<PlaybackEngine>> {
        let mut engines = self.engines.lock().await;
        if let Some(engine) = engines.get(&speaker_id) {
            return Ok(Arc::clone(engine));
        }

        let speaker = speakers::get_speaker(&self.db, &speaker_id.to_string()).await?;
        let engine = PlaybackEngine::spawn(
            &speaker,
            Arc::clone(&self.queue),
            Arc::clone(&self.broadcaster),
            self.settings.clone(),
        )?;
        engines.insert(speaker_id, Arc::clone(&engine));
        info!(speaker = %speaker_id, "engine created");
        Ok(engine)
    }

    pub async fn engine_if_exists(&self, speaker_id: Uuid) -> Option<Arc<PlaybackEngine>> {
        self.engines.lock().await.get(&speaker_id).cloned()
    }

    /// Called once at process start. Pre-warms engines for speakers known
    /// to be online; one speaker failing must not fail the process.
    pub async fn init(&self) -> Result<()> {
        let all = speakers::list_speakers(&self.db).await?;
        for speaker in all.iter().filter(|s| s.online) {
            let speaker_id = match parse_guid(&speaker.guid) {
                Ok(id) => id,
                Err(e) => {
                    warn!("skipping speaker with bad guid: {}", e);
                    continue;
                }
            };
            if let Err(e) = self.get_or_create_engine(speaker_id).await {
                warn!(speaker = %speaker_id, "could not pre-warm engine: {}", e);
            }
        }
        Ok(())
    }

    /// Tear down every registered engine, tolerating individual failures.
    /// Used on shutdown; safe to call twice.
    pub async fn destroy_all(&self) {
        let drained: Vec<(Uuid, Arc<PlaybackEngine>)> =
            self.engines.lock().await.drain().collect();
        for (speaker_id, engine) in drained {
            engine.destroy().await;
            info!(speaker = %speaker_id, "engine torn down");
        }
    }

    /// Destroy one speaker's engine (speaker removal). No-op when the
    /// engine was never created.
    pub async fn remove_engine(&self, speaker_id: Uuid) {
        let removed = self.engines.lock().await.remove(&speaker_id);
        if let Some(engine) = removed {
            engine.destroy().await;
        }
    }

    // Playback facade

    /// Play a request on a speaker (the default speaker when none given).
    /// Query-only requests are resolved through the media resolver first.
    pub async fn play_now(&self, speaker_id: Option<Uuid>, request: &PlayRequest) -> Result<Track> {
        let speaker_id = self.resolve_speaker(speaker_id).await?;
        let track = match request.as_track() {
            Some(track) => track,
            None => match &request.selector {
                MediaSelector::Query(query) => self.resolver.resolve(query).await?,
                MediaSelector::Url(_) => unreachable!("url requests always carry a track"),
            },
        };
        self.play_track(speaker_id, &track).await
    }

    /// Play an already-resolved track. Replaces whatever the speaker is
    /// doing; the engine discards any active queue item inside its own
    /// critical section.
    pub async fn play_track(&self, speaker_id: Uuid, track: &Track) -> Result<Track> {
        let engine = self.get_or_create_engine(speaker_id).await?;
        engine.play_now(track).await
    }

    /// Promote a pending queue item and play it immediately. The promotion
    /// happens inside the owning engine's critical section, so it cannot
    /// interleave with that speaker's auto-advance.
    pub async fn play_from_queue(&self, item_guid: &str) -> Result<Track> {
        let speaker_id = self.queue.owner(item_guid).await?;
        let engine = self.get_or_create_engine(speaker_id).await?;
        engine.play_queue_item(item_guid).await
    }

    /// Stop playback and clear the active queue item
    pub async fn stop(&self, speaker_id: Uuid) -> Result<()> {
        match self.engine_if_exists(speaker_id).await {
            // The engine discards the active item under its critical section
            Some(engine) => engine.stop().await,
            None => self.queue.discard_active(speaker_id).await,
        }
    }

    pub async fn pause(&self, speaker_id: Uuid) -> Result<()> {
        match self.engine_if_exists(speaker_id).await {
            Some(engine) => engine.pause().await,
            None => Ok(()),
        }
    }

    pub async fn resume(&self, speaker_id: Uuid) -> Result<()> {
        match self.engine_if_exists(speaker_id).await {
            Some(engine) => engine.resume().await,
            None => Ok(()),
        }
    }

    pub async fn seek(&self, speaker_id: Uuid, position_ms: i64) -> Result<u64> {
        let engine = self.get_or_create_engine(speaker_id).await?;
        engine.seek(position_ms).await
    }

    pub async fn set_volume(&self, speaker_id: Uuid, volume: i64) -> Result<u8> {
        let engine = self.get_or_create_engine(speaker_id).await?;
        engine.set_volume(volume).await
    }

    /// Live status for a speaker. Speakers without a live engine report an
    /// empty snapshot built from their stored row.
    pub async fn status(&self, speaker_id: Uuid) -> Result<Status> {
        if let Some(engine) = self.engine_if_exists(speaker_id).await {
            return Ok(engine.status());
        }
        let speaker = speakers::get_speaker(&self.db, &speaker_id.to_string()).await?;
        Ok(Status::empty(
            speaker_id,
            &speaker.name,
            speaker.volume.clamp(0, 100) as u8,
        ))
    }

    async fn resolve_speaker(&self, explicit: Option<Uuid>) -> Result<Uuid> {
        match explicit {
            Some(speaker_id) => {
                speakers::get_speaker(&self.db, &speaker_id.to_string()).await?;
                Ok(speaker_id)
            }
            None => match speakers::get_default_speaker(&self.db).await? {
                Some(speaker) => parse_guid(&speaker.guid),
                None => Err(Error::InvalidState(
                    "no default speaker configured".to_string(),
                )),
            },
        }
    }
}
