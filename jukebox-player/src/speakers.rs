//! Speaker registry
//!
//! CRUD over speaker rows plus the bits of live state that must move with
//! them: the first registered speaker becomes the default, a rename is
//! reflected in the engine's cached status, and removal tears the engine
//! down before the row goes away.

use crate::playback::PlaybackManager;
use jukebox_common::db::models::{PlayMode, SpeakerRow};
use jukebox_common::db::{settings, speakers};
use jukebox_common::Result;
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub struct SpeakerRegistry {
    db: Pool<Sqlite>,
    manager: Arc<PlaybackManager>,
}

impl SpeakerRegistry {
    pub fn new(db: Pool<Sqlite>, manager: Arc<PlaybackManager>) -> Self {
        Self { db, manager }
    }

    /// Register a speaker at the system default volume. The first speaker
    /// registered becomes the default output.
    pub async fn register(&self, name: &str, sink_name: &str) -> Result<SpeakerRow> {
        let volume = settings::get_default_speaker_volume(&self.db).await?;
        let is_default = speakers::count_speakers(&self.db).await? == 0;
        let speaker = speakers::insert_speaker(&self.db, name, sink_name, volume, is_default).await?;
        info!(speaker = %speaker.guid, name = %name, "speaker registered");
        Ok(speaker)
    }

    pub async fn get(&self, speaker_id: Uuid) -> Result<SpeakerRow> {
        speakers::get_speaker(&self.db, &speaker_id.to_string()).await
    }

    pub async fn list(&self) -> Result<Vec<SpeakerRow>> {
        speakers::list_speakers(&self.db).await
    }

    /// Rename the speaker and keep any live engine's snapshot in step
    pub async fn rename(&self, speaker_id: Uuid, name: &str) -> Result<()> {
        speakers::rename_speaker(&self.db, &speaker_id.to_string(), name).await?;
        if let Some(engine) = self.manager.engine_if_exists(speaker_id).await {
            engine.set_speaker_name(name);
        }
        Ok(())
    }

    pub async fn set_default(&self, speaker_id: Uuid) -> Result<()> {
        speakers::set_default_speaker(&self.db, &speaker_id.to_string()).await
    }

    pub async fn default_speaker(&self) -> Result<Option<SpeakerRow>> {
        speakers::get_default_speaker(&self.db).await
    }

    /// Persist the speaker's stored volume. The live volume of a playing
    /// engine is set through the playback manager, not here.
    pub async fn set_stored_volume(&self, speaker_id: Uuid, volume: u8) -> Result<()> {
        speakers::set_speaker_volume(&self.db, &speaker_id.to_string(), volume).await
    }

    pub async fn play_mode(&self, speaker_id: Uuid) -> Result<PlayMode> {
        speakers::get_play_mode(&self.db, &speaker_id.to_string()).await
    }

    pub async fn set_play_mode(&self, speaker_id: Uuid, mode: PlayMode) -> Result<()> {
        speakers::set_play_mode(&self.db, &speaker_id.to_string(), mode).await
    }

    pub async fn link_bluetooth(&self, speaker_id: Uuid, device_guid: Option<&str>) -> Result<()> {
        speakers::link_bt_device(&self.db, &speaker_id.to_string(), device_guid).await
    }

    /// Remove a speaker: engine first, then the row (queue items cascade).
    /// If the default speaker is removed, the oldest remaining one takes
    /// over as default.
    pub async fn remove(&self, speaker_id: Uuid) -> Result<()> {
        let speaker = self.get(speaker_id).await?;
        self.manager.remove_engine(speaker_id).await;
        speakers::delete_speaker(&self.db, &speaker.guid).await?;

        if speaker.is_default {
            if let Some(next) = speakers::list_speakers(&self.db).await?.into_iter().next() {
                speakers::set_default_speaker(&self.db, &next.guid).await?;
            }
        }
        info!(speaker = %speaker_id, "speaker removed");
        Ok(())
    }
}
