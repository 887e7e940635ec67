//! Playback status types
//!
//! `Status` is the live playback snapshot for one speaker. It is owned and
//! mutated only by that speaker's engine, and fanned out to observers by the
//! status broadcaster.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Engine lifecycle state for one speaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    /// No connection attempt has been made yet
    Uninitialized,
    /// Connecting to the player process
    Starting,
    /// Connected, nothing loaded
    Ready,
    /// Media loaded and playing
    Playing,
    /// Media loaded and paused
    Paused,
    /// Unrecoverable channel error; next command retries the connection
    Failed,
}

/// Live playback snapshot for one speaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    /// Speaker this snapshot belongs to
    pub speaker_id: Uuid,
    /// Speaker display name
    pub speaker_name: String,
    /// True when media is loaded and not stopped
    pub playing: bool,
    /// True when loaded media is paused
    pub paused: bool,
    /// Title of the loaded media, if any
    pub title: Option<String>,
    /// Url of the loaded media, if any
    pub url: Option<String>,
    /// Total duration in milliseconds, when known
    pub duration_ms: Option<u64>,
    /// Current position in milliseconds
    pub position_ms: u64,
    /// Current volume (0-100)
    pub volume: u8,
    /// When this snapshot was produced
    pub updated_at: DateTime<Utc>,
}

impl Status {
    /// Empty snapshot: nothing loaded (also used when the engine fails to
    /// initialize, so observers always see a well-formed value).
    pub fn empty(speaker_id: Uuid, speaker_name: &str, volume: u8) -> Self {
        Self {
            speaker_id,
            speaker_name: speaker_name.to_string(),
            playing: false,
            paused: false,
            title: None,
            url: None,
            duration_ms: None,
            position_ms: 0,
            volume,
            updated_at: Utc::now(),
        }
    }
}
