//! Database models
//!
//! Rows keep guids as TEXT; callers parse to `Uuid` at the boundary where
//! they need typed ids.

use crate::track::Track;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Queue item lifecycle
///
/// At most one item per speaker is `playing` or `paused` at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemStatus {
    Pending,
    Playing,
    Paused,
}

impl QueueItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueItemStatus::Pending => "pending",
            QueueItemStatus::Playing => "playing",
            QueueItemStatus::Paused => "paused",
        }
    }
}

impl FromStr for QueueItemStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QueueItemStatus::Pending),
            "playing" => Ok(QueueItemStatus::Playing),
            "paused" => Ok(QueueItemStatus::Paused),
            other => Err(format!("unknown queue item status: {}", other)),
        }
    }
}

impl fmt::Display for QueueItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schedule lifecycle
///
/// `fired` and `failed` are terminal; the sweep never retries them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Pending,
    Fired,
    Failed,
    Cancelled,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Pending => "pending",
            ScheduleStatus::Fired => "fired",
            ScheduleStatus::Failed => "failed",
            ScheduleStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for ScheduleStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ScheduleStatus::Pending),
            "fired" => Ok(ScheduleStatus::Fired),
            "failed" => Ok(ScheduleStatus::Failed),
            "cancelled" => Ok(ScheduleStatus::Cancelled),
            other => Err(format!("unknown schedule status: {}", other)),
        }
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-speaker auto-advance policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayMode {
    /// Play pending items in order, stop when exhausted
    Sequential,
    /// Re-append finished items to the end of the pending list
    RepeatAll,
    /// Replay the current item when it ends
    RepeatOne,
}

impl PlayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayMode::Sequential => "sequential",
            PlayMode::RepeatAll => "repeat_all",
            PlayMode::RepeatOne => "repeat_one",
        }
    }
}

impl FromStr for PlayMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "sequential" => Ok(PlayMode::Sequential),
            "repeat_all" => Ok(PlayMode::RepeatAll),
            "repeat_one" => Ok(PlayMode::RepeatOne),
            other => Err(format!("unknown play mode: {}", other)),
        }
    }
}

impl fmt::Display for PlayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SpeakerRow {
    pub guid: String,
    pub name: String,
    pub sink_name: String,
    pub volume: i64,
    pub is_default: bool,
    pub play_mode: String,
    pub bt_device_guid: Option<String>,
    pub online: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct QueueRow {
    pub guid: String,
    pub speaker_guid: String,
    pub url: String,
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    pub duration_ms: Option<i64>,
    pub position: i64,
    pub status: String,
    pub paused_position_ms: Option<i64>,
    pub created_at: String,
}

impl QueueRow {
    /// Track metadata carried by this row
    pub fn track(&self) -> Track {
        Track {
            url: self.url.clone(),
            title: self.title.clone(),
            thumbnail: self.thumbnail.clone(),
            duration_ms: self.duration_ms.map(|d| d as u64),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ScheduleRow {
    pub guid: String,
    pub speaker_guid: Option<String>,
    pub url: Option<String>,
    pub query: Option<String>,
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    pub duration_ms: Option<i64>,
    pub scheduled_at: String,
    pub status: String,
    pub group_guid: Option<String>,
    pub error: Option<String>,
    pub created_at: String,
}

impl ScheduleRow {
    /// Track metadata when the schedule already carries a resolved url.
    /// Query-only schedules return None and need resolution at fire time.
    pub fn track(&self) -> Option<Track> {
        self.url.as_ref().map(|url| Track {
            url: url.clone(),
            title: self.title.clone(),
            thumbnail: self.thumbnail.clone(),
            duration_ms: self.duration_ms.map(|d| d as u64),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BluetoothDeviceRow {
    pub guid: String,
    pub address: String,
    pub name: Option<String>,
    pub alias: Option<String>,
    pub sink_name: String,
    pub connected: bool,
}
