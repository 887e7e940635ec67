//! # Jukebox Player
//!
//! Playback orchestration daemon for the multi-room jukebox. Owns one live
//! engine per speaker, drives each over a socket-based control protocol,
//! reconciles engines against the persistent queue and the time-triggered
//! schedule, and pushes live status to observers.

pub mod api;
pub mod bluetooth;
pub mod channel;
pub mod config;
pub mod playback;
pub mod queue;
pub mod resolver;
pub mod schedule;
pub mod speakers;
pub mod status;

pub use config::Config;
pub use playback::{PlaybackEngine, PlaybackManager};
pub use queue::QueueCoordinator;
pub use schedule::ScheduleTimer;
pub use speakers::SpeakerRegistry;
pub use status::StatusBroadcaster;
