//! Playback engines and their registry

pub mod engine;
pub mod manager;

pub use engine::PlaybackEngine;
pub use manager::PlaybackManager;
