//! # Jukebox Common Library
//!
//! Shared code for the multi-room jukebox daemon:
//! - Error taxonomy used across the workspace
//! - Playback status and track metadata types
//! - Database initialization, models, and per-entity queries
//! - Configuration file resolution

pub mod config;
pub mod db;
pub mod error;
pub mod status;
pub mod track;

pub use error::{Error, Result};
pub use status::{PlayerState, Status};
pub use track::{MediaSelector, PlayRequest, Track};
