//! Common error types for the jukebox workspace
//!
//! One taxonomy shared by every component so user-facing failures carry a
//! stable code regardless of which layer raised them.

use thiserror::Error;

/// Common result type for jukebox operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the playback orchestration subsystem
#[derive(Error, Debug)]
pub enum Error {
    /// Control socket does not exist or refused the connection
    /// (the external player process is not running or not ready yet)
    #[error("Channel unavailable: {0}")]
    ChannelUnavailable(String),

    /// Control socket closed or errored while calls were in flight
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// A control command did not receive a reply within the bounded wait
    #[error("Channel timeout after {0} ms")]
    ChannelTimeout(u64),

    /// The external player rejected or failed to load media
    #[error("Playback error: {0}")]
    Playback(String),

    /// Operation not valid in the current state
    /// (e.g. removing the actively playing queue item)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A free-text query could not be resolved to a playable url
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Stable machine-readable code for user-facing error reporting.
    ///
    /// Socket paths and other internals stay out of the code; the display
    /// message carries the human-readable detail.
    pub fn code(&self) -> &'static str {
        match self {
            Error::ChannelUnavailable(_) => "channel_unavailable",
            Error::ChannelClosed(_) => "channel_closed",
            Error::ChannelTimeout(_) => "channel_timeout",
            Error::Playback(_) => "playback_error",
            Error::InvalidState(_) => "invalid_state",
            Error::NotFound(_) => "not_found",
            Error::Resolution(_) => "resolution_error",
            Error::Database(_) => "database_error",
            Error::Io(_) => "io_error",
            Error::Config(_) => "config_error",
        }
    }
}
