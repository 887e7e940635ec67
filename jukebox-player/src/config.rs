//! Daemon configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Runtime configuration for the player daemon
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database file
    pub db_path: PathBuf,
    /// Directory holding per-speaker player control sockets
    pub socket_dir: PathBuf,
    /// HTTP bind address for the status subscription surface
    pub bind_addr: String,
    /// Bounded wait for every control command
    pub send_timeout: Duration,
    /// Connect attempts before a play fails
    pub connect_attempts: u32,
    /// Initial backoff between connect attempts (doubles per attempt)
    pub connect_backoff: Duration,
    /// Schedule sweep interval
    pub sweep_interval: Duration,
    /// Status broadcast channel capacity per subscriber set
    pub status_capacity: usize,
}

impl Config {
    /// Defaults rooted in a data directory
    pub fn from_data_dir(data_dir: &Path) -> Self {
        Self {
            db_path: data_dir.join("jukebox.db"),
            socket_dir: data_dir.join("sockets"),
            bind_addr: "0.0.0.0:5720".to_string(),
            send_timeout: Duration::from_secs(5),
            connect_attempts: 3,
            connect_backoff: Duration::from_millis(250),
            sweep_interval: Duration::from_secs(30),
            status_capacity: 100,
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            socket_dir: self.socket_dir.clone(),
            send_timeout: self.send_timeout,
            connect_attempts: self.connect_attempts,
            connect_backoff: self.connect_backoff,
        }
    }
}

/// The subset of configuration each playback engine needs
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub socket_dir: PathBuf,
    pub send_timeout: Duration,
    pub connect_attempts: u32,
    pub connect_backoff: Duration,
}
