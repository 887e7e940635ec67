//! Control channel to one external media-player process
//!
//! Newline-delimited JSON over a per-speaker Unix socket. Requests carry a
//! locally generated `request_id`; the reply with the matching id resolves
//! the pending call. Messages without a `request_id` are unsolicited events
//! and go to the registered observer instead. Writes are serialized behind
//! one lock; any number of requests may be logically in flight at once.

use jukebox_common::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Commands understood by the player process
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum PlayerCommand {
    Load { url: String },
    Stop,
    Pause,
    Resume,
    Seek { position_ms: u64 },
    SetVolume { volume: u8 },
}

/// Unsolicited messages pushed by the player process
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// Live playback report
    Status(StatusReport),
    /// Current media finished
    EndOfMedia,
    /// Socket closed or errored; the channel is now disconnected
    Closed,
}

/// Payload of a `status` event from the player
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusReport {
    #[serde(default)]
    pub playing: bool,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub position_ms: u64,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub title: Option<String>,
}

/// Control socket path for a speaker, derived deterministically from its id
pub fn socket_path(socket_dir: &Path, speaker_id: Uuid) -> PathBuf {
    socket_dir.join(format!("player-{}.sock", speaker_id))
}

#[derive(Serialize)]
struct WireRequest<'a> {
    request_id: u64,
    #[serde(flatten)]
    command: &'a PlayerCommand,
}

type ReplyResult = std::result::Result<Value, String>;

struct ChannelShared {
    pending: std::sync::Mutex<HashMap<u64, oneshot::Sender<ReplyResult>>>,
    connected: AtomicBool,
    event_tx: mpsc::Sender<ChannelEvent>,
}

/// One speaker's transport to its player process
pub struct ControlChannel {
    socket_path: PathBuf,
    send_timeout: Duration,
    next_id: AtomicU64,
    writer: Mutex<Option<OwnedWriteHalf>>,
    reader_task: std::sync::Mutex<Option<JoinHandle<()>>>,
    shared: Arc<ChannelShared>,
}

impl ControlChannel {
    /// Create a disconnected channel. The returned receiver is the single
    /// observer for unsolicited events; the engine owns it.
    pub fn new(socket_path: PathBuf, send_timeout: Duration) -> (Self, mpsc::Receiver<ChannelEvent>) {
        let (event_tx, event_rx) = mpsc::channel(64);
        let channel = Self {
            socket_path,
            send_timeout,
            next_id: AtomicU64::new(1),
            writer: Mutex::new(None),
            reader_task: std::sync::Mutex::new(None),
            shared: Arc::new(ChannelShared {
                pending: std::sync::Mutex::new(HashMap::new()),
                connected: AtomicBool::new(false),
                event_tx,
            }),
        };
        (channel, event_rx)
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Open the socket. `ChannelUnavailable` when the socket is missing or
    /// refuses, which usually means the player process is still starting;
    /// callers retry with backoff.
    pub async fn connect(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        let stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            Error::ChannelUnavailable(format!("{}: {}", self.socket_path.display(), e))
        })?;
        let (read_half, write_half) = stream.into_split();

        *self.writer.lock().await = Some(write_half);
        self.shared.connected.store(true, Ordering::SeqCst);

        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(read_loop(read_half, shared));
        if let Some(stale) = self.reader_task.lock().unwrap().replace(task) {
            stale.abort();
        }

        debug!("connected control channel {}", self.socket_path.display());
        Ok(())
    }

    /// Issue one command and wait for its correlated reply, bounded by the
    /// configured timeout.
    pub async fn send(&self, command: &PlayerCommand) -> Result<Value> {
        if !self.is_connected() {
            return Err(Error::ChannelClosed("not connected".to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().unwrap().insert(id, tx);

        let mut line = serde_json::to_string(&WireRequest {
            request_id: id,
            command,
        })
        .map_err(|e| Error::Playback(format!("encode command: {}", e)))?;
        line.push('\n');

        {
            let mut writer = self.writer.lock().await;
            let Some(w) = writer.as_mut() else {
                self.shared.pending.lock().unwrap().remove(&id);
                return Err(Error::ChannelClosed("not connected".to_string()));
            };
            if let Err(e) = w.write_all(line.as_bytes()).await {
                *writer = None;
                drop(writer);
                self.shared.pending.lock().unwrap().remove(&id);
                self.shared.connected.store(false, Ordering::SeqCst);
                fail_pending(&self.shared, "write failed");
                return Err(Error::ChannelClosed(e.to_string()));
            }
        }

        let timeout_ms = self.send_timeout.as_millis() as u64;
        match tokio::time::timeout(self.send_timeout, rx).await {
            Err(_) => {
                self.shared.pending.lock().unwrap().remove(&id);
                Err(Error::ChannelTimeout(timeout_ms))
            }
            Ok(Err(_)) => Err(Error::ChannelClosed("connection lost".to_string())),
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(message))) => Err(Error::Playback(message)),
        }
    }

    /// Drop the connection and fail any in-flight calls. Safe to call when
    /// never connected, and safe to call twice.
    pub async fn close(&self) {
        if let Some(task) = self.reader_task.lock().unwrap().take() {
            task.abort();
        }
        *self.writer.lock().await = None;
        self.shared.connected.store(false, Ordering::SeqCst);
        fail_pending(&self.shared, "channel closed");
    }
}

fn fail_pending(shared: &ChannelShared, reason: &str) {
    let pending: Vec<_> = shared.pending.lock().unwrap().drain().collect();
    for (_, tx) in pending {
        // Receiver may already be gone; transport errors are surfaced, not retried
        let _ = tx.send(Err(reason.to_string()));
    }
}

async fn read_loop(read_half: OwnedReadHalf, shared: Arc<ChannelShared>) {
    let mut lines = BufReader::new(read_half).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                dispatch(&shared, &line).await;
            }
            Ok(None) => break,
            Err(e) => {
                warn!("control channel read error: {}", e);
                break;
            }
        }
    }

    shared.connected.store(false, Ordering::SeqCst);
    fail_pending(&shared, "connection closed by player");
    let _ = shared.event_tx.send(ChannelEvent::Closed).await;
}

async fn dispatch(shared: &Arc<ChannelShared>, line: &str) {
    let value: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            warn!("unparseable message from player: {}", e);
            return;
        }
    };

    // Replies carry the request id they correlate with
    if let Some(id) = value.get("request_id").and_then(|v| v.as_u64()) {
        let sender = shared.pending.lock().unwrap().remove(&id);
        match sender {
            Some(tx) => {
                let ok = value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false);
                let result = if ok {
                    Ok(value)
                } else {
                    Err(value
                        .get("error")
                        .and_then(|v| v.as_str())
                        .unwrap_or("player error")
                        .to_string())
                };
                let _ = tx.send(result);
            }
            None => debug!("reply for unknown request id {}", id),
        }
        return;
    }

    match value.get("event").and_then(|v| v.as_str()) {
        Some("status") => match serde_json::from_value::<StatusReport>(value.clone()) {
            Ok(report) => {
                let _ = shared.event_tx.send(ChannelEvent::Status(report)).await;
            }
            Err(e) => warn!("bad status event from player: {}", e),
        },
        Some("end_of_media") => {
            let _ = shared.event_tx.send(ChannelEvent::EndOfMedia).await;
        }
        Some(other) => debug!("ignoring player event: {}", other),
        None => debug!("ignoring message without request_id or event"),
    }
}
