//! Shared integration-test fixtures: an in-memory system wired like the
//! daemon, a fake player process speaking the control protocol over a real
//! Unix socket, and a canned media resolver.

#![allow(dead_code)]

use async_trait::async_trait;
use jukebox_common::db::init::init_memory_database;
use jukebox_common::db::speakers;
use jukebox_common::{Error, Result, Track};
use jukebox_player::channel::socket_path;
use jukebox_player::config::EngineSettings;
use jukebox_player::resolver::MediaResolver;
use jukebox_player::{PlaybackManager, QueueCoordinator, StatusBroadcaster};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

pub struct TestSystem {
    pub db: SqlitePool,
    pub queue: Arc<QueueCoordinator>,
    pub broadcaster: Arc<StatusBroadcaster>,
    pub manager: Arc<PlaybackManager>,
    pub socket_dir: tempfile::TempDir,
}

impl TestSystem {
    /// Spawn a fake player listening where the engine for this speaker
    /// will dial
    pub fn fake_player(&self, speaker_id: Uuid) -> FakePlayer {
        FakePlayer::spawn(self.socket_dir.path(), speaker_id)
    }
}

pub async fn test_system() -> TestSystem {
    let db = init_memory_database().await.unwrap();
    let socket_dir = tempfile::tempdir().unwrap();

    let settings = EngineSettings {
        socket_dir: socket_dir.path().to_path_buf(),
        send_timeout: Duration::from_millis(500),
        connect_attempts: 2,
        connect_backoff: Duration::from_millis(10),
    };

    let queue = Arc::new(QueueCoordinator::new(db.clone()));
    let broadcaster = Arc::new(StatusBroadcaster::new(16));
    let manager = Arc::new(PlaybackManager::new(
        db.clone(),
        Arc::clone(&queue),
        Arc::clone(&broadcaster),
        Arc::new(StubResolver),
        settings,
    ));

    TestSystem {
        db,
        queue,
        broadcaster,
        manager,
        socket_dir,
    }
}

pub async fn add_speaker(db: &SqlitePool, name: &str, is_default: bool) -> Uuid {
    let row = speakers::insert_speaker(db, name, &format!("sink.{}", name), 50, is_default)
        .await
        .unwrap();
    Uuid::parse_str(&row.guid).unwrap()
}

pub fn track(url: &str) -> Track {
    Track::from_url(url)
}

/// Resolves every query to a deterministic url
pub struct StubResolver;

#[async_trait]
impl MediaResolver for StubResolver {
    async fn resolve(&self, input: &str) -> Result<Track> {
        if input.starts_with("http://") || input.starts_with("https://") {
            return Ok(Track::from_url(input));
        }
        if input == "unresolvable" {
            return Err(Error::Resolution("nothing matched".to_string()));
        }
        Ok(Track {
            url: format!("http://resolved.local/{}", input.replace(' ', "-")),
            title: Some(input.to_string()),
            thumbnail: None,
            duration_ms: Some(180_000),
        })
    }
}

/// A player process stand-in on a real Unix socket. Records every command
/// it receives, acknowledges each one (unless silenced), and can push
/// unsolicited events to the connected engine.
pub struct FakePlayer {
    commands: Arc<Mutex<Vec<Value>>>,
    push_tx: mpsc::UnboundedSender<Value>,
    silent: Arc<AtomicBool>,
    accept_task: JoinHandle<()>,
}

impl FakePlayer {
    pub fn spawn(socket_dir: &Path, speaker_id: Uuid) -> Self {
        let path = socket_path(socket_dir, speaker_id);
        let listener = UnixListener::bind(&path).unwrap();

        let commands: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
        let silent = Arc::new(AtomicBool::new(false));
        let (push_tx, push_rx) = mpsc::unbounded_channel::<Value>();
        let push_rx = Arc::new(tokio::sync::Mutex::new(push_rx));

        let accept_task = {
            let commands = Arc::clone(&commands);
            let silent = Arc::clone(&silent);
            tokio::spawn(async move {
                // Serve connections one at a time; reconnects reuse the
                // same push queue
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        break;
                    };
                    serve(
                        stream,
                        Arc::clone(&commands),
                        Arc::clone(&push_rx),
                        Arc::clone(&silent),
                    )
                    .await;
                }
            })
        };

        Self {
            commands,
            push_tx,
            silent,
            accept_task,
        }
    }

    /// Commands received so far, as raw wire values
    pub fn commands(&self) -> Vec<Value> {
        self.commands.lock().unwrap().clone()
    }

    /// Just the `cmd` field of each received command, in order
    pub fn command_names(&self) -> Vec<String> {
        self.commands()
            .iter()
            .filter_map(|v| v.get("cmd").and_then(|c| c.as_str()).map(String::from))
            .collect()
    }

    /// Stop acknowledging commands; sends will time out
    pub fn go_silent(&self) {
        self.silent.store(true, Ordering::SeqCst);
    }

    pub fn push_end_of_media(&self) {
        let _ = self.push_tx.send(json!({"event": "end_of_media"}));
    }

    pub fn push_status(&self, status: Value) {
        let _ = self.push_tx.send(status);
    }
}

impl Drop for FakePlayer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn serve(
    stream: tokio::net::UnixStream,
    commands: Arc<Mutex<Vec<Value>>>,
    push_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Value>>>,
    silent: Arc<AtomicBool>,
) {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    let mut push_rx = push_rx.lock().await;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Ok(Some(line)) = line else { break };
                let Ok(value) = serde_json::from_str::<Value>(&line) else { continue };
                let id = value.get("request_id").and_then(|v| v.as_u64());
                commands.lock().unwrap().push(value);
                if silent.load(Ordering::SeqCst) {
                    continue;
                }
                if let Some(id) = id {
                    let reply = json!({"request_id": id, "ok": true});
                    if write.write_all(format!("{}\n", reply).as_bytes()).await.is_err() {
                        break;
                    }
                }
            }
            pushed = push_rx.recv() => {
                let Some(event) = pushed else { break };
                if write.write_all(format!("{}\n", event).as_bytes()).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Poll until the condition holds or the deadline passes
pub async fn wait_for(mut condition: impl FnMut() -> bool, deadline: Duration) -> bool {
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Async variant of [`wait_for`] for conditions that query the database
pub async fn wait_until<F, Fut>(mut condition: F, deadline: Duration) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition().await
}
