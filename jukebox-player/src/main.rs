//! Jukebox player daemon entry point
//!
//! Wires storage, the playback manager, the schedule timer, the bluetooth
//! listener, and the HTTP observation surface together, then runs until
//! interrupted.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jukebox_common::config::resolve_data_dir;
use jukebox_common::db::init::init_database;
use jukebox_player::api;
use jukebox_player::bluetooth;
use jukebox_player::resolver::PassthroughResolver;
use jukebox_player::{Config, PlaybackManager, QueueCoordinator, ScheduleTimer, StatusBroadcaster};

#[derive(Parser, Debug)]
#[command(name = "jukebox-player")]
#[command(about = "Playback orchestration daemon for the multi-room jukebox")]
#[command(version)]
struct Args {
    /// Data directory holding the database and player sockets
    #[arg(short, long, env = "JUKEBOX_DATA_DIR")]
    data_dir: Option<String>,

    /// HTTP bind address for the status surface
    #[arg(short, long, env = "JUKEBOX_BIND_ADDR")]
    bind_addr: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jukebox_player=debug,jukebox_common=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let data_dir = resolve_data_dir(args.data_dir.as_deref(), "JUKEBOX_DATA_DIR")
        .context("Failed to resolve data directory")?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

    let mut config = Config::from_data_dir(&data_dir);
    if let Some(bind_addr) = args.bind_addr {
        config.bind_addr = bind_addr;
    }
    std::fs::create_dir_all(&config.socket_dir)
        .with_context(|| format!("Failed to create socket directory {}", config.socket_dir.display()))?;

    info!("Starting jukebox-player, data dir {}", data_dir.display());

    let db = init_database(&config.db_path)
        .await
        .context("Failed to initialize database")?;

    let queue = Arc::new(QueueCoordinator::new(db.clone()));
    let broadcaster = Arc::new(StatusBroadcaster::new(config.status_capacity));
    let manager = Arc::new(PlaybackManager::new(
        db.clone(),
        Arc::clone(&queue),
        Arc::clone(&broadcaster),
        Arc::new(PassthroughResolver),
        config.engine_settings(),
    ));

    manager.init().await.context("Failed to pre-warm engines")?;

    let timer = ScheduleTimer::start(db.clone(), Arc::clone(&manager), config.sweep_interval);

    // The platform bluetooth watcher feeds this channel; the daemon only
    // consumes presence signals
    let (_bt_tx, bt_rx) = mpsc::channel::<bluetooth::BtSignal>(32);
    let bt_listener = bluetooth::spawn_signal_listener(db.clone(), bt_rx);

    let state = api::AppState {
        db,
        manager: Arc::clone(&manager),
        broadcaster,
    };
    api::serve(&config.bind_addr, state, shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Shutting down");
    timer.stop();
    bt_listener.abort();
    manager.destroy_all().await;

    Ok(())
}

/// Resolves on ctrl-c or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
