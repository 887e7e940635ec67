//! Bluetooth presence tracking
//!
//! Consumes connect/disconnect signals from whatever watches the bluetooth
//! stack and mirrors them into the database: device connected flags plus
//! the linked speaker's online flag. A disconnect marks the speaker offline
//! but never stops playback; the control channel surfaces real failures on
//! the next command.

use jukebox_common::db::{bluetooth, speakers};
use jukebox_common::Result;
use sqlx::{Pool, Sqlite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Presence change reported by the platform watcher
#[derive(Debug, Clone)]
pub enum BtSignal {
    Connected {
        address: String,
        name: Option<String>,
        sink_name: String,
    },
    Disconnected {
        address: String,
    },
}

/// Drain signals until the sender side closes. Individual signal failures
/// are logged and skipped; the listener itself never dies early.
pub fn spawn_signal_listener(
    db: Pool<Sqlite>,
    mut signals: mpsc::Receiver<BtSignal>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(signal) = signals.recv().await {
            if let Err(e) = apply_signal(&db, &signal).await {
                warn!("bluetooth signal not applied: {}", e);
            }
        }
        info!("bluetooth signal listener stopped");
    })
}

pub async fn apply_signal(db: &Pool<Sqlite>, signal: &BtSignal) -> Result<()> {
    match signal {
        BtSignal::Connected {
            address,
            name,
            sink_name,
        } => {
            let device =
                bluetooth::upsert_device(db, address, name.as_deref(), None, sink_name).await?;
            bluetooth::set_connected(db, address, true).await?;
            if let Some(speaker_guid) =
                speakers::set_online_by_bt_device(db, &device.guid, true).await?
            {
                info!(address = %address, speaker = %speaker_guid, "bluetooth speaker online");
            }
        }
        BtSignal::Disconnected { address } => {
            let device = bluetooth::get_by_address(db, address).await?;
            bluetooth::set_connected(db, address, false).await?;
            if let Some(speaker_guid) =
                speakers::set_online_by_bt_device(db, &device.guid, false).await?
            {
                info!(address = %address, speaker = %speaker_guid, "bluetooth speaker offline");
            }
        }
    }
    Ok(())
}
