//! Schedule Timer
//!
//! A fixed-interval sweep, independent of request traffic, that fires due
//! schedules through the Playback Manager. One bad entry never blocks the
//! rest of the sweep or stops the timer. Outcomes are recorded on the
//! schedule rows (`fired`/`failed`) since there is no caller to receive an
//! error; `fired` and `failed` entries are never retried.

use crate::playback::PlaybackManager;
use crate::queue::parse_guid;
use chrono::Utc;
use jukebox_common::db::models::ScheduleRow;
use jukebox_common::db::{schedules, speakers};
use jukebox_common::{Error, Result, Track};
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use uuid::Uuid;

pub struct ScheduleTimer {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ScheduleTimer {
    /// Start the recurring sweep
    pub fn start(db: Pool<Sqlite>, manager: Arc<PlaybackManager>, interval: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = run_sweep(&db, &manager).await {
                    // Selection failed entirely; individual entry failures
                    // are already recorded inside the sweep
                    warn!("schedule sweep failed: {}", e);
                }
            }
        });
        info!("schedule timer started, interval {:?}", interval);
        Self {
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Cancel the recurring sweep. Idempotent; safe when already stopped.
    pub fn stop(&self) {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.abort();
            info!("schedule timer stopped");
        }
    }
}

/// One sweep: select due pending schedules in due-time order and fire each
/// independently. Group members carry no atomicity; they simply share a
/// group guid and fire in their individual due order.
pub async fn run_sweep(db: &Pool<Sqlite>, manager: &Arc<PlaybackManager>) -> Result<()> {
    let due = schedules::due_schedules(db, Utc::now()).await?;
    for schedule in due {
        match fire_schedule(db, manager, &schedule).await {
            Ok(()) => {
                info!(schedule = %schedule.guid, "schedule fired");
                if let Err(e) = schedules::mark_fired(db, &schedule.guid).await {
                    warn!(schedule = %schedule.guid, "could not mark fired: {}", e);
                }
            }
            Err(e) => {
                warn!(schedule = %schedule.guid, "schedule failed: {}", e);
                if let Err(mark_err) =
                    schedules::mark_failed(db, &schedule.guid, &e.to_string()).await
                {
                    warn!(schedule = %schedule.guid, "could not mark failed: {}", mark_err);
                }
            }
        }
    }
    Ok(())
}

async fn fire_schedule(
    db: &Pool<Sqlite>,
    manager: &Arc<PlaybackManager>,
    schedule: &ScheduleRow,
) -> Result<()> {
    let speaker_id = resolve_target_speaker(db, schedule).await?;

    let track: Track = match schedule.track() {
        Some(track) => track,
        None => {
            let query = schedule
                .query
                .as_deref()
                .ok_or_else(|| Error::InvalidState("schedule has no url or query".to_string()))?;
            manager.resolver().resolve(query).await?
        }
    };

    // Fired schedules preempt whatever the speaker is doing
    manager.play_track(speaker_id, &track).await?;
    Ok(())
}

/// Explicit binding wins; otherwise the current default speaker. A
/// schedule with neither fails with a recorded reason.
async fn resolve_target_speaker(db: &Pool<Sqlite>, schedule: &ScheduleRow) -> Result<Uuid> {
    match &schedule.speaker_guid {
        Some(guid) => {
            speakers::get_speaker(db, guid).await?;
            parse_guid(guid)
        }
        None => match speakers::get_default_speaker(db).await? {
            Some(speaker) => parse_guid(&speaker.guid),
            None => Err(Error::InvalidState(
                "no target speaker resolves: schedule has no binding and no default speaker exists"
                    .to_string(),
            )),
        },
    }
}
