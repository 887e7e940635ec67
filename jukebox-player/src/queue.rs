//! Queue Coordinator
//!
//! Owns the ordered pending-item list per speaker and the advance policy.
//! Ordering invariants (dense positions, at most one active item) are
//! enforced by the transactional queries in `jukebox_common::db::queue`;
//! this layer adds the policy: what may be removed, how shuffle treats the
//! active item, and which item plays next when the current one ends.

use jukebox_common::db::models::{PlayMode, QueueItemStatus, QueueRow};
use jukebox_common::db::{queue, speakers};
use jukebox_common::{Error, Result, Track};
use rand::seq::SliceRandom;
use sqlx::{Pool, Sqlite};
use tracing::debug;
use uuid::Uuid;

pub struct QueueCoordinator {
    db: Pool<Sqlite>,
}

impl QueueCoordinator {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    /// Append one track to the end of the speaker's pending ordering
    pub async fn enqueue(&self, speaker_id: Uuid, track: &Track) -> Result<QueueRow> {
        queue::insert_item(&self.db, &speaker_id.to_string(), track).await
    }

    /// Append several tracks in the given order
    pub async fn bulk_enqueue(&self, speaker_id: Uuid, tracks: &[Track]) -> Result<Vec<QueueRow>> {
        queue::bulk_insert(&self.db, &speaker_id.to_string(), tracks).await
    }

    /// Active item first, then pending items in order
    pub async fn list(&self, speaker_id: Uuid) -> Result<Vec<QueueRow>> {
        queue::list_for_speaker(&self.db, &speaker_id.to_string()).await
    }

    pub async fn pending(&self, speaker_id: Uuid) -> Result<Vec<QueueRow>> {
        queue::pending_for_speaker(&self.db, &speaker_id.to_string()).await
    }

    pub async fn active(&self, speaker_id: Uuid) -> Result<Option<QueueRow>> {
        queue::active_for_speaker(&self.db, &speaker_id.to_string()).await
    }

    /// Move a pending item so it lands exactly at `new_position`
    pub async fn reorder(&self, item_guid: &str, new_position: i64) -> Result<()> {
        queue::reorder_item(&self.db, item_guid, new_position).await
    }

    /// Randomize the pending ordering. The playing/paused item, if any, is
    /// not part of the pending set and is left untouched.
    pub async fn shuffle(&self, speaker_id: Uuid) -> Result<()> {
        let pending = self.pending(speaker_id).await?;
        let mut guids: Vec<String> = pending.into_iter().map(|r| r.guid).collect();
        guids.shuffle(&mut rand::thread_rng());
        queue::apply_pending_order(&self.db, &speaker_id.to_string(), &guids).await
    }

    /// Remove a pending item. The actively playing/paused item cannot be
    /// removed this way; stop or skip instead. The pending check runs in
    /// the same transaction as the delete, so an item promoted after the
    /// caller saw it pending is rejected, not deleted.
    pub async fn remove(&self, item_guid: &str) -> Result<()> {
        queue::remove_pending_item(&self.db, item_guid)
            .await
            .map_err(|e| match e {
                Error::InvalidState(_) => Error::InvalidState(
                    "item is currently playing; stop or skip instead".to_string(),
                ),
                other => other,
            })
    }

    /// Speaker owning a queue item
    pub async fn owner(&self, item_guid: &str) -> Result<Uuid> {
        let item = queue::get_item(&self.db, item_guid).await?;
        parse_guid(&item.speaker_guid)
    }

    /// Remove all pending items, leaving the active one in place
    pub async fn clear_pending(&self, speaker_id: Uuid) -> Result<u64> {
        queue::clear_pending(&self.db, &speaker_id.to_string()).await
    }

    /// Promote a specific pending item to play immediately, ahead of its
    /// position order. Returns the owning speaker and the track to load.
    pub async fn promote(&self, item_guid: &str) -> Result<(Uuid, Track)> {
        let row = queue::promote_item(&self.db, item_guid).await?;
        let speaker_id = parse_guid(&row.speaker_guid)?;
        Ok((speaker_id, row.track()))
    }

    /// Choose and promote the next item after the current one ended.
    /// Consults the speaker's play mode; None means the queue is exhausted
    /// and the engine should stop.
    pub async fn advance_after_end(&self, speaker_id: Uuid) -> Result<Option<Track>> {
        let speaker_guid = speaker_id.to_string();
        let mode = speakers::get_play_mode(&self.db, &speaker_guid).await?;
        let active = queue::active_for_speaker(&self.db, &speaker_guid).await?;

        if let Some(active) = &active {
            match mode {
                PlayMode::RepeatOne => {
                    // Replay the same item; keep its row active
                    queue::set_status(&self.db, &active.guid, QueueItemStatus::Playing, None)
                        .await?;
                    return Ok(Some(active.track()));
                }
                PlayMode::RepeatAll => {
                    // Finished item goes back to the end of the pending list
                    let track = active.track();
                    queue::delete_item(&self.db, &active.guid).await?;
                    queue::insert_item(&self.db, &speaker_guid, &track).await?;
                }
                PlayMode::Sequential => {
                    queue::delete_item(&self.db, &active.guid).await?;
                }
            }
        }

        let pending = queue::pending_for_speaker(&self.db, &speaker_guid).await?;
        match pending.first() {
            Some(next) => {
                let row = queue::promote_item(&self.db, &next.guid).await?;
                Ok(Some(row.track()))
            }
            None => {
                debug!(speaker = %speaker_id, "queue exhausted");
                Ok(None)
            }
        }
    }

    /// Drop the active item, if any (play completed elsewhere, failed, or
    /// was explicitly replaced/stopped)
    pub async fn discard_active(&self, speaker_id: Uuid) -> Result<()> {
        if let Some(active) = self.active(speaker_id).await? {
            queue::delete_item(&self.db, &active.guid).await?;
        }
        Ok(())
    }

    /// Record the pause offset on the active row so it survives restarts
    pub async fn record_paused(&self, speaker_id: Uuid, position_ms: u64) -> Result<()> {
        if let Some(active) = self.active(speaker_id).await? {
            queue::set_status(
                &self.db,
                &active.guid,
                QueueItemStatus::Paused,
                Some(position_ms as i64),
            )
            .await?;
        }
        Ok(())
    }

    pub async fn record_resumed(&self, speaker_id: Uuid) -> Result<()> {
        if let Some(active) = self.active(speaker_id).await? {
            queue::set_status(&self.db, &active.guid, QueueItemStatus::Playing, None).await?;
        }
        Ok(())
    }

    pub async fn play_mode(&self, speaker_id: Uuid) -> Result<PlayMode> {
        speakers::get_play_mode(&self.db, &speaker_id.to_string()).await
    }

    pub async fn set_play_mode(&self, speaker_id: Uuid, mode: PlayMode) -> Result<()> {
        speakers::set_play_mode(&self.db, &speaker_id.to_string(), mode).await
    }
}

pub(crate) fn parse_guid(guid: &str) -> Result<Uuid> {
    Uuid::parse_str(guid).map_err(|e| Error::InvalidState(format!("invalid guid {}: {}", guid, e)))
}
