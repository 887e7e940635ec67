//! Queue database queries
//!
//! Position values are dense `0..n-1` within each speaker's pending set and
//! carry no meaning beyond ordering. Every mutation that can disturb
//! ordering renumbers inside one transaction.

use crate::db::models::{QueueItemStatus, QueueRow};
use crate::track::Track;
use crate::{Error, Result};
use chrono::Utc;
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

/// Append a track to the end of the speaker's pending ordering
pub async fn insert_item(db: &Pool<Sqlite>, speaker_guid: &str, track: &Track) -> Result<QueueRow> {
    let mut tx = db.begin().await?;
    let row = insert_item_tx(&mut tx, speaker_guid, track).await?;
    tx.commit().await?;
    Ok(row)
}

/// Append several tracks in the given order, atomically
pub async fn bulk_insert(
    db: &Pool<Sqlite>,
    speaker_guid: &str,
    tracks: &[Track],
) -> Result<Vec<QueueRow>> {
    let mut tx = db.begin().await?;
    let mut rows = Vec::with_capacity(tracks.len());
    for track in tracks {
        rows.push(insert_item_tx(&mut tx, speaker_guid, track).await?);
    }
    tx.commit().await?;
    Ok(rows)
}

async fn insert_item_tx(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    speaker_guid: &str,
    track: &Track,
) -> Result<QueueRow> {
    let next_position: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(position), -1) + 1 FROM queue
         WHERE speaker_guid = ? AND status = 'pending'",
    )
    .bind(speaker_guid)
    .fetch_one(&mut **tx)
    .await?;

    let guid = Uuid::new_v4().to_string();
    let created_at = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO queue (guid, speaker_guid, url, title, thumbnail, duration_ms,
                           position, status, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', ?)
        "#,
    )
    .bind(&guid)
    .bind(speaker_guid)
    .bind(&track.url)
    .bind(&track.title)
    .bind(&track.thumbnail)
    .bind(track.duration_ms.map(|d| d as i64))
    .bind(next_position)
    .bind(&created_at)
    .execute(&mut **tx)
    .await?;

    sqlx::query_as::<_, QueueRow>("SELECT * FROM queue WHERE guid = ?")
        .bind(&guid)
        .fetch_one(&mut **tx)
        .await
        .map_err(Error::from)
}

pub async fn get_item(db: &Pool<Sqlite>, guid: &str) -> Result<QueueRow> {
    sqlx::query_as::<_, QueueRow>("SELECT * FROM queue WHERE guid = ?")
        .bind(guid)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| Error::NotFound(format!("queue item {}", guid)))
}

/// Pending items for a speaker, ordered by position
pub async fn pending_for_speaker(db: &Pool<Sqlite>, speaker_guid: &str) -> Result<Vec<QueueRow>> {
    Ok(sqlx::query_as::<_, QueueRow>(
        "SELECT * FROM queue WHERE speaker_guid = ? AND status = 'pending'
         ORDER BY position",
    )
    .bind(speaker_guid)
    .fetch_all(db)
    .await?)
}

/// The speaker's playing or paused item, if any
pub async fn active_for_speaker(db: &Pool<Sqlite>, speaker_guid: &str) -> Result<Option<QueueRow>> {
    Ok(sqlx::query_as::<_, QueueRow>(
        "SELECT * FROM queue WHERE speaker_guid = ? AND status IN ('playing', 'paused')
         LIMIT 1",
    )
    .bind(speaker_guid)
    .fetch_all(db)
    .await?
    .into_iter()
    .next())
}

/// Full view for a speaker: the active item first, then pending in order
pub async fn list_for_speaker(db: &Pool<Sqlite>, speaker_guid: &str) -> Result<Vec<QueueRow>> {
    Ok(sqlx::query_as::<_, QueueRow>(
        "SELECT * FROM queue WHERE speaker_guid = ?
         ORDER BY CASE WHEN status = 'pending' THEN 1 ELSE 0 END, position",
    )
    .bind(speaker_guid)
    .fetch_all(db)
    .await?)
}

pub async fn set_status(
    db: &Pool<Sqlite>,
    guid: &str,
    status: QueueItemStatus,
    paused_position_ms: Option<i64>,
) -> Result<()> {
    let result = sqlx::query("UPDATE queue SET status = ?, paused_position_ms = ? WHERE guid = ?")
        .bind(status.as_str())
        .bind(paused_position_ms)
        .bind(guid)
        .execute(db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("queue item {}", guid)));
    }
    Ok(())
}

/// Delete one item and renumber the speaker's pending set
pub async fn delete_item(db: &Pool<Sqlite>, guid: &str) -> Result<()> {
    let item = get_item(db, guid).await?;

    let mut tx = db.begin().await?;
    sqlx::query("DELETE FROM queue WHERE guid = ?")
        .bind(guid)
        .execute(&mut *tx)
        .await?;
    renumber_pending(&mut tx, &item.speaker_guid).await?;
    tx.commit().await?;
    Ok(())
}

/// Delete one item only if it is still pending, checked inside the same
/// transaction as the delete. A concurrent promotion to `playing` makes
/// this fail with `InvalidState` instead of deleting the active row.
pub async fn remove_pending_item(db: &Pool<Sqlite>, guid: &str) -> Result<()> {
    let mut tx = db.begin().await?;

    let row: Option<(String, String)> =
        sqlx::query_as("SELECT status, speaker_guid FROM queue WHERE guid = ?")
            .bind(guid)
            .fetch_optional(&mut *tx)
            .await?;
    let (status, speaker_guid) =
        row.ok_or_else(|| Error::NotFound(format!("queue item {}", guid)))?;
    if status != QueueItemStatus::Pending.as_str() {
        return Err(Error::InvalidState(format!(
            "queue item {} is not pending",
            guid
        )));
    }

    sqlx::query("DELETE FROM queue WHERE guid = ?")
        .bind(guid)
        .execute(&mut *tx)
        .await?;
    renumber_pending(&mut tx, &speaker_guid).await?;
    tx.commit().await?;
    Ok(())
}

/// Promote a pending item to `playing`, replacing any current active item
/// (the replaced item is removed). Pending positions are renumbered.
pub async fn promote_item(db: &Pool<Sqlite>, guid: &str) -> Result<QueueRow> {
    let item = get_item(db, guid).await?;
    if item.status != QueueItemStatus::Pending.as_str() {
        return Err(Error::InvalidState(format!(
            "queue item {} is not pending",
            guid
        )));
    }

    let mut tx = db.begin().await?;
    sqlx::query(
        "DELETE FROM queue WHERE speaker_guid = ? AND status IN ('playing', 'paused')",
    )
    .bind(&item.speaker_guid)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE queue SET status = 'playing', paused_position_ms = NULL WHERE guid = ?")
        .bind(guid)
        .execute(&mut *tx)
        .await?;

    renumber_pending(&mut tx, &item.speaker_guid).await?;
    tx.commit().await?;

    get_item(db, guid).await
}

/// Move a pending item so it lands exactly at `new_position`; everything
/// else shifts contiguously.
pub async fn reorder_item(db: &Pool<Sqlite>, guid: &str, new_position: i64) -> Result<()> {
    let item = get_item(db, guid).await?;
    if item.status != QueueItemStatus::Pending.as_str() {
        return Err(Error::InvalidState(format!(
            "queue item {} is not pending",
            guid
        )));
    }

    let mut tx = db.begin().await?;

    let mut guids: Vec<String> = sqlx::query_scalar(
        "SELECT guid FROM queue WHERE speaker_guid = ? AND status = 'pending'
         ORDER BY position",
    )
    .bind(&item.speaker_guid)
    .fetch_all(&mut *tx)
    .await?;

    let from = guids
        .iter()
        .position(|g| g == guid)
        .ok_or_else(|| Error::NotFound(format!("queue item {}", guid)))?;
    let moved = guids.remove(from);
    let to = new_position.clamp(0, guids.len() as i64) as usize;
    guids.insert(to, moved);

    apply_positions(&mut tx, &guids).await?;
    tx.commit().await?;
    Ok(())
}

/// Rewrite the pending ordering to exactly `ordered_guids` (shuffle support).
/// The guid set must be the speaker's full pending set.
pub async fn apply_pending_order(
    db: &Pool<Sqlite>,
    speaker_guid: &str,
    ordered_guids: &[String],
) -> Result<()> {
    let mut tx = db.begin().await?;

    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM queue WHERE speaker_guid = ? AND status = 'pending'",
    )
    .bind(speaker_guid)
    .fetch_one(&mut *tx)
    .await?;

    if count as usize != ordered_guids.len() {
        return Err(Error::InvalidState(format!(
            "ordering covers {} items but speaker has {} pending",
            ordered_guids.len(),
            count
        )));
    }

    apply_positions(&mut tx, ordered_guids).await?;
    tx.commit().await?;
    Ok(())
}

/// Remove all pending (not playing/paused) items for a speaker
pub async fn clear_pending(db: &Pool<Sqlite>, speaker_guid: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM queue WHERE speaker_guid = ? AND status = 'pending'")
        .bind(speaker_guid)
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}

pub async fn count_pending(db: &Pool<Sqlite>, speaker_guid: &str) -> Result<i64> {
    Ok(sqlx::query_scalar(
        "SELECT COUNT(*) FROM queue WHERE speaker_guid = ? AND status = 'pending'",
    )
    .bind(speaker_guid)
    .fetch_one(db)
    .await?)
}

async fn apply_positions(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    ordered_guids: &[String],
) -> Result<()> {
    for (index, guid) in ordered_guids.iter().enumerate() {
        sqlx::query("UPDATE queue SET position = ? WHERE guid = ?")
            .bind(index as i64)
            .bind(guid)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

/// Reassign dense 0..n-1 positions to a speaker's pending set, preserving
/// relative order.
async fn renumber_pending(tx: &mut sqlx::Transaction<'_, Sqlite>, speaker_guid: &str) -> Result<()> {
    let guids: Vec<String> = sqlx::query_scalar(
        "SELECT guid FROM queue WHERE speaker_guid = ? AND status = 'pending'
         ORDER BY position",
    )
    .bind(speaker_guid)
    .fetch_all(&mut **tx)
    .await?;

    apply_positions(tx, &guids).await
}
