//! Speaker database queries

use crate::db::models::{PlayMode, SpeakerRow};
use crate::{Error, Result};
use chrono::Utc;
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

/// Insert a new speaker. The caller decides the default flag; use
/// [`set_default_speaker`] to move the flag afterwards.
pub async fn insert_speaker(
    db: &Pool<Sqlite>,
    name: &str,
    sink_name: &str,
    volume: u8,
    is_default: bool,
) -> Result<SpeakerRow> {
    let guid = Uuid::new_v4().to_string();
    let created_at = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO speakers (guid, name, sink_name, volume, is_default, play_mode, online, created_at)
        VALUES (?, ?, ?, ?, ?, 'sequential', 0, ?)
        "#,
    )
    .bind(&guid)
    .bind(name)
    .bind(sink_name)
    .bind(volume as i64)
    .bind(is_default)
    .bind(&created_at)
    .execute(db)
    .await?;

    get_speaker(db, &guid).await
}

/// Get speaker by guid, `NotFound` if absent
pub async fn get_speaker(db: &Pool<Sqlite>, guid: &str) -> Result<SpeakerRow> {
    sqlx::query_as::<_, SpeakerRow>("SELECT * FROM speakers WHERE guid = ?")
        .bind(guid)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| Error::NotFound(format!("speaker {}", guid)))
}

/// List all speakers ordered by creation time
pub async fn list_speakers(db: &Pool<Sqlite>) -> Result<Vec<SpeakerRow>> {
    Ok(
        sqlx::query_as::<_, SpeakerRow>("SELECT * FROM speakers ORDER BY created_at")
            .fetch_all(db)
            .await?,
    )
}

/// Current default speaker, if one is flagged
pub async fn get_default_speaker(db: &Pool<Sqlite>) -> Result<Option<SpeakerRow>> {
    Ok(
        sqlx::query_as::<_, SpeakerRow>("SELECT * FROM speakers WHERE is_default = 1 LIMIT 1")
            .fetch_optional(db)
            .await?,
    )
}

/// Move the default flag to one speaker, clearing all others in the same
/// transaction so at most one speaker is ever default.
pub async fn set_default_speaker(db: &Pool<Sqlite>, guid: &str) -> Result<()> {
    // Fail early with NotFound rather than silently clearing every flag
    get_speaker(db, guid).await?;

    let mut tx = db.begin().await?;
    sqlx::query("UPDATE speakers SET is_default = 0")
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE speakers SET is_default = 1 WHERE guid = ?")
        .bind(guid)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

pub async fn rename_speaker(db: &Pool<Sqlite>, guid: &str, name: &str) -> Result<()> {
    let result = sqlx::query("UPDATE speakers SET name = ? WHERE guid = ?")
        .bind(name)
        .bind(guid)
        .execute(db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("speaker {}", guid)));
    }
    Ok(())
}

/// Update the speaker's default volume (0-100, clamped)
pub async fn set_speaker_volume(db: &Pool<Sqlite>, guid: &str, volume: u8) -> Result<()> {
    let result = sqlx::query("UPDATE speakers SET volume = ? WHERE guid = ?")
        .bind(volume.min(100) as i64)
        .bind(guid)
        .execute(db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("speaker {}", guid)));
    }
    Ok(())
}

pub async fn get_play_mode(db: &Pool<Sqlite>, guid: &str) -> Result<PlayMode> {
    let speaker = get_speaker(db, guid).await?;
    speaker
        .play_mode
        .parse::<PlayMode>()
        .map_err(Error::Config)
}

pub async fn set_play_mode(db: &Pool<Sqlite>, guid: &str, mode: PlayMode) -> Result<()> {
    let result = sqlx::query("UPDATE speakers SET play_mode = ? WHERE guid = ?")
        .bind(mode.as_str())
        .bind(guid)
        .execute(db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("speaker {}", guid)));
    }
    Ok(())
}

pub async fn set_speaker_online(db: &Pool<Sqlite>, guid: &str, online: bool) -> Result<()> {
    sqlx::query("UPDATE speakers SET online = ? WHERE guid = ?")
        .bind(online)
        .bind(guid)
        .execute(db)
        .await?;
    Ok(())
}

/// Mark the speaker linked to a bluetooth device online/offline.
/// Returns the speaker guid when a link exists.
pub async fn set_online_by_bt_device(
    db: &Pool<Sqlite>,
    bt_device_guid: &str,
    online: bool,
) -> Result<Option<String>> {
    let guid: Option<String> =
        sqlx::query_scalar("SELECT guid FROM speakers WHERE bt_device_guid = ?")
            .bind(bt_device_guid)
            .fetch_optional(db)
            .await?;

    if let Some(ref guid) = guid {
        set_speaker_online(db, guid, online).await?;
    }
    Ok(guid)
}

/// Link (or unlink with None) a bluetooth device to a speaker
pub async fn link_bt_device(
    db: &Pool<Sqlite>,
    guid: &str,
    bt_device_guid: Option<&str>,
) -> Result<()> {
    let result = sqlx::query("UPDATE speakers SET bt_device_guid = ? WHERE guid = ?")
        .bind(bt_device_guid)
        .bind(guid)
        .execute(db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("speaker {}", guid)));
    }
    Ok(())
}

/// Delete a speaker row. Queue rows cascade; the caller is responsible for
/// tearing down the live engine.
pub async fn delete_speaker(db: &Pool<Sqlite>, guid: &str) -> Result<()> {
    let result = sqlx::query("DELETE FROM speakers WHERE guid = ?")
        .bind(guid)
        .execute(db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("speaker {}", guid)));
    }
    Ok(())
}

pub async fn count_speakers(db: &Pool<Sqlite>) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM speakers")
        .fetch_one(db)
        .await?)
}
