//! Settings database access
//!
//! Read/write settings from the settings table (key-value store).
//! All settings are global/system-wide.

use crate::{Error, Result};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;

/// Generic setting getter
///
/// Returns None if the key doesn't exist in the database.
pub async fn get_setting<T: FromStr>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await?;

    match value {
        Some(s) => match s.parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(Error::Config(format!(
                "Failed to parse setting '{}' value: {}",
                key, s
            ))),
        },
        None => Ok(None),
    }
}

/// Generic setting setter (insert or update)
pub async fn set_setting<T: ToString>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value)
        VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await?;
    Ok(())
}

/// Default volume applied to newly registered speakers (0-100)
pub async fn get_default_speaker_volume(db: &Pool<Sqlite>) -> Result<u8> {
    match get_setting::<i64>(db, "default_speaker_volume").await? {
        Some(vol) => Ok(vol.clamp(0, 100) as u8),
        None => {
            set_setting(db, "default_speaker_volume", 50).await?;
            Ok(50)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init::init_memory_database;

    #[tokio::test]
    async fn test_setting_roundtrip() {
        let db = init_memory_database().await.unwrap();

        assert!(get_setting::<i64>(&db, "missing").await.unwrap().is_none());

        set_setting(&db, "sweep_interval_s", 30).await.unwrap();
        let value: Option<i64> = get_setting(&db, "sweep_interval_s").await.unwrap();
        assert_eq!(value, Some(30));

        // Overwrite
        set_setting(&db, "sweep_interval_s", 60).await.unwrap();
        let value: Option<i64> = get_setting(&db, "sweep_interval_s").await.unwrap();
        assert_eq!(value, Some(60));
    }

    #[tokio::test]
    async fn test_default_speaker_volume_initializes() {
        let db = init_memory_database().await.unwrap();
        assert_eq!(get_default_speaker_volume(&db).await.unwrap(), 50);

        set_setting(&db, "default_speaker_volume", 80).await.unwrap();
        assert_eq!(get_default_speaker_volume(&db).await.unwrap(), 80);
    }
}
