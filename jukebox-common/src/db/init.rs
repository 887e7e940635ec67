//! Database initialization
//!
//! Creates the database on first run and brings the schema up idempotently.
//! All tables use `CREATE TABLE IF NOT EXISTS` so startup is safe to repeat.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    configure_pool(&pool).await?;
    create_schema(&pool).await?;

    Ok(pool)
}

/// Initialize an in-memory database (tests)
pub async fn init_memory_database() -> Result<SqlitePool> {
    // A single connection keeps every handle on the same in-memory database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    configure_pool(&pool).await?;
    create_schema(&pool).await?;
    Ok(pool)
}

async fn configure_pool(pool: &SqlitePool) -> Result<()> {
    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    // WAL allows concurrent readers with one writer
    sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;

    // Bound lock waits instead of failing immediately
    sqlx::query("PRAGMA busy_timeout = 5000").execute(pool).await?;

    Ok(())
}

async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_speakers_table(pool).await?;
    create_bluetooth_devices_table(pool).await?;
    create_queue_table(pool).await?;
    create_schedules_table(pool).await?;
    Ok(())
}

async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_speakers_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS speakers (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            sink_name TEXT NOT NULL,
            volume INTEGER NOT NULL DEFAULT 50,
            is_default INTEGER NOT NULL DEFAULT 0,
            play_mode TEXT NOT NULL DEFAULT 'sequential',
            bt_device_guid TEXT,
            online INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_bluetooth_devices_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bluetooth_devices (
            guid TEXT PRIMARY KEY,
            address TEXT NOT NULL UNIQUE,
            name TEXT,
            alias TEXT,
            sink_name TEXT NOT NULL,
            connected INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_queue_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS queue (
            guid TEXT PRIMARY KEY,
            speaker_guid TEXT NOT NULL REFERENCES speakers(guid) ON DELETE CASCADE,
            url TEXT NOT NULL,
            title TEXT,
            thumbnail TEXT,
            duration_ms INTEGER,
            position INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            paused_position_ms INTEGER,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_queue_speaker_position
         ON queue(speaker_guid, position)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_schedules_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schedules (
            guid TEXT PRIMARY KEY,
            speaker_guid TEXT,
            url TEXT,
            query TEXT,
            title TEXT,
            thumbnail TEXT,
            duration_ms INTEGER,
            scheduled_at TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            group_guid TEXT,
            error TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_schedules_due
         ON schedules(status, scheduled_at)",
    )
    .execute(pool)
    .await?;
    Ok(())
}
