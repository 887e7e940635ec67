//! Schedule database queries
//!
//! Schedules are future-dated playback intents. Timestamps are stored as
//! RFC 3339 UTC text, which sorts and compares lexicographically.

use crate::db::models::{ScheduleRow, ScheduleStatus};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

/// Fields for creating a schedule. Either `url` or `query` must be set;
/// query-only schedules are resolved at fire time.
#[derive(Debug, Clone, Default)]
pub struct NewSchedule {
    pub speaker_guid: Option<String>,
    pub url: Option<String>,
    pub query: Option<String>,
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    pub duration_ms: Option<i64>,
    pub group_guid: Option<String>,
}

pub async fn insert_schedule(
    db: &Pool<Sqlite>,
    new: &NewSchedule,
    scheduled_at: DateTime<Utc>,
) -> Result<ScheduleRow> {
    if new.url.is_none() && new.query.is_none() {
        return Err(Error::InvalidState(
            "schedule needs a url or a query".to_string(),
        ));
    }

    let guid = Uuid::new_v4().to_string();
    let created_at = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO schedules (guid, speaker_guid, url, query, title, thumbnail,
                               duration_ms, scheduled_at, status, group_guid, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?)
        "#,
    )
    .bind(&guid)
    .bind(&new.speaker_guid)
    .bind(&new.url)
    .bind(&new.query)
    .bind(&new.title)
    .bind(&new.thumbnail)
    .bind(new.duration_ms)
    .bind(scheduled_at.to_rfc3339())
    .bind(&new.group_guid)
    .bind(&created_at)
    .execute(db)
    .await?;

    get_schedule(db, &guid).await
}

/// Create a batch sharing a fresh group guid; members fire independently.
/// Returns the group guid and the created rows in input order.
pub async fn insert_group(
    db: &Pool<Sqlite>,
    entries: &[(NewSchedule, DateTime<Utc>)],
) -> Result<(String, Vec<ScheduleRow>)> {
    let group_guid = Uuid::new_v4().to_string();
    let mut rows = Vec::with_capacity(entries.len());
    for (new, at) in entries {
        let mut member = new.clone();
        member.group_guid = Some(group_guid.clone());
        rows.push(insert_schedule(db, &member, *at).await?);
    }
    Ok((group_guid, rows))
}

pub async fn get_schedule(db: &Pool<Sqlite>, guid: &str) -> Result<ScheduleRow> {
    sqlx::query_as::<_, ScheduleRow>("SELECT * FROM schedules WHERE guid = ?")
        .bind(guid)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| Error::NotFound(format!("schedule {}", guid)))
}

pub async fn list_schedules(db: &Pool<Sqlite>) -> Result<Vec<ScheduleRow>> {
    Ok(
        sqlx::query_as::<_, ScheduleRow>("SELECT * FROM schedules ORDER BY scheduled_at")
            .fetch_all(db)
            .await?,
    )
}

/// Pending schedules that are due at `now`, in due-time order.
/// Group members come out interleaved with everything else by due time.
pub async fn due_schedules(db: &Pool<Sqlite>, now: DateTime<Utc>) -> Result<Vec<ScheduleRow>> {
    Ok(sqlx::query_as::<_, ScheduleRow>(
        "SELECT * FROM schedules WHERE status = 'pending' AND scheduled_at <= ?
         ORDER BY scheduled_at",
    )
    .bind(now.to_rfc3339())
    .fetch_all(db)
    .await?)
}

pub async fn mark_fired(db: &Pool<Sqlite>, guid: &str) -> Result<()> {
    set_status(db, guid, ScheduleStatus::Fired, None).await
}

/// Record a failure; the reason is preserved on the row since there is no
/// caller to receive an error during the sweep.
pub async fn mark_failed(db: &Pool<Sqlite>, guid: &str, reason: &str) -> Result<()> {
    set_status(db, guid, ScheduleStatus::Failed, Some(reason)).await
}

pub async fn cancel_schedule(db: &Pool<Sqlite>, guid: &str) -> Result<()> {
    set_status(db, guid, ScheduleStatus::Cancelled, None).await
}

async fn set_status(
    db: &Pool<Sqlite>,
    guid: &str,
    status: ScheduleStatus,
    error: Option<&str>,
) -> Result<()> {
    let result = sqlx::query("UPDATE schedules SET status = ?, error = ? WHERE guid = ?")
        .bind(status.as_str())
        .bind(error)
        .bind(guid)
        .execute(db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("schedule {}", guid)));
    }
    Ok(())
}

/// Update the fields a user may edit before a schedule fires
pub async fn update_schedule(
    db: &Pool<Sqlite>,
    guid: &str,
    new: &NewSchedule,
    scheduled_at: DateTime<Utc>,
) -> Result<ScheduleRow> {
    let current = get_schedule(db, guid).await?;
    if current.status != ScheduleStatus::Pending.as_str() {
        return Err(Error::InvalidState(format!(
            "schedule {} is {}",
            guid, current.status
        )));
    }

    sqlx::query(
        r#"
        UPDATE schedules
        SET speaker_guid = ?, url = ?, query = ?, title = ?, thumbnail = ?,
            duration_ms = ?, scheduled_at = ?
        WHERE guid = ?
        "#,
    )
    .bind(&new.speaker_guid)
    .bind(&new.url)
    .bind(&new.query)
    .bind(&new.title)
    .bind(&new.thumbnail)
    .bind(new.duration_ms)
    .bind(scheduled_at.to_rfc3339())
    .bind(guid)
    .execute(db)
    .await?;

    get_schedule(db, guid).await
}

pub async fn delete_schedule(db: &Pool<Sqlite>, guid: &str) -> Result<()> {
    let result = sqlx::query("DELETE FROM schedules WHERE guid = ?")
        .bind(guid)
        .execute(db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("schedule {}", guid)));
    }
    Ok(())
}

/// Delete every member of a batch-created group
pub async fn delete_group(db: &Pool<Sqlite>, group_guid: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM schedules WHERE group_guid = ?")
        .bind(group_guid)
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}
