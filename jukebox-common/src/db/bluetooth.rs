//! Bluetooth device database queries
//!
//! Devices relate to speakers through `speakers.bt_device_guid`. That is a
//! lookup relation only; deleting a device never deletes its speaker.

use crate::db::models::BluetoothDeviceRow;
use crate::{Error, Result};
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

/// Insert or update a device keyed by its unique address
pub async fn upsert_device(
    db: &Pool<Sqlite>,
    address: &str,
    name: Option<&str>,
    alias: Option<&str>,
    sink_name: &str,
) -> Result<BluetoothDeviceRow> {
    let guid = Uuid::new_v4().to_string();

    sqlx::query(
        r#"
        INSERT INTO bluetooth_devices (guid, address, name, alias, sink_name, connected)
        VALUES (?, ?, ?, ?, ?, 0)
        ON CONFLICT(address) DO UPDATE SET
            name = COALESCE(excluded.name, bluetooth_devices.name),
            alias = COALESCE(excluded.alias, bluetooth_devices.alias),
            sink_name = excluded.sink_name
        "#,
    )
    .bind(&guid)
    .bind(address)
    .bind(name)
    .bind(alias)
    .bind(sink_name)
    .execute(db)
    .await?;

    get_by_address(db, address).await
}

pub async fn get_by_address(db: &Pool<Sqlite>, address: &str) -> Result<BluetoothDeviceRow> {
    sqlx::query_as::<_, BluetoothDeviceRow>("SELECT * FROM bluetooth_devices WHERE address = ?")
        .bind(address)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| Error::NotFound(format!("bluetooth device {}", address)))
}

pub async fn list_devices(db: &Pool<Sqlite>) -> Result<Vec<BluetoothDeviceRow>> {
    Ok(sqlx::query_as::<_, BluetoothDeviceRow>(
        "SELECT * FROM bluetooth_devices ORDER BY address",
    )
    .fetch_all(db)
    .await?)
}

pub async fn set_connected(db: &Pool<Sqlite>, address: &str, connected: bool) -> Result<()> {
    let result = sqlx::query("UPDATE bluetooth_devices SET connected = ? WHERE address = ?")
        .bind(connected)
        .bind(address)
        .execute(db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("bluetooth device {}", address)));
    }
    Ok(())
}

pub async fn delete_device(db: &Pool<Sqlite>, address: &str) -> Result<()> {
    let result = sqlx::query("DELETE FROM bluetooth_devices WHERE address = ?")
        .bind(address)
        .execute(db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("bluetooth device {}", address)));
    }
    Ok(())
}
