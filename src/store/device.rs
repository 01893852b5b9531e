//! Device persistence.

use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use uuid::Uuid;

use super::{uuid_column, Store};
use crate::constants::DEFAULT_CHANNEL_UUID;
use crate::error::{Error, Result};

const DEVICE_SELECT: &str = "SELECT d.uuid, d.name, d.channel_uuid, c.name, d.last_ip, d.last_time
                               FROM devices d
                               LEFT JOIN channels c ON d.channel_uuid = c.uuid";

/// A provisioned display device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    /// Device identity, supplied by the device itself.
    pub uuid: Uuid,
    /// Display name (defaults to the UUID text).
    pub name: String,
    /// Channel the device is assigned to.
    pub channel_uuid: Uuid,
    /// Name of the assigned channel, if it still exists.
    pub channel_name: Option<String>,
    /// Remote address of the most recent connection.
    pub last_ip: Option<String>,
    /// RFC 3339 timestamp of the most recent connection.
    pub last_time: Option<String>,
}

fn device_from_row(row: &Row<'_>) -> rusqlite::Result<Device> {
    Ok(Device {
        uuid: uuid_column(row, 0)?,
        name: row.get(1)?,
        channel_uuid: uuid_column(row, 2)?,
        channel_name: row.get(3)?,
        last_ip: row.get(4)?,
        last_time: row.get(5)?,
    })
}

fn find_device(conn: &Connection, uuid: Uuid) -> Result<Device> {
    conn.query_row(
        &format!("{DEVICE_SELECT} WHERE d.uuid = ?1"),
        [uuid.to_string()],
        device_from_row,
    )
    .optional()?
    .ok_or(Error::DeviceNotFound(uuid))
}

impl Store {
    /// Record a connection from `uuid`, provisioning unknown devices.
    ///
    /// A device seen for the first time is created on the default channel
    /// and named after its UUID. Every login stamps the remote address and
    /// time.
    pub fn login_device(&self, uuid: Uuid, remote_ip: Option<&str>) -> Result<Device> {
        self.update(|tx| {
            let known = tx
                .query_row(
                    "SELECT 1 FROM devices WHERE uuid = ?1",
                    [uuid.to_string()],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            if !known {
                log::info!("[Store] Provisioning new device {}", uuid);
                tx.execute(
                    "INSERT INTO devices (uuid, name, channel_uuid) VALUES (?1, ?1, ?2)",
                    (uuid.to_string(), DEFAULT_CHANNEL_UUID.to_string()),
                )?;
            }

            let now = chrono::Utc::now().to_rfc3339();
            tx.execute(
                "UPDATE devices SET last_ip = ?1, last_time = ?2 WHERE uuid = ?3",
                (remote_ip, &now, uuid.to_string()),
            )?;
            find_device(tx, uuid)
        })
    }

    /// All devices ordered by name, with their channel names.
    pub fn get_all_devices(&self) -> Result<Vec<Device>> {
        self.view(|tx| {
            let mut stmt = tx.prepare(&format!("{DEVICE_SELECT} ORDER BY d.name"))?;
            let rows = stmt.query_map([], device_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    /// Look a device up by UUID.
    pub fn get_device(&self, uuid: Uuid) -> Result<Device> {
        self.view(|tx| find_device(tx, uuid))
    }

    /// Rename a device and/or assign it to another channel.
    pub fn modify_device(&self, uuid: Uuid, name: Option<&str>, channel: Option<Uuid>) -> Result<Device> {
        self.update(|tx| {
            find_device(tx, uuid)?;

            if let Some(name) = name {
                let holder: Option<String> = tx
                    .query_row(
                        "SELECT uuid FROM devices WHERE name = ?1 AND uuid <> ?2",
                        (name, uuid.to_string()),
                        |row| row.get(0),
                    )
                    .optional()?;
                if let Some(holder) = holder {
                    return Err(Error::InvalidRequest(format!(
                        "device name {name} already used by {holder}"
                    )));
                }
                tx.execute(
                    "UPDATE devices SET name = ?1 WHERE uuid = ?2",
                    (name, uuid.to_string()),
                )?;
            }

            if let Some(channel) = channel {
                let exists = tx
                    .query_row(
                        "SELECT 1 FROM channels WHERE uuid = ?1",
                        [channel.to_string()],
                        |_| Ok(()),
                    )
                    .optional()?
                    .is_some();
                if !exists {
                    return Err(Error::ChannelNotFound(channel.to_string()));
                }
                log::info!("[Store] Assign device {} to channel {}", uuid, channel);
                tx.execute(
                    "UPDATE devices SET channel_uuid = ?1 WHERE uuid = ?2",
                    [channel.to_string(), uuid.to_string()],
                )?;
            }

            find_device(tx, uuid)
        })
    }
}
