//! Channel and channel-applet persistence.

use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use uuid::Uuid;

use super::reorder::{applet_count, reorder};
use super::{uuid_column, Store};
use crate::error::{Error, Result};

/// A channel row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelRecord {
    /// Channel identity.
    pub uuid: Uuid,
    /// Unique (case-insensitive) name.
    pub name: String,
    /// Free-form description.
    pub comment: Option<String>,
}

/// An applet attached to a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelApplet {
    /// Applet instance identity.
    pub uuid: Uuid,
    /// Position within the channel, `0..count`.
    pub idx: i64,
    /// Catalog app id.
    pub app_id: String,
    /// Opaque JSON configuration blob.
    pub config: Option<String>,
}

/// A device subscribed (by configuration) to a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceRef {
    /// Device identity.
    pub uuid: Uuid,
    /// Display name.
    pub name: String,
}

/// Full channel configuration read in one snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelDetail {
    /// The channel row.
    pub channel: ChannelRecord,
    /// Applets ordered by position.
    pub applets: Vec<ChannelApplet>,
    /// Devices configured for this channel, ordered by name.
    pub subscribers: Vec<DeviceRef>,
}

/// Request to attach an applet to a channel.
#[derive(Debug, Clone, Default)]
pub struct NewApplet {
    /// Catalog app id.
    pub app_id: String,
    /// Explicit position; `None` appends.
    pub position: Option<i64>,
    /// JSON configuration blob.
    pub config: Option<String>,
}

/// Changes to an existing channel applet.
#[derive(Debug, Clone, Default)]
pub struct AppletUpdate {
    /// New position within `0..count`.
    pub position: Option<i64>,
    /// Replacement configuration blob.
    pub config: Option<String>,
}

fn channel_from_row(row: &Row<'_>) -> rusqlite::Result<ChannelRecord> {
    Ok(ChannelRecord {
        uuid: uuid_column(row, 0)?,
        name: row.get(1)?,
        comment: row.get(2)?,
    })
}

fn applet_from_row(row: &Row<'_>) -> rusqlite::Result<ChannelApplet> {
    Ok(ChannelApplet {
        uuid: uuid_column(row, 0)?,
        idx: row.get(1)?,
        app_id: row.get(2)?,
        config: row.get(3)?,
    })
}

fn find_channel(conn: &Connection, uuid: Uuid) -> Result<ChannelRecord> {
    conn.query_row(
        "SELECT uuid, name, comment FROM channels WHERE uuid = ?1",
        [uuid.to_string()],
        channel_from_row,
    )
    .optional()?
    .ok_or_else(|| Error::ChannelNotFound(uuid.to_string()))
}

fn find_applet(conn: &Connection, channel: Uuid, applet: Uuid) -> Result<ChannelApplet> {
    conn.query_row(
        "SELECT uuid, idx, app_id, config FROM channel_applets
          WHERE uuid = ?1 AND channel_uuid = ?2",
        [applet.to_string(), channel.to_string()],
        applet_from_row,
    )
    .optional()?
    .ok_or(Error::AppletNotFound { channel, applet })
}

impl Store {
    /// Create a channel with a unique name.
    pub fn create_channel(&self, name: &str, comment: Option<&str>) -> Result<ChannelRecord> {
        self.update(|tx| {
            let existing = tx
                .query_row(
                    "SELECT uuid, name, comment FROM channels WHERE name = ?1",
                    [name],
                    channel_from_row,
                )
                .optional()?;
            if let Some(existing) = existing {
                return Err(Error::ChannelExists {
                    name: existing.name,
                    uuid: existing.uuid,
                });
            }

            let channel = ChannelRecord {
                uuid: Uuid::now_v7(),
                name: name.to_string(),
                comment: comment.map(str::to_string),
            };
            tx.execute(
                "INSERT INTO channels (uuid, name, comment) VALUES (?1, ?2, ?3)",
                (channel.uuid.to_string(), &channel.name, &channel.comment),
            )?;
            log::info!("[Store] Created channel {} ({})", channel.name, channel.uuid);
            Ok(channel)
        })
    }

    /// All channels ordered by name.
    pub fn get_all_channels(&self) -> Result<Vec<ChannelRecord>> {
        self.view(|tx| {
            let mut stmt = tx.prepare("SELECT uuid, name, comment FROM channels ORDER BY name")?;
            let rows = stmt.query_map([], channel_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    /// A channel with its applets and configured devices.
    pub fn get_channel(&self, uuid: Uuid) -> Result<ChannelDetail> {
        self.view(|tx| {
            let channel = find_channel(tx, uuid)?;

            let mut stmt = tx.prepare(
                "SELECT uuid, idx, app_id, config FROM channel_applets
                  WHERE channel_uuid = ?1 ORDER BY idx",
            )?;
            let applets = stmt
                .query_map([uuid.to_string()], applet_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut stmt =
                tx.prepare("SELECT uuid, name FROM devices WHERE channel_uuid = ?1 ORDER BY name")?;
            let subscribers = stmt
                .query_map([uuid.to_string()], |row| {
                    Ok(DeviceRef {
                        uuid: uuid_column(row, 0)?,
                        name: row.get(1)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(ChannelDetail {
                channel,
                applets,
                subscribers,
            })
        })
    }

    /// Look a channel up by (case-insensitive) name.
    pub fn get_channel_by_name(&self, name: &str) -> Result<ChannelRecord> {
        self.view(|tx| {
            tx.query_row(
                "SELECT uuid, name, comment FROM channels WHERE name = ?1",
                [name],
                channel_from_row,
            )
            .optional()?
            .ok_or_else(|| Error::ChannelNotFound(name.to_string()))
        })
    }

    /// Attach an applet to a channel.
    ///
    /// Appends when no position is given. An explicit position `p <= count`
    /// shifts every applet at `p` or later up by one first; `p > count` is
    /// rejected with [`Error::IndexOutOfRange`].
    pub fn create_channel_applet(&self, channel: Uuid, applet: NewApplet) -> Result<ChannelApplet> {
        self.update(|tx| {
            find_channel(tx, channel)?;
            let count = applet_count(tx, channel)?;

            let idx = applet.position.unwrap_or(count);
            if idx < 0 || idx > count {
                return Err(Error::IndexOutOfRange { index: idx, count });
            }
            if idx < count {
                reorder(tx, channel, count, idx)?;
            }

            let created = ChannelApplet {
                uuid: Uuid::now_v7(),
                idx,
                app_id: applet.app_id,
                config: applet.config,
            };
            tx.execute(
                "INSERT INTO channel_applets (uuid, channel_uuid, idx, app_id, config)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (
                    created.uuid.to_string(),
                    channel.to_string(),
                    created.idx,
                    &created.app_id,
                    &created.config,
                ),
            )?;
            log::info!(
                "[Store] Attached applet {} ({}) to channel {} at {}",
                created.app_id,
                created.uuid,
                channel,
                created.idx
            );
            Ok(created)
        })
    }

    /// Remove an applet and close the gap it leaves.
    pub fn delete_channel_applet(&self, channel: Uuid, applet: Uuid) -> Result<()> {
        log::info!("[Store] Delete applet {} (channel {})", applet, channel);
        self.update(|tx| {
            let removed = find_applet(tx, channel, applet)?;
            tx.execute(
                "DELETE FROM channel_applets WHERE uuid = ?1",
                [applet.to_string()],
            )?;

            let count = applet_count(tx, channel)?;
            if removed.idx < count {
                reorder(tx, channel, removed.idx, count)?;
            }
            Ok(())
        })
    }

    /// Update an applet's configuration and/or move it to a new position.
    ///
    /// Positions must lie within `0..count`.
    pub fn modify_channel_applet(
        &self,
        channel: Uuid,
        applet: Uuid,
        update: AppletUpdate,
    ) -> Result<ChannelApplet> {
        self.update(|tx| {
            let mut current = find_applet(tx, channel, applet)?;

            if let Some(config) = update.config {
                tx.execute(
                    "UPDATE channel_applets SET config = ?1 WHERE uuid = ?2",
                    (&config, applet.to_string()),
                )?;
                current.config = Some(config);
            }

            if let Some(idx) = update.position.filter(|idx| *idx != current.idx) {
                log::info!(
                    "[Store] Change applet {} original idx: {} new idx: {}",
                    applet,
                    current.idx,
                    idx
                );
                let count = applet_count(tx, channel)?;
                if idx < 0 || idx >= count {
                    return Err(Error::IndexOutOfRange { index: idx, count });
                }
                reorder(tx, channel, current.idx, idx)?;
                current.idx = idx;
            }
            Ok(current)
        })
    }
}
