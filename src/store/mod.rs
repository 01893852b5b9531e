//! Durable store for channels, devices, and channel applets.
//!
//! Backed by SQLite through `rusqlite`. Every operation runs as a single
//! statement or inside one transaction opened by [`Store::update`] (write)
//! or [`Store::view`] (read-only snapshot).
//!
//! # Schema
//!
//! ```text
//! channels         (uuid PK, name UNIQUE NOCASE, comment)
//! channel_applets  (uuid PK, channel_uuid, idx, app_id, config,
//!                   UNIQUE (channel_uuid, idx))
//! devices          (uuid PK, name UNIQUE NOCASE, channel_uuid, last_ip, last_time)
//! schema_version   (version PK)
//! ```
//!
//! The `(channel_uuid, idx)` constraint is what [`reorder`] works around:
//! applet positions are always the contiguous set `0..count` outside a
//! transaction.

mod channel;
mod device;
pub(crate) mod reorder;

pub use channel::{AppletUpdate, ChannelApplet, ChannelDetail, ChannelRecord, DeviceRef, NewApplet};
pub use device::Device;

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use uuid::Uuid;

use crate::constants::{DEFAULT_CHANNEL_NAME, DEFAULT_CHANNEL_UUID, STORE_BUSY_TIMEOUT};
use crate::error::Result;

/// Current schema version written by [`Store::init_schema`].
const SCHEMA_VERSION: i64 = 1;

/// SQLite-backed durable store.
///
/// The connection is guarded by a mutex, so the store is `Send + Sync` and
/// can be shared behind an `Arc` between the hub actor, the connection
/// entry point, and admin callers. Calls are short and synchronous.
pub struct Store {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    /// Open (or create) the database at `path`, bootstrapping the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::from_connection(Connection::open(path)?)
    }

    /// Open a private in-memory database (tests, dry runs).
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(STORE_BUSY_TIMEOUT)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        let version = store.schema_version()?;
        log::info!("[Store] Current database schema: {}", version);
        Ok(store)
    }

    /// Run `f` inside a write transaction.
    ///
    /// The transaction commits only if `f` returns `Ok`; any error rolls back
    /// every statement `f` executed.
    pub fn update<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Run `f` inside a read-only transaction for a consistent snapshot.
    ///
    /// The connection is switched to `query_only` for the duration, so any
    /// write inside `f` fails. The transaction is always rolled back.
    pub fn view<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.pragma_update(None, "query_only", true)?;
        let result = conn
            .transaction_with_behavior(TransactionBehavior::Deferred)
            .map_err(crate::Error::from)
            .and_then(|tx| f(&tx));
        conn.pragma_update(None, "query_only", false)?;
        result
    }

    fn schema_version(&self) -> Result<i64> {
        {
            let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
            conn.execute(
                "CREATE TABLE IF NOT EXISTS schema_version(version INTEGER PRIMARY KEY)",
                [],
            )?;
            let version: Option<i64> = conn
                .query_row(
                    "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(version) = version {
                return Ok(version);
            }
        }
        self.init_schema()?;
        Ok(SCHEMA_VERSION)
    }

    fn init_schema(&self) -> Result<()> {
        log::info!("[Store] Perform initial database setup");
        let default_uuid = DEFAULT_CHANNEL_UUID.to_string();
        self.update(|tx| {
            tx.execute_batch(
                "CREATE TABLE channels (
                    uuid TEXT PRIMARY KEY COLLATE NOCASE,
                    name TEXT NOT NULL UNIQUE COLLATE NOCASE,
                    comment TEXT
                 );
                 CREATE TABLE channel_applets (
                    uuid TEXT PRIMARY KEY COLLATE NOCASE,
                    channel_uuid TEXT NOT NULL COLLATE NOCASE,
                    idx INTEGER NOT NULL,
                    app_id TEXT NOT NULL,
                    config TEXT,
                    UNIQUE (channel_uuid, idx)
                 );
                 CREATE TABLE devices (
                    uuid TEXT PRIMARY KEY COLLATE NOCASE,
                    name TEXT NOT NULL UNIQUE COLLATE NOCASE,
                    channel_uuid TEXT NOT NULL COLLATE NOCASE,
                    last_ip TEXT,
                    last_time TEXT
                 );
                 CREATE INDEX idx_channel_devices ON devices (channel_uuid, uuid);",
            )?;
            tx.execute(
                "INSERT INTO channels (uuid, name, comment) VALUES (?1, ?2, 'The default channel')",
                (&default_uuid, DEFAULT_CHANNEL_NAME),
            )?;
            tx.execute(
                "INSERT INTO channel_applets (uuid, channel_uuid, idx, app_id, config)
                 VALUES ('efe35cfa-4076-4e84-9c9c-961e821769bd', ?1, 0, 'clock-by-henry',
                         '{\"blink_time\": \"true\", \"use_12h\": \"true\"}')",
                [&default_uuid],
            )?;
            tx.execute(
                "INSERT INTO channel_applets (uuid, channel_uuid, idx, app_id, config)
                 VALUES ('e7a8d2d4-f8a7-44a7-8158-1525582f88e0', ?1, 1, 'dvd-logo', NULL)",
                [&default_uuid],
            )?;
            tx.execute("INSERT INTO schema_version VALUES (?1)", [SCHEMA_VERSION])?;
            Ok(())
        })
    }
}

/// Read a TEXT column as a UUID.
pub(crate) fn uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(idx)?;
    Uuid::parse_str(&text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_store_seeds_default_channel() {
        let store = Store::open_in_memory().unwrap();
        let detail = store.get_channel(DEFAULT_CHANNEL_UUID).unwrap();

        assert_eq!(detail.channel.name, "default");
        let apps: Vec<_> = detail.applets.iter().map(|a| (a.idx, a.app_id.as_str())).collect();
        assert_eq!(apps, vec![(0, "clock-by-henry"), (1, "dvd-logo")]);
        assert!(detail.applets[0].config.is_some());
        assert!(detail.applets[1].config.is_none());
    }

    #[test]
    fn test_reopen_keeps_schema() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("etc").join("cfg.db");

        {
            let store = Store::open(&path).unwrap();
            store.create_channel("kitchen", None).unwrap();
        }

        let store = Store::open(&path).unwrap();
        let names: Vec<_> = store
            .get_all_channels()
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["default".to_string(), "kitchen".to_string()]);
    }

    #[test]
    fn test_view_rejects_writes() {
        let store = Store::open_in_memory().unwrap();
        let result: Result<usize> = store.view(|tx| {
            Ok(tx.execute(
                "INSERT INTO channels (uuid, name) VALUES ('00000000-0000-0000-0000-000000000002', 'sneaky')",
                [],
            )?)
        });
        assert!(matches!(result, Err(crate::Error::Storage(_))));
        assert!(store.get_channel_by_name("sneaky").is_err());

        // Writes work again once the view is over.
        store.create_channel("after", None).unwrap();
    }

    #[test]
    fn test_busy_timeout_is_set() {
        let store = Store::open_in_memory().unwrap();
        let timeout_ms: i64 = store
            .view(|tx| Ok(tx.query_row("PRAGMA busy_timeout", [], |row| row.get(0))?))
            .unwrap();
        assert_eq!(timeout_ms, STORE_BUSY_TIMEOUT.as_millis() as i64);
    }

    #[test]
    fn test_writer_waits_for_other_connection() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("cfg.db");
        let store = Store::open(&path).unwrap();

        // A second process holds the write lock briefly.
        let other = Connection::open(&path).unwrap();
        other.execute_batch("BEGIN IMMEDIATE").unwrap();
        let release = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(200));
            other.execute_batch("COMMIT").unwrap();
        });

        store.create_channel("patient", None).unwrap();
        release.join().unwrap();
        assert!(store.get_channel_by_name("patient").is_ok());
    }

    #[test]
    fn test_update_rolls_back_on_error() {
        let store = Store::open_in_memory().unwrap();
        let result: Result<()> = store.update(|tx| {
            tx.execute(
                "INSERT INTO channels (uuid, name) VALUES ('00000000-0000-0000-0000-000000000001', 'temp')",
                [],
            )?;
            Err(crate::Error::InvalidRequest("abort".to_string()))
        });
        assert!(result.is_err());
        assert!(store.get_channel_by_name("temp").is_err());
    }
}
