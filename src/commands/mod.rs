//! CLI subcommand implementations for pixelcast.
//!
//! [`serve`] runs the hub. Everything else administers the store directly
//! through an offline [`Admin`](crate::admin::Admin), which is how channels
//! and devices are edited when no API layer is in front of the hub:
//!
//! - [`channel`] - list, create and show channels; add, remove and move applets
//! - [`device`] - list devices, assign one to a channel
//! - [`apps`] - list the installed catalog
//!
//! Offline edits only reach the database. A running `pixelcast serve` keeps
//! its channels and live sessions as they were until it is restarted, so
//! stop the server (or restart it afterwards) when editing channels,
//! applets or device assignments.
//!
//! # Usage
//!
//! ```bash
//! pixelcast channel create kitchen --comment "by the fridge"
//! pixelcast applet add kitchen clock-by-henry --config '{"use_12h": "true"}'
//! pixelcast device assign 6f1c...e2 kitchen
//! pixelcast serve
//! ```

pub mod apps;
pub mod channel;
pub mod device;
pub mod serve;

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use uuid::Uuid;

use crate::admin::Admin;
use crate::catalog::{Catalog, DirCatalog};
use crate::config::Config;
use crate::store::Store;

/// Open the configured store and catalog for offline administration.
///
/// The returned [`Admin`] has no hub: a running server does not see the
/// changes until it restarts.
pub fn offline_admin(config: &Config) -> Result<Admin> {
    let store = Store::open(&config.database_path).with_context(|| {
        format!("Failed to open database {}", config.database_path.display())
    })?;
    let catalog: Arc<dyn Catalog> = Arc::new(DirCatalog::load(&config.apps_dir));
    Ok(Admin::offline(Arc::new(store), catalog))
}

/// Accept a channel UUID or a channel name.
pub fn resolve_channel(admin: &Admin, channel: &str) -> Result<Uuid> {
    if let Ok(uuid) = Uuid::parse_str(channel) {
        return Ok(uuid);
    }
    Ok(admin
        .find_channel(channel)
        .with_context(|| format!("Unknown channel '{channel}'"))?
        .uuid)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
