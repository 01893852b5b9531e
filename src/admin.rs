//! Administrative operations.
//!
//! [`Admin`] is what an API layer (or the CLI) calls to change channels,
//! applets and devices. Each operation writes the store first and then
//! tells the hub, so running channels and live sessions pick the change up
//! without reconnecting:
//!
//! | Operation       | Store                      | Hub                           |
//! |-----------------|----------------------------|-------------------------------|
//! | attach applet   | insert (+ reorder)         | reload, render the new applet |
//! | detach applet   | delete (+ reorder)         | reload from the start         |
//! | modify applet   | config and/or move         | reload, render that applet    |
//! | modify device   | rename and/or reassign     | move live sessions            |
//!
//! An offline `Admin` (no hub) only writes the store; a hub started later
//! reads the new configuration when it starts each channel.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::hub::{HubHandle, SessionInfo};
use crate::store::{
    AppletUpdate, ChannelApplet, ChannelDetail, ChannelRecord, Device, NewApplet, Store,
};

/// Catalog entry as shown to administrators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppSummary {
    /// Catalog id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// One-line summary.
    pub summary: String,
    /// Longer description.
    pub description: String,
    /// Author credit.
    pub author: String,
}

/// Channel reference in a device update; either field may identify it.
#[derive(Debug, Clone, Default)]
pub struct ChannelRef {
    /// Channel identity.
    pub uuid: Option<Uuid>,
    /// Channel name.
    pub name: Option<String>,
}

/// Changes to a device.
#[derive(Debug, Clone, Default)]
pub struct DeviceUpdate {
    /// New display name.
    pub name: Option<String>,
    /// New channel.
    pub channel: Option<ChannelRef>,
}

/// Administrative service over the store, catalog and (optionally) hub.
pub struct Admin {
    store: Arc<Store>,
    catalog: Arc<dyn Catalog>,
    hub: Option<HubHandle>,
}

impl std::fmt::Debug for Admin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Admin")
            .field("online", &self.hub.is_some())
            .finish_non_exhaustive()
    }
}

impl Admin {
    /// Service that keeps a running hub in sync.
    pub fn new(store: Arc<Store>, catalog: Arc<dyn Catalog>, hub: HubHandle) -> Self {
        Self {
            store,
            catalog,
            hub: Some(hub),
        }
    }

    /// Service that only edits the store.
    pub fn offline(store: Arc<Store>, catalog: Arc<dyn Catalog>) -> Self {
        Self {
            store,
            catalog,
            hub: None,
        }
    }

    // === Channels ===

    /// All channels ordered by name.
    pub fn list_channels(&self) -> Result<Vec<ChannelRecord>> {
        self.store.get_all_channels()
    }

    /// Create an empty channel.
    pub fn create_channel(&self, name: &str, comment: Option<&str>) -> Result<ChannelRecord> {
        if name.trim().is_empty() {
            return Err(Error::InvalidRequest("channel name is empty".to_string()));
        }
        self.store.create_channel(name, comment)
    }

    /// Channel with applets and configured devices.
    pub fn get_channel(&self, channel: Uuid) -> Result<ChannelDetail> {
        self.store.get_channel(channel)
    }

    /// Look a channel up by name.
    pub fn find_channel(&self, name: &str) -> Result<ChannelRecord> {
        self.store.get_channel_by_name(name)
    }

    // === Applets ===

    /// Attach an installed app to a channel and render it right away.
    pub async fn attach_applet(&self, channel: Uuid, applet: NewApplet) -> Result<ChannelApplet> {
        if self.catalog.find_manifest(&applet.app_id).is_none() {
            return Err(Error::UnknownApp(applet.app_id));
        }
        if let Some(config) = &applet.config {
            validate_config(config)?;
        }

        let created = self.store.create_channel_applet(channel, applet)?;
        self.reload(channel, Some(created.uuid)).await?;
        Ok(created)
    }

    /// Remove an applet; the channel restarts from its first applet.
    pub async fn detach_applet(&self, channel: Uuid, applet: Uuid) -> Result<()> {
        self.store.delete_channel_applet(channel, applet)?;
        self.reload(channel, None).await
    }

    /// Move and/or reconfigure an applet and render it right away.
    pub async fn modify_applet(
        &self,
        channel: Uuid,
        applet: Uuid,
        update: AppletUpdate,
    ) -> Result<ChannelApplet> {
        if let Some(config) = &update.config {
            validate_config(config)?;
        }
        let modified = self.store.modify_channel_applet(channel, applet, update)?;
        self.reload(channel, Some(applet)).await?;
        Ok(modified)
    }

    async fn reload(&self, channel: Uuid, focus: Option<Uuid>) -> Result<()> {
        match &self.hub {
            Some(hub) => hub.reload_applets(channel, focus).await,
            None => Ok(()),
        }
    }

    // === Devices ===

    /// All devices ordered by name.
    pub fn list_devices(&self) -> Result<Vec<Device>> {
        self.store.get_all_devices()
    }

    /// One device.
    pub fn get_device(&self, device: Uuid) -> Result<Device> {
        self.store.get_device(device)
    }

    /// Rename a device and/or assign it to a channel.
    ///
    /// A channel given by both UUID and name must be the same channel.
    /// Live sessions follow a channel change immediately.
    pub async fn modify_device(&self, device: Uuid, update: DeviceUpdate) -> Result<Device> {
        if update.name.is_none() && update.channel.is_none() {
            return Err(Error::InvalidRequest("no attributes provided".to_string()));
        }
        let current = self.store.get_device(device)?;

        let target = match &update.channel {
            Some(channel) => self.resolve_channel(channel)?,
            None => None,
        };
        let reassign = target.filter(|uuid| *uuid != current.channel_uuid);

        let modified = self
            .store
            .modify_device(device, update.name.as_deref(), reassign)?;
        if let (Some(channel), Some(hub)) = (reassign, &self.hub) {
            let moved = hub.reassign_device(device, channel).await?;
            log::info!("[Admin] Device {} reassigned, {} live sessions moved", device, moved);
        }
        Ok(modified)
    }

    fn resolve_channel(&self, channel: &ChannelRef) -> Result<Option<Uuid>> {
        let by_uuid = channel
            .uuid
            .map(|uuid| self.store.get_channel(uuid).map(|detail| detail.channel))
            .transpose()?;
        match (by_uuid, channel.name.as_deref()) {
            (Some(record), Some(name)) if !record.name.eq_ignore_ascii_case(name) => {
                Err(Error::InvalidRequest(
                    "channel uuid and name must refer to the same channel".to_string(),
                ))
            }
            (Some(record), _) => Ok(Some(record.uuid)),
            (None, Some(name)) => Ok(Some(self.store.get_channel_by_name(name)?.uuid)),
            (None, None) => Ok(None),
        }
    }

    // === Sessions & catalog ===

    /// Live sessions; empty when offline.
    pub async fn sessions(&self) -> Result<Vec<SessionInfo>> {
        match &self.hub {
            Some(hub) => hub.sessions().await,
            None => Ok(Vec::new()),
        }
    }

    /// Installed apps sorted by id.
    pub fn list_apps(&self) -> Vec<AppSummary> {
        let mut apps: Vec<AppSummary> = self
            .catalog
            .manifests()
            .iter()
            .map(|m| AppSummary {
                id: m.id.clone(),
                name: m.name.clone(),
                summary: m.summary.clone(),
                description: m.desc.clone(),
                author: m.author.clone(),
            })
            .collect();
        apps.sort_by(|a, b| a.id.cmp(&b.id));
        apps
    }

    /// One installed app.
    pub fn get_app(&self, id: &str) -> Result<AppSummary> {
        self.list_apps()
            .into_iter()
            .find(|app| app.id == id)
            .ok_or_else(|| Error::UnknownApp(id.to_string()))
    }
}

/// Applet configuration must be a JSON object of strings.
fn validate_config(config: &str) -> Result<()> {
    serde_json::from_str::<HashMap<String, String>>(config)
        .map(|_| ())
        .map_err(|e| Error::InvalidRequest(format!("applet config: {e}")))
}
