//! The hub: process-wide registry of sessions and running channels.
//!
//! # Architecture
//!
//! ```text
//!                 HubHandle (clone per caller)
//!                       │ HubCommand
//!                       ▼
//!   ┌──────────────── Hub actor ────────────────┐
//!   │ clients:  session → (Client, channel)     │
//!   │ channels: channel uuid → ChannelHandle    │
//!   └───────────────────┬───────────────────────┘
//!                       │ ChannelCommand
//!                       ▼
//!              Channel actors (one per channel)
//!                       │ FrameSlot::send
//!                       ▼
//!               Client write pumps
//! ```
//!
//! The hub only ever waits on channels, and channels never wait on the hub
//! or on clients, so actor calls cannot form a cycle.
//!
//! Channels start lazily on first reference and then stay resident for the
//! life of the process.

pub mod channel;
pub mod client;
pub mod commands;
pub mod hub_handle;
pub(crate) mod task;

pub use channel::{AppletConfig, ChannelHandle, ChannelStatus, Frame, RenderPipeline};
pub use client::{Client, ClientState, FrameSlot, SessionId};
pub use commands::HubCommand;
pub use hub_handle::HubHandle;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::constants::ACTOR_MAILBOX_CAPACITY;
use crate::error::Result;
use crate::store::{ChannelDetail, Store};

/// One row of the live-session listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    /// Session id.
    pub session_id: SessionId,
    /// Device identity.
    pub device_uuid: Uuid,
    /// Peer IP address.
    pub remote_addr: Option<String>,
    /// Channel the session is subscribed to.
    pub channel_uuid: Uuid,
    /// Name of that channel.
    pub channel_name: String,
}

struct Registration {
    client: Arc<Client>,
    channel: Uuid,
}

/// Hub actor state. Build with [`Hub::new`], then [`Hub::spawn`] it.
pub struct Hub {
    store: Arc<Store>,
    catalog: Arc<dyn Catalog>,
    pipeline: RenderPipeline,
    clients: HashMap<SessionId, Registration>,
    channels: HashMap<Uuid, ChannelHandle>,
}

impl fmt::Debug for Hub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hub")
            .field("clients", &self.clients.len())
            .field("channels", &self.channels.len())
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

impl Hub {
    /// Create a hub with no sessions and no running channels.
    pub fn new(store: Arc<Store>, catalog: Arc<dyn Catalog>, pipeline: RenderPipeline) -> Self {
        Self {
            store,
            catalog,
            pipeline,
            clients: HashMap::new(),
            channels: HashMap::new(),
        }
    }

    /// Start the actor loop and return a handle to it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(self) -> HubHandle {
        let (command_tx, command_rx) = mpsc::channel(ACTOR_MAILBOX_CAPACITY);
        tokio::spawn(self.run(command_rx));
        HubHandle::new(command_tx)
    }

    async fn run(mut self, mut command_rx: mpsc::Receiver<HubCommand>) {
        log::info!("[Hub] Started");
        while let Some(command) = command_rx.recv().await {
            self.handle_command(command).await;
        }
        log::info!("[Hub] Stopped");
    }

    async fn handle_command(&mut self, command: HubCommand) {
        match command {
            HubCommand::GetOrCreateChannel { channel, response_tx } => {
                let _ = response_tx.send(self.get_or_create_channel(channel));
            }
            HubCommand::Register {
                client,
                channel,
                response_tx,
            } => {
                let _ = response_tx.send(self.register(client, channel).await);
            }
            HubCommand::Unregister { session, response_tx } => {
                self.unregister(session).await;
                let _ = response_tx.send(());
            }
            HubCommand::ReloadApplets {
                channel,
                focus,
                response_tx,
            } => {
                let _ = response_tx.send(self.reload_applets(channel, focus).await);
            }
            HubCommand::ReassignDevice {
                device,
                channel,
                response_tx,
            } => {
                let _ = response_tx.send(self.reassign_device(device, channel).await);
            }
            HubCommand::Sessions { response_tx } => {
                let _ = response_tx.send(self.sessions());
            }
        }
    }

    /// Resolve stored applets into render configs, skipping ones that
    /// cannot run.
    fn applets_from_detail(&self, detail: &ChannelDetail) -> Vec<AppletConfig> {
        let name = &detail.channel.name;
        detail
            .applets
            .iter()
            .filter_map(|applet| {
                let Some(manifest) = self.catalog.find_manifest(&applet.app_id) else {
                    log::warn!("[Hub] {} cannot find applet with id {}", name, applet.app_id);
                    return None;
                };
                let config = match applet.config.as_deref() {
                    None => HashMap::new(),
                    Some(raw) => match serde_json::from_str::<HashMap<String, String>>(raw) {
                        Ok(config) => config,
                        Err(e) => {
                            log::warn!(
                                "[Hub] {} cannot parse config for applet {} at index {} {:?}: {}",
                                name,
                                applet.app_id,
                                applet.idx,
                                raw,
                                e
                            );
                            return None;
                        }
                    },
                };
                Some(AppletConfig {
                    uuid: applet.uuid,
                    manifest,
                    config,
                    ttl: Duration::ZERO,
                })
            })
            .collect()
    }

    fn get_or_create_channel(&mut self, uuid: Uuid) -> Result<ChannelHandle> {
        if let Some(handle) = self.channels.get(&uuid) {
            return Ok(handle.clone());
        }

        let detail = self.store.get_channel(uuid)?;
        let applets = self.applets_from_detail(&detail);
        let handle = ChannelHandle::spawn(
            detail.channel.uuid,
            &detail.channel.name,
            applets,
            self.pipeline.clone(),
        );
        self.channels.insert(uuid, handle.clone());
        Ok(handle)
    }

    async fn register(&mut self, client: Arc<Client>, channel: Uuid) -> Result<()> {
        let handle = self.get_or_create_channel(channel)?;
        log::info!("[Hub] {} register {}", client, handle.name());
        handle.subscribe(Arc::clone(&client)).await?;
        self.clients.insert(
            client.session(),
            Registration {
                client,
                channel: handle.uuid(),
            },
        );
        Ok(())
    }

    async fn unregister(&mut self, session: SessionId) {
        let Some(registration) = self.clients.remove(&session) else {
            return;
        };
        if let Some(handle) = self.channels.get(&registration.channel) {
            log::info!("[Hub] {} deregister {}", registration.client, handle.name());
            if let Err(e) = handle.unsubscribe(session).await {
                log::warn!("[Hub] {} unsubscribe failed: {}", registration.client, e);
            }
        }
    }

    async fn reload_applets(&mut self, channel: Uuid, focus: Option<Uuid>) -> Result<()> {
        let Some(handle) = self.channels.get(&channel) else {
            // Not running: the next start reads the store anyway.
            return Ok(());
        };

        let detail = self.store.get_channel(channel)?;
        let applets = self.applets_from_detail(&detail);
        log::info!("[Hub] Reload channel {} with {} applets", handle.name(), applets.len());
        handle.set_applets(applets, focus).await
    }

    async fn reassign_device(&mut self, device: Uuid, channel: Uuid) -> Result<usize> {
        let mut moving: Vec<SessionId> = self
            .clients
            .iter()
            .filter(|(_, r)| r.client.device() == device && r.channel != channel)
            .map(|(session, _)| *session)
            .collect();
        if moving.is_empty() {
            return Ok(0);
        }
        moving.sort_unstable();

        let target = self.get_or_create_channel(channel)?;
        for session in &moving {
            let Some(registration) = self.clients.get_mut(session) else {
                continue;
            };
            if let Some(old) = self.channels.get(&registration.channel) {
                old.unsubscribe(*session).await?;
            }
            target.subscribe(Arc::clone(&registration.client)).await?;
            log::info!("[Hub] {} moved to {}", registration.client, target.name());
            registration.channel = channel;
        }
        Ok(moving.len())
    }

    fn sessions(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = self
            .clients
            .values()
            .map(|r| SessionInfo {
                session_id: r.client.session(),
                device_uuid: r.client.device(),
                remote_addr: r.client.remote_addr().map(|addr| addr.ip().to_string()),
                channel_uuid: r.channel,
                channel_name: self
                    .channels
                    .get(&r.channel)
                    .map(|h| h.name().to_string())
                    .unwrap_or_default(),
            })
            .collect();
        sessions.sort_by_key(|s| s.session_id);
        sessions
    }
}
