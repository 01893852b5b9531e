//! Cloneable access to the hub actor.
//!
//! `HubHandle` wraps the hub's command mailbox and turns each operation
//! into a send-and-wait call. It is `Clone + Send + Sync`: the connection
//! entry point, every client session and the admin service each hold one.
//!
//! All methods return [`Error::ActorGone`] if the hub loop has stopped.
//!
//! [`Error::ActorGone`]: crate::Error::ActorGone

use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use super::channel::ChannelHandle;
use super::client::{Client, SessionId};
use super::commands::HubCommand;
use super::task::submit;
use super::SessionInfo;
use crate::error::Result;

const ACTOR: &str = "hub";

/// Handle for communicating with the hub actor.
#[derive(Debug, Clone)]
pub struct HubHandle {
    command_tx: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    /// Wrap a hub mailbox.
    #[must_use]
    pub fn new(command_tx: mpsc::Sender<HubCommand>) -> Self {
        Self { command_tx }
    }

    /// Running actor for `channel`, started on first reference.
    pub async fn channel(&self, channel: Uuid) -> Result<ChannelHandle> {
        submit(&self.command_tx, ACTOR, |response_tx| HubCommand::GetOrCreateChannel {
            channel,
            response_tx,
        })
        .await?
    }

    /// Claim `client` for this hub and subscribe it to `channel`.
    ///
    /// A client can be claimed once in its life; a second claim fails with
    /// [`crate::Error::AlreadyOwned`] before the hub is contacted.
    pub async fn register(&self, client: Arc<Client>, channel: Uuid) -> Result<()> {
        client.claim(self.clone())?;
        submit(&self.command_tx, ACTOR, |response_tx| HubCommand::Register {
            client,
            channel,
            response_tx,
        })
        .await?
    }

    /// Remove a session. Unknown sessions are ignored.
    pub async fn unregister(&self, session: SessionId) -> Result<()> {
        submit(&self.command_tx, ACTOR, |response_tx| HubCommand::Unregister {
            session,
            response_tx,
        })
        .await
    }

    /// Push the stored applet list to a running channel.
    ///
    /// Does nothing if the channel has no running actor.
    pub async fn reload_applets(&self, channel: Uuid, focus: Option<Uuid>) -> Result<()> {
        submit(&self.command_tx, ACTOR, |response_tx| HubCommand::ReloadApplets {
            channel,
            focus,
            response_tx,
        })
        .await?
    }

    /// Move all live sessions of `device` to `channel`.
    ///
    /// Returns how many sessions moved.
    pub async fn reassign_device(&self, device: Uuid, channel: Uuid) -> Result<usize> {
        submit(&self.command_tx, ACTOR, |response_tx| HubCommand::ReassignDevice {
            device,
            channel,
            response_tx,
        })
        .await?
    }

    /// Snapshot of live sessions ordered by session id.
    pub async fn sessions(&self) -> Result<Vec<SessionInfo>> {
        submit(&self.command_tx, ACTOR, |response_tx| HubCommand::Sessions { response_tx }).await
    }
}
