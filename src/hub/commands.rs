//! Hub commands.
//!
//! Callers talk to the hub actor by sending [`HubCommand`]s over its
//! `tokio::sync::mpsc` mailbox. The hub processes commands one at a time in
//! its main loop, so the client and channel registries are never shared.
//! Every command carries a oneshot sender for the reply; [`HubHandle`]
//! wraps the send-and-wait dance.
//!
//! [`HubHandle`]: super::HubHandle

use std::sync::Arc;

use tokio::sync::oneshot;
use uuid::Uuid;

use super::channel::ChannelHandle;
use super::client::{Client, SessionId};
use super::SessionInfo;
use crate::error::Result;

/// Commands processed by the hub loop.
#[derive(Debug)]
pub enum HubCommand {
    /// Return the running actor for a channel, starting it if needed.
    GetOrCreateChannel {
        /// Channel identity.
        channel: Uuid,
        /// Reply channel.
        response_tx: oneshot::Sender<Result<ChannelHandle>>,
    },

    /// Subscribe an already-claimed client to a channel.
    Register {
        /// The session.
        client: Arc<Client>,
        /// Channel the device is assigned to.
        channel: Uuid,
        /// Reply channel.
        response_tx: oneshot::Sender<Result<()>>,
    },

    /// Drop a session from its channel and the registry.
    Unregister {
        /// Session to drop.
        session: SessionId,
        /// Completion signal.
        response_tx: oneshot::Sender<()>,
    },

    /// Reload a running channel's applets from the store.
    ReloadApplets {
        /// Channel to refresh.
        channel: Uuid,
        /// Applet to render first.
        focus: Option<Uuid>,
        /// Reply channel.
        response_tx: oneshot::Sender<Result<()>>,
    },

    /// Move every live session of a device to another channel.
    ReassignDevice {
        /// Device identity.
        device: Uuid,
        /// Target channel.
        channel: Uuid,
        /// Reply channel with the number of sessions moved.
        response_tx: oneshot::Sender<Result<usize>>,
    },

    /// List live sessions.
    Sessions {
        /// Reply channel.
        response_tx: oneshot::Sender<Vec<SessionInfo>>,
    },
}
