//! Device sessions.
//!
//! A [`Client`] is one live WebSocket connection from a device. It moves
//! through a small state machine:
//!
//! ```text
//! Connecting ──start()──► Active ──read/write failure──► Closing ──► Closed
//! ```
//!
//! Two tasks serve an active client. The read pump only watches liveness:
//! every inbound frame refreshes the read deadline, and missing it ends the
//! session. The write pump delivers frames from the [`FrameSlot`] and sends
//! keepalive pings at 9/10 of the read deadline.
//!
//! Whichever pump fails first calls [`Client::shutdown`]. Shutdown takes
//! the hub ownership out of the client exactly once, so the hub sees a
//! single unregister even when both pumps fail together.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::channel::Frame;
use super::hub_handle::HubHandle;
use crate::config::KeepaliveConfig;
use crate::error::{Error, Result};
use crate::ws::{self, WsMessage, WsReader, WsStream, WsWriter};

/// Per-process session number.
pub type SessionId = u32;

static LAST_SESSION_ID: AtomicU32 = AtomicU32::new(0);

fn next_session_id() -> SessionId {
    LAST_SESSION_ID.fetch_add(1, Ordering::Relaxed) + 1
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientState {
    /// Created; pumps not running yet.
    Connecting = 0,
    /// Pumps running.
    Active = 1,
    /// Shutdown in progress.
    Closing = 2,
    /// Terminal.
    Closed = 3,
}

impl ClientState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Active,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Single-slot outbound mailbox.
///
/// Holds only the newest undelivered frame: a send replaces whatever the
/// writer has not picked up yet and never waits. Closing the slot wakes the
/// writer so it can exit.
#[derive(Debug)]
pub struct FrameSlot {
    tx: Mutex<Option<watch::Sender<Option<Arc<Frame>>>>>,
}

/// Consumer side of a [`FrameSlot`].
pub type FrameReceiver = watch::Receiver<Option<Arc<Frame>>>;

impl FrameSlot {
    fn new() -> (Self, FrameReceiver) {
        let (tx, rx) = watch::channel(None);
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    /// Replace the pending frame. Returns `false` once the slot is closed.
    pub fn send(&self, frame: Arc<Frame>) -> bool {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        match tx.as_ref() {
            Some(tx) => {
                tx.send_replace(Some(frame));
                true
            }
            None => false,
        }
    }

    /// Close the slot; further sends are dropped.
    pub fn close(&self) {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

#[derive(Debug)]
enum Ownership {
    Unclaimed,
    Owned(HubHandle),
    Released,
}

/// One device connection.
#[derive(Debug)]
pub struct Client {
    session: SessionId,
    device: Uuid,
    remote_addr: Option<SocketAddr>,
    slot: FrameSlot,
    frames: Mutex<Option<FrameReceiver>>,
    ownership: Mutex<Ownership>,
    state: AtomicU8,
    cancel: CancellationToken,
}

impl fmt::Display for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.session, self.device)
    }
}

impl Client {
    /// Create a session for `device` with a fresh session id.
    pub fn new(device: Uuid, remote_addr: Option<SocketAddr>) -> Arc<Self> {
        let (slot, frames) = FrameSlot::new();
        Arc::new(Self {
            session: next_session_id(),
            device,
            remote_addr,
            slot,
            frames: Mutex::new(Some(frames)),
            ownership: Mutex::new(Ownership::Unclaimed),
            state: AtomicU8::new(ClientState::Connecting as u8),
            cancel: CancellationToken::new(),
        })
    }

    /// Session id, unique within this process.
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Device identity the connection presented.
    pub fn device(&self) -> Uuid {
        self.device
    }

    /// Peer address, if known.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ClientState {
        ClientState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ClientState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Queue a frame for delivery, replacing any undelivered one.
    pub fn send(&self, frame: Arc<Frame>) -> bool {
        self.slot.send(frame)
    }

    /// Take the consumer side of the outbound slot. Only the first call
    /// gets it.
    pub fn take_frames(&self) -> Option<FrameReceiver> {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// Record `hub` as the owner. Fails if the client was ever claimed.
    pub(crate) fn claim(&self, hub: HubHandle) -> Result<()> {
        let mut ownership = self.ownership.lock().unwrap_or_else(PoisonError::into_inner);
        match *ownership {
            Ownership::Unclaimed => {
                *ownership = Ownership::Owned(hub);
                Ok(())
            }
            Ownership::Owned(_) | Ownership::Released => Err(Error::AlreadyOwned),
        }
    }

    /// Tear the session down.
    ///
    /// Only the first call does anything: it unregisters from the owning
    /// hub, closes the outbound slot and stops both pumps. Returns whether
    /// this call performed the shutdown.
    pub async fn shutdown(&self) -> bool {
        let hub = {
            let mut ownership = self.ownership.lock().unwrap_or_else(PoisonError::into_inner);
            match std::mem::replace(&mut *ownership, Ownership::Released) {
                Ownership::Owned(hub) => Some(hub),
                Ownership::Unclaimed => None,
                Ownership::Released => return false,
            }
        };

        self.set_state(ClientState::Closing);
        log::info!("[Client {}] Shutdown connection", self);
        if let Some(hub) = hub {
            if let Err(e) = hub.unregister(self.session).await {
                log::warn!("[Client {}] Unregister failed: {}", self, e);
            }
        }
        self.slot.close();
        self.cancel.cancel();
        self.set_state(ClientState::Closed);
        true
    }

    /// Start the read and write pumps on an upgraded socket.
    pub fn start(self: &Arc<Self>, socket: WsStream, keepalive: &KeepaliveConfig) {
        let Some(frames) = self.take_frames() else {
            log::warn!("[Client {}] Pumps already started", self);
            return;
        };
        let (writer, reader) = ws::split(socket);
        self.set_state(ClientState::Active);

        tokio::spawn(Arc::clone(self).read_pump(reader, keepalive.pong_wait()));
        tokio::spawn(Arc::clone(self).write_pump(
            writer,
            frames,
            keepalive.write_wait(),
            keepalive.ping_period(),
        ));
    }

    async fn read_pump(self: Arc<Self>, mut reader: WsReader, pong_wait: Duration) {
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                next = timeout(pong_wait, reader.recv()) => match next {
                    Err(_) => {
                        log::info!("[Client {}] Read deadline exceeded", self);
                        break;
                    }
                    Ok(None) | Ok(Some(Ok(WsMessage::Close { .. }))) => {
                        log::info!("[Client {}] Disconnected", self);
                        break;
                    }
                    Ok(Some(Err(e))) => {
                        log::warn!("[Client {}] Read error: {}", self, e);
                        break;
                    }
                    // Any inbound frame, pongs included, proves liveness.
                    Ok(Some(Ok(_))) => {}
                },
            }
        }
        log::debug!("[Client {}] Read pump stopped", self);
        self.shutdown().await;
    }

    async fn write_pump(
        self: Arc<Self>,
        mut writer: WsWriter,
        mut frames: FrameReceiver,
        write_wait: Duration,
        ping_period: Duration,
    ) {
        let mut ping = tokio::time::interval_at(Instant::now() + ping_period, ping_period);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                changed = frames.changed() => {
                    if changed.is_err() {
                        // Slot closed: already unregistered.
                        break;
                    }
                    let frame = frames.borrow_and_update().clone();
                    let Some(frame) = frame else { continue };
                    match timeout(write_wait, writer.send_binary(frame.data.to_vec())).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            log::warn!("[Client {}] Write failed ({} bytes): {}", self, frame.data.len(), e);
                            break;
                        }
                        Err(_) => {
                            log::warn!("[Client {}] Write deadline exceeded", self);
                            break;
                        }
                    }
                }
                _ = ping.tick() => {
                    match timeout(write_wait, writer.send_ping()).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            log::warn!("[Client {}] Ping failed: {}", self, e);
                            break;
                        }
                        Err(_) => {
                            log::warn!("[Client {}] Ping deadline exceeded", self);
                            break;
                        }
                    }
                }
            }
        }
        log::debug!("[Client {}] Write pump stopped", self);
        self.shutdown().await;

        if let Ok(Err(e)) = timeout(write_wait, writer.send_close()).await {
            log::debug!("[Client {}] Close frame not sent: {}", self, e);
        }
        let _ = timeout(write_wait, writer.close()).await;
    }
}
