//! Channel actor: one playlist, one render loop, many subscribers.
//!
//! Each running channel owns its applet list, render cursor, subscriber set
//! and last frame. Only the actor loop touches them; everything else goes
//! through [`ChannelHandle`].
//!
//! # Render loop
//!
//! ```text
//! loop {
//!     select! {
//!         timer fired  => render_next() → cache + broadcast, rearm timer
//!         command      => subscribe / unsubscribe / set_applets / status
//!     }
//! }
//! ```
//!
//! A tick tries at most `len(applets)` applets starting at the cursor and
//! advances the cursor after every attempt, so a failing applet never
//! starves the ones after it. The first applet that renders ends the tick.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Sleep};
use uuid::Uuid;

use super::client::{Client, SessionId};
use super::task::submit;
use crate::catalog::Manifest;
use crate::constants::{ACTOR_MAILBOX_CAPACITY, RENDER_NOW_DELAY};
use crate::error::Result;
use crate::render::{Encoder, Renderer};

/// One applet as the render loop sees it.
#[derive(Debug, Clone)]
pub struct AppletConfig {
    /// Channel applet identity.
    pub uuid: Uuid,
    /// Resolved catalog entry.
    pub manifest: Arc<Manifest>,
    /// Key/value configuration handed to the renderer.
    pub config: HashMap<String, String>,
    /// Requested display time. Carried but not used for scheduling.
    pub ttl: Duration,
}

/// An encoded image ready to send to devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Image bytes.
    pub data: Bytes,
    /// How long the image is meant to stay on screen.
    pub ttl: Duration,
}

/// What a channel needs to turn applets into frames.
#[derive(Clone)]
pub struct RenderPipeline {
    /// Runs applets.
    pub renderer: Arc<dyn Renderer>,
    /// Encodes roots into images.
    pub encoder: Arc<dyn Encoder>,
    /// Fixed period between ticks.
    pub period: Duration,
    /// Byte limit passed to the encoder.
    pub size_limit: usize,
}

impl fmt::Debug for RenderPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderPipeline")
            .field("period", &self.period)
            .field("size_limit", &self.size_limit)
            .finish_non_exhaustive()
    }
}

/// Point-in-time view of a running channel.
#[derive(Debug, Clone)]
pub struct ChannelStatus {
    /// Channel identity.
    pub uuid: Uuid,
    /// Channel name.
    pub name: String,
    /// Index of the next applet to try.
    pub cursor: usize,
    /// Applets in play order.
    pub applets: Vec<Uuid>,
    /// Subscribed sessions.
    pub subscribers: Vec<SessionId>,
    /// Most recent successfully rendered frame.
    pub last_frame: Option<Arc<Frame>>,
}

/// Commands processed by the channel loop.
#[derive(Debug)]
pub enum ChannelCommand {
    /// Add a subscriber and push it the cached frame.
    Subscribe {
        /// Client to add.
        client: Arc<Client>,
        /// Completion signal.
        response_tx: oneshot::Sender<()>,
    },
    /// Remove a subscriber. Unknown sessions are ignored.
    Unsubscribe {
        /// Session to remove.
        session: SessionId,
        /// Completion signal.
        response_tx: oneshot::Sender<()>,
    },
    /// Replace the applet list and render immediately.
    SetApplets {
        /// New play order.
        applets: Vec<AppletConfig>,
        /// Applet to render first.
        focus: Option<Uuid>,
        /// Completion signal.
        response_tx: oneshot::Sender<()>,
    },
    /// Snapshot the channel state.
    Status {
        /// Reply channel.
        response_tx: oneshot::Sender<ChannelStatus>,
    },
}

/// Cloneable handle to a running channel actor.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    uuid: Uuid,
    name: Arc<str>,
    command_tx: mpsc::Sender<ChannelCommand>,
}

impl ChannelHandle {
    /// Start a channel actor and return its handle.
    ///
    /// The first render happens right away. The actor stops once every
    /// handle has been dropped.
    pub fn spawn(uuid: Uuid, name: &str, applets: Vec<AppletConfig>, pipeline: RenderPipeline) -> Self {
        let (command_tx, command_rx) = mpsc::channel(ACTOR_MAILBOX_CAPACITY);
        let channel = Channel {
            uuid,
            name: name.to_string(),
            applets,
            cursor: 0,
            subscribers: HashMap::new(),
            last: None,
            pipeline,
        };
        tokio::spawn(channel.run(command_rx));
        Self {
            uuid,
            name: Arc::from(name),
            command_tx,
        }
    }

    /// Channel identity.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Channel name at the time the actor started.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add `client` to the subscriber set.
    pub async fn subscribe(&self, client: Arc<Client>) -> Result<()> {
        submit(&self.command_tx, "channel", |response_tx| ChannelCommand::Subscribe {
            client,
            response_tx,
        })
        .await
    }

    /// Remove a session from the subscriber set.
    pub async fn unsubscribe(&self, session: SessionId) -> Result<()> {
        submit(&self.command_tx, "channel", |response_tx| ChannelCommand::Unsubscribe {
            session,
            response_tx,
        })
        .await
    }

    /// Replace the applet list, positioning the cursor on `focus` if present.
    pub async fn set_applets(&self, applets: Vec<AppletConfig>, focus: Option<Uuid>) -> Result<()> {
        submit(&self.command_tx, "channel", |response_tx| ChannelCommand::SetApplets {
            applets,
            focus,
            response_tx,
        })
        .await
    }

    /// Snapshot of the channel's state.
    pub async fn status(&self) -> Result<ChannelStatus> {
        submit(&self.command_tx, "channel", |response_tx| ChannelCommand::Status { response_tx }).await
    }
}

struct Channel {
    uuid: Uuid,
    name: String,
    applets: Vec<AppletConfig>,
    cursor: usize,
    subscribers: HashMap<SessionId, Arc<Client>>,
    last: Option<Arc<Frame>>,
    pipeline: RenderPipeline,
}

impl Channel {
    async fn run(mut self, mut command_rx: mpsc::Receiver<ChannelCommand>) {
        log::info!("[Channel {}] Started with {} applets", self.name, self.applets.len());

        let timer = tokio::time::sleep(RENDER_NOW_DELAY);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                () = &mut timer => {
                    if let Some(frame) = self.render_next().await {
                        self.last = Some(Arc::clone(&frame));
                        for client in self.subscribers.values() {
                            client.send(Arc::clone(&frame));
                        }
                    }
                    timer.as_mut().reset(Instant::now() + self.pipeline.period);
                }
                command = command_rx.recv() => match command {
                    Some(command) => self.handle_command(command, timer.as_mut()),
                    None => break,
                },
            }
        }

        log::info!("[Channel {}] Stopped", self.name);
    }

    fn handle_command(&mut self, command: ChannelCommand, timer: std::pin::Pin<&mut Sleep>) {
        match command {
            ChannelCommand::Subscribe { client, response_tx } => {
                if let Some(frame) = &self.last {
                    client.send(Arc::clone(frame));
                }
                log::debug!("[Channel {}] Subscribe {}", self.name, client);
                self.subscribers.insert(client.session(), client);
                let _ = response_tx.send(());
            }
            ChannelCommand::Unsubscribe { session, response_tx } => {
                if self.subscribers.remove(&session).is_some() {
                    log::debug!("[Channel {}] Unsubscribe session {}", self.name, session);
                }
                let _ = response_tx.send(());
            }
            ChannelCommand::SetApplets {
                applets,
                focus,
                response_tx,
            } => {
                self.cursor = focus
                    .and_then(|focus| applets.iter().position(|a| a.uuid == focus))
                    .unwrap_or(0);
                self.applets = applets;
                log::info!(
                    "[Channel {}] Render now ({} applets, cursor {})",
                    self.name,
                    self.applets.len(),
                    self.cursor
                );
                timer.reset(Instant::now() + RENDER_NOW_DELAY);
                let _ = response_tx.send(());
            }
            ChannelCommand::Status { response_tx } => {
                let _ = response_tx.send(ChannelStatus {
                    uuid: self.uuid,
                    name: self.name.clone(),
                    cursor: self.cursor,
                    applets: self.applets.iter().map(|a| a.uuid).collect(),
                    subscribers: self.subscribers.keys().copied().collect(),
                    last_frame: self.last.clone(),
                });
            }
        }
    }

    /// Render the next applet that succeeds, advancing the cursor past
    /// every applet tried.
    async fn render_next(&mut self) -> Option<Arc<Frame>> {
        let count = self.applets.len();
        for _ in 0..count {
            let applet = &self.applets[self.cursor];
            self.cursor = (self.cursor + 1) % count;
            let app = &applet.manifest.name;
            log::debug!("[Channel {}] {} running", self.name, app);

            let roots = match self.pipeline.renderer.run(&applet.manifest, &applet.config).await {
                Ok(roots) => roots,
                Err(e) => {
                    log::warn!("[Channel {}] {} {}", self.name, app, e);
                    continue;
                }
            };
            if roots.is_empty() {
                log::info!("[Channel {}] {} produced no roots", self.name, app);
                continue;
            }

            let data = match self.pipeline.encoder.encode(&roots, self.pipeline.size_limit).await {
                Ok(data) => data,
                Err(e) => {
                    log::warn!("[Channel {}] {} {}", self.name, app, e);
                    continue;
                }
            };

            log::info!(
                "[Channel {}] {} success ({} bytes, {})",
                self.name,
                app,
                data.len(),
                short_digest(&data)
            );
            return Some(Arc::new(Frame {
                data,
                ttl: self.pipeline.period,
            }));
        }

        if count > 0 {
            log::warn!("[Channel {}] Ran out of render attempts", self.name);
        }
        None
    }
}

fn short_digest(data: &[u8]) -> String {
    Sha256::digest(data)
        .iter()
        .take(8)
        .map(|b| format!("{b:02x}"))
        .collect()
}
