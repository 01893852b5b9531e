//! Device connection entry point.
//!
//! Listens for TCP connections and upgrades each to a WebSocket. A device
//! identifies itself in the upgrade request's query string:
//!
//! ```text
//! GET /ws?device=<uuid>      (older firmware sends ?clientId=<uuid>)
//! ```
//!
//! Before the upgrade completes the device is logged in against the store,
//! which provisions unknown devices onto the default channel. The upgraded
//! socket becomes a [`Client`] registered with the hub on the device's
//! configured channel; its pumps start only once registration succeeded.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use uuid::Uuid;

use crate::config::KeepaliveConfig;
use crate::error::Error;
use crate::hub::{Client, HubHandle};
use crate::store::{Device, Store};
use crate::ws::WsStream;

struct ServerContext {
    hub: HubHandle,
    store: Arc<Store>,
    keepalive: KeepaliveConfig,
}

/// WebSocket listener for devices.
#[derive(Debug)]
pub struct DeviceServer {
    local_addr: SocketAddr,
    accept_handle: JoinHandle<()>,
}

impl DeviceServer {
    /// Bind `addr` and start accepting devices.
    pub async fn start(
        addr: &str,
        hub: HubHandle,
        store: Arc<Store>,
        keepalive: KeepaliveConfig,
    ) -> Result<Self> {
        keepalive.validate()?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        let local_addr = listener.local_addr()?;
        log::info!("[Server] Listening for devices on {}", local_addr);

        let ctx = Arc::new(ServerContext {
            hub,
            store,
            keepalive,
        });
        let accept_handle = tokio::spawn(Self::accept_loop(listener, ctx));
        Ok(Self {
            local_addr,
            accept_handle,
        })
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting. Established sessions keep running.
    pub fn shutdown(self) {
        self.accept_handle.abort();
    }

    async fn accept_loop(listener: TcpListener, ctx: Arc<ServerContext>) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    tokio::spawn(handle_connection(stream, peer, Arc::clone(&ctx)));
                }
                Err(e) => {
                    log::error!("[Server] Accept error: {e}");
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                }
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, ctx: Arc<ServerContext>) {
    let (socket, device) = match upgrade(stream, peer, &ctx).await {
        Ok(accepted) => accepted,
        Err(e) => {
            log::info!("[Server] {}: {}", peer.ip(), e);
            return;
        }
    };

    let client = Client::new(device.uuid, Some(peer));
    log::info!("[Server] [{}] established from {}", client, peer.ip());

    if let Err(e) = ctx.hub.register(Arc::clone(&client), device.channel_uuid).await {
        log::warn!("[Server] [{}] register failed: {}", client, e);
        client.shutdown().await;
        let (mut writer, _reader) = crate::ws::split(socket);
        let _ = writer.send_close().await;
        return;
    }
    client.start(socket, &ctx.keepalive);
}

/// Complete the websocket handshake, logging the device in on the way.
async fn upgrade(
    stream: TcpStream,
    peer: SocketAddr,
    ctx: &ServerContext,
) -> crate::Result<(WsStream, Device)> {
    let host = peer.ip().to_string();
    let mut login: Option<Device> = None;

    let callback = |request: &Request, response: Response| -> std::result::Result<Response, ErrorResponse> {
        let device = device_from_query(request.uri().query()).map_err(|msg| {
            log::warn!("[Server] {}: {}", host, msg);
            error_response(StatusCode::BAD_REQUEST, msg)
        })?;
        match ctx.store.login_device(device, Some(&host)) {
            Ok(found) => {
                login = Some(found);
                Ok(response)
            }
            Err(e) => {
                log::warn!("[Server] {} {}: failed to get device configuration: {}", device, host, e);
                Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
            }
        }
    };

    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(ctx.keepalive.max_message_size);

    let socket = tokio_tungstenite::accept_hdr_async_with_config(stream, callback, Some(config))
        .await
        .map_err(|e| Error::Transport(format!("failed to establish websocket: {e}")))?;
    let device = login.ok_or_else(|| Error::Transport("handshake finished without a device".to_string()))?;
    Ok((socket, device))
}

fn error_response(status: StatusCode, message: String) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(message));
    *response.status_mut() = status;
    response
}

/// Extract the device UUID from an upgrade request's query string.
///
/// `device` wins over the legacy `clientId` parameter.
fn device_from_query(query: Option<&str>) -> std::result::Result<Uuid, String> {
    let params: Vec<(&str, &str)> = query
        .unwrap_or_default()
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .collect();
    let lookup = |key: &str| {
        params
            .iter()
            .find(|(k, v)| *k == key && !v.is_empty())
            .map(|(_, v)| *v)
    };

    let id = lookup("device")
        .or_else(|| lookup("clientId"))
        .ok_or_else(|| "no device UUID specified".to_string())?;
    Uuid::parse_str(id).map_err(|e| format!("device UUID {id} is not valid: {e}"))
}
