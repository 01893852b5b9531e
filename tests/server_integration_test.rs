//! End-to-end tests: real websocket server, real hub, echo renderer.
//!
//! The renderer emits each app's id as the frame payload, so a device can
//! tell which applet it is looking at.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use pixelcast::admin::{ChannelRef, DeviceUpdate};
use pixelcast::catalog::{Catalog, DirCatalog, Manifest};
use pixelcast::config::KeepaliveConfig;
use pixelcast::constants::DEFAULT_CHANNEL_UUID;
use pixelcast::hub::RenderPipeline;
use pixelcast::render::{Encoder, RenderError, Renderer, Root};
use pixelcast::store::{NewApplet, Store};
use pixelcast::{Admin, DeviceServer, Hub};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

type DeviceSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct EchoRenderer;

#[async_trait]
impl Renderer for EchoRenderer {
    async fn run(
        &self,
        manifest: &Manifest,
        _config: &HashMap<String, String>,
    ) -> Result<Vec<Root>, RenderError> {
        Ok(vec![Root(Bytes::from(manifest.id.clone()))])
    }
}

struct FirstRootEncoder;

#[async_trait]
impl Encoder for FirstRootEncoder {
    async fn encode(&self, roots: &[Root], _size_limit: usize) -> Result<Bytes, RenderError> {
        roots
            .first()
            .map(|root| root.0.clone())
            .ok_or_else(|| RenderError::Encode("no roots".to_string()))
    }
}

fn manifest(id: &str) -> Manifest {
    Manifest {
        id: id.to_string(),
        name: id.to_string(),
        summary: String::new(),
        desc: String::new(),
        author: "tests".to_string(),
        image: None,
        bundle: PathBuf::new(),
    }
}

struct TestHub {
    server: DeviceServer,
    admin: Admin,
    store: Arc<Store>,
}

impl TestHub {
    async fn start() -> Self {
        Self::start_with(KeepaliveConfig::default()).await
    }

    async fn start_with(keepalive: KeepaliveConfig) -> Self {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let mut catalog = DirCatalog::default();
        catalog.insert(manifest("clock-by-henry"));
        catalog.insert(manifest("dvd-logo"));
        let catalog: Arc<dyn Catalog> = Arc::new(catalog);

        let pipeline = RenderPipeline {
            renderer: Arc::new(EchoRenderer),
            encoder: Arc::new(FirstRootEncoder),
            period: Duration::from_secs(3600),
            size_limit: 1024,
        };
        let hub = Hub::new(Arc::clone(&store), Arc::clone(&catalog), pipeline).spawn();
        let server = DeviceServer::start(
            "127.0.0.1:0",
            hub.clone(),
            Arc::clone(&store),
            keepalive,
        )
        .await
        .unwrap();
        let admin = Admin::new(Arc::clone(&store), catalog, hub);
        Self {
            server,
            admin,
            store,
        }
    }

    fn url(&self, query: &str) -> String {
        format!("ws://{}/ws?{}", self.server.local_addr(), query)
    }

    async fn connect(&self, device: Uuid) -> DeviceSocket {
        let (socket, _response) = timeout(
            Duration::from_secs(5),
            connect_async(self.url(&format!("device={device}"))),
        )
        .await
        .expect("connect timed out")
        .unwrap();
        socket
    }
}

/// Next binary frame, skipping control frames.
async fn next_frame(socket: &mut DeviceSocket) -> Vec<u8> {
    timeout(Duration::from_secs(5), async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Binary(data))) => return data,
                Some(Ok(_)) => continue,
                Some(Err(e)) => panic!("socket failed before a frame arrived: {e}"),
                None => panic!("socket ended before a frame arrived"),
            }
        }
    })
    .await
    .expect("no frame within timeout")
}

#[tokio::test]
async fn test_new_device_is_provisioned_and_receives_frame() {
    let hub = TestHub::start().await;
    let device = Uuid::new_v4();

    let mut socket = hub.connect(device).await;
    assert_eq!(next_frame(&mut socket).await, b"clock-by-henry");

    let record = hub.store.get_device(device).unwrap();
    assert_eq!(record.channel_uuid, DEFAULT_CHANNEL_UUID);
    assert_eq!(record.name, device.to_string());
    assert_eq!(record.last_ip.as_deref(), Some("127.0.0.1"));
}

#[tokio::test]
async fn test_legacy_client_id_parameter() {
    let hub = TestHub::start().await;
    let device = Uuid::new_v4();

    let (mut socket, _) = connect_async(hub.url(&format!("clientId={device}")))
        .await
        .unwrap();
    assert_eq!(next_frame(&mut socket).await, b"clock-by-henry");
    assert!(hub.store.get_device(device).is_ok());
}

#[tokio::test]
async fn test_missing_or_invalid_device_is_rejected() {
    let hub = TestHub::start().await;

    for query in ["", "device=not-a-uuid"] {
        match connect_async(hub.url(query)).await {
            Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
                assert_eq!(response.status().as_u16(), 400);
            }
            Err(e) => panic!("expected HTTP 400 for '{query}', got {e}"),
            Ok(_) => panic!("upgrade without a valid device succeeded for '{query}'"),
        }
    }
    assert!(hub.store.get_all_devices().unwrap().is_empty());
}

#[tokio::test]
async fn test_sessions_listing() {
    let hub = TestHub::start().await;
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();

    let mut a = hub.connect(first).await;
    let mut b = hub.connect(second).await;
    next_frame(&mut a).await;
    next_frame(&mut b).await;

    let sessions = hub.admin.sessions().await.unwrap();
    assert_eq!(sessions.len(), 2);
    assert!(sessions.windows(2).all(|w| w[0].session_id < w[1].session_id));
    for session in &sessions {
        assert_eq!(session.channel_uuid, DEFAULT_CHANNEL_UUID);
        assert_eq!(session.channel_name, "default");
        assert_eq!(session.remote_addr.as_deref(), Some("127.0.0.1"));
    }
    let devices: Vec<Uuid> = sessions.iter().map(|s| s.device_uuid).collect();
    assert!(devices.contains(&first));
    assert!(devices.contains(&second));
}

#[tokio::test]
async fn test_closed_socket_leaves_sessions() {
    let hub = TestHub::start().await;
    let mut socket = hub.connect(Uuid::new_v4()).await;
    next_frame(&mut socket).await;
    assert_eq!(hub.admin.sessions().await.unwrap().len(), 1);

    socket.close(None).await.unwrap();
    drop(socket);

    timeout(Duration::from_secs(5), async {
        while !hub.admin.sessions().await.unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session was never unregistered");
}

/// One-second read deadline, pings every 900ms.
fn short_keepalive() -> KeepaliveConfig {
    KeepaliveConfig {
        pong_wait_secs: 1,
        write_wait_secs: 1,
        ..KeepaliveConfig::default()
    }
}

async fn wait_for_sessions(hub: &TestHub, expected: usize) {
    timeout(Duration::from_secs(5), async {
        while hub.admin.sessions().await.unwrap().len() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session count never settled");
}

#[tokio::test]
async fn test_pings_arrive_before_read_deadline() {
    let hub = TestHub::start_with(short_keepalive()).await;
    let mut socket = hub.connect(Uuid::new_v4()).await;

    let ping = timeout(Duration::from_millis(1500), async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Ping(_))) => return,
                Some(Ok(_)) => continue,
                Some(Err(e)) => panic!("socket failed before a ping arrived: {e}"),
                None => panic!("socket ended before a ping arrived"),
            }
        }
    })
    .await;
    assert!(ping.is_ok(), "no ping within the read deadline");
}

#[tokio::test]
async fn test_silent_device_is_dropped_after_read_deadline() {
    let hub = TestHub::start_with(short_keepalive()).await;

    // Polling the socket answers pings with pongs, which keeps the session alive.
    let mut responsive = hub.connect(Uuid::new_v4()).await;
    let poller = tokio::spawn(async move {
        while let Some(Ok(_)) = responsive.next().await {}
    });
    // Never read: pings go unanswered.
    let _silent = hub.connect(Uuid::new_v4()).await;
    wait_for_sessions(&hub, 2).await;

    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert_eq!(hub.admin.sessions().await.unwrap().len(), 1);
    assert!(!poller.is_finished(), "responsive device was disconnected");
    poller.abort();
}

#[tokio::test]
async fn test_dropped_tcp_stream_unregisters_session() {
    let hub = TestHub::start().await;
    let mut socket = hub.connect(Uuid::new_v4()).await;
    assert_eq!(next_frame(&mut socket).await, b"clock-by-henry");
    assert_eq!(hub.admin.sessions().await.unwrap().len(), 1);

    // Vanish without a close handshake, then force a write to the dead peer.
    drop(socket);
    let dvd = hub
        .admin
        .get_channel(DEFAULT_CHANNEL_UUID)
        .unwrap()
        .applets
        .into_iter()
        .find(|applet| applet.app_id == "dvd-logo")
        .unwrap();
    hub.admin
        .modify_applet(
            DEFAULT_CHANNEL_UUID,
            dvd.uuid,
            pixelcast::store::AppletUpdate {
                position: None,
                config: Some(r#"{"speed":"fast"}"#.to_string()),
            },
        )
        .await
        .unwrap();

    wait_for_sessions(&hub, 0).await;

    // The channel keeps serving new devices afterwards.
    let mut next = hub.connect(Uuid::new_v4()).await;
    assert_eq!(next_frame(&mut next).await, b"dvd-logo");
    wait_for_sessions(&hub, 1).await;
}

#[tokio::test]
async fn test_reassign_moves_live_session() {
    let hub = TestHub::start().await;
    let device = Uuid::new_v4();
    let mut socket = hub.connect(device).await;
    assert_eq!(next_frame(&mut socket).await, b"clock-by-henry");

    let kitchen = hub.admin.create_channel("kitchen", None).unwrap();
    hub.admin
        .attach_applet(
            kitchen.uuid,
            NewApplet {
                app_id: "dvd-logo".to_string(),
                position: None,
                config: None,
            },
        )
        .await
        .unwrap();

    let modified = hub
        .admin
        .modify_device(
            device,
            DeviceUpdate {
                name: Some("hallway".to_string()),
                channel: Some(ChannelRef {
                    uuid: None,
                    name: Some("kitchen".to_string()),
                }),
            },
        )
        .await
        .unwrap();
    assert_eq!(modified.channel_uuid, kitchen.uuid);
    assert_eq!(modified.name, "hallway");

    assert_eq!(next_frame(&mut socket).await, b"dvd-logo");
    let sessions = hub.admin.sessions().await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].channel_uuid, kitchen.uuid);
    assert_eq!(sessions[0].channel_name, "kitchen");
}

#[tokio::test]
async fn test_applet_edit_renders_focus_immediately() {
    let hub = TestHub::start().await;
    let mut socket = hub.connect(Uuid::new_v4()).await;
    assert_eq!(next_frame(&mut socket).await, b"clock-by-henry");

    let detail = hub.admin.get_channel(DEFAULT_CHANNEL_UUID).unwrap();
    let dvd = detail
        .applets
        .iter()
        .find(|applet| applet.app_id == "dvd-logo")
        .unwrap();

    hub.admin
        .modify_applet(
            DEFAULT_CHANNEL_UUID,
            dvd.uuid,
            pixelcast::store::AppletUpdate {
                position: Some(0),
                config: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(next_frame(&mut socket).await, b"dvd-logo");
    let order: Vec<String> = hub
        .admin
        .get_channel(DEFAULT_CHANNEL_UUID)
        .unwrap()
        .applets
        .into_iter()
        .map(|applet| applet.app_id)
        .collect();
    assert_eq!(order, ["dvd-logo", "clock-by-henry"]);
}
