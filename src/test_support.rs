//! Shared fixtures for unit tests.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::timeout;

use crate::catalog::{Catalog, DirCatalog, Manifest};
use crate::hub::{ChannelHandle, ChannelStatus, RenderPipeline};
use crate::render::{Encoder, RenderError, Renderer, Root};

/// Renders each app as its own id.
pub(crate) struct EchoRenderer;

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

/// Passes the first root through.
pub(crate) struct FirstRootEncoder;

#[async_trait]
impl Encoder for FirstRootEncoder {
    async fn encode(&self, roots: &[Root], _size_limit: usize) -> Result<Bytes, RenderError> {
        roots
            .first()
            .map(|root| root.0.clone())
            .ok_or_else(|| RenderError::Encode("no roots".to_string()))
    }
}

pub(crate) fn manifest(id: &str) -> Manifest {
    Manifest {
        id: id.to_string(),
        name: id.to_string(),
        summary: format!("{id} summary"),
        desc: String::new(),
        author: "tests".to_string(),
        image: None,
        bundle: PathBuf::new(),
    }
}

/// Catalog with the apps the seeded default channel uses.
pub(crate) fn test_catalog() -> Arc<dyn Catalog> {
    let mut catalog = DirCatalog::default();
    catalog.insert(manifest("clock-by-henry"));
    catalog.insert(manifest("dvd-logo"));
    Arc::new(catalog)
}

/// Echo pipeline with a period long enough that only forced renders run.
pub(crate) fn pipeline() -> RenderPipeline {
    RenderPipeline {
        renderer: Arc::new(EchoRenderer),
        encoder: Arc::new(FirstRootEncoder),
        period: Duration::from_secs(3600),
        size_limit: 1024,
    }
}

/// Poll a channel until `done` holds for its status.
pub(crate) async fn wait_for(
    channel: &ChannelHandle,
    done: impl Fn(&ChannelStatus) -> bool,
) -> ChannelStatus {
    timeout(Duration::from_secs(5), async {
        loop {
            let status = channel.status().await.unwrap();
            if done(&status) {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("channel never reached the expected state")
}
