//! `pixelcast serve`: run the hub and the device listener.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::catalog::{Catalog, DirCatalog};
use crate::config::Config;
use crate::hub::{Hub, RenderPipeline};
use crate::render::{PassthroughEncoder, StaticImageRenderer};
use crate::server::DeviceServer;
use crate::store::Store;

/// Run until interrupted.
pub async fn run(config: &Config) -> Result<()> {
    let store = Arc::new(Store::open(&config.database_path).with_context(|| {
        format!("Failed to open database {}", config.database_path.display())
    })?);

    let catalog = DirCatalog::load(&config.apps_dir);
    log::info!(
        "[Serve] {} apps loaded from {}",
        catalog.len(),
        config.apps_dir.display()
    );
    let catalog: Arc<dyn Catalog> = Arc::new(catalog);

    let pipeline = RenderPipeline {
        renderer: Arc::new(StaticImageRenderer),
        encoder: Arc::new(PassthroughEncoder),
        period: config.render_period(),
        size_limit: config.image_size_limit,
    };
    let hub = Hub::new(Arc::clone(&store), catalog, pipeline).spawn();

    let server = DeviceServer::start(&config.listen_addr, hub, store, config.keepalive.clone()).await?;
    println!("pixelcast listening on {}", server.local_addr());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    println!("Shutting down...");
    server.shutdown();
    Ok(())
}
