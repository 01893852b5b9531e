//! Configuration loading.
//!
//! Reads the pixelcast configuration file, applies environment overrides,
//! and falls back to defaults when no file exists.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf, time::Duration};

use crate::constants;

/// WebSocket keepalive settings for device connections.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct KeepaliveConfig {
    /// Seconds allowed for a single outbound write.
    pub write_wait_secs: u64,
    /// Seconds allowed between inbound frames before the device is dead.
    pub pong_wait_secs: u64,
    /// Largest inbound message accepted, in bytes.
    pub max_message_size: usize,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            write_wait_secs: constants::DEFAULT_WRITE_WAIT.as_secs(),
            pong_wait_secs: constants::DEFAULT_PONG_WAIT.as_secs(),
            max_message_size: constants::DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl KeepaliveConfig {
    /// Write deadline for each outbound frame.
    #[must_use]
    pub fn write_wait(&self) -> Duration {
        Duration::from_secs(self.write_wait_secs)
    }

    /// Read deadline, refreshed on every inbound frame.
    #[must_use]
    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_secs)
    }

    /// Interval between keepalive pings.
    #[must_use]
    pub fn ping_period(&self) -> Duration {
        constants::ping_period(self.pong_wait())
    }

    /// Reject deadlines the pumps cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.write_wait_secs == 0 {
            anyhow::bail!("keepalive.write_wait_secs must be at least 1");
        }
        if self.pong_wait_secs == 0 {
            anyhow::bail!("keepalive.pong_wait_secs must be at least 1");
        }
        Ok(())
    }
}

/// Configuration for the pixelcast hub.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Config {
    /// Address the device WebSocket listener binds to.
    pub listen_addr: String,
    /// Path of the SQLite database.
    pub database_path: PathBuf,
    /// Directory holding applet bundles (`<id>/manifest.json`).
    pub apps_dir: PathBuf,
    /// Seconds between channel render ticks.
    pub render_period_secs: u64,
    /// Size limit handed to the image encoder, in bytes.
    pub image_size_limit: usize,
    /// Device connection keepalive.
    pub keepalive: KeepaliveConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            database_path: PathBuf::from("./etc/cfg.db"),
            apps_dir: PathBuf::from("./apps"),
            render_period_secs: constants::DEFAULT_RENDER_PERIOD.as_secs(),
            image_size_limit: constants::DEFAULT_IMAGE_SIZE_LIMIT,
            keepalive: KeepaliveConfig::default(),
        }
    }
}

impl Config {
    /// Default location of the configuration file.
    ///
    /// `PIXELCAST_CONFIG_DIR` overrides the platform config directory.
    pub fn config_dir() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var("PIXELCAST_CONFIG_DIR") {
            return Ok(PathBuf::from(dir));
        }
        Ok(dirs::config_dir()
            .context("Could not determine config directory")?
            .join("pixelcast"))
    }

    /// Loads configuration with environment variable overrides.
    ///
    /// An explicit `path` must exist; the default location may be absent,
    /// in which case defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => {
                let default_path = Self::config_dir()?.join("config.json");
                if default_path.exists() {
                    Self::load_from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_overrides();
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Check values that would stall or crash the hub at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.render_period_secs == 0 {
            anyhow::bail!("render_period_secs must be at least 1");
        }
        self.keepalive.validate()
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(listen) = std::env::var("PIXELCAST_LISTEN") {
            self.listen_addr = listen;
        }

        if let Ok(database) = std::env::var("PIXELCAST_DATABASE") {
            self.database_path = PathBuf::from(database);
        }

        if let Ok(apps_dir) = std::env::var("PIXELCAST_APPS_DIR") {
            self.apps_dir = PathBuf::from(apps_dir);
        }

        if let Ok(period) = std::env::var("PIXELCAST_RENDER_PERIOD_SECS") {
            if let Ok(secs) = period.parse::<u64>() {
                self.render_period_secs = secs;
            }
        }
    }

    /// Period between channel render ticks.
    #[must_use]
    pub fn render_period(&self) -> Duration {
        Duration::from_secs(self.render_period_secs)
    }
}
