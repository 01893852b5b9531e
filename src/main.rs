//! Pixelcast CLI - runs the broadcast hub and administers its store.
//!
//! See the `pixelcast` library for the core functionality.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use pixelcast::{commands, Config};

/// Global allocator configured per M-MIMALLOC-APPS guideline.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser)]
#[command(name = "pixelcast")]
#[command(version)]
#[command(about = "Broadcast hub for networked pixel displays")]
#[command(
    after_help = "Channel, applet and device commands edit the database directly. \
                  A running `pixelcast serve` picks the changes up after a restart."
)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the hub and accept device connections
    Serve {
        /// Override the listen address from the configuration
        #[arg(long)]
        listen: Option<String>,
    },
    /// List channels
    Channels,
    /// List devices
    Devices,
    /// List installed apps
    Apps,
    /// Channel management
    Channel {
        #[command(subcommand)]
        command: ChannelCommands,
    },
    /// Applet management within a channel
    Applet {
        #[command(subcommand)]
        command: AppletCommands,
    },
    /// Device management
    Device {
        #[command(subcommand)]
        command: DeviceCommands,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Subcommand)]
enum ChannelCommands {
    /// Create a channel
    Create {
        name: String,
        #[arg(long)]
        comment: Option<String>,
    },
    /// Show a channel's applets and devices
    Show {
        /// Channel UUID or name
        channel: String,
    },
}

#[derive(Subcommand)]
enum AppletCommands {
    /// Attach an app to a channel
    Add {
        /// Channel UUID or name
        channel: String,
        /// App id from the catalog
        app: String,
        /// Insert at this position instead of appending
        #[arg(long)]
        position: Option<i64>,
        /// JSON object of string values
        #[arg(long)]
        config: Option<String>,
    },
    /// Detach an applet
    Remove { channel: String, applet: String },
    /// Move an applet to a new position
    Move {
        channel: String,
        applet: String,
        position: i64,
    },
    /// Replace an applet's configuration
    Configure {
        channel: String,
        applet: String,
        /// JSON object of string values
        config: String,
    },
}

#[derive(Subcommand)]
enum DeviceCommands {
    /// Assign a device to a channel and/or rename it
    Assign {
        /// Device UUID
        device: String,
        /// Channel UUID or name
        channel: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    if let Err(e) = run(Cli::parse()) {
        // Library errors carry a stable code for scripts.
        match e.downcast_ref::<pixelcast::Error>() {
            Some(err) => eprintln!("Error {}: {:#}", err.code(), e),
            None => eprintln!("Error: {:#}", e),
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start tokio runtime")?;

    match cli.command {
        Commands::Serve { listen } => {
            if let Some(listen) = listen {
                config.listen_addr = listen;
            }
            log::info!("Pixelcast v{} starting", env!("CARGO_PKG_VERSION"));
            runtime.block_on(commands::serve::run(&config))?;
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Channels => {
            commands::channel::list(&commands::offline_admin(&config)?, cli.json)?;
        }
        Commands::Devices => {
            commands::device::list(&commands::offline_admin(&config)?, cli.json)?;
        }
        Commands::Apps => {
            commands::apps::list(&commands::offline_admin(&config)?, cli.json)?;
        }
        Commands::Channel { command } => {
            let admin = commands::offline_admin(&config)?;
            match command {
                ChannelCommands::Create { name, comment } => {
                    commands::channel::create(&admin, &name, comment.as_deref(), cli.json)?;
                }
                ChannelCommands::Show { channel } => {
                    commands::channel::show(&admin, &channel, cli.json)?;
                }
            }
        }
        Commands::Applet { command } => {
            let admin = commands::offline_admin(&config)?;
            runtime.block_on(async {
                match command {
                    AppletCommands::Add {
                        channel,
                        app,
                        position,
                        config,
                    } => commands::channel::add_applet(&admin, &channel, &app, position, config).await,
                    AppletCommands::Remove { channel, applet } => {
                        commands::channel::remove_applet(&admin, &channel, &applet).await
                    }
                    AppletCommands::Move {
                        channel,
                        applet,
                        position,
                    } => commands::channel::move_applet(&admin, &channel, &applet, position).await,
                    AppletCommands::Configure {
                        channel,
                        applet,
                        config,
                    } => commands::channel::configure_applet(&admin, &channel, &applet, config).await,
                }
            })?;
        }
        Commands::Device { command } => {
            let admin = commands::offline_admin(&config)?;
            match command {
                DeviceCommands::Assign {
                    device,
                    channel,
                    name,
                } => runtime.block_on(commands::device::assign(
                    &admin,
                    &device,
                    channel.as_deref(),
                    name,
                ))?,
            }
        }
    }

    Ok(())
}
