//! Pixelcast - broadcast hub for networked pixel displays.
//!
//! Devices connect over WebSocket and subscribe to a channel. Each channel
//! cycles through an ordered list of applets, renders the next one on a
//! fixed period and pushes the encoded frame to every subscribed device.
//!
//! # Architecture
//!
//! The crate follows an actor pattern built on tokio mailboxes:
//!
//! - **Hub** - owns the session registry and the running channels
//! - **Channel** - one actor per channel, owns its playlist and render timer
//! - **Client** - one per connected device, with a read pump and a write pump
//! - **Store** - SQLite persistence for channels, applets and devices
//! - **Admin** - management operations that write the store then notify the hub
//!
//! # Modules
//!
//! - [`hub`] - hub, channel and client actors
//! - [`store`] - durable channel, applet and device records
//! - [`admin`] - management service
//! - [`server`] - device WebSocket listener
//! - [`catalog`] - installed app manifests
//! - [`render`] - renderer and encoder seams

pub mod admin;
pub mod catalog;
pub mod commands;
pub mod config;
pub mod constants;
pub mod error;
pub mod hub;
pub mod render;
pub mod server;
pub mod store;
pub mod ws;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use admin::Admin;
pub use config::Config;
pub use error::{Error, Result};
pub use hub::{Hub, HubHandle};
pub use server::DeviceServer;
