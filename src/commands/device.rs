//! Device administration.

use anyhow::{Context, Result};
use uuid::Uuid;

use super::print_json;
use crate::admin::{Admin, ChannelRef, DeviceUpdate};

/// Print all devices.
pub fn list(admin: &Admin, json: bool) -> Result<()> {
    let devices = admin.list_devices()?;
    if json {
        return print_json(&devices);
    }
    for device in devices {
        println!(
            "{}  {:<20} {:<16} {:<16} {}",
            device.uuid,
            device.name,
            device.channel_name.as_deref().unwrap_or("?"),
            device.last_ip.as_deref().unwrap_or("-"),
            device.last_time.as_deref().unwrap_or("never")
        );
    }
    Ok(())
}

/// Rename a device and/or assign it to a channel (UUID or name).
pub async fn assign(admin: &Admin, device: &str, channel: Option<&str>, name: Option<String>) -> Result<()> {
    let device = Uuid::parse_str(device).with_context(|| format!("'{device}' is not a device UUID"))?;
    let channel = channel.map(|channel| match Uuid::parse_str(channel) {
        Ok(uuid) => ChannelRef {
            uuid: Some(uuid),
            name: None,
        },
        Err(_) => ChannelRef {
            uuid: None,
            name: Some(channel.to_string()),
        },
    });

    let modified = admin.modify_device(device, DeviceUpdate { name, channel }).await?;
    println!(
        "Device {} ({}) on channel {}",
        modified.name,
        modified.uuid,
        modified.channel_name.as_deref().unwrap_or("?")
    );
    Ok(())
}
