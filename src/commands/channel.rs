//! Channel and applet administration.

use anyhow::{Context, Result};
use uuid::Uuid;

use super::{print_json, resolve_channel};
use crate::admin::Admin;
use crate::store::{AppletUpdate, NewApplet};

/// Print all channels.
pub fn list(admin: &Admin, json: bool) -> Result<()> {
    let channels = admin.list_channels()?;
    if json {
        return print_json(&channels);
    }
    for channel in channels {
        println!(
            "{}  {:<20} {}",
            channel.uuid,
            channel.name,
            channel.comment.unwrap_or_default()
        );
    }
    Ok(())
}

/// Create a channel and print it.
pub fn create(admin: &Admin, name: &str, comment: Option<&str>, json: bool) -> Result<()> {
    let channel = admin.create_channel(name, comment)?;
    if json {
        return print_json(&channel);
    }
    println!("Created channel {} ({})", channel.name, channel.uuid);
    Ok(())
}

/// Print a channel's applets and devices.
pub fn show(admin: &Admin, channel: &str, json: bool) -> Result<()> {
    let detail = admin.get_channel(resolve_channel(admin, channel)?)?;
    if json {
        return print_json(&detail);
    }
    println!("{} ({})", detail.channel.name, detail.channel.uuid);
    if let Some(comment) = &detail.channel.comment {
        println!("  {comment}");
    }
    println!("Applets:");
    for applet in &detail.applets {
        println!(
            "  {:>3}  {}  {:<24} {}",
            applet.idx,
            applet.uuid,
            applet.app_id,
            applet.config.as_deref().unwrap_or("")
        );
    }
    println!("Devices:");
    for device in &detail.subscribers {
        println!("  {}  {}", device.uuid, device.name);
    }
    Ok(())
}

/// Attach an app to a channel.
pub async fn add_applet(
    admin: &Admin,
    channel: &str,
    app_id: &str,
    position: Option<i64>,
    config: Option<String>,
) -> Result<()> {
    let channel = resolve_channel(admin, channel)?;
    let applet = admin
        .attach_applet(
            channel,
            NewApplet {
                app_id: app_id.to_string(),
                position,
                config,
            },
        )
        .await?;
    println!("Added {} ({}) at position {}", applet.app_id, applet.uuid, applet.idx);
    Ok(())
}

/// Detach an applet from a channel.
pub async fn remove_applet(admin: &Admin, channel: &str, applet: &str) -> Result<()> {
    let channel = resolve_channel(admin, channel)?;
    let applet = parse_applet(applet)?;
    admin.detach_applet(channel, applet).await?;
    println!("Removed applet {applet}");
    Ok(())
}

/// Move an applet to a new position.
pub async fn move_applet(admin: &Admin, channel: &str, applet: &str, position: i64) -> Result<()> {
    let channel = resolve_channel(admin, channel)?;
    let applet = parse_applet(applet)?;
    let moved = admin
        .modify_applet(
            channel,
            applet,
            AppletUpdate {
                position: Some(position),
                config: None,
            },
        )
        .await?;
    println!("Moved {} ({}) to position {}", moved.app_id, moved.uuid, moved.idx);
    Ok(())
}

/// Replace an applet's configuration.
pub async fn configure_applet(admin: &Admin, channel: &str, applet: &str, config: String) -> Result<()> {
    let channel = resolve_channel(admin, channel)?;
    let applet = parse_applet(applet)?;
    admin
        .modify_applet(
            channel,
            applet,
            AppletUpdate {
                position: None,
                config: Some(config),
            },
        )
        .await?;
    println!("Updated configuration of applet {applet}");
    Ok(())
}

fn parse_applet(applet: &str) -> Result<Uuid> {
    Uuid::parse_str(applet).with_context(|| format!("'{applet}' is not an applet UUID"))
}
