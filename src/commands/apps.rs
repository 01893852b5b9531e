//! Catalog listing.

use anyhow::Result;

use super::print_json;
use crate::admin::Admin;

/// Print installed apps sorted by id.
pub fn list(admin: &Admin, json: bool) -> Result<()> {
    let apps = admin.list_apps();
    if json {
        return print_json(&apps);
    }
    if apps.is_empty() {
        println!("No apps installed.");
        return Ok(());
    }
    for app in apps {
        println!("{:<24} {:<24} {}", app.id, app.name, app.summary);
    }
    Ok(())
}
