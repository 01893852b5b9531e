//! Offline administration against an on-disk store.

use std::path::PathBuf;
use std::sync::Arc;

use pixelcast::catalog::{Catalog, DirCatalog, Manifest};
use pixelcast::config::Config;
use pixelcast::constants::DEFAULT_CHANNEL_UUID;
use pixelcast::store::{AppletUpdate, NewApplet, Store};
use pixelcast::{commands, Admin, Error};
use tempfile::TempDir;

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

fn admin(dir: &TempDir) -> Admin {
    let store = Store::open(&dir.path().join("etc").join("cfg.db")).unwrap();
    let mut catalog = DirCatalog::default();
    catalog.insert(manifest("clock-by-henry"));
    catalog.insert(manifest("dvd-logo"));
    catalog.insert(manifest("nyan-cat"));
    let catalog: Arc<dyn Catalog> = Arc::new(catalog);
    Admin::offline(Arc::new(store), catalog)
}

fn order(admin: &Admin) -> Vec<String> {
    admin
        .get_channel(DEFAULT_CHANNEL_UUID)
        .unwrap()
        .applets
        .into_iter()
        .map(|applet| applet.app_id)
        .collect()
}

#[tokio::test]
async fn test_move_then_delete_on_seeded_channel() {
    let dir = TempDir::new().unwrap();
    let admin = admin(&dir);
    assert_eq!(order(&admin), ["clock-by-henry", "dvd-logo"]);

    let dvd = admin.get_channel(DEFAULT_CHANNEL_UUID).unwrap().applets[1].uuid;
    let moved = admin
        .modify_applet(
            DEFAULT_CHANNEL_UUID,
            dvd,
            AppletUpdate {
                position: Some(0),
                config: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(moved.idx, 0);
    assert_eq!(order(&admin), ["dvd-logo", "clock-by-henry"]);

    admin.detach_applet(DEFAULT_CHANNEL_UUID, dvd).await.unwrap();
    let applets = admin.get_channel(DEFAULT_CHANNEL_UUID).unwrap().applets;
    assert_eq!(applets.len(), 1);
    assert_eq!(applets[0].app_id, "clock-by-henry");
    assert_eq!(applets[0].idx, 0);
}

#[tokio::test]
async fn test_insert_at_front_shifts_existing() {
    let dir = TempDir::new().unwrap();
    let admin = admin(&dir);
    let channel = admin.create_channel("kitchen", Some("by the fridge")).unwrap();

    admin
        .attach_applet(
            channel.uuid,
            NewApplet {
                app_id: "clock-by-henry".to_string(),
                position: None,
                config: None,
            },
        )
        .await
        .unwrap();
    let front = admin
        .attach_applet(
            channel.uuid,
            NewApplet {
                app_id: "nyan-cat".to_string(),
                position: Some(0),
                config: Some(r#"{"speed":"fast"}"#.to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(front.idx, 0);

    let applets = admin.get_channel(channel.uuid).unwrap().applets;
    let summary: Vec<(i64, &str)> = applets.iter().map(|a| (a.idx, a.app_id.as_str())).collect();
    assert_eq!(summary, [(0, "nyan-cat"), (1, "clock-by-henry")]);
}

#[tokio::test]
async fn test_rejected_requests_leave_store_untouched() {
    let dir = TempDir::new().unwrap();
    let admin = admin(&dir);

    let unknown = admin
        .attach_applet(
            DEFAULT_CHANNEL_UUID,
            NewApplet {
                app_id: "not-installed".to_string(),
                position: None,
                config: None,
            },
        )
        .await;
    assert!(matches!(unknown, Err(Error::UnknownApp(_))));

    let too_far = admin
        .attach_applet(
            DEFAULT_CHANNEL_UUID,
            NewApplet {
                app_id: "dvd-logo".to_string(),
                position: Some(5),
                config: None,
            },
        )
        .await;
    assert!(matches!(too_far, Err(Error::IndexOutOfRange { index: 5, count: 2 })));

    let bad_config = admin
        .attach_applet(
            DEFAULT_CHANNEL_UUID,
            NewApplet {
                app_id: "dvd-logo".to_string(),
                position: None,
                config: Some("[1, 2]".to_string()),
            },
        )
        .await;
    assert!(matches!(bad_config, Err(Error::InvalidRequest(_))));

    assert!(matches!(
        admin.create_channel("DEFAULT", None),
        Err(Error::ChannelExists { .. })
    ));
    assert_eq!(order(&admin), ["clock-by-henry", "dvd-logo"]);
}

#[test]
fn test_store_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let admin = admin(&dir);
        admin.create_channel("porch", None).unwrap();
    }
    let admin = admin(&dir);
    let names: Vec<String> = admin
        .list_channels()
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, ["default", "porch"]);
}

#[test]
fn test_offline_admin_from_config() {
    let dir = TempDir::new().unwrap();
    let app_dir = dir.path().join("apps").join("dvd-logo");
    std::fs::create_dir_all(&app_dir).unwrap();
    std::fs::write(
        app_dir.join("manifest.json"),
        r#"{"id": "dvd-logo", "name": "DVD Logo", "summary": "Bouncing logo", "desc": "", "author": "tests"}"#,
    )
    .unwrap();

    let config = Config {
        database_path: dir.path().join("cfg.db"),
        apps_dir: dir.path().join("apps"),
        ..Config::default()
    };
    let admin = commands::offline_admin(&config).unwrap();
    let apps = admin.list_apps();
    assert_eq!(apps.len(), 1);
    assert_eq!(apps[0].name, "DVD Logo");

    assert_eq!(
        commands::resolve_channel(&admin, "default").unwrap(),
        DEFAULT_CHANNEL_UUID
    );
    assert_eq!(
        commands::resolve_channel(&admin, &DEFAULT_CHANNEL_UUID.to_string()).unwrap(),
        DEFAULT_CHANNEL_UUID
    );
    assert!(commands::resolve_channel(&admin, "nowhere").is_err());
}
