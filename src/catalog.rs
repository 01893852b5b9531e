//! Applet catalog.
//!
//! Apps live as bundles under one directory, each with a manifest:
//!
//! ```text
//! apps/
//! ├── clock-by-henry/
//! │   ├── manifest.json
//! │   └── clock.webp
//! └── dvd-logo/
//!     └── manifest.json
//! ```
//!
//! The hub only needs two things from the catalog: resolving an app id to
//! its manifest (with a handle to the bundle), and listing what is
//! installed. [`Catalog`] is the seam; [`DirCatalog`] is the filesystem
//! implementation loaded once at startup.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use globset::{GlobBuilder, GlobMatcher};
use serde::{Deserialize, Serialize};

/// Manifest file name expected inside every bundle.
const MANIFEST_FILE: &str = "manifest.json";

/// Directory levels scanned below the apps root.
const MAX_SCAN_DEPTH: usize = 3;

/// Describes one installed app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Catalog id, referenced by channel applets.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// One-line summary.
    #[serde(default)]
    pub summary: String,
    /// Longer description.
    #[serde(default)]
    pub desc: String,
    /// Author credit.
    #[serde(default)]
    pub author: String,
    /// Pre-rendered image inside the bundle, for apps that display a
    /// static picture.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Bundle directory the manifest was loaded from.
    #[serde(skip)]
    pub bundle: PathBuf,
}

/// Lookup of installed apps.
pub trait Catalog: Send + Sync {
    /// Resolve an app id.
    fn find_manifest(&self, id: &str) -> Option<Arc<Manifest>>;

    /// Every installed app, sorted by id.
    fn manifests(&self) -> Vec<Arc<Manifest>>;
}

/// Catalog backed by `<root>/*/manifest.json`.
#[derive(Debug, Default)]
pub struct DirCatalog {
    manifests: BTreeMap<String, Arc<Manifest>>,
}

impl DirCatalog {
    /// Scan `root` for bundles.
    ///
    /// Unreadable or malformed manifests are logged and skipped; a missing
    /// root yields an empty catalog.
    pub fn load(root: &Path) -> Self {
        let mut catalog = Self::default();

        let matcher = match manifest_matcher() {
            Ok(matcher) => matcher,
            Err(e) => {
                log::error!("[Catalog] Invalid manifest pattern: {}", e);
                return catalog;
            }
        };

        if !root.is_dir() {
            log::warn!("[Catalog] Apps directory {} does not exist", root.display());
            return catalog;
        }

        let mut candidates = Vec::new();
        collect_files(root, root, &matcher, 0, &mut candidates);
        candidates.sort();

        for manifest_path in candidates {
            let Some(bundle) = manifest_path.parent() else {
                continue;
            };
            match load_manifest(&manifest_path, bundle) {
                Ok(manifest) => {
                    log::info!(
                        "[Catalog] Loaded app {} from {}",
                        manifest.id,
                        manifest_path.display()
                    );
                    catalog.insert(manifest);
                }
                Err(e) => {
                    log::warn!(
                        "[Catalog] Failed to load manifest {}: {}",
                        manifest_path.display(),
                        e
                    );
                }
            }
        }

        catalog
    }

    /// Add (or replace) an app.
    pub fn insert(&mut self, manifest: Manifest) {
        self.manifests.insert(manifest.id.clone(), Arc::new(manifest));
    }

    /// Number of installed apps.
    pub fn len(&self) -> usize {
        self.manifests.len()
    }

    /// Whether no apps are installed.
    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }
}

impl Catalog for DirCatalog {
    fn find_manifest(&self, id: &str) -> Option<Arc<Manifest>> {
        self.manifests.get(id).cloned()
    }

    fn manifests(&self) -> Vec<Arc<Manifest>> {
        self.manifests.values().cloned().collect()
    }
}

fn manifest_matcher() -> Result<GlobMatcher, globset::Error> {
    // Bundle manifests sit exactly one directory below the apps root.
    Ok(GlobBuilder::new(&format!("*/{MANIFEST_FILE}"))
        .literal_separator(true)
        .build()?
        .compile_matcher())
}

/// Walk `current_dir`, keeping files whose path relative to `root` matches.
fn collect_files(
    root: &Path,
    current_dir: &Path,
    matcher: &GlobMatcher,
    depth: usize,
    found: &mut Vec<PathBuf>,
) {
    if depth > MAX_SCAN_DEPTH {
        return;
    }
    let entries = match fs::read_dir(current_dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("[Catalog] Cannot read {}: {}", current_dir.display(), e);
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        // Hidden directories hold editor and VCS state, never bundles.
        if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'))
        {
            continue;
        }
        if path.is_dir() {
            collect_files(root, &path, matcher, depth + 1, found);
        } else if let Ok(rel_path) = path.strip_prefix(root) {
            if matcher.is_match(rel_path) {
                found.push(path);
            }
        }
    }
}

fn load_manifest(path: &Path, bundle: &Path) -> anyhow::Result<Manifest> {
    let content = fs::read_to_string(path)?;
    let mut manifest: Manifest = serde_json::from_str(&content)?;
    if manifest.id.is_empty() {
        anyhow::bail!("manifest has an empty id");
    }
    manifest.bundle = bundle.to_path_buf();
    Ok(manifest)
}
