//! Startup validation of the served site
//!
//! Reads the site's viewer.toml and runs the catalogs through the same
//! parser the viewer uses, so broken entries show up in the server log
//! instead of silently disappearing in the browser.

use splatview_core::catalog::{parse_bookmarks, parse_pois, CatalogIssue, Parsed};
use splatview_core::{CatalogError, ViewerConfig};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum CatalogStatus {
    /// Parsed; the viewer will show `entries` items
    Loaded {
        entries: usize,
        issues: Vec<CatalogIssue>,
    },
    /// The viewer will fall back to an empty list
    Unusable(String),
    /// Hosted elsewhere, not checked
    Remote,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogReport {
    pub path: String,
    pub status: CatalogStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SiteReport {
    pub catalogs: Vec<CatalogReport>,
    /// First scene candidate present on disk
    pub scene: Option<String>,
}

impl SiteReport {
    /// Whether the viewer will come up with everything it was given.
    pub fn is_clean(&self) -> bool {
        self.scene.is_some()
            && self.catalogs.iter().all(|report| match &report.status {
                CatalogStatus::Loaded { issues, .. } => issues.is_empty(),
                CatalogStatus::Unusable(_) => false,
                CatalogStatus::Remote => true,
            })
    }

    pub fn log(&self) {
        for report in &self.catalogs {
            match &report.status {
                CatalogStatus::Loaded { entries, issues } => {
                    info!(path = %report.path, entries, "Catalog OK");
                    for issue in issues {
                        warn!(path = %report.path, "{}", issue);
                    }
                }
                CatalogStatus::Unusable(reason) => {
                    warn!(path = %report.path, %reason, "Catalog unusable, the viewer will show nothing")
                }
                CatalogStatus::Remote => info!(path = %report.path, "Remote catalog, not checked"),
            }
        }
        match &self.scene {
            Some(scene) => info!(%scene, "Scene file found"),
            None => warn!("No scene file found, the viewer will show a load error"),
        }
    }
}

fn is_remote(path: &str) -> bool {
    path.contains("://")
}

fn local_path(site: &Path, path: &str) -> PathBuf {
    site.join(path.trim_start_matches("./"))
}

fn check_catalog<T>(
    site: &Path,
    path: &str,
    parse: fn(&str) -> Result<Parsed<T>, CatalogError>,
) -> CatalogReport {
    let status = if is_remote(path) {
        CatalogStatus::Remote
    } else {
        match std::fs::read_to_string(local_path(site, path)) {
            Ok(body) => match parse(&body) {
                Ok(parsed) => CatalogStatus::Loaded {
                    entries: parsed.items.len(),
                    issues: parsed.issues,
                },
                Err(e) => CatalogStatus::Unusable(e.to_string()),
            },
            Err(e) => CatalogStatus::Unusable(e.to_string()),
        }
    };
    CatalogReport {
        path: path.to_string(),
        status,
    }
}

/// Check the site directory the way the viewer will see it.
pub fn check_site(site: &Path) -> SiteReport {
    let config = ViewerConfig::load_or_default(&site.join("viewer.toml"));
    let assets = &config.assets;

    let catalogs = vec![
        check_catalog(site, &assets.cameras, parse_bookmarks),
        check_catalog(site, &assets.pois, parse_pois),
    ];
    let scene = assets
        .scene_candidates
        .iter()
        .find(|candidate| is_remote(candidate) || local_path(site, candidate).is_file())
        .cloned();

    SiteReport { catalogs, scene }
}
