//! Asset fetching: viewer config, catalogs and the splat scene
//!
//! Everything here is async in the browser. Results land in `Pending*`
//! resources and are handed to the engine by per-frame systems.

use bevy::prelude::*;
use splatview_core::catalog::{list_or_empty, parse_bookmarks, parse_pois};
use splatview_core::config::AssetConfig;
use splatview_core::scene::LoadedScene;
use splatview_core::{CameraBookmark, OrbitRig, Poi, SceneLoadError, ViewerConfig};
use std::sync::{Arc, Mutex};

use crate::app::{now_ms, ViewerSet, ViewerState};
use crate::viewport::PendingViewportEvents;

/// Plugin for asset loading
pub struct NetworkPlugin;

impl Plugin for NetworkPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(AssetSource::from_browser())
            .init_resource::<PendingConfig>()
            .init_resource::<PendingBookmarks>()
            .init_resource::<PendingPois>()
            .init_resource::<PendingScene>()
            .init_resource::<SplatScene>()
            .add_systems(Startup, fetch_config)
            .add_systems(
                Update,
                (process_config, process_catalogs, process_scene)
                    .chain()
                    .in_set(ViewerSet::Input),
            );
    }
}

/// Where assets are fetched from
#[derive(Debug, Clone, Resource)]
pub struct AssetSource {
    /// Prefix for relative asset paths, empty for the page origin
    pub base_url: String,
    pub config_url: String,
}

impl Default for AssetSource {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            config_url: "./viewer.toml".to_string(),
        }
    }
}

impl AssetSource {
    /// Read `?assets=` and `?config=` from the page URL.
    pub fn from_browser() -> Self {
        let mut source = Self::default();
        if let Some(base) = query_param("assets") {
            tracing::info!("Using asset base from URL parameter: {}", base);
            source.base_url = base.trim_end_matches('/').to_string();
        }
        if let Some(config) = query_param("config") {
            source.config_url = config;
        }
        source
    }

    /// Resolve a configured asset path against the base.
    pub fn resolve(&self, path: &str) -> String {
        if self.base_url.is_empty() || path.contains("://") {
            return path.to_string();
        }
        format!("{}/{}", self.base_url, path.trim_start_matches("./"))
    }
}

/// Look up a query parameter on the current page.
pub fn query_param(name: &str) -> Option<String> {
    #[cfg(target_arch = "wasm32")]
    {
        let search = web_sys::window()?.location().search().ok()?;
        parse_query_param(&search, name)
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        let _ = name;
        None
    }
}

/// Parse a query parameter from a URL search string
#[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
fn parse_query_param(search: &str, param: &str) -> Option<String> {
    let search = search.trim_start_matches('?');
    for pair in search.split('&') {
        let mut parts = pair.splitn(2, '=');
        if let (Some(key), Some(value)) = (parts.next(), parts.next()) {
            if key == param && !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Config fetched at startup, defaults when absent or invalid
#[derive(Resource, Default)]
pub struct PendingConfig(pub Arc<Mutex<Option<ViewerConfig>>>);

#[derive(Resource, Default)]
pub struct PendingBookmarks(pub Arc<Mutex<Option<Vec<CameraBookmark>>>>);

#[derive(Resource, Default)]
pub struct PendingPois(pub Arc<Mutex<Option<Vec<Poi>>>>);

#[derive(Resource, Default)]
pub struct PendingScene(pub Arc<Mutex<Option<Result<LoadedScene<Vec<u8>>, SceneLoadError>>>>);

/// The loaded splat payload and where the renderer should place it.
/// `scene::attach_splat_payload` hands it to the renderer.
#[derive(Resource, Default)]
pub struct SplatScene {
    pub url: Option<String>,
    pub bytes: Arc<Vec<u8>>,
}

fn fetch_config(source: Res<AssetSource>, pending: Res<PendingConfig>) {
    let pending_clone = pending.0.clone();
    let url = source.config_url.clone();

    #[cfg(target_arch = "wasm32")]
    {
        use wasm_bindgen_futures::spawn_local;
        spawn_local(async move {
            let config = match fetch_text(&url).await {
                Ok(text) => config_or_default(&url, &text),
                Err(e) => {
                    tracing::info!("No viewer config at {} ({}), using defaults", url, e);
                    ViewerConfig::default()
                }
            };
            if let Ok(mut slot) = pending_clone.lock() {
                *slot = Some(config);
            }
        });
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        let path = std::path::Path::new(&url);
        if let Ok(mut slot) = pending_clone.lock() {
            *slot = Some(ViewerConfig::load_or_default(path));
        };
    }
}

#[cfg(target_arch = "wasm32")]
fn config_or_default(url: &str, text: &str) -> ViewerConfig {
    let parsed = ViewerConfig::from_toml_str(text).and_then(|config| {
        config.validate()?;
        Ok(config)
    });
    match parsed {
        Ok(config) => {
            tracing::info!("Loaded viewer config from {}", url);
            config
        }
        Err(e) => {
            tracing::warn!("Ignoring viewer config at {}: {}", url, e);
            ViewerConfig::default()
        }
    }
}

/// Config arrived: rebuild the engine around it and start the asset loads.
fn process_config(
    mut state: ResMut<ViewerState>,
    source: Res<AssetSource>,
    pending: Res<PendingConfig>,
    bookmarks: Res<PendingBookmarks>,
    pois: Res<PendingPois>,
    scene: Res<PendingScene>,
    viewport_events: Res<PendingViewportEvents>,
) {
    let Some(config) = pending.0.try_lock().ok().and_then(|mut slot| slot.take()) else {
        return;
    };
    start_asset_fetches(&config.assets, &source, &bookmarks, &pois, &scene);
    let mut orbit = OrbitRig::new(config.orbit.clone());
    state.viewer.reconfigure(config, &mut orbit);
    state.orbit = orbit;
    // The rebuilt viewport monitor has not seen the page yet
    viewport_events.push_resize();
}

fn start_asset_fetches(
    assets: &AssetConfig,
    source: &AssetSource,
    bookmarks: &PendingBookmarks,
    pois: &PendingPois,
    scene: &PendingScene,
) {
    let cameras_url = source.resolve(&assets.cameras);
    let pois_url = source.resolve(&assets.pois);
    let candidates: Vec<String> = assets
        .scene_candidates
        .iter()
        .map(|path| source.resolve(path))
        .collect();
    tracing::info!("Fetching {}, {} and scene candidates {:?}", cameras_url, pois_url, candidates);

    let bookmarks_clone = bookmarks.0.clone();
    let pois_clone = pois.0.clone();
    let scene_clone = scene.0.clone();

    #[cfg(target_arch = "wasm32")]
    {
        use wasm_bindgen_futures::spawn_local;

        spawn_local(async move {
            let fetched = fetch_text(&cameras_url).await;
            let list = list_or_empty(&cameras_url, fetched, parse_bookmarks);
            if let Ok(mut slot) = bookmarks_clone.lock() {
                *slot = Some(list);
            }
        });

        spawn_local(async move {
            let fetched = fetch_text(&pois_url).await;
            let list = list_or_empty(&pois_url, fetched, parse_pois);
            if let Ok(mut slot) = pois_clone.lock() {
                *slot = Some(list);
            }
        });

        spawn_local(async move {
            let result = splatview_core::load_first(&candidates, |url| async move {
                fetch_bytes(&url).await
            })
            .await;
            if let Ok(mut slot) = scene_clone.lock() {
                *slot = Some(result);
            }
        });
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        let read = |path: &str| std::fs::read_to_string(path);
        let list = list_or_empty(&cameras_url, read(&cameras_url), parse_bookmarks);
        if let Ok(mut slot) = bookmarks_clone.lock() {
            *slot = Some(list);
        }
        let list = list_or_empty(&pois_url, read(&pois_url), parse_pois);
        if let Ok(mut slot) = pois_clone.lock() {
            *slot = Some(list);
        }
        let first = candidates
            .iter()
            .find_map(|url| std::fs::read(url).ok().map(|bytes| (url.clone(), bytes)));
        let result = match first {
            Some((url, scene)) => Ok(LoadedScene { url, scene }),
            None if candidates.is_empty() => Err(SceneLoadError::NoCandidates),
            None => Err(SceneLoadError::Exhausted(
                candidates
                    .iter()
                    .map(|url| (url.clone(), "not readable".to_string()))
                    .collect(),
            )),
        };
        if let Ok(mut slot) = scene_clone.lock() {
            *slot = Some(result);
        };
    }
}

#[cfg(target_arch = "wasm32")]
async fn fetch_text(url: &str) -> Result<String, String> {
    let response = gloo_net::http::Request::get(url)
        .send()
        .await
        .map_err(|e| e.to_string())?;
    if !response.ok() {
        return Err(format!("HTTP {}", response.status()));
    }
    response.text().await.map_err(|e| e.to_string())
}

#[cfg(target_arch = "wasm32")]
async fn fetch_bytes(url: &str) -> Result<Vec<u8>, String> {
    let response = gloo_net::http::Request::get(url)
        .send()
        .await
        .map_err(|e| e.to_string())?;
    if !response.ok() {
        return Err(format!("HTTP {}", response.status()));
    }
    response.binary().await.map_err(|e| e.to_string())
}

fn process_catalogs(
    mut state: ResMut<ViewerState>,
    bookmarks: Res<PendingBookmarks>,
    pois: Res<PendingPois>,
    time: Res<Time<Real>>,
) {
    let ViewerState { viewer, labels, .. } = &mut *state;

    if let Some(list) = bookmarks.0.try_lock().ok().and_then(|mut slot| slot.take()) {
        viewer.set_bookmarks(list, now_ms(&time));
    }
    if let Some(list) = pois.0.try_lock().ok().and_then(|mut slot| slot.take()) {
        viewer.set_pois(list, labels);
    }
}

fn process_scene(
    mut state: ResMut<ViewerState>,
    mut splat: ResMut<SplatScene>,
    pending: Res<PendingScene>,
    time: Res<Time<Real>>,
) {
    let Some(result) = pending.0.try_lock().ok().and_then(|mut slot| slot.take()) else {
        return;
    };
    let ViewerState { viewer, labels, .. } = &mut *state;
    match result {
        Ok(loaded) => {
            tracing::info!("Scene {} loaded ({} bytes)", loaded.url, loaded.scene.len());
            viewer.scene_loaded(&loaded.url, now_ms(&time), labels);
            splat.url = Some(loaded.url);
            splat.bytes = Arc::new(loaded.scene);
        }
        Err(e) => viewer.scene_failed(&e),
    }
}
