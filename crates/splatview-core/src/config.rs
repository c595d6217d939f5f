//! Viewer configuration
//!
//! Every tunable of the engine lives here with its stock value as the serde
//! default, so an empty or partial `viewer.toml` is always valid.

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level viewer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ViewerConfig {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub orbit: OrbitConfig,
    #[serde(default)]
    pub markers: MarkerConfig,
    #[serde(default)]
    pub viewport: ViewportConfig,
    #[serde(default)]
    pub sensors: SensorConfig,
    #[serde(default)]
    pub assets: AssetConfig,
    #[serde(default)]
    pub scene: SceneConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

impl ViewerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load from `path`, falling back to defaults when the file is missing
    /// or invalid.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            info!(path = %path.display(), "No viewer config found, using defaults");
            return Self::default();
        }
        match Self::from_file(path) {
            Ok(config) => {
                info!(path = %path.display(), "Loaded viewer config");
                config
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring invalid viewer config");
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.orbit.min_distance <= 0.0 || self.orbit.min_distance > self.orbit.max_distance {
            return Err(ConfigError::Invalid(format!(
                "orbit distance range {}..{} is empty",
                self.orbit.min_distance, self.orbit.max_distance
            )));
        }
        if self.orbit.min_polar > self.orbit.max_polar {
            return Err(ConfigError::Invalid(format!(
                "orbit polar range {}..{} is empty",
                self.orbit.min_polar, self.orbit.max_polar
            )));
        }
        if !(0.0..=1.0).contains(&self.orbit.damping) {
            return Err(ConfigError::Invalid(format!(
                "orbit damping {} must be within 0..=1",
                self.orbit.damping
            )));
        }
        if self.camera.flight_duration_ms < 0.0 {
            return Err(ConfigError::Invalid("flight duration must not be negative".into()));
        }
        if self.assets.scene_candidates.is_empty() {
            return Err(ConfigError::Invalid("at least one scene candidate is required".into()));
        }
        Ok(())
    }
}

/// Camera lens and bookmark flight settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Vertical field of view in degrees
    #[serde(default = "default_fov")]
    pub fov_deg: f32,
    #[serde(default = "default_near")]
    pub near: f32,
    #[serde(default = "default_far")]
    pub far: f32,
    /// Pose before any bookmark is applied
    #[serde(default = "default_start_position")]
    pub start_position: [f32; 3],
    /// Animated flight duration
    #[serde(default = "default_flight_duration")]
    pub flight_duration_ms: f64,
    /// Multiple of the bookmark direction the eye is placed behind the point
    #[serde(default = "default_standoff")]
    pub standoff: f32,
    /// Extra eye height above the standoff point
    #[serde(default = "default_lift")]
    pub lift: f32,
    /// Delay between data load and the initial bookmark jump
    #[serde(default = "default_initial_delay")]
    pub initial_bookmark_delay_ms: f64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_deg: default_fov(),
            near: default_near(),
            far: default_far(),
            start_position: default_start_position(),
            flight_duration_ms: default_flight_duration(),
            standoff: default_standoff(),
            lift: default_lift(),
            initial_bookmark_delay_ms: default_initial_delay(),
        }
    }
}

fn default_fov() -> f32 {
    60.0
}

fn default_near() -> f32 {
    0.1
}

fn default_far() -> f32 {
    1000.0
}

fn default_start_position() -> [f32; 3] {
    [0.0, 0.0, 4.0]
}

fn default_flight_duration() -> f64 {
    1200.0
}

fn default_standoff() -> f32 {
    2.0
}

fn default_lift() -> f32 {
    0.5
}

fn default_initial_delay() -> f64 {
    500.0
}

/// Orbit-drag controller limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrbitConfig {
    #[serde(default = "default_damping")]
    pub damping: f32,
    #[serde(default = "default_min_distance")]
    pub min_distance: f32,
    #[serde(default = "default_max_distance")]
    pub max_distance: f32,
    /// Polar limits in radians, measured from +Y
    #[serde(default)]
    pub min_polar: f32,
    #[serde(default = "default_max_polar")]
    pub max_polar: f32,
    /// Radians of rotation per pixel of drag
    #[serde(default = "default_rotate_speed")]
    pub rotate_speed: f32,
    /// Dolly factor per wheel notch
    #[serde(default = "default_zoom_step")]
    pub zoom_step: f32,
}

impl Default for OrbitConfig {
    fn default() -> Self {
        Self {
            damping: default_damping(),
            min_distance: default_min_distance(),
            max_distance: default_max_distance(),
            min_polar: 0.0,
            max_polar: default_max_polar(),
            rotate_speed: default_rotate_speed(),
            zoom_step: default_zoom_step(),
        }
    }
}

fn default_damping() -> f32 {
    0.1
}

fn default_min_distance() -> f32 {
    0.1
}

fn default_max_distance() -> f32 {
    10.0
}

fn default_max_polar() -> f32 {
    std::f32::consts::PI
}

fn default_rotate_speed() -> f32 {
    0.005
}

fn default_zoom_step() -> f32 {
    0.95
}

/// POI marker geometry and styling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerConfig {
    /// Vertical offset applied to every marker group
    #[serde(default = "default_vertical_bias")]
    pub vertical_bias: f32,
    /// Label anchor height above the marker group
    #[serde(default = "default_label_lift")]
    pub label_lift: f32,
    #[serde(default = "default_accent")]
    pub accent_color: u32,
    #[serde(default = "default_highlight")]
    pub highlight_color: u32,
    /// Ring spin per second, radians
    #[serde(default = "default_ring_spin")]
    pub ring_spin_rate: f32,
    /// Label text when a POI has no name
    #[serde(default = "default_label_fallback")]
    pub label_fallback: String,
    /// Whether POI icons start visible
    #[serde(default = "default_true")]
    pub icons_visible: bool,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            vertical_bias: default_vertical_bias(),
            label_lift: default_label_lift(),
            accent_color: default_accent(),
            highlight_color: default_highlight(),
            ring_spin_rate: default_ring_spin(),
            label_fallback: default_label_fallback(),
            icons_visible: true,
        }
    }
}

fn default_vertical_bias() -> f32 {
    -1.5
}

fn default_label_lift() -> f32 {
    1.2
}

fn default_accent() -> u32 {
    0x4a90e2
}

fn default_highlight() -> u32 {
    0xff6b35
}

fn default_ring_spin() -> f32 {
    0.6 // 0.01 rad per frame at 60 fps
}

fn default_label_fallback() -> String {
    "POI".to_string()
}

fn default_true() -> bool {
    true
}

/// Device classification and orientation recheck timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewportConfig {
    /// Windows at or below this width count as mobile
    #[serde(default = "default_mobile_width")]
    pub mobile_max_width: f32,
    /// Case-insensitive user-agent tokens that mark a mobile device
    #[serde(default = "default_mobile_agents")]
    pub mobile_agents: Vec<String>,
    /// Delays after an orientation change at which the viewport is re-sampled
    #[serde(default = "default_recheck")]
    pub recheck_delays_ms: Vec<f64>,
    #[serde(default = "default_max_pixel_ratio")]
    pub max_pixel_ratio: f32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            mobile_max_width: default_mobile_width(),
            mobile_agents: default_mobile_agents(),
            recheck_delays_ms: default_recheck(),
            max_pixel_ratio: default_max_pixel_ratio(),
        }
    }
}

fn default_mobile_width() -> f32 {
    900.0
}

fn default_mobile_agents() -> Vec<String> {
    ["android", "iphone", "ipad", "ipod"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_recheck() -> Vec<f64> {
    vec![100.0, 200.0, 350.0, 500.0]
}

fn default_max_pixel_ratio() -> f32 {
    2.0
}

/// Orientation sensor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    /// How long to wait for a first sample before warning
    #[serde(default = "default_probe_window")]
    pub probe_window_ms: f64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            probe_window_ms: default_probe_window(),
        }
    }
}

fn default_probe_window() -> f64 {
    500.0
}

/// Asset locations, relative to the page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetConfig {
    /// Scene files tried in order; the first that loads wins
    #[serde(default = "default_scene_candidates")]
    pub scene_candidates: Vec<String>,
    #[serde(default = "default_cameras")]
    pub cameras: String,
    #[serde(default = "default_pois")]
    pub pois: String,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            scene_candidates: default_scene_candidates(),
            cameras: default_cameras(),
            pois: default_pois(),
        }
    }
}

fn default_scene_candidates() -> Vec<String> {
    vec!["./scene.sog".to_string(), "./scene.ply".to_string()]
}

fn default_cameras() -> String {
    "./cameras.json".to_string()
}

fn default_pois() -> String {
    "./pois.json".to_string()
}

/// Placement of the splat cloud in world space. POIs and bookmarks are
/// authored in world space and are not affected by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    #[serde(default = "default_scene_scale")]
    pub scale: f32,
    #[serde(default = "default_splat_offset")]
    pub offset: [f32; 3],
    /// Turn the cloud upside down (180 degrees about X)
    #[serde(default = "default_true")]
    pub flip_x: bool,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            scale: default_scene_scale(),
            offset: default_splat_offset(),
            flip_x: true,
        }
    }
}

impl SceneConfig {
    /// Root scale, then the splat offset, then the flip.
    pub fn transform(&self) -> Mat4 {
        let flip = if self.flip_x {
            Quat::from_rotation_x(std::f32::consts::PI)
        } else {
            Quat::IDENTITY
        };
        Mat4::from_scale(Vec3::splat(self.scale))
            * Mat4::from_rotation_translation(flip, Vec3::from_array(self.offset))
    }
}

fn default_scene_scale() -> f32 {
    50.0
}

fn default_splat_offset() -> [f32; 3] {
    [-0.1, -0.18, -0.1]
}

/// Toast lifetimes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_error_toast")]
    pub error_ms: f64,
    #[serde(default = "default_warning_toast")]
    pub warning_ms: f64,
    #[serde(default = "default_info_toast")]
    pub info_ms: f64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            error_ms: default_error_toast(),
            warning_ms: default_warning_toast(),
            info_ms: default_info_toast(),
        }
    }
}

fn default_error_toast() -> f64 {
    5000.0
}

fn default_warning_toast() -> f64 {
    4000.0
}

fn default_info_toast() -> f64 {
    3000.0
}
