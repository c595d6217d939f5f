//! Splatview Core - view control and interaction engine
//!
//! This crate holds everything about the viewer that is not rendering:
//! - Camera flights between bookmarks and the shared camera pose
//! - Device orientation fusion for gyro-driven looking around
//! - POI markers, hit-testing and screen-space labels
//! - Viewport and device-orientation classification
//! - The coordinator that arbitrates which control source owns the camera
//!
//! It performs no I/O. Hosts drive it once per frame and carry out the
//! `HostRequest`s it emits.

pub mod authority;
pub mod camera;
pub mod catalog;
pub mod config;
pub mod flight;
pub mod labels;
pub mod markers;
pub mod notify;
pub mod orbit;
pub mod orientation;
pub mod picking;
pub mod scene;
pub mod schedule;
pub mod viewer;
pub mod viewport;
pub mod xr;

pub use authority::{AuthorityArbiter, CameraAuthority};
pub use camera::{Camera, CameraPose};
pub use catalog::{CameraBookmark, CatalogError, Poi};
pub use config::{ConfigError, ViewerConfig};
pub use flight::{FlightController, FlightMode};
pub use labels::{LabelBoard, LabelId, LabelRenderer};
pub use markers::PoiRegistry;
pub use notify::{Overlay, Toast, ToastKind};
pub use orbit::{OrbitControls, OrbitRig};
pub use orientation::{
    OrientationError, OrientationSample, PermissionKind, PermissionOutcome, PermissionSupport,
};
pub use scene::{load_first, SceneLoadError};
pub use schedule::Tick;
pub use viewer::{HostRequest, LoadState, Viewer};
pub use viewport::{ViewportSignals, ViewportState};
pub use xr::{ArSessionRequest, XrError};
