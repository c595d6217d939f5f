//! Interaction coordinator
//!
//! `Viewer` owns the shared view state and routes user input, sensor data
//! and load results to the components that own each concern. It never
//! touches the platform itself: anything that needs the browser is queued
//! as a `HostRequest`, and the host reports back through method calls.
//! The orbit controller and label renderer stay with the host and are
//! lent in per call.

use glam::{Mat4, Vec2};
use tracing::{debug, error, info, warn};

use crate::authority::{AuthorityArbiter, CameraAuthority};
use crate::camera::{Camera, CameraPose};
use crate::catalog::{initial_bookmark, CameraBookmark, Poi};
use crate::config::ViewerConfig;
use crate::flight::{FlightController, FlightMode};
use crate::labels::LabelRenderer;
use crate::markers::PoiRegistry;
use crate::notify::{Notifications, Overlay, Toast, ToastKind};
use crate::orbit::OrbitControls;
use crate::orientation::{
    EnableStep, OrientationError, OrientationFusion, OrientationSample, PermissionKind,
    PermissionOutcome, PermissionSupport,
};
use crate::scene::SceneLoadError;
use crate::schedule::Timers;
use crate::viewport::{ViewportMonitor, ViewportSignals, ViewportState};
use crate::xr::{ArSession, ArSessionRequest, XrError};

/// Side effects the host has to carry out
#[derive(Debug, Clone, PartialEq)]
pub enum HostRequest {
    RequestPermission(PermissionKind),
    SubscribeOrientation,
    UnsubscribeOrientation,
    /// Sample `ViewportSignals` and pass them to `viewport_changed`
    SampleViewport,
    ResizeSurface {
        width: f32,
        height: f32,
        pixel_ratio: f32,
    },
    StartArSession(ArSessionRequest),
    EndArSession,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadState {
    Loading,
    Ready { url: String },
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deferred {
    InitialBookmark,
    ViewportRecheck,
}

pub struct Viewer {
    config: ViewerConfig,
    camera: Camera,
    arbiter: AuthorityArbiter,
    flight: FlightController,
    fusion: OrientationFusion,
    markers: PoiRegistry,
    viewport: ViewportMonitor,
    ar: ArSession,
    timers: Timers<Deferred>,
    notifications: Notifications,
    load_state: LoadState,
    bookmarks: Vec<CameraBookmark>,
    bookmarks_loaded: bool,
    pois: Vec<Poi>,
    active_bookmark: Option<String>,
    active_poi: Option<String>,
    pointer_ndc: Option<Vec2>,
    initial_scheduled: bool,
    requests: Vec<HostRequest>,
}

impl Viewer {
    pub fn new(config: ViewerConfig) -> Self {
        Self {
            camera: Camera::from_config(&config.camera),
            arbiter: AuthorityArbiter::default(),
            flight: FlightController::new(config.camera.clone()),
            fusion: OrientationFusion::new(&config.sensors),
            markers: PoiRegistry::new(config.markers.clone()),
            viewport: ViewportMonitor::new(config.viewport.clone()),
            ar: ArSession::default(),
            timers: Timers::new(),
            notifications: Notifications::default(),
            load_state: LoadState::Loading,
            bookmarks: Vec::new(),
            bookmarks_loaded: false,
            pois: Vec::new(),
            active_bookmark: None,
            active_poi: None,
            pointer_ndc: None,
            initial_scheduled: false,
            requests: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn pose(&self) -> &CameraPose {
        &self.camera.pose
    }

    pub fn authority(&self) -> CameraAuthority {
        self.arbiter.current()
    }

    pub fn is_flying(&self) -> bool {
        self.flight.is_active()
    }

    pub fn orientation(&self) -> &OrientationFusion {
        &self.fusion
    }

    pub fn markers(&self) -> &PoiRegistry {
        &self.markers
    }

    pub fn viewport(&self) -> ViewportState {
        self.viewport.state()
    }

    pub fn ar(&self) -> &ArSession {
        &self.ar
    }

    pub fn toast(&self) -> Option<&Toast> {
        self.notifications.current()
    }

    pub fn load_state(&self) -> &LoadState {
        &self.load_state
    }

    pub fn bookmarks(&self) -> &[CameraBookmark] {
        &self.bookmarks
    }

    pub fn pois(&self) -> &[Poi] {
        &self.pois
    }

    pub fn active_bookmark(&self) -> Option<&str> {
        self.active_bookmark.as_deref()
    }

    pub fn active_poi(&self) -> Option<&str> {
        self.active_poi.as_deref()
    }

    pub fn show_poi_icons(&self) -> bool {
        self.markers.icons_visible()
    }

    /// Where the renderer should put the splat cloud.
    pub fn scene_transform(&self) -> Mat4 {
        self.config.scene.transform()
    }

    /// Blocking overlays, most important first.
    pub fn overlays(&self) -> Vec<Overlay> {
        let mut overlays = Vec::new();
        match &self.load_state {
            LoadState::Loading => overlays.push(Overlay::Loading),
            LoadState::Failed(message) => overlays.push(Overlay::SceneLoadError(message.clone())),
            LoadState::Ready { .. } => {}
        }
        if self.viewport.state().needs_rotation_advisory() {
            overlays.push(Overlay::RotateDevice);
        }
        overlays
    }

    /// Take the queued host requests, oldest first.
    pub fn drain_requests(&mut self) -> Vec<HostRequest> {
        std::mem::take(&mut self.requests)
    }

    /// Bring a freshly created orbit controller in line with the camera.
    pub fn attach_orbit(&self, orbit: &mut dyn OrbitControls) {
        orbit.set_target(self.camera.pose.target);
        orbit.sync_from(&self.camera.pose);
        orbit.set_enabled(self.arbiter.current() == CameraAuthority::OrbitDrag);
    }

    /// Adopt a configuration that arrived after start-up. Everything derived
    /// from the config is rebuilt. What the host has already reported carries
    /// over: AR support, an orientation prompt or session in progress, the
    /// current toast and queued requests.
    pub fn reconfigure(&mut self, config: ViewerConfig, orbit: &mut dyn OrbitControls) {
        self.flight.cancel(orbit, &mut self.arbiter);
        let mut next = Viewer::new(config);
        next.ar = std::mem::take(&mut self.ar);
        next.notifications = std::mem::take(&mut self.notifications);
        next.requests = std::mem::take(&mut self.requests);
        if self.fusion.is_enabling() || self.fusion.is_subscribed() {
            let idle = OrientationFusion::new(&next.config.sensors);
            next.fusion = std::mem::replace(&mut self.fusion, idle);
            next.arbiter = std::mem::take(&mut self.arbiter);
        }
        *self = next;
        self.attach_orbit(orbit);
        info!("Viewer reconfigured");
    }

    // ---- per frame ----

    /// Advance everything to `now_ms`. Call once per rendered frame.
    pub fn frame(
        &mut self,
        now_ms: f64,
        orbit: &mut dyn OrbitControls,
        labels: &mut dyn LabelRenderer,
    ) {
        self.notifications.expire(now_ms);

        for deferred in self.timers.drain_due(now_ms) {
            match deferred {
                Deferred::InitialBookmark => self.apply_initial_bookmark(now_ms, orbit),
                Deferred::ViewportRecheck => self.requests.push(HostRequest::SampleViewport),
            }
        }

        if let Some(activated) = self
            .fusion
            .poll(now_ms, &self.camera.pose, orbit, &mut self.arbiter)
        {
            match activated.warning {
                Some(warning) => self.toast_error(ToastKind::Warning, &warning, now_ms),
                None => {
                    let duration = self.config.notifications.info_ms;
                    self.notifications.show(
                        ToastKind::Info,
                        "Gyro control enabled, move your device to look around",
                        now_ms,
                        duration,
                    );
                }
            }
        }

        if self.flight.is_active() {
            self.flight
                .step(now_ms, &mut self.camera.pose, orbit, &mut self.arbiter);
        } else if self.arbiter.current() == CameraAuthority::OrbitDrag && orbit.enabled() {
            orbit.update(&mut self.camera.pose);
        }

        self.markers.animate((now_ms / 1000.0) as f32);
        self.markers
            .update_labels(&self.camera, self.viewport.state().size(), labels);
    }

    // ---- data ----

    pub fn set_bookmarks(&mut self, bookmarks: Vec<CameraBookmark>, now_ms: f64) {
        info!(count = bookmarks.len(), "Bookmarks loaded");
        self.bookmarks = bookmarks;
        self.bookmarks_loaded = true;
        let stale = self
            .active_bookmark
            .as_ref()
            .is_some_and(|active| !self.bookmarks.iter().any(|b| &b.id == active));
        if stale {
            self.active_bookmark = None;
        }
        self.schedule_initial_bookmark(now_ms);
    }

    pub fn set_pois(&mut self, pois: Vec<Poi>, labels: &mut dyn LabelRenderer) {
        info!(count = pois.len(), "POIs loaded");
        self.pois = pois;
        let stale = self
            .active_poi
            .as_ref()
            .is_some_and(|active| !self.pois.iter().any(|p| &p.id == active));
        if stale {
            self.active_poi = None;
            self.markers.set_active(None);
        }
        if self.load_state != LoadState::Loading {
            self.markers.rebuild(&self.pois, labels);
        }
    }

    pub fn scene_loaded(&mut self, url: &str, now_ms: f64, labels: &mut dyn LabelRenderer) {
        info!(%url, "Scene ready");
        self.load_state = LoadState::Ready {
            url: url.to_string(),
        };
        self.markers.rebuild(&self.pois, labels);
        self.schedule_initial_bookmark(now_ms);
    }

    /// Fatal: the overlay stays up and nothing retries.
    pub fn scene_failed(&mut self, err: &SceneLoadError) {
        error!(error = %err, "Scene failed to load");
        self.load_state = LoadState::Failed(err.to_string());
    }

    fn schedule_initial_bookmark(&mut self, now_ms: f64) {
        let ready = matches!(self.load_state, LoadState::Ready { .. });
        if self.initial_scheduled || !ready || !self.bookmarks_loaded {
            return;
        }
        self.initial_scheduled = true;
        let delay = self.config.camera.initial_bookmark_delay_ms;
        self.timers.schedule(now_ms, delay, Deferred::InitialBookmark);
        debug!(delay, "Initial bookmark scheduled");
    }

    fn apply_initial_bookmark(&mut self, now_ms: f64, orbit: &mut dyn OrbitControls) {
        if self.active_poi.is_some() || self.active_bookmark.is_some() || self.flight.is_active() {
            debug!("User already interacted, skipping initial bookmark");
            return;
        }
        let Some(bookmark) = initial_bookmark(&self.bookmarks).cloned() else {
            return;
        };
        self.active_bookmark = Some(bookmark.id.clone());
        self.flight.fly_to(
            &bookmark,
            FlightMode::Instant,
            now_ms,
            &mut self.camera.pose,
            orbit,
            &mut self.arbiter,
        );
    }

    // ---- pointer and selection ----

    pub fn pointer_moved(&mut self, ndc: Vec2) {
        self.pointer_ndc = Some(ndc);
    }

    /// Pick at the last pointer position. Returns the POI that became
    /// active, if any. The camera never moves.
    pub fn click(&mut self) -> Option<&str> {
        if self.flight.is_active() {
            debug!("Click ignored during flight");
            return None;
        }
        let ndc = self.pointer_ndc?;
        let id = self.markers.pick_at(ndc, &self.camera)?.id.clone();
        info!(poi = %id, "POI selected");
        self.markers.set_active(Some(&id));
        self.active_poi = Some(id);
        self.active_poi.as_deref()
    }

    /// Fly to a bookmark. Ignored while a flight is already running.
    pub fn select_bookmark(&mut self, id: &str, now_ms: f64, orbit: &mut dyn OrbitControls) -> bool {
        if self.flight.is_active() {
            debug!(bookmark = %id, "Bookmark ignored during flight");
            return false;
        }
        let Some(bookmark) = self.bookmarks.iter().find(|b| b.id == id).cloned() else {
            warn!(bookmark = %id, "Unknown bookmark");
            return false;
        };
        self.active_bookmark = Some(bookmark.id.clone());
        self.flight.fly_to(
            &bookmark,
            FlightMode::Animated,
            now_ms,
            &mut self.camera.pose,
            orbit,
            &mut self.arbiter,
        );
        true
    }

    pub fn set_poi_icons_visible(&mut self, visible: bool, labels: &mut dyn LabelRenderer) {
        if visible == self.markers.icons_visible() {
            return;
        }
        self.markers.set_icons_visible(visible);
        if self.load_state != LoadState::Loading {
            self.markers.rebuild(&self.pois, labels);
        }
    }

    pub fn toggle_poi_icons(&mut self, labels: &mut dyn LabelRenderer) {
        let visible = !self.markers.icons_visible();
        self.set_poi_icons_visible(visible, labels);
    }

    // ---- orientation ----

    /// Start enabling gyro control. Must run inside a user gesture.
    pub fn enable_orientation(&mut self, support: PermissionSupport, now_ms: f64) {
        let step = self.fusion.begin_enable(support, now_ms);
        self.continue_enable(step);
    }

    pub fn disable_orientation(&mut self, orbit: &mut dyn OrbitControls) {
        if self.fusion.disable(orbit, &mut self.arbiter) {
            self.requests.push(HostRequest::UnsubscribeOrientation);
        }
    }

    pub fn toggle_orientation(
        &mut self,
        support: PermissionSupport,
        now_ms: f64,
        orbit: &mut dyn OrbitControls,
    ) {
        if self.fusion.is_active() {
            self.disable_orientation(orbit);
        } else {
            self.enable_orientation(support, now_ms);
        }
    }

    pub fn permission_resolved(&mut self, kind: PermissionKind, outcome: PermissionOutcome, now_ms: f64) {
        match self.fusion.permission_resolved(kind, outcome, now_ms) {
            Ok(Some(step)) => self.continue_enable(step),
            Ok(None) => {}
            Err(e) => self.toast_error(ToastKind::Error, &e, now_ms),
        }
    }

    fn continue_enable(&mut self, step: EnableStep) {
        match step {
            EnableStep::RequestPermission(kind) => {
                self.requests.push(HostRequest::RequestPermission(kind))
            }
            EnableStep::StartProbe { .. } => self.requests.push(HostRequest::SubscribeOrientation),
            EnableStep::AlreadyActive | EnableStep::InProgress => {}
        }
    }

    /// Apply a sensor sample right away. Returns whether the pose changed.
    pub fn orientation_sample(&mut self, sample: OrientationSample) -> bool {
        let apply = self.arbiter.current() == CameraAuthority::OrientationFusion;
        self.fusion
            .handle_sample(sample, &mut self.camera.pose, apply)
    }

    fn toast_error(&mut self, kind: ToastKind, err: &OrientationError, now_ms: f64) {
        let duration = match kind {
            ToastKind::Error => self.config.notifications.error_ms,
            ToastKind::Warning => self.config.notifications.warning_ms,
            ToastKind::Info => self.config.notifications.info_ms,
        };
        self.notifications.show(kind, err.to_string(), now_ms, duration);
    }

    // ---- AR ----

    pub fn ar_support_resolved(&mut self, result: Result<bool, XrError>) {
        self.ar.support_resolved(result);
    }

    pub fn toggle_ar(&mut self) {
        if self.ar.is_active() {
            if self.ar.request_stop() {
                self.requests.push(HostRequest::EndArSession);
            }
        } else if let Some(request) = self.ar.request_start() {
            self.requests.push(HostRequest::StartArSession(request));
        }
    }

    pub fn ar_session_started(&mut self, result: Result<(), XrError>) {
        if self.ar.started(result) {
            self.requests.push(HostRequest::EndArSession);
        }
    }

    pub fn ar_session_ended(&mut self, result: Result<(), XrError>) {
        self.ar.ended(result);
    }

    // ---- viewport ----

    /// Feed freshly sampled viewport signals.
    pub fn viewport_changed(&mut self, signals: &ViewportSignals) -> ViewportState {
        let (state, changed) = self.viewport.update(signals);
        if changed {
            self.camera
                .projection
                .set_viewport(state.width_px, state.height_px);
            self.requests.push(HostRequest::ResizeSurface {
                width: state.width_px,
                height: state.height_px,
                pixel_ratio: state.pixel_ratio,
            });
        }
        state
    }

    /// Device rotated. Dimensions settle late on some platforms, so the
    /// viewport is sampled again on a short staggered schedule.
    pub fn orientation_changed(&mut self, signals: &ViewportSignals, now_ms: f64) {
        self.viewport_changed(signals);
        self.timers
            .cancel_where(|d| *d == Deferred::ViewportRecheck);
        for delay in self.viewport.recheck_delays_ms().to_vec() {
            self.timers
                .schedule(now_ms, delay, Deferred::ViewportRecheck);
        }
    }

    // ---- lifecycle ----

    /// Release everything that outlives a frame.
    pub fn teardown(&mut self, orbit: &mut dyn OrbitControls, labels: &mut dyn LabelRenderer) {
        self.flight.cancel(orbit, &mut self.arbiter);
        self.disable_orientation(orbit);
        if self.ar.request_stop() {
            self.requests.push(HostRequest::EndArSession);
        }
        self.markers.dispose(labels);
        self.timers.clear();
        self.notifications.clear();
        self.pointer_ndc = None;
        info!("Viewer torn down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::LabelBoard;
    use crate::orbit::OrbitRig;
    use glam::Vec3;

    struct Host {
        viewer: Viewer,
        orbit: OrbitRig,
        labels: LabelBoard,
    }

    impl Host {
        fn new() -> Self {
            let config = ViewerConfig::default();
            let orbit = OrbitRig::new(config.orbit.clone());
            Self {
                viewer: Viewer::new(config),
                orbit,
                labels: LabelBoard::new(),
            }
        }

        /// Loaded scene and catalogs, landscape desktop viewport.
        fn ready() -> Self {
            let mut host = Self::new();
            host.viewer.viewport_changed(&desktop());
            host.viewer.set_bookmarks(bookmarks(), 0.0);
            host.viewer.set_pois(pois(), &mut host.labels);
            host.viewer.scene_loaded("./scene.sog", 0.0, &mut host.labels);
            host.viewer.drain_requests();
            host
        }

        fn frame(&mut self, now: f64) {
            self.viewer.frame(now, &mut self.orbit, &mut self.labels);
        }

        fn select(&mut self, id: &str, now: f64) -> bool {
            self.viewer.select_bookmark(id, now, &mut self.orbit)
        }

        fn activate_orientation(&mut self, now: f64) {
            self.viewer
                .enable_orientation(PermissionSupport::default(), now);
            self.frame(now + 500.0);
        }
    }

    fn desktop() -> ViewportSignals {
        ViewportSignals {
            window: Vec2::new(1280.0, 800.0),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64)".to_string(),
            device_pixel_ratio: 1.0,
            ..Default::default()
        }
    }

    fn bookmarks() -> Vec<CameraBookmark> {
        let bookmark = |id: &str, position: Vec3, is_initial: bool| CameraBookmark {
            id: id.to_string(),
            name: id.to_uppercase(),
            description: None,
            position,
            camera_direction: None,
            is_initial,
        };
        vec![
            bookmark("start", Vec3::new(0.0, 1.0, 0.0), true),
            bookmark("far", Vec3::new(4.0, 0.0, 0.0), false),
        ]
    }

    fn pois() -> Vec<Poi> {
        vec![Poi {
            id: "statue".to_string(),
            name: "Statue".to_string(),
            // Disc centered on the view axis of the start pose
            position: Vec3::new(0.0, 1.45, 0.0),
        }]
    }

    #[test]
    fn test_initial_bookmark_applied_once_after_delay() {
        let mut host = Host::ready();
        host.frame(499.0);
        assert_eq!(host.viewer.active_bookmark(), None);

        host.frame(500.0);
        assert_eq!(host.viewer.active_bookmark(), Some("start"));
        assert_eq!(host.viewer.pose().position, Vec3::new(0.0, 1.5, 2.0));
        assert!(!host.viewer.is_flying());
        assert_eq!(host.viewer.authority(), CameraAuthority::OrbitDrag);

        // Reloading catalogs does not re-apply it
        host.viewer.set_bookmarks(bookmarks(), 600.0);
        host.select("far", 700.0);
        host.frame(2000.0);
        host.frame(3000.0);
        assert_eq!(host.viewer.active_bookmark(), Some("far"));
    }

    #[test]
    fn test_initial_bookmark_waits_for_scene() {
        let mut host = Host::new();
        host.viewer.set_bookmarks(bookmarks(), 0.0);
        host.frame(1000.0);
        assert_eq!(host.viewer.active_bookmark(), None);

        host.viewer.scene_loaded("./scene.ply", 1000.0, &mut host.labels);
        host.frame(1500.0);
        assert_eq!(host.viewer.active_bookmark(), Some("start"));
    }

    #[test]
    fn test_initial_bookmark_skipped_when_poi_active() {
        let mut host = Host::ready();
        host.viewer.pointer_moved(Vec2::ZERO);
        // Camera at (0, 0, 4) looking at the origin, the statue marker sits there
        assert_eq!(host.viewer.click(), Some("statue"));
        host.frame(500.0);
        assert_eq!(host.viewer.active_bookmark(), None);
        assert_eq!(host.viewer.pose().position, Vec3::new(0.0, 0.0, 4.0));
    }

    #[test]
    fn test_click_selects_without_moving_camera() {
        let mut host = Host::ready();
        let before = *host.viewer.pose();
        host.viewer.pointer_moved(Vec2::ZERO);
        assert_eq!(host.viewer.click(), Some("statue"));
        assert_eq!(host.viewer.active_poi(), Some("statue"));
        assert!(host.viewer.markers().visuals()[0].active);
        assert_eq!(*host.viewer.pose(), before);

        // A miss keeps the selection
        host.viewer.pointer_moved(Vec2::new(0.9, 0.9));
        assert_eq!(host.viewer.click(), None);
        assert_eq!(host.viewer.active_poi(), Some("statue"));
    }

    #[test]
    fn test_click_ignored_while_flying_or_hidden() {
        let mut host = Host::ready();
        host.viewer.pointer_moved(Vec2::ZERO);
        host.select("far", 0.0);
        assert_eq!(host.viewer.click(), None);
        assert_eq!(host.viewer.active_poi(), None);

        let mut host = Host::ready();
        host.viewer.pointer_moved(Vec2::ZERO);
        host.viewer.toggle_poi_icons(&mut host.labels);
        assert!(host.viewer.markers().is_empty());
        assert!(host.labels.is_empty());
        assert_eq!(host.viewer.click(), None);

        host.viewer.toggle_poi_icons(&mut host.labels);
        assert_eq!(host.viewer.markers().len(), 1);
    }

    #[test]
    fn test_bookmark_ignored_during_flight() {
        let mut host = Host::ready();
        assert!(host.select("far", 0.0));
        assert!(!host.orbit.enabled());
        assert!(!host.select("start", 100.0));
        assert_eq!(host.viewer.active_bookmark(), Some("far"));
        assert!(!host.select("missing", 5000.0));

        host.frame(1200.0);
        assert!(!host.viewer.is_flying());
        assert!(host.orbit.enabled());
        assert_eq!(host.viewer.pose().target, Vec3::new(4.0, 0.0, 0.0));
    }

    #[test]
    fn test_orientation_enable_flow_with_prompts() {
        let mut host = Host::ready();
        let support = PermissionSupport {
            motion_prompt: true,
            orientation_prompt: true,
        };
        host.viewer.enable_orientation(support, 0.0);
        assert_eq!(
            host.viewer.drain_requests(),
            vec![HostRequest::RequestPermission(PermissionKind::Motion)]
        );
        host.viewer
            .permission_resolved(PermissionKind::Motion, PermissionOutcome::Granted, 10.0);
        host.viewer
            .permission_resolved(PermissionKind::Orientation, PermissionOutcome::Granted, 20.0);
        assert_eq!(
            host.viewer.drain_requests(),
            vec![
                HostRequest::RequestPermission(PermissionKind::Orientation),
                HostRequest::SubscribeOrientation
            ]
        );

        host.viewer.orientation_sample(OrientationSample::new(0.0, 0.0, -45.0));
        host.frame(520.0);
        assert!(host.viewer.orientation().is_active());
        assert_eq!(host.viewer.authority(), CameraAuthority::OrientationFusion);
        assert!(!host.orbit.enabled());
        assert_eq!(host.viewer.toast().unwrap().kind, ToastKind::Info);
    }

    #[test]
    fn test_orientation_denied_shows_error_and_keeps_orbit() {
        let mut host = Host::ready();
        let support = PermissionSupport {
            motion_prompt: true,
            orientation_prompt: false,
        };
        host.viewer.enable_orientation(support, 0.0);
        host.viewer
            .permission_resolved(PermissionKind::Motion, PermissionOutcome::Denied, 10.0);
        let toast = host.viewer.toast().unwrap();
        assert_eq!(toast.kind, ToastKind::Error);
        assert_eq!(toast.expires_at_ms, 5010.0);
        assert!(!host.viewer.orientation().is_active());
        assert!(host.orbit.enabled());

        host.frame(5010.0);
        assert!(host.viewer.toast().is_none());
    }

    #[test]
    fn test_no_sensor_warns_but_enables() {
        let mut host = Host::ready();
        host.activate_orientation(0.0);
        assert!(host.viewer.orientation().is_active());
        let toast = host.viewer.toast().unwrap();
        assert_eq!(toast.kind, ToastKind::Warning);
        assert_eq!(toast.expires_at_ms, 4500.0);
    }

    #[test]
    fn test_fusion_and_orbit_never_both_drive() {
        let mut host = Host::ready();
        host.activate_orientation(0.0);
        assert!(host.viewer.orientation_sample(OrientationSample::new(10.0, 5.0, -20.0)));
        let fused = host.viewer.pose().rotation;

        // Orbit input while fused changes nothing
        host.orbit.drag(200.0, 0.0);
        host.frame(600.0);
        assert_eq!(host.viewer.pose().rotation, fused);

        host.viewer.disable_orientation(&mut host.orbit);
        assert_eq!(host.viewer.drain_requests(), vec![
            HostRequest::SubscribeOrientation,
            HostRequest::UnsubscribeOrientation,
        ]);
        assert!(host.orbit.enabled());
        assert_eq!(host.viewer.authority(), CameraAuthority::OrbitDrag);

        // Disabling again is a no-op
        host.viewer.disable_orientation(&mut host.orbit);
        assert!(host.viewer.drain_requests().is_empty());
        assert!(host.orbit.enabled());
    }

    #[test]
    fn test_orbit_reaims_after_fusion_disabled() {
        let mut host = Host::ready();
        host.activate_orientation(0.0);
        assert!(host.viewer.orientation_sample(OrientationSample::new(30.0, 60.0, 0.0)));
        host.viewer.disable_orientation(&mut host.orbit);

        for i in 0..10 {
            host.frame(600.0 + 16.0 * i as f64);
        }
        let pose = host.viewer.pose();
        let expected = (host.orbit.target() - pose.position).normalize();
        assert!((pose.forward() - expected).length() < 1e-4);
    }

    #[test]
    fn test_flight_during_fusion_holds_samples_then_resumes() {
        let mut host = Host::ready();
        host.activate_orientation(0.0);
        host.viewer.orientation_sample(OrientationSample::new(0.0, 0.0, -30.0));

        host.select("far", 1000.0);
        assert_eq!(host.viewer.authority(), CameraAuthority::Flight);
        host.frame(1600.0);
        let mid = *host.viewer.pose();
        assert!(!host.viewer.orientation_sample(OrientationSample::new(90.0, 0.0, -30.0)));
        assert_eq!(*host.viewer.pose(), mid);

        host.frame(2200.0);
        assert_eq!(host.viewer.authority(), CameraAuthority::OrientationFusion);
        assert!(!host.orbit.enabled());
        assert!(host.viewer.orientation_sample(OrientationSample::new(90.0, 0.0, -30.0)));
    }

    #[test]
    fn test_disable_fusion_mid_flight_keeps_orbit_off_until_landing() {
        let mut host = Host::ready();
        host.activate_orientation(0.0);
        host.select("far", 1000.0);
        host.viewer.disable_orientation(&mut host.orbit);
        assert!(!host.orbit.enabled());
        host.frame(2200.0);
        assert!(host.orbit.enabled());
    }

    #[test]
    fn test_orientation_change_schedules_rechecks() {
        let mut host = Host::ready();
        let mut phone = ViewportSignals {
            orientation_type: Some("portrait-primary".to_string()),
            window: Vec2::new(390.0, 844.0),
            user_agent: "iPhone".to_string(),
            device_pixel_ratio: 3.0,
            ..Default::default()
        };
        host.viewer.orientation_changed(&phone, 0.0);
        assert_eq!(
            host.viewer.drain_requests(),
            vec![HostRequest::ResizeSurface {
                width: 390.0,
                height: 844.0,
                pixel_ratio: 2.0
            }]
        );
        assert!(host.viewer.overlays().contains(&Overlay::RotateDevice));

        // A second event restarts the schedule instead of stacking it
        phone.orientation_type = Some("landscape-primary".to_string());
        host.viewer.orientation_changed(&phone, 50.0);
        host.viewer.drain_requests();
        host.frame(120.0);
        assert!(host.viewer.drain_requests().is_empty());
        host.frame(150.0);
        assert_eq!(host.viewer.drain_requests(), vec![HostRequest::SampleViewport]);
        host.frame(1000.0);
        assert_eq!(host.viewer.drain_requests().len(), 3);
        assert!(!host.viewer.overlays().contains(&Overlay::RotateDevice));
    }

    #[test]
    fn test_viewport_sets_camera_aspect() {
        let mut host = Host::new();
        host.viewer.viewport_changed(&desktop());
        assert!((host.viewer.camera().projection.aspect - 1.6).abs() < 1e-6);
    }

    #[test]
    fn test_overlays_follow_load_state() {
        let mut host = Host::new();
        assert_eq!(host.viewer.overlays(), vec![Overlay::Loading]);
        host.viewer.scene_failed(&SceneLoadError::NoCandidates);
        assert!(matches!(host.viewer.overlays()[0], Overlay::SceneLoadError(_)));

        let host = Host::ready();
        assert!(host.viewer.overlays().is_empty());
    }

    #[test]
    fn test_markers_wait_for_scene() {
        let mut host = Host::new();
        host.viewer.set_pois(pois(), &mut host.labels);
        assert!(host.viewer.markers().is_empty());
        host.viewer.scene_loaded("./scene.sog", 0.0, &mut host.labels);
        assert_eq!(host.viewer.markers().len(), 1);
        assert_eq!(host.labels.len(), 1);
    }

    #[test]
    fn test_labels_placed_each_frame() {
        let mut host = Host::ready();
        host.frame(16.0);
        let label = host.viewer.markers().visuals()[0].label;
        let placed = host.labels.get(label).unwrap();
        assert!(placed.visible);
        assert!((placed.screen.x - 640.0).abs() < 1e-2);
    }

    #[test]
    fn test_ar_toggle() {
        let mut host = Host::ready();
        host.viewer.toggle_ar();
        assert!(host.viewer.drain_requests().is_empty());

        host.viewer.ar_support_resolved(Ok(true));
        host.viewer.toggle_ar();
        assert!(matches!(
            host.viewer.drain_requests()[..],
            [HostRequest::StartArSession(_)]
        ));
        host.viewer.ar_session_started(Ok(()));
        assert!(host.viewer.ar().is_active());

        host.viewer.toggle_ar();
        assert_eq!(host.viewer.drain_requests(), vec![HostRequest::EndArSession]);
        host.viewer.ar_session_ended(Ok(()));
        assert!(!host.viewer.ar().is_active());

        // Cancelled while the platform was still starting it
        host.viewer.toggle_ar();
        host.viewer.drain_requests();
        host.viewer.teardown(&mut host.orbit, &mut host.labels);
        host.viewer.drain_requests();
        host.viewer.ar_session_started(Ok(()));
        assert_eq!(host.viewer.drain_requests(), vec![HostRequest::EndArSession]);
    }

    #[test]
    fn test_reconfigure_keeps_reported_platform_state() {
        let mut host = Host::new();
        host.viewer.ar_support_resolved(Ok(true));
        host.viewer.enable_orientation(
            PermissionSupport {
                motion_prompt: true,
                orientation_prompt: true,
            },
            0.0,
        );
        assert_eq!(
            host.viewer.drain_requests(),
            vec![HostRequest::RequestPermission(PermissionKind::Motion)]
        );

        let mut config = ViewerConfig::default();
        config.camera.flight_duration_ms = 250.0;
        let mut orbit = OrbitRig::new(config.orbit.clone());
        host.viewer.reconfigure(config, &mut orbit);
        host.orbit = orbit;

        assert_eq!(host.viewer.config().camera.flight_duration_ms, 250.0);
        assert!(host.viewer.ar().is_supported());
        assert!(host.viewer.orientation().is_enabling());

        // The prompt answered for the old engine continues on the new one
        host.viewer
            .permission_resolved(PermissionKind::Motion, PermissionOutcome::Granted, 10.0);
        assert_eq!(
            host.viewer.drain_requests(),
            vec![HostRequest::RequestPermission(PermissionKind::Orientation)]
        );
    }

    #[test]
    fn test_reconfigure_with_active_fusion_keeps_orbit_off() {
        let mut host = Host::new();
        host.activate_orientation(0.0);
        assert_eq!(host.viewer.authority(), CameraAuthority::OrientationFusion);

        let config = ViewerConfig::default();
        let mut orbit = OrbitRig::new(config.orbit.clone());
        host.viewer.reconfigure(config, &mut orbit);
        assert!(!orbit.enabled());
        assert_eq!(host.viewer.authority(), CameraAuthority::OrientationFusion);
        assert!(host.viewer.orientation().is_active());
    }

    #[test]
    fn test_teardown_releases_everything() {
        let mut host = Host::ready();
        host.activate_orientation(0.0);
        host.select("far", 600.0);
        host.viewer.drain_requests();

        host.viewer.teardown(&mut host.orbit, &mut host.labels);
        assert!(!host.viewer.is_flying());
        assert!(!host.viewer.orientation().is_active());
        assert!(host.labels.is_empty());
        assert_eq!(host.viewer.drain_requests(), vec![HostRequest::UnsubscribeOrientation]);
        assert!(host.orbit.enabled());

        // Nothing fires afterwards
        let pose = *host.viewer.pose();
        host.frame(10_000.0);
        assert_eq!(*host.viewer.pose(), pose);
    }
}
