//! Camera flights to bookmarks
//!
//! A flight moves the eye and the look-at target from wherever the camera
//! currently is to the pose a bookmark describes. Instant flights happen in
//! one call; animated flights are stepped once per frame until they land.

use glam::Vec3;
use tracing::{debug, info};

use crate::authority::{AuthorityArbiter, AuthorityChange};
use crate::camera::CameraPose;
use crate::catalog::CameraBookmark;
use crate::config::CameraConfig;
use crate::orbit::OrbitControls;
use crate::schedule::Tick;

/// Direction used by bookmarks that don't specify one
pub const DEFAULT_DIRECTION: Vec3 = Vec3::NEG_Z;

/// Eye position plus the point it looks at
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewPoint {
    pub eye: Vec3,
    pub look_at: Vec3,
}

impl ViewPoint {
    /// Stand `standoff` direction-lengths behind the bookmark, raised by
    /// `lift`, looking at the bookmark position. The direction is used as
    /// authored, so its length scales the standoff.
    pub fn for_bookmark(bookmark: &CameraBookmark, config: &CameraConfig) -> Self {
        let direction = bookmark.camera_direction.unwrap_or(DEFAULT_DIRECTION);
        Self {
            eye: bookmark.position - direction * config.standoff + Vec3::Y * config.lift,
            look_at: bookmark.position,
        }
    }

    fn of(pose: &CameraPose) -> Self {
        Self {
            eye: pose.position,
            look_at: pose.target,
        }
    }

    fn lerp(self, to: Self, s: f32) -> Self {
        Self {
            eye: self.eye.lerp(to.eye, s),
            look_at: self.look_at.lerp(to.look_at, s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightMode {
    Instant,
    Animated,
}

/// An animated flight in progress
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlightState {
    pub start: ViewPoint,
    pub target: ViewPoint,
    pub start_ms: f64,
    pub duration_ms: f64,
}

impl FlightState {
    /// Linear progress in `0..=1`.
    pub fn progress(&self, now_ms: f64) -> f32 {
        if self.duration_ms <= 0.0 {
            return 1.0;
        }
        ((now_ms - self.start_ms) / self.duration_ms).clamp(0.0, 1.0) as f32
    }
}

pub fn ease_out_cubic(k: f32) -> f32 {
    1.0 - (1.0 - k).powi(3)
}

/// Owns the single in-flight `FlightState`
#[derive(Debug, Clone)]
pub struct FlightController {
    config: CameraConfig,
    state: Option<FlightState>,
}

impl FlightController {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            state: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.is_some()
    }

    pub fn state(&self) -> Option<&FlightState> {
        self.state.as_ref()
    }

    /// Move the camera to `bookmark`.
    ///
    /// Any flight already in progress is dropped first; the new one starts
    /// from the pose it had reached.
    pub fn fly_to(
        &mut self,
        bookmark: &CameraBookmark,
        mode: FlightMode,
        now_ms: f64,
        pose: &mut CameraPose,
        orbit: &mut dyn OrbitControls,
        arbiter: &mut AuthorityArbiter,
    ) {
        let target = ViewPoint::for_bookmark(bookmark, &self.config);
        let superseded = self.state.take().is_some();

        match mode {
            FlightMode::Instant => {
                land(pose, orbit, target);
                if superseded || arbiter.flight_active() {
                    arbiter.apply(AuthorityChange::EndFlight, orbit);
                }
                info!(bookmark = %bookmark.id, "Jumped to bookmark");
            }
            FlightMode::Animated => {
                if !arbiter.flight_active() {
                    arbiter.apply(AuthorityChange::BeginFlight, orbit);
                }
                self.state = Some(FlightState {
                    start: ViewPoint::of(pose),
                    target,
                    start_ms: now_ms,
                    duration_ms: self.config.flight_duration_ms,
                });
                info!(bookmark = %bookmark.id, superseded, "Flying to bookmark");
            }
        }
    }

    /// Advance the flight to `now_ms`. Returns `Done` once nothing is left
    /// to animate.
    pub fn step(
        &mut self,
        now_ms: f64,
        pose: &mut CameraPose,
        orbit: &mut dyn OrbitControls,
        arbiter: &mut AuthorityArbiter,
    ) -> Tick {
        let Some(flight) = self.state else {
            return Tick::Done;
        };

        let k = flight.progress(now_ms);
        if k >= 1.0 {
            land(pose, orbit, flight.target);
            self.state = None;
            arbiter.apply(AuthorityChange::EndFlight, orbit);
            debug!("Flight landed");
            return Tick::Done;
        }

        let view = flight.start.lerp(flight.target, ease_out_cubic(k));
        pose.position = view.eye;
        pose.look_at(view.look_at);
        Tick::Continue
    }

    /// Drop the flight without landing and hand the camera back.
    pub fn cancel(&mut self, orbit: &mut dyn OrbitControls, arbiter: &mut AuthorityArbiter) {
        if self.state.take().is_some() {
            arbiter.apply(AuthorityChange::EndFlight, orbit);
            debug!("Flight cancelled");
        }
    }
}

/// Put the camera exactly on `view` and let orbit-drag pick up from there.
fn land(pose: &mut CameraPose, orbit: &mut dyn OrbitControls, view: ViewPoint) {
    pose.position = view.eye;
    pose.look_at(view.look_at);
    orbit.set_target(view.look_at);
    orbit.sync_from(pose);
}
