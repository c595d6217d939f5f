//! Device orientation control
//!
//! Turns raw `deviceorientation` angles (alpha, beta, gamma in degrees) into
//! a camera rotation for a phone held in landscape. Enabling goes through
//! the platform permission prompts and a short probe for a live sensor; the
//! host performs the prompts and subscriptions, this module only decides
//! what comes next.

use glam::{EulerRot, Quat};
use std::f64::consts::PI;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::authority::{AuthorityArbiter, AuthorityChange};
use crate::camera::CameraPose;
use crate::config::SensorConfig;
use crate::orbit::OrbitControls;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionKind {
    Motion,
    Orientation,
}

impl fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionKind::Motion => write!(f, "motion"),
            PermissionKind::Orientation => write!(f, "orientation"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrientationError {
    #[error("{0} sensor permission was denied")]
    PermissionDenied(PermissionKind),
    #[error("{kind} sensor permission request failed: {reason}")]
    PermissionFailed { kind: PermissionKind, reason: String },
    #[error("no orientation data within {window_ms} ms, the device may not have a gyroscope")]
    NoSensorDetected { window_ms: f64 },
}

/// Result of a permission prompt as reported by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionOutcome {
    Granted,
    Denied,
    Failed(String),
}

/// Which prompts the platform exposes. Platforms without prompts grant
/// sensor access implicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PermissionSupport {
    pub motion_prompt: bool,
    pub orientation_prompt: bool,
}

/// One sensor reading, in degrees. Any angle may be missing.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OrientationSample {
    pub alpha: Option<f64>,
    pub beta: Option<f64>,
    pub gamma: Option<f64>,
}

impl OrientationSample {
    pub fn new(alpha: f64, beta: f64, gamma: f64) -> Self {
        Self {
            alpha: Some(alpha),
            beta: Some(beta),
            gamma: Some(gamma),
        }
    }

    /// Whether the sample proves a sensor is present.
    pub fn has_reading(&self) -> bool {
        self.alpha.is_some() || self.beta.is_some() || self.gamma.is_some()
    }
}

/// Screen facing up or down relative to the horizon, decided by gamma
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hemisphere {
    Upper,
    Lower,
}

/// Euler angles in radians, applied yaw first, then pitch, then roll
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusedAngles {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
    pub hemisphere: Hemisphere,
}

impl FusedAngles {
    pub fn rotation(&self) -> Quat {
        Quat::from_euler(EulerRot::YXZ, self.yaw, self.pitch, self.roll)
    }
}

/// Map one reading to camera angles. `calibration` is the alpha of the
/// first sample of the session so that the initial heading is zero.
pub fn fuse(alpha: f64, beta: f64, gamma: f64, calibration: f64) -> FusedAngles {
    let mut yaw = (alpha - calibration).to_radians();
    let (pitch, roll, hemisphere) = if gamma > 0.0 {
        yaw += PI;
        ((90.0 - gamma).to_radians(), beta.to_radians() + PI, Hemisphere::Upper)
    } else {
        ((-(gamma + 90.0)).to_radians(), -beta.to_radians(), Hemisphere::Lower)
    };
    FusedAngles {
        yaw: yaw as f32,
        pitch: pitch as f32,
        roll: roll as f32,
        hemisphere,
    }
}

/// State of an active orientation session
#[derive(Debug, Clone, PartialEq)]
pub struct OrientationSession {
    /// Alpha of the first sample; `None` until one arrives
    pub calibration_alpha: Option<f64>,
    /// Pose when the session started
    pub baseline: CameraPose,
    pub samples: u64,
}

/// What the host should do to continue enabling
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EnableStep {
    RequestPermission(PermissionKind),
    /// Subscribe to samples; the probe ends at `until_ms`
    StartProbe { until_ms: f64 },
    AlreadyActive,
    InProgress,
}

/// Reported once the probe window closes and fusion takes the camera
#[derive(Debug, Clone, PartialEq)]
pub struct Activated {
    pub warning: Option<OrientationError>,
}

#[derive(Debug, Clone, PartialEq)]
enum Phase {
    Idle,
    AwaitingPermission {
        kind: PermissionKind,
        then: Option<PermissionKind>,
    },
    Probing {
        until_ms: f64,
        saw_reading: bool,
    },
    Active(OrientationSession),
}

#[derive(Debug, Clone)]
pub struct OrientationFusion {
    probe_window_ms: f64,
    phase: Phase,
}

impl OrientationFusion {
    pub fn new(config: &SensorConfig) -> Self {
        Self {
            probe_window_ms: config.probe_window_ms,
            phase: Phase::Idle,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.phase, Phase::Active(_))
    }

    /// Permission prompts or the probe are underway.
    pub fn is_enabling(&self) -> bool {
        matches!(
            self.phase,
            Phase::AwaitingPermission { .. } | Phase::Probing { .. }
        )
    }

    /// A sample subscription is expected to be live.
    pub fn is_subscribed(&self) -> bool {
        matches!(self.phase, Phase::Probing { .. } | Phase::Active(_))
    }

    pub fn session(&self) -> Option<&OrientationSession> {
        match &self.phase {
            Phase::Active(session) => Some(session),
            _ => None,
        }
    }

    /// Start enabling. Must be called from a user gesture so that the host
    /// may show permission prompts.
    pub fn begin_enable(&mut self, support: PermissionSupport, now_ms: f64) -> EnableStep {
        match self.phase {
            Phase::Active(_) => return EnableStep::AlreadyActive,
            Phase::AwaitingPermission { .. } | Phase::Probing { .. } => {
                return EnableStep::InProgress
            }
            Phase::Idle => {}
        }

        let orientation = support
            .orientation_prompt
            .then_some(PermissionKind::Orientation);
        if support.motion_prompt {
            self.phase = Phase::AwaitingPermission {
                kind: PermissionKind::Motion,
                then: orientation,
            };
            EnableStep::RequestPermission(PermissionKind::Motion)
        } else if let Some(kind) = orientation {
            self.phase = Phase::AwaitingPermission { kind, then: None };
            EnableStep::RequestPermission(kind)
        } else {
            self.start_probe(now_ms)
        }
    }

    /// Feed back the answer to a permission prompt.
    ///
    /// `Ok(None)` means the answer no longer matters (enabling was aborted
    /// meanwhile). A refusal returns the session to idle so that the user can
    /// try again.
    pub fn permission_resolved(
        &mut self,
        kind: PermissionKind,
        outcome: PermissionOutcome,
        now_ms: f64,
    ) -> Result<Option<EnableStep>, OrientationError> {
        let Phase::AwaitingPermission { kind: expected, then } = self.phase else {
            debug!(%kind, "Ignoring stale permission result");
            return Ok(None);
        };
        if kind != expected {
            debug!(%kind, %expected, "Ignoring permission result for another prompt");
            return Ok(None);
        }

        match outcome {
            PermissionOutcome::Granted => {}
            PermissionOutcome::Denied => {
                self.phase = Phase::Idle;
                warn!(%kind, "Sensor permission denied");
                return Err(OrientationError::PermissionDenied(kind));
            }
            PermissionOutcome::Failed(reason) => {
                self.phase = Phase::Idle;
                warn!(%kind, %reason, "Sensor permission request failed");
                return Err(OrientationError::PermissionFailed { kind, reason });
            }
        }

        Ok(Some(match then {
            Some(next) => {
                self.phase = Phase::AwaitingPermission {
                    kind: next,
                    then: None,
                };
                EnableStep::RequestPermission(next)
            }
            None => self.start_probe(now_ms),
        }))
    }

    fn start_probe(&mut self, now_ms: f64) -> EnableStep {
        let until_ms = now_ms + self.probe_window_ms;
        self.phase = Phase::Probing {
            until_ms,
            saw_reading: false,
        };
        debug!(until_ms, "Probing for orientation samples");
        EnableStep::StartProbe { until_ms }
    }

    /// Close the probe window once it has elapsed and take the camera.
    pub fn poll(
        &mut self,
        now_ms: f64,
        pose: &CameraPose,
        orbit: &mut dyn OrbitControls,
        arbiter: &mut AuthorityArbiter,
    ) -> Option<Activated> {
        let Phase::Probing {
            until_ms,
            saw_reading,
        } = self.phase
        else {
            return None;
        };
        if now_ms < until_ms {
            return None;
        }

        let warning = (!saw_reading).then(|| {
            warn!("No orientation samples during probe");
            OrientationError::NoSensorDetected {
                window_ms: self.probe_window_ms,
            }
        });
        self.phase = Phase::Active(OrientationSession {
            calibration_alpha: None,
            baseline: *pose,
            samples: 0,
        });
        arbiter.apply(AuthorityChange::BeginFusion, orbit);
        info!("Orientation control enabled");
        Some(Activated { warning })
    }

    /// Consume a sample. The rotation is written to `pose` only when `apply`
    /// is set, so a running flight keeps the camera while the session still
    /// calibrates. Returns whether the pose changed.
    pub fn handle_sample(
        &mut self,
        sample: OrientationSample,
        pose: &mut CameraPose,
        apply: bool,
    ) -> bool {
        match &mut self.phase {
            Phase::Probing { saw_reading, .. } => {
                *saw_reading |= sample.has_reading();
                false
            }
            Phase::Active(session) => {
                let Some(alpha) = sample.alpha else {
                    return false;
                };
                let calibration = *session.calibration_alpha.get_or_insert(alpha);
                session.samples += 1;
                if !apply {
                    return false;
                }
                let angles = fuse(
                    alpha,
                    sample.beta.unwrap_or(0.0),
                    sample.gamma.unwrap_or(0.0),
                    calibration,
                );
                pose.rotation = angles.rotation();
                true
            }
            _ => false,
        }
    }

    /// Stop using the sensor. Returns whether a subscription has to be
    /// released. A no-op when nothing is enabled.
    pub fn disable(&mut self, orbit: &mut dyn OrbitControls, arbiter: &mut AuthorityArbiter) -> bool {
        let subscribed = self.is_subscribed();
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Idle => return false,
            Phase::Active(session) => {
                arbiter.apply(AuthorityChange::EndFusion, orbit);
                info!(samples = session.samples, "Orientation control disabled");
            }
            Phase::AwaitingPermission { .. } | Phase::Probing { .. } => {
                debug!("Orientation enabling aborted");
            }
        }
        subscribed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::CameraAuthority;
    use crate::config::OrbitConfig;
    use crate::orbit::OrbitRig;
    use glam::Vec3;
    use std::f32::consts::PI as PI32;

    fn near(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    fn fusion() -> OrientationFusion {
        OrientationFusion::new(&SensorConfig::default())
    }

    fn pose() -> CameraPose {
        CameraPose::looking_at(Vec3::new(0.0, 0.0, 4.0), Vec3::ZERO)
    }

    #[test]
    fn test_fuse_upper_hemisphere() {
        let angles = fuse(10.0, 0.0, 30.0, 10.0);
        assert_eq!(angles.hemisphere, Hemisphere::Upper);
        assert!(near(angles.yaw, PI32));
        assert!(near(angles.pitch, 60f32.to_radians()));
        assert!(near(angles.roll, PI32));
    }

    #[test]
    fn test_fuse_lower_hemisphere() {
        let angles = fuse(10.0, 0.0, -30.0, 10.0);
        assert_eq!(angles.hemisphere, Hemisphere::Lower);
        assert!(near(angles.yaw, 0.0));
        assert!(near(angles.pitch, (-60f32).to_radians()));
        assert!(near(angles.roll, 0.0));

        // gamma == 0 belongs to the lower branch
        let angles = fuse(0.0, 20.0, 0.0, 0.0);
        assert_eq!(angles.hemisphere, Hemisphere::Lower);
        assert!(near(angles.pitch, -PI32 / 2.0));
        assert!(near(angles.roll, -20f32.to_radians()));
    }

    #[test]
    fn test_fuse_roll_follows_beta_per_branch() {
        let angles = fuse(0.0, 5.0, 10.0, 0.0);
        assert_eq!(angles.hemisphere, Hemisphere::Upper);
        assert!(near(angles.yaw, PI32));
        assert!(near(angles.pitch, 80f32.to_radians()));
        assert!(near(angles.roll, 5f32.to_radians() + PI32));

        let angles = fuse(0.0, 5.0, -10.0, 0.0);
        assert_eq!(angles.hemisphere, Hemisphere::Lower);
        assert!(near(angles.yaw, 0.0));
        assert!(near(angles.pitch, (-80f32).to_radians()));
        assert!(near(angles.roll, -5f32.to_radians()));
    }

    #[test]
    fn test_rotation_order_is_yaw_pitch_roll() {
        let angles = FusedAngles {
            yaw: 0.3,
            pitch: -0.2,
            roll: 0.1,
            hemisphere: Hemisphere::Lower,
        };
        let expected = Quat::from_rotation_y(0.3) * Quat::from_rotation_x(-0.2) * Quat::from_rotation_z(0.1);
        assert!(angles.rotation().abs_diff_eq(expected, 1e-6));
    }

    #[test]
    fn test_enable_without_prompts_probes_directly() {
        let mut fusion = fusion();
        let step = fusion.begin_enable(PermissionSupport::default(), 100.0);
        assert_eq!(step, EnableStep::StartProbe { until_ms: 600.0 });
        assert!(fusion.is_enabling());
        assert!(fusion.is_subscribed());
        assert_eq!(fusion.begin_enable(PermissionSupport::default(), 150.0), EnableStep::InProgress);
    }

    #[test]
    fn test_permissions_are_sequential() {
        let mut fusion = fusion();
        let support = PermissionSupport {
            motion_prompt: true,
            orientation_prompt: true,
        };
        assert_eq!(
            fusion.begin_enable(support, 0.0),
            EnableStep::RequestPermission(PermissionKind::Motion)
        );
        // An answer for the wrong prompt is ignored
        assert_eq!(
            fusion.permission_resolved(PermissionKind::Orientation, PermissionOutcome::Granted, 1.0),
            Ok(None)
        );
        assert_eq!(
            fusion.permission_resolved(PermissionKind::Motion, PermissionOutcome::Granted, 10.0),
            Ok(Some(EnableStep::RequestPermission(PermissionKind::Orientation)))
        );
        assert_eq!(
            fusion.permission_resolved(PermissionKind::Orientation, PermissionOutcome::Granted, 20.0),
            Ok(Some(EnableStep::StartProbe { until_ms: 520.0 }))
        );
    }

    #[test]
    fn test_denial_leaves_orbit_in_charge_and_allows_retry() {
        let mut fusion = fusion();
        let mut orbit = OrbitRig::new(OrbitConfig::default());
        let support = PermissionSupport {
            motion_prompt: true,
            orientation_prompt: false,
        };
        fusion.begin_enable(support, 0.0);
        let result = fusion.permission_resolved(PermissionKind::Motion, PermissionOutcome::Denied, 5.0);
        assert_eq!(result, Err(OrientationError::PermissionDenied(PermissionKind::Motion)));
        assert!(!fusion.is_active());
        assert!(!fusion.is_enabling());
        assert!(orbit.enabled());

        let failed = {
            fusion.begin_enable(support, 10.0);
            fusion.permission_resolved(
                PermissionKind::Motion,
                PermissionOutcome::Failed("NotAllowedError".into()),
                11.0,
            )
        };
        assert!(matches!(failed, Err(OrientationError::PermissionFailed { .. })));

        assert_eq!(
            fusion.begin_enable(support, 20.0),
            EnableStep::RequestPermission(PermissionKind::Motion)
        );
    }

    #[test]
    fn test_probe_without_samples_warns_but_activates() {
        let mut fusion = fusion();
        let mut orbit = OrbitRig::new(OrbitConfig::default());
        let mut arbiter = AuthorityArbiter::default();
        let pose = pose();

        fusion.begin_enable(PermissionSupport::default(), 0.0);
        assert!(fusion.poll(499.0, &pose, &mut orbit, &mut arbiter).is_none());
        let activated = fusion.poll(500.0, &pose, &mut orbit, &mut arbiter).unwrap();
        assert_eq!(
            activated.warning,
            Some(OrientationError::NoSensorDetected { window_ms: 500.0 })
        );
        assert!(fusion.is_active());
        assert_eq!(arbiter.current(), CameraAuthority::OrientationFusion);
        assert!(!orbit.enabled());
        assert_eq!(fusion.session().unwrap().baseline, pose);
    }

    #[test]
    fn test_probe_sample_suppresses_warning() {
        let mut fusion = fusion();
        let mut orbit = OrbitRig::new(OrbitConfig::default());
        let mut arbiter = AuthorityArbiter::default();
        let mut pose = pose();

        fusion.begin_enable(PermissionSupport::default(), 0.0);
        let empty = OrientationSample::default();
        assert!(!fusion.handle_sample(empty, &mut pose, true));
        assert!(!fusion.handle_sample(OrientationSample::new(1.0, 2.0, 3.0), &mut pose, true));
        let activated = fusion.poll(600.0, &pose, &mut orbit, &mut arbiter).unwrap();
        assert!(activated.warning.is_none());
    }

    #[test]
    fn test_first_sample_calibrates_heading() {
        let mut fusion = fusion();
        let mut orbit = OrbitRig::new(OrbitConfig::default());
        let mut arbiter = AuthorityArbiter::default();
        let mut pose = pose();
        fusion.begin_enable(PermissionSupport::default(), 0.0);
        fusion.poll(500.0, &pose, &mut orbit, &mut arbiter);

        // Null alpha is ignored entirely
        let no_alpha = OrientationSample {
            alpha: None,
            beta: Some(10.0),
            gamma: Some(-30.0),
        };
        assert!(!fusion.handle_sample(no_alpha, &mut pose, true));
        assert_eq!(fusion.session().unwrap().calibration_alpha, None);

        assert!(fusion.handle_sample(OrientationSample::new(42.0, 0.0, -30.0), &mut pose, true));
        assert_eq!(fusion.session().unwrap().calibration_alpha, Some(42.0));
        let expected = fuse(42.0, 0.0, -30.0, 42.0).rotation();
        assert!(pose.rotation.abs_diff_eq(expected, 1e-6));

        // Later samples are relative to the first, last one wins
        fusion.handle_sample(OrientationSample::new(72.0, 0.0, -30.0), &mut pose, true);
        let expected = fuse(72.0, 0.0, -30.0, 42.0).rotation();
        assert!(pose.rotation.abs_diff_eq(expected, 1e-6));
        assert_eq!(fusion.session().unwrap().samples, 2);
    }

    #[test]
    fn test_samples_not_applied_without_authority() {
        let mut fusion = fusion();
        let mut orbit = OrbitRig::new(OrbitConfig::default());
        let mut arbiter = AuthorityArbiter::default();
        let mut pose = pose();
        fusion.begin_enable(PermissionSupport::default(), 0.0);
        fusion.poll(500.0, &pose, &mut orbit, &mut arbiter);

        let before = pose;
        assert!(!fusion.handle_sample(OrientationSample::new(5.0, 1.0, 2.0), &mut pose, false));
        assert_eq!(pose, before);
        assert_eq!(fusion.session().unwrap().calibration_alpha, Some(5.0));
    }

    #[test]
    fn test_disable_restores_orbit_and_is_idempotent() {
        let mut fusion = fusion();
        let mut orbit = OrbitRig::new(OrbitConfig::default());
        let mut arbiter = AuthorityArbiter::default();
        let pose = pose();

        assert!(!fusion.disable(&mut orbit, &mut arbiter));
        assert!(orbit.enabled());

        fusion.begin_enable(PermissionSupport::default(), 0.0);
        fusion.poll(500.0, &pose, &mut orbit, &mut arbiter);
        assert!(fusion.disable(&mut orbit, &mut arbiter));
        assert!(orbit.enabled());
        assert_eq!(arbiter.current(), CameraAuthority::OrbitDrag);
        assert!(!fusion.disable(&mut orbit, &mut arbiter));

        // Samples after disabling are dropped
        let mut after = pose;
        assert!(!fusion.handle_sample(OrientationSample::new(1.0, 1.0, 1.0), &mut after, true));
    }

    #[test]
    fn test_late_permission_after_abort_is_ignored() {
        let mut fusion = fusion();
        let mut orbit = OrbitRig::new(OrbitConfig::default());
        let mut arbiter = AuthorityArbiter::default();
        let support = PermissionSupport {
            motion_prompt: false,
            orientation_prompt: true,
        };
        fusion.begin_enable(support, 0.0);
        assert!(!fusion.disable(&mut orbit, &mut arbiter));
        assert_eq!(
            fusion.permission_resolved(PermissionKind::Orientation, PermissionOutcome::Granted, 5.0),
            Ok(None)
        );
        assert!(!fusion.is_enabling());
    }
}
