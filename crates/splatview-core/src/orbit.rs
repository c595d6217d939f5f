//! Orbit-drag camera control
//!
//! `OrbitControls` is the capability the engine needs from whatever turns
//! user drags into camera motion. `OrbitRig` is the stock implementation:
//! a damped spherical orbit around a target, without panning.

use glam::Vec3;

use crate::camera::CameraPose;
use crate::config::OrbitConfig;

pub trait OrbitControls {
    fn enabled(&self) -> bool;
    fn set_enabled(&mut self, enabled: bool);
    fn target(&self) -> Vec3;
    fn set_target(&mut self, target: Vec3);
    /// Apply pending user input to the pose. Called once per frame while
    /// orbit-drag owns the camera.
    fn update(&mut self, pose: &mut CameraPose);
    /// Re-derive internal state from a pose that was set by someone else,
    /// dropping any residual momentum.
    fn sync_from(&mut self, pose: &CameraPose);
}

/// Spherical coordinates of the eye relative to the target
#[derive(Debug, Clone, Copy, PartialEq)]
struct Spherical {
    radius: f32,
    /// Polar angle from +Y
    phi: f32,
    /// Azimuth around +Y, zero on +Z
    theta: f32,
}

impl Spherical {
    fn from_offset(offset: Vec3) -> Self {
        let radius = offset.length();
        if radius == 0.0 {
            return Self {
                radius: 0.0,
                phi: 0.0,
                theta: 0.0,
            };
        }
        Self {
            radius,
            phi: (offset.y / radius).clamp(-1.0, 1.0).acos(),
            theta: offset.x.atan2(offset.z),
        }
    }

    fn to_offset(self) -> Vec3 {
        let sin_phi = self.phi.sin();
        Vec3::new(
            self.radius * sin_phi * self.theta.sin(),
            self.radius * self.phi.cos(),
            self.radius * sin_phi * self.theta.cos(),
        )
    }
}

/// Damped orbit around a target point
#[derive(Debug, Clone)]
pub struct OrbitRig {
    config: OrbitConfig,
    enabled: bool,
    target: Vec3,
    /// Rotation still to be applied, decays by the damping factor
    delta_theta: f32,
    delta_phi: f32,
    /// Pending dolly multiplier on the radius
    dolly: f32,
}

impl OrbitRig {
    pub fn new(config: OrbitConfig) -> Self {
        Self {
            config,
            enabled: true,
            target: Vec3::ZERO,
            delta_theta: 0.0,
            delta_phi: 0.0,
            dolly: 1.0,
        }
    }

    /// Feed a drag of `dx`, `dy` pixels. Ignored while disabled.
    pub fn drag(&mut self, dx: f32, dy: f32) {
        if !self.enabled {
            return;
        }
        self.delta_theta -= dx * self.config.rotate_speed;
        self.delta_phi -= dy * self.config.rotate_speed;
    }

    /// Feed wheel notches; positive zooms in. Ignored while disabled.
    pub fn zoom(&mut self, notches: f32) {
        if !self.enabled {
            return;
        }
        self.dolly *= self.config.zoom_step.powf(notches);
    }

    pub fn is_settled(&self) -> bool {
        self.delta_theta.abs() < 1e-5 && self.delta_phi.abs() < 1e-5 && self.dolly == 1.0
    }
}

impl OrbitControls for OrbitRig {
    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.delta_theta = 0.0;
            self.delta_phi = 0.0;
            self.dolly = 1.0;
        }
    }

    fn target(&self) -> Vec3 {
        self.target
    }

    fn set_target(&mut self, target: Vec3) {
        self.target = target;
    }

    fn update(&mut self, pose: &mut CameraPose) {
        if self.is_settled() {
            self.delta_theta = 0.0;
            self.delta_phi = 0.0;
            // Re-aim anyway: another controller may have rotated the pose
            pose.look_at(self.target);
            return;
        }
        let damping = self.config.damping;
        let mut spherical = Spherical::from_offset(pose.position - self.target);

        spherical.theta += self.delta_theta * damping;
        spherical.phi += self.delta_phi * damping;
        spherical.phi = spherical
            .phi
            .clamp(self.config.min_polar, self.config.max_polar)
            .clamp(1e-6, std::f32::consts::PI - 1e-6);
        spherical.radius = (spherical.radius * self.dolly)
            .clamp(self.config.min_distance, self.config.max_distance);

        pose.position = self.target + spherical.to_offset();
        pose.look_at(self.target);

        self.delta_theta *= 1.0 - damping;
        self.delta_phi *= 1.0 - damping;
        self.dolly = 1.0;
    }

    fn sync_from(&mut self, pose: &CameraPose) {
        self.target = pose.target;
        self.delta_theta = 0.0;
        self.delta_phi = 0.0;
        self.dolly = 1.0;
    }
}
