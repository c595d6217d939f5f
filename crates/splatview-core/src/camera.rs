//! Camera pose and projection
//!
//! Right-handed, Y-up, camera looking down its local -Z, with GL-style clip
//! space (NDC depth in -1..1). A point behind the camera projects to a depth
//! greater than 1, which is what label culling relies on.

use glam::{Mat3, Mat4, Quat, Vec2, Vec3};

use crate::config::CameraConfig;
use crate::picking::Ray;

pub const WORLD_UP: Vec3 = Vec3::Y;

/// The single shared camera pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub position: Vec3,
    /// Orbit / look-at target
    pub target: Vec3,
    pub rotation: Quat,
}

impl CameraPose {
    pub fn looking_at(position: Vec3, target: Vec3) -> Self {
        Self {
            position,
            target,
            rotation: look_rotation(position, target),
        }
    }

    /// Point the camera at `target` from its current position.
    pub fn look_at(&mut self, target: Vec3) {
        self.target = target;
        self.rotation = look_rotation(self.position, target);
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    pub fn world_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position)
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.world_matrix().inverse()
    }
}

/// Rotation that makes a camera at `eye` look at `target` with +Y up.
///
/// Looking straight up or down nudges the view direction slightly so the
/// basis stays well defined.
pub fn look_rotation(eye: Vec3, target: Vec3) -> Quat {
    let mut back = eye - target;
    if back.length_squared() == 0.0 {
        back.z = 1.0;
    }
    back = back.normalize();

    let mut right = WORLD_UP.cross(back);
    if right.length_squared() == 0.0 {
        back.z += 0.0001;
        back = back.normalize();
        right = WORLD_UP.cross(back);
    }
    let right = right.normalize();
    let up = back.cross(right);

    Quat::from_mat3(&Mat3::from_cols(right, up, back)).normalize()
}

/// Perspective lens
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub fov_y_deg: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Projection {
    pub fn from_config(config: &CameraConfig) -> Self {
        Self {
            fov_y_deg: config.fov_deg,
            aspect: 1.0,
            near: config.near,
            far: config.far,
        }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::perspective_rh_gl(self.fov_y_deg.to_radians(), self.aspect, self.near, self.far)
    }

    /// Follow a resized surface. Degenerate sizes are ignored.
    pub fn set_viewport(&mut self, width: f32, height: f32) {
        if width > 0.0 && height > 0.0 {
            self.aspect = width / height;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub pose: CameraPose,
    pub projection: Projection,
}

impl Camera {
    pub fn from_config(config: &CameraConfig) -> Self {
        Self {
            pose: CameraPose::looking_at(Vec3::from_array(config.start_position), Vec3::ZERO),
            projection: Projection::from_config(config),
        }
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection.matrix() * self.pose.view_matrix()
    }

    /// World point to normalized device coordinates.
    pub fn project(&self, world: Vec3) -> Vec3 {
        self.view_projection().project_point3(world)
    }

    /// Ray from the eye through a point given in normalized device coordinates.
    pub fn ray_through(&self, ndc: Vec2) -> Ray {
        let inverse = self.view_projection().inverse();
        let on_frustum = inverse.project_point3(ndc.extend(0.5));
        Ray::new(self.pose.position, on_frustum - self.pose.position)
    }
}

/// Map NDC to pixel coordinates with the origin at the top-left.
pub fn ndc_to_screen(ndc: Vec3, size: Vec2) -> Vec2 {
    Vec2::new(
        (ndc.x * 0.5 + 0.5) * size.x,
        (-ndc.y * 0.5 + 0.5) * size.y,
    )
}

/// Map pixel coordinates (top-left origin) to NDC.
pub fn screen_to_ndc(screen: Vec2, size: Vec2) -> Vec2 {
    if size.x <= 0.0 || size.y <= 0.0 {
        return Vec2::ZERO;
    }
    Vec2::new(
        screen.x / size.x * 2.0 - 1.0,
        -(screen.y / size.y) * 2.0 + 1.0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-4
    }

    #[test]
    fn test_look_rotation_faces_target() {
        let pose = CameraPose::looking_at(Vec3::new(0.0, 0.0, 4.0), Vec3::ZERO);
        assert!(close(pose.forward(), Vec3::NEG_Z));

        let pose = CameraPose::looking_at(Vec3::new(3.0, 2.0, 1.0), Vec3::new(-1.0, 0.5, 2.0));
        let expected = (Vec3::new(-1.0, 0.5, 2.0) - Vec3::new(3.0, 2.0, 1.0)).normalize();
        assert!(close(pose.forward(), expected));
        // No roll: camera right stays horizontal
        assert!((pose.rotation * Vec3::X).y.abs() < 1e-5);
    }

    #[test]
    fn test_look_rotation_straight_down() {
        let rotation = look_rotation(Vec3::new(0.0, 5.0, 0.0), Vec3::ZERO);
        assert!(rotation.is_finite());
        assert!((rotation * Vec3::NEG_Z).y < -0.999);
    }

    #[test]
    fn test_project_in_front_and_behind() {
        let camera = Camera::from_config(&CameraConfig::default());
        let ndc = camera.project(Vec3::ZERO);
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
        assert!(ndc.z < 1.0);

        let behind = camera.project(Vec3::new(0.0, 0.0, 10.0));
        assert!(behind.z > 1.0);
    }

    #[test]
    fn test_ray_through_center() {
        let camera = Camera::from_config(&CameraConfig::default());
        let ray = camera.ray_through(Vec2::ZERO);
        assert!(close(ray.origin, Vec3::new(0.0, 0.0, 4.0)));
        assert!(close(ray.dir, Vec3::NEG_Z));

        let right = camera.ray_through(Vec2::new(1.0, 0.0));
        assert!(right.dir.x > 0.0);
    }

    #[test]
    fn test_screen_mapping() {
        let size = Vec2::new(800.0, 600.0);
        assert_eq!(ndc_to_screen(Vec3::ZERO, size), Vec2::new(400.0, 300.0));
        assert_eq!(ndc_to_screen(Vec3::new(-1.0, 1.0, 0.0), size), Vec2::ZERO);
        let ndc = screen_to_ndc(Vec2::new(800.0, 600.0), size);
        assert_eq!(ndc, Vec2::new(1.0, -1.0));
    }
}
