//! Ray casting against marker shapes
//!
//! Markers are a handful of analytic primitives, so hits are solved in
//! closed form in each shape's local frame instead of against meshes.

use glam::{Quat, Vec3};

const EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub dir: Vec3,
}

impl Ray {
    /// Build a ray; `dir` is normalized, a zero direction falls back to -Z.
    pub fn new(origin: Vec3, dir: Vec3) -> Self {
        Self {
            origin,
            dir: dir.try_normalize().unwrap_or(Vec3::NEG_Z),
        }
    }

    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.dir * t
    }
}

/// Primitive shapes, centered at the local origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    /// Capped cylinder along Y
    Cylinder { radius: f32, height: f32 },
    /// Cone along Y with the apex up and a capped base
    Cone { radius: f32, height: f32 },
    /// Flat ring in the local XY plane
    Annulus { inner: f32, outer: f32 },
}

/// A shape positioned in the world
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placed {
    pub shape: Shape,
    pub center: Vec3,
    pub rotation: Quat,
    pub scale: f32,
}

impl Placed {
    /// Distance along the ray to the first hit in front of the origin.
    pub fn intersect(&self, ray: &Ray) -> Option<f32> {
        if self.scale <= EPSILON {
            return None;
        }
        // Uniform scale keeps t identical between frames
        let inverse = self.rotation.inverse();
        let origin = inverse * (ray.origin - self.center) / self.scale;
        let dir = inverse * ray.dir / self.scale;

        let hits = match self.shape {
            Shape::Cylinder { radius, height } => cylinder_hits(origin, dir, radius, height),
            Shape::Cone { radius, height } => cone_hits(origin, dir, radius, height),
            Shape::Annulus { inner, outer } => annulus_hits(origin, dir, inner, outer),
        };
        hits.into_iter()
            .filter(|t| *t > EPSILON)
            .min_by(|a, b| a.total_cmp(b))
    }
}

/// Closest hit among `candidates`; equal distances resolve to the earlier one.
pub fn nearest<K, I>(ray: &Ray, candidates: I) -> Option<(K, f32)>
where
    I: IntoIterator<Item = (K, Placed)>,
{
    let mut best: Option<(K, f32)> = None;
    for (key, placed) in candidates {
        if let Some(t) = placed.intersect(ray) {
            if best.as_ref().map_or(true, |(_, best_t)| t < *best_t) {
                best = Some((key, t));
            }
        }
    }
    best
}

fn solve_quadratic(a: f32, b: f32, c: f32) -> Vec<f32> {
    if a.abs() < EPSILON {
        if b.abs() < EPSILON {
            return Vec::new();
        }
        return vec![-c / b];
    }
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return Vec::new();
    }
    let root = disc.sqrt();
    vec![(-b - root) / (2.0 * a), (-b + root) / (2.0 * a)]
}

fn cap_hit(origin: Vec3, dir: Vec3, y: f32, radius: f32) -> Option<f32> {
    if dir.y.abs() < EPSILON {
        return None;
    }
    let t = (y - origin.y) / dir.y;
    let p = origin + dir * t;
    (p.x * p.x + p.z * p.z <= radius * radius).then_some(t)
}

fn cylinder_hits(origin: Vec3, dir: Vec3, radius: f32, height: f32) -> Vec<f32> {
    let half = height * 0.5;
    let a = dir.x * dir.x + dir.z * dir.z;
    let b = 2.0 * (origin.x * dir.x + origin.z * dir.z);
    let c = origin.x * origin.x + origin.z * origin.z - radius * radius;

    let mut hits: Vec<f32> = if a > EPSILON {
        solve_quadratic(a, b, c)
            .into_iter()
            .filter(|t| (origin.y + dir.y * t).abs() <= half)
            .collect()
    } else {
        Vec::new()
    };
    hits.extend(cap_hit(origin, dir, half, radius));
    hits.extend(cap_hit(origin, dir, -half, radius));
    hits
}

fn cone_hits(origin: Vec3, dir: Vec3, radius: f32, height: f32) -> Vec<f32> {
    if height <= EPSILON {
        return Vec::new();
    }
    let half = height * 0.5;
    let k = radius / height;
    let k2 = k * k;
    // Radius at y is k * (apex - y)
    let s = half - origin.y;
    let a = dir.x * dir.x + dir.z * dir.z - k2 * dir.y * dir.y;
    let b = 2.0 * (origin.x * dir.x + origin.z * dir.z + k2 * s * dir.y);
    let c = origin.x * origin.x + origin.z * origin.z - k2 * s * s;

    let mut hits: Vec<f32> = solve_quadratic(a, b, c)
        .into_iter()
        .filter(|t| {
            let y = origin.y + dir.y * t;
            (-half..=half).contains(&y)
        })
        .collect();
    hits.extend(cap_hit(origin, dir, -half, radius));
    hits
}

fn annulus_hits(origin: Vec3, dir: Vec3, inner: f32, outer: f32) -> Vec<f32> {
    if dir.z.abs() < EPSILON {
        return Vec::new();
    }
    let t = -origin.z / dir.z;
    let p = origin + dir * t;
    let r2 = p.x * p.x + p.y * p.y;
    if r2 >= inner * inner && r2 <= outer * outer {
        vec![t]
    } else {
        Vec::new()
    }
}
