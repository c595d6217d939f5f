//! POI markers
//!
//! Each POI is drawn as a disc with a cone on top and a flat ring at its
//! foot, plus a screen-space label. The registry owns the derived visuals,
//! animates them, and answers pick queries against their exact shapes.

use glam::{Quat, Vec2, Vec3};
use std::f32::consts::{FRAC_PI_2, TAU};
use tracing::debug;

use crate::camera::{ndc_to_screen, Camera};
use crate::catalog::Poi;
use crate::config::MarkerConfig;
use crate::labels::{LabelId, LabelRenderer};
use crate::picking::{nearest, Placed, Ray, Shape};

const DISC: Shape = Shape::Cylinder {
    radius: 0.3,
    height: 0.1,
};
const CONE: Shape = Shape::Cone {
    radius: 0.15,
    height: 0.4,
};
const RING: Shape = Shape::Annulus {
    inner: 0.35,
    outer: 0.5,
};

const DISC_OFFSET: f32 = 0.05;
const CONE_OFFSET: f32 = 0.3;
const RING_OFFSET: f32 = 0.01;
const RING_OPACITY: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKind {
    Disc,
    Cone,
    Ring,
}

/// One mesh of a marker, relative to the marker origin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerPart {
    pub kind: PartKind,
    pub shape: Shape,
    pub offset: Vec3,
    pub scale: f32,
    /// Ring rotation about its own normal
    pub spin: f32,
    pub color: u32,
    pub opacity: f32,
}

impl MarkerPart {
    fn new(kind: PartKind, color: u32) -> Self {
        let (shape, height, opacity) = match kind {
            PartKind::Disc => (DISC, DISC_OFFSET, 0.8),
            PartKind::Cone => (CONE, CONE_OFFSET, 0.9),
            PartKind::Ring => (RING, RING_OFFSET, RING_OPACITY),
        };
        Self {
            kind,
            shape,
            offset: Vec3::Y * height,
            scale: 1.0,
            spin: 0.0,
            color,
            opacity,
        }
    }

    /// The ring lies flat on the ground; disc and cone stay upright.
    pub fn rotation(&self) -> Quat {
        match self.kind {
            PartKind::Ring => Quat::from_rotation_x(-FRAC_PI_2) * Quat::from_rotation_z(self.spin),
            PartKind::Disc | PartKind::Cone => Quat::IDENTITY,
        }
    }

    pub fn placed(&self, origin: Vec3) -> Placed {
        Placed {
            shape: self.shape,
            center: origin + self.offset,
            rotation: self.rotation(),
            scale: self.scale,
        }
    }
}

/// Everything derived from one POI
#[derive(Debug, Clone, PartialEq)]
pub struct PoiVisual {
    pub poi: Poi,
    pub index: usize,
    /// POI position with the vertical bias applied
    pub origin: Vec3,
    pub parts: [MarkerPart; 3],
    pub label: LabelId,
    pub active: bool,
}

impl PoiVisual {
    pub fn part(&self, kind: PartKind) -> &MarkerPart {
        match kind {
            PartKind::Disc => &self.parts[0],
            PartKind::Cone => &self.parts[1],
            PartKind::Ring => &self.parts[2],
        }
    }
}

#[derive(Debug, Clone)]
pub struct PoiRegistry {
    style: MarkerConfig,
    visuals: Vec<PoiVisual>,
    icons_visible: bool,
    active: Option<String>,
    /// Bumped whenever the visual set is replaced
    generation: u64,
}

impl PoiRegistry {
    pub fn new(style: MarkerConfig) -> Self {
        let icons_visible = style.icons_visible;
        Self {
            style,
            visuals: Vec::new(),
            icons_visible,
            active: None,
            generation: 0,
        }
    }

    pub fn visuals(&self) -> &[PoiVisual] {
        &self.visuals
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn icons_visible(&self) -> bool {
        self.icons_visible
    }

    /// Takes effect on the next `rebuild`.
    pub fn set_icons_visible(&mut self, visible: bool) {
        self.icons_visible = visible;
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn len(&self) -> usize {
        self.visuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visuals.is_empty()
    }

    /// Drop every visual and label.
    pub fn dispose(&mut self, labels: &mut dyn LabelRenderer) {
        for visual in self.visuals.drain(..) {
            labels.remove(visual.label);
        }
        self.generation += 1;
    }

    /// Replace all visuals with ones for `pois`. Nothing is built while
    /// icons are hidden.
    pub fn rebuild(&mut self, pois: &[Poi], labels: &mut dyn LabelRenderer) {
        self.dispose(labels);
        if !self.icons_visible {
            debug!("POI icons hidden, skipping marker build");
            return;
        }

        let bias = Vec3::Y * self.style.vertical_bias;
        for (index, poi) in pois.iter().enumerate() {
            let text = if poi.name.is_empty() {
                self.style.label_fallback.as_str()
            } else {
                poi.name.as_str()
            };
            let active = self.active.as_deref() == Some(poi.id.as_str());
            let color = self.color_for(active);
            self.visuals.push(PoiVisual {
                poi: poi.clone(),
                index,
                origin: poi.position + bias,
                parts: [
                    MarkerPart::new(PartKind::Disc, color),
                    MarkerPart::new(PartKind::Cone, color),
                    MarkerPart::new(PartKind::Ring, color),
                ],
                label: labels.create(text),
                active,
            });
        }
        debug!(count = self.visuals.len(), generation = self.generation, "Built POI markers");
    }

    /// Highlight one POI, or none.
    pub fn set_active(&mut self, id: Option<&str>) {
        self.active = id.map(String::from);
        for visual in &mut self.visuals {
            visual.active = id == Some(visual.poi.id.as_str());
            let color = if visual.active {
                self.style.highlight_color
            } else {
                self.style.accent_color
            };
            for part in &mut visual.parts {
                part.color = color;
            }
        }
    }

    fn color_for(&self, active: bool) -> u32 {
        if active {
            self.style.highlight_color
        } else {
            self.style.accent_color
        }
    }

    /// Per-frame idle animation at `t` seconds.
    pub fn animate(&mut self, t: f32) {
        let spin = (self.style.ring_spin_rate * t).rem_euclid(TAU);
        for visual in &mut self.visuals {
            let breathe = (t * 2.0 + visual.index as f32 * 0.5).sin() * 0.1 + 1.0;
            let (disc_opacity, cone_opacity) = if visual.active {
                (0.9 + (t * 3.0).sin() * 0.1, 1.0)
            } else {
                (0.8, 0.9)
            };
            for part in &mut visual.parts {
                match part.kind {
                    PartKind::Disc => {
                        part.scale = breathe;
                        part.opacity = disc_opacity;
                    }
                    PartKind::Cone => {
                        part.scale = breathe;
                        part.opacity = cone_opacity;
                    }
                    PartKind::Ring => part.spin = spin,
                }
            }
        }
    }

    /// Nearest POI hit by `ray`, over every part of every marker.
    pub fn pick(&self, ray: &Ray) -> Option<&Poi> {
        if !self.icons_visible {
            return None;
        }
        let candidates = self.visuals.iter().enumerate().flat_map(|(i, visual)| {
            visual
                .parts
                .iter()
                .map(move |part| (i, part.placed(visual.origin)))
        });
        nearest(ray, candidates).map(|(i, _)| &self.visuals[i].poi)
    }

    /// Pick through a pointer position in normalized device coordinates.
    pub fn pick_at(&self, ndc: Vec2, camera: &Camera) -> Option<&Poi> {
        self.pick(&camera.ray_through(ndc))
    }

    /// Position labels for the current camera. Labels whose anchor is
    /// behind the camera are hidden.
    pub fn update_labels(&self, camera: &Camera, viewport: Vec2, labels: &mut dyn LabelRenderer) {
        let lift = Vec3::Y * self.style.label_lift;
        let view_projection = camera.view_projection();
        for visual in &self.visuals {
            let ndc = view_projection.project_point3(visual.origin + lift);
            if ndc.is_finite() && ndc.z < 1.0 {
                labels.place(visual.label, ndc_to_screen(ndc, viewport));
                labels.set_visible(visual.label, true);
            } else {
                labels.set_visible(visual.label, false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraPose;
    use crate::config::CameraConfig;
    use crate::labels::LabelBoard;

    fn poi(id: &str, name: &str, position: Vec3) -> Poi {
        Poi {
            id: id.to_string(),
            name: name.to_string(),
            position,
        }
    }

    fn camera_at(position: Vec3, target: Vec3) -> Camera {
        let mut camera = Camera::from_config(&CameraConfig::default());
        camera.pose = CameraPose::looking_at(position, target);
        camera
    }

    fn two_pois() -> Vec<Poi> {
        vec![
            poi("near", "Near", Vec3::new(0.0, 1.5, 0.0)),
            poi("far", "", Vec3::new(0.0, 1.5, -3.0)),
        ]
    }

    #[test]
    fn test_rebuild_replaces_everything() {
        let mut registry = PoiRegistry::new(MarkerConfig::default());
        let mut labels = LabelBoard::new();

        registry.rebuild(&two_pois(), &mut labels);
        assert_eq!(registry.len(), 2);
        assert_eq!(labels.len(), 2);
        assert_eq!(registry.visuals()[0].origin, Vec3::ZERO);
        assert_eq!(labels.get(registry.visuals()[1].label).unwrap().text, "POI");

        let generation = registry.generation();
        registry.rebuild(&two_pois()[..1], &mut labels);
        assert_eq!(registry.len(), 1);
        assert_eq!(labels.len(), 1);
        assert!(registry.generation() > generation);

        registry.rebuild(&[], &mut labels);
        assert!(registry.is_empty());
        assert!(labels.is_empty());
    }

    #[test]
    fn test_hidden_icons_build_nothing_and_never_pick() {
        let mut registry = PoiRegistry::new(MarkerConfig::default());
        let mut labels = LabelBoard::new();
        registry.rebuild(&two_pois(), &mut labels);
        let camera = camera_at(Vec3::new(0.0, 0.05, 5.0), Vec3::new(0.0, 0.05, 0.0));
        assert!(registry.pick_at(Vec2::ZERO, &camera).is_some());

        registry.set_icons_visible(false);
        assert!(registry.pick_at(Vec2::ZERO, &camera).is_none());
        registry.rebuild(&two_pois(), &mut labels);
        assert!(registry.is_empty());
        assert!(labels.is_empty());
    }

    #[test]
    fn test_pick_returns_nearest() {
        let mut registry = PoiRegistry::new(MarkerConfig::default());
        let mut labels = LabelBoard::new();
        registry.rebuild(&two_pois(), &mut labels);

        // Both markers lie on the view axis; the closer one wins
        let camera = camera_at(Vec3::new(0.0, 0.05, 5.0), Vec3::new(0.0, 0.05, 0.0));
        assert_eq!(registry.pick_at(Vec2::ZERO, &camera).unwrap().id, "near");

        let camera = camera_at(Vec3::new(0.0, 0.05, -8.0), Vec3::new(0.0, 0.05, 0.0));
        assert_eq!(registry.pick_at(Vec2::ZERO, &camera).unwrap().id, "far");

        // Looking away hits nothing
        let camera = camera_at(Vec3::new(0.0, 0.05, 5.0), Vec3::new(0.0, 0.05, 10.0));
        assert!(registry.pick_at(Vec2::ZERO, &camera).is_none());
    }

    #[test]
    fn test_set_active_recolors() {
        let style = MarkerConfig::default();
        let mut registry = PoiRegistry::new(style.clone());
        let mut labels = LabelBoard::new();
        registry.rebuild(&two_pois(), &mut labels);

        registry.set_active(Some("far"));
        assert_eq!(registry.active(), Some("far"));
        assert!(registry.visuals()[1].active);
        assert!(registry.visuals()[1].parts.iter().all(|p| p.color == style.highlight_color));
        assert!(registry.visuals()[0].parts.iter().all(|p| p.color == style.accent_color));

        // Highlight survives a rebuild
        registry.rebuild(&two_pois(), &mut labels);
        assert!(registry.visuals()[1].active);

        registry.set_active(None);
        assert!(registry.visuals().iter().all(|v| !v.active));
    }

    #[test]
    fn test_animate() {
        let mut registry = PoiRegistry::new(MarkerConfig::default());
        let mut labels = LabelBoard::new();
        registry.rebuild(&two_pois(), &mut labels);
        registry.set_active(Some("near"));

        let t = 0.25;
        registry.animate(t);
        let active = &registry.visuals()[0];
        let idle = &registry.visuals()[1];
        let breathe = (t * 2.0).sin() * 0.1 + 1.0;
        assert!((active.part(PartKind::Disc).scale - breathe).abs() < 1e-6);
        assert!((active.part(PartKind::Disc).opacity - (0.9 + (t * 3.0).sin() * 0.1)).abs() < 1e-6);
        assert_eq!(active.part(PartKind::Cone).opacity, 1.0);
        assert_eq!(idle.part(PartKind::Disc).opacity, 0.8);
        assert_eq!(idle.part(PartKind::Cone).opacity, 0.9);
        assert_eq!(idle.part(PartKind::Ring).opacity, 0.3);
        // Phase offset per index
        let idle_breathe = (t * 2.0 + 0.5).sin() * 0.1 + 1.0;
        assert!((idle.part(PartKind::Cone).scale - idle_breathe).abs() < 1e-6);
        assert!(idle.part(PartKind::Ring).spin > 0.0);
    }

    #[test]
    fn test_labels_follow_projection() {
        let mut registry = PoiRegistry::new(MarkerConfig::default());
        let mut labels = LabelBoard::new();
        registry.rebuild(&[poi("a", "A", Vec3::new(0.0, 0.3, 0.0))], &mut labels);
        let label = registry.visuals()[0].label;
        let viewport = Vec2::new(800.0, 600.0);

        // Anchor sits at y = 0.3 - 1.5 + 1.2 = 0, straight ahead
        let camera = camera_at(Vec3::new(0.0, 0.0, 4.0), Vec3::ZERO);
        registry.update_labels(&camera, viewport, &mut labels);
        let placed = labels.get(label).unwrap();
        assert!(placed.visible);
        assert!((placed.screen - Vec2::new(400.0, 300.0)).length() < 1e-2);

        // Turn around: the anchor is behind the camera
        let camera = camera_at(Vec3::new(0.0, 0.0, 4.0), Vec3::new(0.0, 0.0, 8.0));
        registry.update_labels(&camera, viewport, &mut labels);
        assert!(!labels.get(label).unwrap().visible);
    }
}
