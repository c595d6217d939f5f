//! POI marker meshes
//!
//! The engine owns marker state. This module spawns one mesh per marker
//! part whenever the engine rebuilds its visuals, and copies the animated
//! transform and colour onto the meshes every frame.

use bevy::prelude::*;
use splatview_core::markers::{MarkerPart, PartKind};
use splatview_core::picking::Shape;

use crate::app::{ViewerSet, ViewerState};

pub struct MarkersPlugin;

impl Plugin for MarkersPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<SpawnedGeneration>().add_systems(
            Update,
            (rebuild_marker_meshes, sync_marker_meshes)
                .chain()
                .in_set(ViewerSet::Sync),
        );
    }
}

/// One spawned marker part
#[derive(Component, Debug, Clone, Copy)]
pub struct MarkerMesh {
    /// Index into the engine's visuals for the generation it was built from
    pub index: usize,
    pub kind: PartKind,
}

/// Registry generation the current meshes were spawned for
#[derive(Resource, Default)]
struct SpawnedGeneration(Option<u64>);

fn mesh_for(shape: Shape) -> Mesh {
    match shape {
        Shape::Cylinder { radius, height } => Cylinder::new(radius, height).into(),
        Shape::Cone { radius, height } => Cone { radius, height }.into(),
        Shape::Annulus { inner, outer } => Annulus::new(inner, outer).into(),
    }
}

fn color_for(part: &MarkerPart) -> Color {
    let [_, r, g, b] = part.color.to_be_bytes();
    Color::srgb_u8(r, g, b).with_alpha(part.opacity)
}

fn transform_for(part: &MarkerPart, origin: Vec3) -> Transform {
    Transform {
        translation: origin + part.offset,
        rotation: part.rotation(),
        scale: Vec3::splat(part.scale),
    }
}

fn rebuild_marker_meshes(
    mut commands: Commands,
    state: Res<ViewerState>,
    mut spawned: ResMut<SpawnedGeneration>,
    existing: Query<Entity, With<MarkerMesh>>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let registry = state.viewer.markers();
    if spawned.0 == Some(registry.generation()) {
        return;
    }

    // Dropping the entities drops the last handles to their assets
    for entity in &existing {
        commands.entity(entity).despawn();
    }

    for visual in registry.visuals() {
        for part in &visual.parts {
            let material = materials.add(StandardMaterial {
                base_color: color_for(part),
                unlit: true,
                alpha_mode: AlphaMode::Blend,
                double_sided: true,
                cull_mode: None,
                ..default()
            });
            commands.spawn((
                Mesh3d(meshes.add(mesh_for(part.shape))),
                MeshMaterial3d(material),
                transform_for(part, visual.origin),
                MarkerMesh {
                    index: visual.index,
                    kind: part.kind,
                },
                Name::new(format!("poi-{}-{:?}", visual.poi.id, part.kind)),
            ));
        }
    }

    tracing::debug!(
        "Spawned meshes for {} POIs (generation {})",
        registry.len(),
        registry.generation()
    );
    spawned.0 = Some(registry.generation());
}

fn sync_marker_meshes(
    state: Res<ViewerState>,
    mut query: Query<(&MarkerMesh, &mut Transform, &MeshMaterial3d<StandardMaterial>)>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let visuals = state.viewer.markers().visuals();
    for (marker, mut transform, material) in &mut query {
        // Meshes from a superseded generation are despawned this frame
        let Some(visual) = visuals.get(marker.index) else {
            continue;
        };
        let part = visual.part(marker.kind);
        *transform = transform_for(part, visual.origin);

        let color = color_for(part);
        let stale = materials
            .get(&material.0)
            .is_some_and(|current| current.base_color != color);
        if stale {
            if let Some(current) = materials.get_mut(&material.0) {
                current.base_color = color;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_from_hex() {
        let part = MarkerPart {
            kind: PartKind::Disc,
            shape: Shape::Cylinder {
                radius: 0.3,
                height: 0.1,
            },
            offset: Vec3::ZERO,
            scale: 1.0,
            spin: 0.0,
            color: 0xff6b35,
            opacity: 0.5,
        };
        let color = color_for(&part).to_srgba();
        assert!((color.red - 1.0).abs() < 1e-6);
        assert!((color.green - 0x6b as f32 / 255.0).abs() < 1e-6);
        assert!((color.blue - 0x35 as f32 / 255.0).abs() < 1e-6);
        assert!((color.alpha - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_transform_matches_pick_shape() {
        let part = MarkerPart {
            kind: PartKind::Ring,
            shape: Shape::Annulus {
                inner: 0.35,
                outer: 0.5,
            },
            offset: Vec3::Y * 0.01,
            scale: 1.2,
            spin: 0.4,
            color: 0x4a90e2,
            opacity: 0.3,
        };
        let origin = Vec3::new(1.0, -1.5, 2.0);
        let transform = transform_for(&part, origin);
        let placed = part.placed(origin);
        assert_eq!(transform.translation, placed.center);
        assert_eq!(transform.rotation, placed.rotation);
        assert_eq!(transform.scale, Vec3::splat(placed.scale));
    }
}
