//! 3D scene: camera, splat root and pointer input

use bevy::input::mouse::{MouseMotion, MouseScrollUnit, MouseWheel};
use bevy::prelude::*;
use bevy_egui::EguiContexts;
use splatview_core::camera::screen_to_ndc;
use std::sync::Arc;

use crate::app::{now_ms, ViewerSet, ViewerState};
use crate::network::SplatScene;

/// Pixels of travel after which a press counts as a drag, not a tap
const TAP_SLOP: f32 = 10.0;

/// Line-mode wheel notches per pixel-mode scroll unit
const PIXELS_PER_NOTCH: f32 = 100.0;

pub struct ScenePlugin;

impl Plugin for ScenePlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<TouchState>()
            .add_systems(Startup, setup_scene)
            .add_systems(
                Update,
                (update_orbit_input, handle_pointer_selection).in_set(ViewerSet::Input),
            )
            .add_systems(Update, drive_viewer.in_set(ViewerSet::Frame))
            .add_systems(
                Update,
                (sync_camera, sync_splat_root, attach_splat_payload).in_set(ViewerSet::Sync),
            );
    }
}

/// Marker component for the main camera
#[derive(Component)]
pub struct MainCamera;

/// Parent of the splat renderer's output
#[derive(Component)]
pub struct SplatRoot;

/// The fetched splat file, attached to the `SplatRoot` once it has loaded.
///
/// This is where a splat renderer plugs in: it decodes the bytes of an
/// added `SplatPayload` and spawns its draw entities as children of the
/// root, so they follow the scene transform.
#[derive(Component, Debug, Clone)]
pub struct SplatPayload {
    pub url: String,
    pub bytes: Arc<Vec<u8>>,
}

fn setup_scene(mut commands: Commands, state: Res<ViewerState>) {
    let camera = state.viewer.camera();
    commands.spawn((
        Camera3d::default(),
        Projection::Perspective(PerspectiveProjection {
            fov: camera.projection.fov_y_deg.to_radians(),
            near: camera.projection.near,
            far: camera.projection.far,
            ..default()
        }),
        Transform {
            translation: camera.pose.position,
            rotation: camera.pose.rotation,
            ..default()
        },
        MainCamera,
    ));

    commands.spawn((
        SplatRoot,
        Name::new("splat-root"),
        Transform::from_matrix(state.viewer.scene_transform()),
        Visibility::default(),
    ));
}

fn egui_wants_pointer(contexts: &mut EguiContexts) -> bool {
    contexts
        .ctx_mut()
        .map(|ctx| ctx.wants_pointer_input())
        .unwrap_or(false)
}

/// Feed mouse and touch drags into the orbit rig. The rig ignores input
/// while another control source owns the camera.
fn update_orbit_input(
    mut state: ResMut<ViewerState>,
    mut mouse_motion: MessageReader<MouseMotion>,
    mut mouse_wheel: MessageReader<MouseWheel>,
    mouse_button: Res<ButtonInput<MouseButton>>,
    touch_input: Res<Touches>,
    mut contexts: EguiContexts,
) {
    // Check if egui wants the mouse - if so, don't process camera controls
    let ui_has_pointer = egui_wants_pointer(&mut contexts);

    // Drain the readers even when the input goes unused
    let mut total_motion = Vec2::ZERO;
    for motion in mouse_motion.read() {
        total_motion += motion.delta;
    }
    let mut notches = 0.0;
    for scroll in mouse_wheel.read() {
        notches += match scroll.unit {
            MouseScrollUnit::Line => scroll.y,
            MouseScrollUnit::Pixel => scroll.y / PIXELS_PER_NOTCH,
        };
    }
    if ui_has_pointer {
        return;
    }

    let zoom_step = state.viewer.config().orbit.zoom_step;
    let orbit = &mut state.orbit;

    if mouse_button.pressed(MouseButton::Left) && total_motion != Vec2::ZERO {
        orbit.drag(total_motion.x, total_motion.y);
    }
    if notches != 0.0 {
        orbit.zoom(notches);
    }

    let touches: Vec<_> = touch_input.iter().collect();
    match touches.as_slice() {
        [touch] => {
            let delta = touch.delta();
            if delta != Vec2::ZERO {
                orbit.drag(delta.x, delta.y);
            }
        }
        // Pinch to zoom: the radius follows the finger spread
        [t1, t2] => {
            let curr_dist = t1.position().distance(t2.position());
            let prev_dist = (t1.position() - t1.delta()).distance(t2.position() - t2.delta());
            if curr_dist > 1.0 && prev_dist > 1.0 && zoom_step > 0.0 && zoom_step != 1.0 {
                let pinch_notches = (prev_dist / curr_dist).ln() / zoom_step.ln();
                orbit.zoom(pinch_notches);
            }
        }
        _ => {}
    }
}

/// Track touch state for tap detection
#[derive(Resource, Default)]
pub struct TouchState {
    /// Position where the press started
    pub start_pos: Option<Vec2>,
    /// Whether the press travelled far enough to be a drag
    pub is_drag: bool,
}

impl TouchState {
    fn begin(&mut self, pos: Option<Vec2>) {
        self.start_pos = pos;
        self.is_drag = false;
    }

    fn moved_to(&mut self, pos: Vec2) {
        if let Some(start) = self.start_pos {
            if start.distance(pos) > TAP_SLOP {
                self.is_drag = true;
            }
        }
    }

    /// End the press. Returns whether it was a tap.
    fn end(&mut self) -> bool {
        let was_tap = self.start_pos.is_some() && !self.is_drag;
        self.start_pos = None;
        self.is_drag = false;
        was_tap
    }
}

/// Clicks and taps select POIs. Drags that orbit the camera do not.
fn handle_pointer_selection(
    mut state: ResMut<ViewerState>,
    windows: Query<&Window>,
    mouse_button: Res<ButtonInput<MouseButton>>,
    touch_input: Res<Touches>,
    mut touch_state: ResMut<TouchState>,
    mut contexts: EguiContexts,
) {
    let Ok(window) = windows.single() else {
        return;
    };
    let size = Vec2::new(window.width(), window.height());
    let ui_has_pointer = egui_wants_pointer(&mut contexts);
    let cursor = window.cursor_position();

    if let Some(pos) = cursor {
        state.viewer.pointer_moved(screen_to_ndc(pos, size));
    }

    if mouse_button.just_pressed(MouseButton::Left) {
        touch_state.begin(cursor);
    }
    if let Some(pos) = cursor {
        if mouse_button.pressed(MouseButton::Left) {
            touch_state.moved_to(pos);
        }
    }
    if mouse_button.just_released(MouseButton::Left) && touch_state.end() && !ui_has_pointer {
        if let Some(id) = state.viewer.click() {
            tracing::info!("Clicked POI {}", id);
        }
    }

    for touch in touch_input.iter_just_pressed() {
        touch_state.begin(Some(touch.position()));
    }
    for touch in touch_input.iter() {
        touch_state.moved_to(touch.position());
    }
    for touch in touch_input.iter_just_released() {
        if touch_state.end() && !ui_has_pointer {
            state.viewer.pointer_moved(screen_to_ndc(touch.position(), size));
            if let Some(id) = state.viewer.click() {
                tracing::info!("Tapped POI {}", id);
            }
        }
    }
}

fn drive_viewer(mut state: ResMut<ViewerState>, time: Res<Time<Real>>) {
    let ViewerState {
        viewer,
        orbit,
        labels,
    } = &mut *state;
    viewer.frame(now_ms(&time), orbit, labels);
}

/// Mirror the engine's camera onto the Bevy camera.
fn sync_camera(
    state: Res<ViewerState>,
    mut camera_query: Query<(&mut Transform, &mut Projection), With<MainCamera>>,
) {
    let Ok((mut transform, mut projection)) = camera_query.single_mut() else {
        return;
    };
    let camera = state.viewer.camera();
    transform.translation = camera.pose.position;
    transform.rotation = camera.pose.rotation;

    // Bevy derives the aspect ratio from the viewport itself
    if let Projection::Perspective(perspective) = projection.as_mut() {
        perspective.fov = camera.projection.fov_y_deg.to_radians();
        perspective.near = camera.projection.near;
        perspective.far = camera.projection.far;
    }
}

fn sync_splat_root(state: Res<ViewerState>, mut roots: Query<&mut Transform, With<SplatRoot>>) {
    let target = Transform::from_matrix(state.viewer.scene_transform());
    for mut transform in &mut roots {
        if *transform != target {
            *transform = target;
        }
    }
}

fn attach_splat_payload(
    mut commands: Commands,
    splat: Res<SplatScene>,
    roots: Query<Entity, With<SplatRoot>>,
) {
    if !splat.is_changed() {
        return;
    }
    let Some(url) = &splat.url else {
        return;
    };
    for root in &roots {
        commands.entity(root).insert(SplatPayload {
            url: url.clone(),
            bytes: splat.bytes.clone(),
        });
    }
    tracing::info!("Splat payload {} ({} bytes) ready for the renderer", url, splat.bytes.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loaded_scene_reaches_splat_root() {
        let mut app = App::new();
        app.init_resource::<SplatScene>()
            .add_systems(Update, attach_splat_payload);
        let root = app.world_mut().spawn(SplatRoot).id();

        // Nothing loaded yet
        app.update();
        assert!(app.world().get::<SplatPayload>(root).is_none());

        {
            let mut splat = app.world_mut().resource_mut::<SplatScene>();
            splat.url = Some("./scene.sog".to_string());
            splat.bytes = Arc::new(vec![1, 2, 3]);
        }
        app.update();
        let payload = app.world().get::<SplatPayload>(root).unwrap();
        assert_eq!(payload.url, "./scene.sog");
        assert_eq!(payload.bytes.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_short_press_is_tap() {
        let mut touch = TouchState::default();
        touch.begin(Some(Vec2::new(100.0, 100.0)));
        touch.moved_to(Vec2::new(104.0, 97.0));
        assert!(touch.end());
    }

    #[test]
    fn test_long_travel_is_drag() {
        let mut touch = TouchState::default();
        touch.begin(Some(Vec2::new(100.0, 100.0)));
        touch.moved_to(Vec2::new(130.0, 100.0));
        // Coming back does not undo the drag
        touch.moved_to(Vec2::new(100.0, 100.0));
        assert!(!touch.end());
    }

    #[test]
    fn test_release_without_press() {
        let mut touch = TouchState::default();
        assert!(!touch.end());
    }
}
