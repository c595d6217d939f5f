//! Bevy application setup

use bevy::app::AppExit;
use bevy::asset::AssetMetaCheck;
use bevy::prelude::*;
use bevy_egui::EguiPlugin;
use bevy_picking::DefaultPickingPlugins;
use splatview_core::{HostRequest, LabelBoard, OrbitRig, Viewer, ViewerConfig};

use crate::markers::MarkersPlugin;
use crate::network::NetworkPlugin;
use crate::scene::ScenePlugin;
use crate::sensors::{PendingSensorEvents, SensorsPlugin};
use crate::ui::UiPlugin;
use crate::viewport::ViewportPlugin;
use crate::xr::{PendingXrEvents, XrPlugin};

/// The engine plus the collaborators it borrows each frame
#[derive(Resource)]
pub struct ViewerState {
    pub viewer: Viewer,
    pub orbit: OrbitRig,
    pub labels: LabelBoard,
}

impl ViewerState {
    pub fn new(config: ViewerConfig) -> Self {
        let mut orbit = OrbitRig::new(config.orbit.clone());
        let viewer = Viewer::new(config);
        viewer.attach_orbit(&mut orbit);
        Self {
            viewer,
            orbit,
            labels: LabelBoard::new(),
        }
    }
}

impl Default for ViewerState {
    fn default() -> Self {
        Self::new(ViewerConfig::default())
    }
}

/// Per-frame ordering: input feeds the engine, the engine steps, the host
/// carries out what it asked for, then the scene mirrors the result.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum ViewerSet {
    Input,
    Frame,
    Host,
    Sync,
}

/// Engine clock. Real time so flights keep their duration when the tab
/// was throttled.
pub fn now_ms(time: &Time<Real>) -> f64 {
    time.elapsed_secs_f64() * 1000.0
}

/// Layout hints for the egui overlay
#[derive(Debug, Clone, Resource)]
pub struct UiLayout {
    /// Whether the bookmark panel is open
    pub show_panel: bool,
    pub is_mobile: bool,
    /// Scale factor for UI elements on mobile
    pub ui_scale: f32,
}

impl Default for UiLayout {
    fn default() -> Self {
        Self {
            show_panel: true,
            is_mobile: false,
            ui_scale: 1.0,
        }
    }
}

impl UiLayout {
    pub fn set_mobile(&mut self, is_mobile: bool) {
        if self.is_mobile == is_mobile {
            return;
        }
        self.is_mobile = is_mobile;
        // Bigger touch targets, and start with the panel out of the way
        self.ui_scale = if is_mobile { 1.3 } else { 1.0 };
        self.show_panel = !is_mobile;
    }
}

pub fn run() {
    App::new()
        .insert_resource(ClearColor(Color::srgb(0.05, 0.05, 0.07)))
        .add_plugins(
            DefaultPlugins
                .set(WindowPlugin {
                    primary_window: Some(Window {
                        title: "Splatview".into(),
                        canvas: Some("#splatview-canvas".into()),
                        fit_canvas_to_parent: true,
                        prevent_default_event_handling: false,
                        ..default()
                    }),
                    ..default()
                })
                .set(AssetPlugin {
                    file_path: "".into(),
                    meta_check: AssetMetaCheck::Never,
                    ..default()
                }),
        )
        .add_plugins(DefaultPickingPlugins)
        .add_plugins(EguiPlugin::default())
        .init_resource::<ViewerState>()
        .init_resource::<UiLayout>()
        .configure_sets(
            Update,
            (
                ViewerSet::Input,
                ViewerSet::Frame,
                ViewerSet::Host,
                ViewerSet::Sync,
            )
                .chain(),
        )
        .add_plugins(NetworkPlugin)
        .add_plugins(ScenePlugin)
        .add_plugins(MarkersPlugin)
        .add_plugins(SensorsPlugin)
        .add_plugins(XrPlugin)
        .add_plugins(ViewportPlugin)
        .add_plugins(UiPlugin)
        .add_systems(Update, dispatch_host_requests.in_set(ViewerSet::Host))
        .add_systems(Last, teardown_on_exit)
        .run();
}

/// Carry out the side effects the engine queued this frame.
fn dispatch_host_requests(
    mut state: ResMut<ViewerState>,
    sensor_events: Res<PendingSensorEvents>,
    xr_events: Res<PendingXrEvents>,
    windows: Query<&Window>,
) {
    // Sampling the viewport may queue a resize, so loop until quiet
    loop {
        let requests = state.viewer.drain_requests();
        if requests.is_empty() {
            break;
        }
        for request in requests {
            match request {
                HostRequest::RequestPermission(kind) => {
                    crate::sensors::request_permission(kind, &sensor_events)
                }
                HostRequest::SubscribeOrientation => crate::sensors::subscribe(&sensor_events),
                HostRequest::UnsubscribeOrientation => crate::sensors::unsubscribe(),
                HostRequest::SampleViewport => {
                    if let Ok(window) = windows.single() {
                        let signals = crate::viewport::sample_signals(window);
                        state.viewer.viewport_changed(&signals);
                    }
                }
                HostRequest::ResizeSurface {
                    width,
                    height,
                    pixel_ratio,
                } => {
                    // The canvas follows its parent and winit sizes the
                    // backing store, so egui labels and picking stay in CSS
                    // pixels
                    tracing::debug!("Surface {}x{} @{}", width, height, pixel_ratio);
                }
                HostRequest::StartArSession(request) => {
                    crate::xr::start_session(request, &xr_events)
                }
                HostRequest::EndArSession => crate::xr::end_session(&xr_events),
            }
        }
    }
}

fn teardown_on_exit(
    mut exit: MessageReader<AppExit>,
    mut state: ResMut<ViewerState>,
    xr_events: Res<PendingXrEvents>,
) {
    if exit.read().next().is_none() {
        return;
    }
    let ViewerState {
        viewer,
        orbit,
        labels,
    } = &mut *state;
    viewer.teardown(orbit, labels);
    for request in viewer.drain_requests() {
        match request {
            HostRequest::UnsubscribeOrientation => crate::sensors::unsubscribe(),
            HostRequest::EndArSession => {}
            other => tracing::debug!(?other, "Request dropped at shutdown"),
        }
    }
    crate::xr::shutdown(&xr_events);
    crate::viewport::stop_listening();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xr::XrEvent;

    #[test]
    fn test_exit_tears_down_and_drops_xr_events() {
        let mut app = App::new();
        app.add_message::<AppExit>()
            .init_resource::<ViewerState>()
            .init_resource::<PendingXrEvents>()
            .add_systems(Last, teardown_on_exit);
        app.world()
            .resource::<PendingXrEvents>()
            .0
            .lock()
            .unwrap()
            .push(XrEvent::Ended(Ok(())));

        // Keeps running until the app exits
        app.update();
        assert_eq!(app.world().resource::<PendingXrEvents>().0.lock().unwrap().len(), 1);

        app.world_mut().write_message(AppExit::Success);
        app.update();
        assert!(app.world().resource::<PendingXrEvents>().0.lock().unwrap().is_empty());
        let mut state = app.world_mut().resource_mut::<ViewerState>();
        assert!(state.viewer.drain_requests().is_empty());
        assert!(!state.viewer.is_flying());
    }
}
