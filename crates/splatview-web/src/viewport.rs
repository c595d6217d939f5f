//! Browser viewport signals
//!
//! Samples the raw signals the engine classifies and forwards resize and
//! device-rotation events from the page.

use bevy::prelude::*;
use splatview_core::ViewportSignals;
use std::sync::{Arc, Mutex};

use crate::app::{now_ms, UiLayout, ViewerSet, ViewerState};

pub struct ViewportPlugin;

impl Plugin for ViewportPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<PendingViewportEvents>()
            .add_systems(Startup, listen_for_viewport_events)
            .add_systems(Update, process_viewport_events.in_set(ViewerSet::Input));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewportEvent {
    Resized,
    Rotated,
}

/// Page events waiting for the next frame
#[derive(Resource, Clone)]
pub struct PendingViewportEvents(pub Arc<Mutex<Vec<ViewportEvent>>>);

impl Default for PendingViewportEvents {
    fn default() -> Self {
        // Sample once on the first frame
        Self(Arc::new(Mutex::new(vec![ViewportEvent::Resized])))
    }
}

impl PendingViewportEvents {
    pub fn push_resize(&self) {
        if let Ok(mut events) = self.0.lock() {
            events.push(ViewportEvent::Resized);
        }
    }
}

/// Read the current signals from the page, or from the Bevy window when
/// there is no page.
pub fn sample_signals(window: &Window) -> ViewportSignals {
    #[cfg(target_arch = "wasm32")]
    if let Some(signals) = js_interop::sample() {
        return signals;
    }

    ViewportSignals {
        orientation_type: None,
        legacy_orientation: None,
        visual_viewport: None,
        window: Vec2::new(window.width(), window.height()),
        user_agent: String::new(),
        device_pixel_ratio: window.scale_factor(),
    }
}

fn listen_for_viewport_events(pending: Res<PendingViewportEvents>) {
    #[cfg(target_arch = "wasm32")]
    js_interop::listen(&pending);
    #[cfg(not(target_arch = "wasm32"))]
    let _ = pending;
}

/// Remove the page listeners. Called at teardown.
pub fn stop_listening() {
    #[cfg(target_arch = "wasm32")]
    js_interop::stop_listening();
}

fn process_viewport_events(
    mut state: ResMut<ViewerState>,
    mut layout: ResMut<UiLayout>,
    pending: Res<PendingViewportEvents>,
    windows: Query<&Window>,
    time: Res<Time<Real>>,
) {
    let events: Vec<ViewportEvent> = match pending.0.try_lock() {
        Ok(mut events) => events.drain(..).collect(),
        Err(_) => return,
    };
    if events.is_empty() {
        return;
    }
    let Ok(window) = windows.single() else {
        return;
    };

    // One sample covers any number of queued events
    let signals = sample_signals(window);
    if events.contains(&ViewportEvent::Rotated) {
        state.viewer.orientation_changed(&signals, now_ms(&time));
    } else {
        state.viewer.viewport_changed(&signals);
    }
    layout.set_mobile(state.viewer.viewport().is_mobile);
}

#[cfg(target_arch = "wasm32")]
mod js_interop {
    use super::{PendingViewportEvents, ViewportEvent};
    use bevy::math::Vec2;
    use splatview_core::ViewportSignals;
    use std::cell::RefCell;
    use wasm_bindgen::prelude::*;
    use wasm_bindgen::JsCast;

    fn get(target: &JsValue, key: &str) -> Option<JsValue> {
        js_sys::Reflect::get(target, &JsValue::from_str(key))
            .ok()
            .filter(|value| !value.is_undefined() && !value.is_null())
    }

    pub fn sample() -> Option<ViewportSignals> {
        let window = web_sys::window()?;
        let width = window.inner_width().ok()?.as_f64()?;
        let height = window.inner_height().ok()?.as_f64()?;

        let orientation_type = get(&window, "screen")
            .and_then(|screen| get(&screen, "orientation"))
            .and_then(|orientation| get(&orientation, "type"))
            .and_then(|kind| kind.as_string());
        let legacy_orientation = get(&window, "orientation").and_then(|angle| angle.as_f64());
        let visual_viewport = window
            .visual_viewport()
            .map(|viewport| Vec2::new(viewport.width() as f32, viewport.height() as f32));
        let user_agent = window.navigator().user_agent().unwrap_or_default();

        Some(ViewportSignals {
            orientation_type,
            legacy_orientation,
            visual_viewport,
            window: Vec2::new(width as f32, height as f32),
            user_agent,
            device_pixel_ratio: window.device_pixel_ratio() as f32,
        })
    }

    type Listener = Closure<dyn FnMut(web_sys::Event)>;

    thread_local! {
        // Kept so the listeners can be removed again
        static LISTENERS: RefCell<Vec<(web_sys::EventTarget, &'static str, Listener)>> =
            const { RefCell::new(Vec::new()) };
    }

    /// Forward window resizes and device rotations. `screen.orientation`
    /// and `visualViewport` are listened to where the browser has them.
    pub fn listen(pending: &PendingViewportEvents) {
        let Some(window) = web_sys::window() else {
            return;
        };
        stop_listening();

        let window_target: web_sys::EventTarget = window.clone().into();
        add(window_target.clone(), "resize", ViewportEvent::Resized, pending);
        add(window_target, "orientationchange", ViewportEvent::Rotated, pending);

        if let Some(orientation) = get(&window, "screen").and_then(|screen| get(&screen, "orientation")) {
            add(orientation.unchecked_into(), "change", ViewportEvent::Rotated, pending);
        }
        if let Some(viewport) = window.visual_viewport() {
            add(viewport.into(), "resize", ViewportEvent::Resized, pending);
        }
    }

    fn add(
        target: web_sys::EventTarget,
        event: &'static str,
        kind: ViewportEvent,
        pending: &PendingViewportEvents,
    ) {
        let queue = pending.0.clone();
        let closure = Closure::wrap(Box::new(move |_event: web_sys::Event| {
            if let Ok(mut events) = queue.lock() {
                events.push(kind);
            }
        }) as Box<dyn FnMut(web_sys::Event)>);

        if let Err(e) = target.add_event_listener_with_callback(event, closure.as_ref().unchecked_ref()) {
            tracing::warn!("Could not listen for {}: {:?}", event, e);
            return;
        }
        LISTENERS.with(|listeners| listeners.borrow_mut().push((target, event, closure)));
    }

    pub fn stop_listening() {
        let listeners = LISTENERS.with(|listeners| std::mem::take(&mut *listeners.borrow_mut()));
        if listeners.is_empty() {
            return;
        }
        for (target, event, closure) in &listeners {
            target
                .remove_event_listener_with_callback(event, closure.as_ref().unchecked_ref())
                .ok();
        }
        tracing::info!("Removed {} viewport listeners", listeners.len());
    }
}
