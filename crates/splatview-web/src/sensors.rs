//! Device orientation bridge
//!
//! Permission prompts and the `deviceorientation` subscription live in the
//! page. Their results are queued and handed to the engine once per frame,
//! in arrival order.

use bevy::prelude::*;
use splatview_core::{OrientationSample, PermissionKind, PermissionOutcome, PermissionSupport};
use std::sync::{Arc, Mutex};

use crate::app::{now_ms, ViewerSet, ViewerState};

pub struct SensorsPlugin;

impl Plugin for SensorsPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<PendingSensorEvents>()
            .add_systems(Update, process_sensor_events.in_set(ViewerSet::Input));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SensorEvent {
    Permission(PermissionKind, PermissionOutcome),
    Sample(OrientationSample),
}

#[derive(Resource, Default)]
pub struct PendingSensorEvents(pub Arc<Mutex<Vec<SensorEvent>>>);

impl PendingSensorEvents {
    fn push(queue: &Mutex<Vec<SensorEvent>>, event: SensorEvent) {
        if let Ok(mut events) = queue.lock() {
            events.push(event);
        }
    }
}

/// Which permission prompts this browser has.
pub fn permission_support() -> PermissionSupport {
    #[cfg(target_arch = "wasm32")]
    {
        PermissionSupport {
            motion_prompt: js_interop::has_permission_prompt("DeviceMotionEvent"),
            orientation_prompt: js_interop::has_permission_prompt("DeviceOrientationEvent"),
        }
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        PermissionSupport::default()
    }
}

pub fn request_permission(kind: PermissionKind, pending: &PendingSensorEvents) {
    let queue = pending.0.clone();

    #[cfg(target_arch = "wasm32")]
    {
        use wasm_bindgen_futures::spawn_local;
        spawn_local(async move {
            let outcome = js_interop::request_permission(kind).await;
            tracing::info!("{} permission: {:?}", kind, outcome);
            PendingSensorEvents::push(&queue, SensorEvent::Permission(kind, outcome));
        });
    }

    #[cfg(not(target_arch = "wasm32"))]
    PendingSensorEvents::push(&queue, SensorEvent::Permission(kind, PermissionOutcome::Granted));
}

pub fn subscribe(pending: &PendingSensorEvents) {
    #[cfg(target_arch = "wasm32")]
    js_interop::subscribe(pending.0.clone());

    #[cfg(not(target_arch = "wasm32"))]
    {
        let _ = pending;
        tracing::debug!("No orientation sensor outside the browser");
    }
}

pub fn unsubscribe() {
    #[cfg(target_arch = "wasm32")]
    js_interop::unsubscribe();
}

fn process_sensor_events(
    mut state: ResMut<ViewerState>,
    pending: Res<PendingSensorEvents>,
    time: Res<Time<Real>>,
) {
    let events: Vec<SensorEvent> = match pending.0.try_lock() {
        Ok(mut events) => events.drain(..).collect(),
        Err(_) => return,
    };
    let now = now_ms(&time);
    for event in events {
        match event {
            SensorEvent::Permission(kind, outcome) => {
                state.viewer.permission_resolved(kind, outcome, now)
            }
            SensorEvent::Sample(sample) => {
                state.viewer.orientation_sample(sample);
            }
        }
    }
}

#[cfg(target_arch = "wasm32")]
mod js_interop {
    use super::{PendingSensorEvents, SensorEvent};
    use splatview_core::{OrientationSample, PermissionKind, PermissionOutcome};
    use std::cell::RefCell;
    use std::sync::{Arc, Mutex};
    use wasm_bindgen::prelude::*;
    use wasm_bindgen::JsCast;

    type Listener = Closure<dyn FnMut(web_sys::DeviceOrientationEvent)>;

    thread_local! {
        // Kept so the listener can be removed again
        static LISTENER: RefCell<Option<Listener>> = const { RefCell::new(None) };
    }

    fn constructor(name: &str) -> Option<JsValue> {
        let window = web_sys::window()?;
        js_sys::Reflect::get(&window, &JsValue::from_str(name))
            .ok()
            .filter(|value| !value.is_undefined())
    }

    fn event_name(kind: PermissionKind) -> &'static str {
        match kind {
            PermissionKind::Motion => "DeviceMotionEvent",
            PermissionKind::Orientation => "DeviceOrientationEvent",
        }
    }

    pub fn has_permission_prompt(name: &str) -> bool {
        constructor(name)
            .and_then(|ctor| js_sys::Reflect::get(&ctor, &JsValue::from_str("requestPermission")).ok())
            .is_some_and(|f| f.is_function())
    }

    pub async fn request_permission(kind: PermissionKind) -> PermissionOutcome {
        let Some(ctor) = constructor(event_name(kind)) else {
            return PermissionOutcome::Failed(format!("{} is not available", event_name(kind)));
        };
        let request = match js_sys::Reflect::get(&ctor, &JsValue::from_str("requestPermission")) {
            Ok(f) if f.is_function() => f.unchecked_into::<js_sys::Function>(),
            // Nothing to ask for
            _ => return PermissionOutcome::Granted,
        };
        let promise = match request.call0(&ctor) {
            Ok(value) => js_sys::Promise::from(value),
            Err(e) => return PermissionOutcome::Failed(format!("{:?}", e)),
        };
        match wasm_bindgen_futures::JsFuture::from(promise).await {
            Ok(state) if state.as_string().as_deref() == Some("granted") => PermissionOutcome::Granted,
            Ok(_) => PermissionOutcome::Denied,
            Err(e) => PermissionOutcome::Failed(format!("{:?}", e)),
        }
    }

    pub fn subscribe(queue: Arc<Mutex<Vec<SensorEvent>>>) {
        let Some(window) = web_sys::window() else {
            return;
        };
        unsubscribe();

        let closure = Closure::wrap(Box::new(move |event: web_sys::DeviceOrientationEvent| {
            let sample = OrientationSample {
                alpha: event.alpha(),
                beta: event.beta(),
                gamma: event.gamma(),
            };
            PendingSensorEvents::push(&queue, SensorEvent::Sample(sample));
        }) as Box<dyn FnMut(web_sys::DeviceOrientationEvent)>);

        if let Err(e) = window
            .add_event_listener_with_callback("deviceorientation", closure.as_ref().unchecked_ref())
        {
            tracing::warn!("Could not listen for deviceorientation: {:?}", e);
            return;
        }
        LISTENER.with(|slot| *slot.borrow_mut() = Some(closure));
        tracing::info!("Subscribed to deviceorientation");
    }

    pub fn unsubscribe() {
        let Some(closure) = LISTENER.with(|slot| slot.borrow_mut().take()) else {
            return;
        };
        if let Some(window) = web_sys::window() {
            window
                .remove_event_listener_with_callback("deviceorientation", closure.as_ref().unchecked_ref())
                .ok();
        }
        tracing::info!("Unsubscribed from deviceorientation");
    }
}
