//! WebXR bridge
//!
//! `navigator.xr` is reached through reflection so the crate builds without
//! web-sys's unstable XR bindings. Outcomes are queued for the engine.

use bevy::prelude::*;
use serde::Serialize;
use splatview_core::{ArSessionRequest, XrError};
use std::sync::{Arc, Mutex};

use crate::app::{ViewerSet, ViewerState};

pub struct XrPlugin;

impl Plugin for XrPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<PendingXrEvents>()
            .add_systems(Startup, probe_support)
            .add_systems(Update, process_xr_events.in_set(ViewerSet::Input));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum XrEvent {
    Supported(Result<bool, XrError>),
    Started(Result<(), XrError>),
    Ended(Result<(), XrError>),
}

#[derive(Resource, Default)]
pub struct PendingXrEvents(pub Arc<Mutex<Vec<XrEvent>>>);

impl PendingXrEvents {
    fn push(queue: &Mutex<Vec<XrEvent>>, event: XrEvent) {
        if let Ok(mut events) = queue.lock() {
            events.push(event);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.0.lock() {
            events.clear();
        }
    }
}

/// `XRSessionInit` as the browser expects it
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionInit<'a> {
    required_features: &'a [String],
    optional_features: &'a [String],
}

fn session_init_json(request: &ArSessionRequest) -> Result<String, serde_json::Error> {
    serde_json::to_string(&SessionInit {
        required_features: &request.required_features,
        optional_features: &request.optional_features,
    })
}

fn probe_support(pending: Res<PendingXrEvents>) {
    let queue = pending.0.clone();

    #[cfg(target_arch = "wasm32")]
    {
        use wasm_bindgen_futures::spawn_local;
        spawn_local(async move {
            let supported = js_interop::is_session_supported(splatview_core::xr::AR_MODE).await;
            PendingXrEvents::push(&queue, XrEvent::Supported(supported));
        });
    }

    #[cfg(not(target_arch = "wasm32"))]
    PendingXrEvents::push(&queue, XrEvent::Supported(Err(XrError::Unavailable)));
}

pub fn start_session(request: ArSessionRequest, pending: &PendingXrEvents) {
    let queue = pending.0.clone();
    let init = match session_init_json(&request) {
        Ok(init) => init,
        Err(e) => {
            PendingXrEvents::push(&queue, XrEvent::Started(Err(XrError::SessionFailed(e.to_string()))));
            return;
        }
    };

    #[cfg(target_arch = "wasm32")]
    {
        use wasm_bindgen_futures::spawn_local;
        spawn_local(async move {
            let started = js_interop::request_session(&request.mode, &init, queue.clone()).await;
            PendingXrEvents::push(&queue, XrEvent::Started(started));
        });
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        tracing::debug!("Cannot start {} with {} outside the browser", request.mode, init);
        PendingXrEvents::push(&queue, XrEvent::Started(Err(XrError::Unavailable)));
    }
}

/// Ask the platform to end the session. The `end` event reports back.
pub fn end_session(pending: &PendingXrEvents) {
    #[cfg(target_arch = "wasm32")]
    if let Err(e) = js_interop::end_session() {
        // No end event will come
        PendingXrEvents::push(&pending.0, XrEvent::Ended(Err(e)));
    }

    #[cfg(not(target_arch = "wasm32"))]
    let _ = pending;
}

/// End any live session and detach its listener. Called at teardown.
pub fn shutdown(pending: &PendingXrEvents) {
    #[cfg(target_arch = "wasm32")]
    js_interop::shutdown();
    // Nothing will process the end event any more
    pending.clear();
}

fn process_xr_events(mut state: ResMut<ViewerState>, pending: Res<PendingXrEvents>) {
    let events: Vec<XrEvent> = match pending.0.try_lock() {
        Ok(mut events) => events.drain(..).collect(),
        Err(_) => return,
    };
    for event in events {
        match event {
            XrEvent::Supported(result) => state.viewer.ar_support_resolved(result),
            XrEvent::Started(result) => state.viewer.ar_session_started(result),
            XrEvent::Ended(result) => {
                #[cfg(target_arch = "wasm32")]
                js_interop::session_ended();
                state.viewer.ar_session_ended(result)
            }
        }
    }
}

#[cfg(target_arch = "wasm32")]
mod js_interop {
    use super::{PendingXrEvents, XrEvent};
    use splatview_core::XrError;
    use std::cell::RefCell;
    use std::sync::{Arc, Mutex};
    use wasm_bindgen::prelude::*;
    use wasm_bindgen::JsCast;

    type EndListener = Closure<dyn FnMut(web_sys::Event)>;

    /// The live session and its `end` listener
    struct Live {
        session: JsValue,
        on_end: EndListener,
    }

    thread_local! {
        static SESSION: RefCell<Option<Live>> = const { RefCell::new(None) };
    }

    /// Drop the session handle and detach its `end` listener.
    fn release() {
        let Some(live) = SESSION.with(|slot| slot.borrow_mut().take()) else {
            return;
        };
        let target: &web_sys::EventTarget = live.session.unchecked_ref();
        target
            .remove_event_listener_with_callback("end", live.on_end.as_ref().unchecked_ref())
            .ok();
    }

    fn xr() -> Result<JsValue, XrError> {
        let window = web_sys::window().ok_or(XrError::Unavailable)?;
        js_sys::Reflect::get(&window.navigator(), &JsValue::from_str("xr"))
            .ok()
            .filter(|xr| !xr.is_undefined() && !xr.is_null())
            .ok_or(XrError::Unavailable)
    }

    fn method(target: &JsValue, name: &str) -> Result<js_sys::Function, XrError> {
        js_sys::Reflect::get(target, &JsValue::from_str(name))
            .ok()
            .filter(|f| f.is_function())
            .map(|f| f.unchecked_into::<js_sys::Function>())
            .ok_or(XrError::Unavailable)
    }

    fn failed(e: JsValue) -> XrError {
        XrError::SessionFailed(format!("{:?}", e))
    }

    pub async fn is_session_supported(mode: &str) -> Result<bool, XrError> {
        let xr = xr()?;
        let promise = method(&xr, "isSessionSupported")?
            .call1(&xr, &JsValue::from_str(mode))
            .map_err(failed)?;
        let supported = wasm_bindgen_futures::JsFuture::from(js_sys::Promise::from(promise))
            .await
            .map_err(failed)?;
        Ok(supported.as_bool().unwrap_or(false))
    }

    pub async fn request_session(
        mode: &str,
        init: &str,
        queue: Arc<Mutex<Vec<XrEvent>>>,
    ) -> Result<(), XrError> {
        let xr = xr()?;
        let init = js_sys::JSON::parse(init).map_err(failed)?;
        let promise = method(&xr, "requestSession")?
            .call2(&xr, &JsValue::from_str(mode), &init)
            .map_err(failed)?;
        let session = wasm_bindgen_futures::JsFuture::from(js_sys::Promise::from(promise))
            .await
            .map_err(failed)?;

        // The platform may end the session on its own. The listener can't
        // release itself while it runs, so that waits for the next frame.
        let on_end = Closure::wrap(Box::new(move |_event: web_sys::Event| {
            PendingXrEvents::push(&queue, XrEvent::Ended(Ok(())));
        }) as Box<dyn FnMut(web_sys::Event)>);
        let target: &web_sys::EventTarget = session.unchecked_ref();
        target
            .add_event_listener_with_callback("end", on_end.as_ref().unchecked_ref())
            .map_err(failed)?;

        release();
        SESSION.with(|slot| *slot.borrow_mut() = Some(Live { session, on_end }));
        Ok(())
    }

    pub fn end_session() -> Result<(), XrError> {
        let Some(session) = SESSION.with(|slot| slot.borrow().as_ref().map(|live| live.session.clone())) else {
            return Ok(());
        };
        method(&session, "end")?.call0(&session).map_err(failed)?;
        Ok(())
    }

    /// The session is over; forget it.
    pub fn session_ended() {
        release();
    }

    /// End whatever is still running without waiting for the `end` event.
    pub fn shutdown() {
        if let Err(e) = end_session() {
            tracing::warn!(error = %e, "Could not end AR session at shutdown");
        }
        release();
    }
}
