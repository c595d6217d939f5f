//! Splatview Web - WebGPU-powered browser front end
//!
//! This crate hosts the view-control engine from `splatview-core` inside a
//! Bevy app and bridges it to the browser: asset fetches, device
//! orientation, WebXR and viewport signals.

mod app;
mod markers;
mod network;
mod scene;
mod sensors;
mod ui;
mod viewport;
mod xr;

use wasm_bindgen::prelude::*;

/// Entry point for WASM module
#[wasm_bindgen(start)]
pub fn main() {
    // Set panic hook for better error messages
    console_error_panic_hook::set_once();

    // `?log=debug` raises the level; WARN keeps wgpu quiet otherwise
    let level = network::query_param("log")
        .and_then(|level| level.parse::<tracing::Level>().ok())
        .unwrap_or(tracing::Level::WARN);
    tracing_wasm::set_as_global_default_with_config(
        tracing_wasm::WASMLayerConfigBuilder::new()
            .set_max_level(level)
            .build(),
    );

    app::run();
}
