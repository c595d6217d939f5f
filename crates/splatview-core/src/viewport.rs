//! Viewport classification
//!
//! Decides from raw browser signals whether the device is mobile and held
//! in landscape, and how big the render surface should be.

use glam::Vec2;
use tracing::debug;

use crate::config::ViewportConfig;

/// Raw signals sampled by the host
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ViewportSignals {
    /// `screen.orientation.type`, e.g. "landscape-primary"
    pub orientation_type: Option<String>,
    /// Legacy `window.orientation` in degrees
    pub legacy_orientation: Option<f64>,
    /// Visual viewport size, when the platform exposes one
    pub visual_viewport: Option<Vec2>,
    /// `innerWidth` x `innerHeight`
    pub window: Vec2,
    pub user_agent: String,
    pub device_pixel_ratio: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportState {
    pub width_px: f32,
    pub height_px: f32,
    pub is_mobile: bool,
    pub is_landscape: bool,
    /// Device pixel ratio after capping
    pub pixel_ratio: f32,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self {
            width_px: 0.0,
            height_px: 0.0,
            is_mobile: false,
            is_landscape: true,
            pixel_ratio: 1.0,
        }
    }
}

impl ViewportState {
    pub fn size(&self) -> Vec2 {
        Vec2::new(self.width_px, self.height_px)
    }

    /// Mobile devices held upright get blocked with a rotate prompt.
    pub fn needs_rotation_advisory(&self) -> bool {
        self.is_mobile && !self.is_landscape
    }
}

/// Landscape test in order of signal reliability.
pub fn is_landscape(signals: &ViewportSignals) -> bool {
    if let Some(kind) = signals.orientation_type.as_deref() {
        return kind.contains("landscape");
    }
    if let Some(angle) = signals.legacy_orientation {
        return angle.abs() == 90.0;
    }
    let size = signals.visual_viewport.unwrap_or(signals.window);
    size.x > size.y
}

pub fn is_mobile(signals: &ViewportSignals, config: &ViewportConfig) -> bool {
    if signals.window.x <= config.mobile_max_width {
        return true;
    }
    let agent = signals.user_agent.to_ascii_lowercase();
    config
        .mobile_agents
        .iter()
        .any(|token| agent.contains(&token.to_ascii_lowercase()))
}

#[derive(Debug, Clone)]
pub struct ViewportMonitor {
    config: ViewportConfig,
    state: ViewportState,
}

impl ViewportMonitor {
    pub fn new(config: ViewportConfig) -> Self {
        Self {
            config,
            state: ViewportState::default(),
        }
    }

    pub fn state(&self) -> ViewportState {
        self.state
    }

    /// Delays after an orientation change at which to sample again.
    pub fn recheck_delays_ms(&self) -> &[f64] {
        &self.config.recheck_delays_ms
    }

    /// Recompute from fresh signals. Returns the new state and whether it
    /// differs from the previous one.
    pub fn update(&mut self, signals: &ViewportSignals) -> (ViewportState, bool) {
        let size = signals.visual_viewport.unwrap_or(signals.window).round();
        let ratio = if signals.device_pixel_ratio > 0.0 {
            signals.device_pixel_ratio
        } else {
            1.0
        };
        let next = ViewportState {
            width_px: size.x,
            height_px: size.y,
            is_mobile: is_mobile(signals, &self.config),
            is_landscape: is_landscape(signals),
            pixel_ratio: ratio.min(self.config.max_pixel_ratio),
        };
        let changed = next != self.state;
        if changed {
            debug!(
                width = next.width_px,
                height = next.height_px,
                mobile = next.is_mobile,
                landscape = next.is_landscape,
                "Viewport changed"
            );
        }
        self.state = next;
        (next, changed)
    }
}
