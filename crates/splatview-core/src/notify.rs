//! Transient toasts and persistent overlays

/// Severity of a toast, used for styling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub kind: ToastKind,
    pub message: String,
    pub expires_at_ms: f64,
}

/// Full-screen states that block the view until resolved
#[derive(Debug, Clone, PartialEq)]
pub enum Overlay {
    Loading,
    SceneLoadError(String),
    RotateDevice,
}

/// A single toast slot; a new toast replaces the current one.
#[derive(Debug, Clone, Default)]
pub struct Notifications {
    toast: Option<Toast>,
}

impl Notifications {
    pub fn show(&mut self, kind: ToastKind, message: impl Into<String>, now_ms: f64, duration_ms: f64) {
        self.toast = Some(Toast {
            kind,
            message: message.into(),
            expires_at_ms: now_ms + duration_ms,
        });
    }

    /// Drop the toast once its time is up. Returns whether it was dropped.
    pub fn expire(&mut self, now_ms: f64) -> bool {
        match &self.toast {
            Some(toast) if now_ms >= toast.expires_at_ms => {
                self.toast = None;
                true
            }
            _ => false,
        }
    }

    pub fn current(&self) -> Option<&Toast> {
        self.toast.as_ref()
    }

    pub fn clear(&mut self) {
        self.toast = None;
    }
}
