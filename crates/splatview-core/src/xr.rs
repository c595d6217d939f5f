//! Immersive AR session state
//!
//! The platform session lives in the host; this tracks what the UI should
//! show and which requests are allowed. Every failure is swallowed and
//! simply leaves AR off.

use thiserror::Error;
use tracing::{info, warn};

pub const AR_MODE: &str = "immersive-ar";
pub const REQUIRED_FEATURES: &[&str] = &["local-floor"];
pub const OPTIONAL_FEATURES: &[&str] = &["hit-test"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum XrError {
    #[error("WebXR is not available")]
    Unavailable,
    #[error("AR session failed: {0}")]
    SessionFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArSessionRequest {
    pub mode: String,
    pub required_features: Vec<String>,
    pub optional_features: Vec<String>,
}

impl Default for ArSessionRequest {
    fn default() -> Self {
        Self {
            mode: AR_MODE.to_string(),
            required_features: REQUIRED_FEATURES.iter().map(|s| s.to_string()).collect(),
            optional_features: OPTIONAL_FEATURES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArPhase {
    #[default]
    Inactive,
    Starting,
    Active,
    Ending,
}

#[derive(Debug, Clone, Default)]
pub struct ArSession {
    supported: bool,
    phase: ArPhase,
}

impl ArSession {
    pub fn is_supported(&self) -> bool {
        self.supported
    }

    pub fn phase(&self) -> ArPhase {
        self.phase
    }

    /// What the UI shows as "AR on".
    pub fn is_active(&self) -> bool {
        matches!(self.phase, ArPhase::Active | ArPhase::Ending)
    }

    pub fn support_resolved(&mut self, result: Result<bool, XrError>) {
        self.supported = match result {
            Ok(supported) => supported,
            Err(e) => {
                warn!(error = %e, "AR support check failed");
                false
            }
        };
        info!(supported = self.supported, "AR support resolved");
    }

    /// Request to start, if a session may start now.
    pub fn request_start(&mut self) -> Option<ArSessionRequest> {
        if !self.supported || self.phase != ArPhase::Inactive {
            return None;
        }
        self.phase = ArPhase::Starting;
        Some(ArSessionRequest::default())
    }

    /// Returns whether the host has a session to end.
    pub fn request_stop(&mut self) -> bool {
        match self.phase {
            ArPhase::Active => {
                self.phase = ArPhase::Ending;
                true
            }
            ArPhase::Ending => false,
            ArPhase::Inactive | ArPhase::Starting => {
                self.phase = ArPhase::Inactive;
                false
            }
        }
    }

    /// Returns true when the session came up after it was cancelled and
    /// the host has to end it.
    pub fn started(&mut self, result: Result<(), XrError>) -> bool {
        match result {
            Ok(()) if self.phase == ArPhase::Starting => {
                self.phase = ArPhase::Active;
                info!("AR session started");
                false
            }
            Ok(()) => {
                warn!(phase = ?self.phase, "AR session started after it was cancelled, ending it");
                self.phase = ArPhase::Ending;
                true
            }
            Err(e) => {
                warn!(error = %e, "AR session could not start");
                self.phase = ArPhase::Inactive;
                false
            }
        }
    }

    /// The session ended, whether we asked for it or the platform did.
    pub fn ended(&mut self, result: Result<(), XrError>) {
        if let Err(e) = result {
            warn!(error = %e, "AR session ended with an error");
        }
        self.phase = ArPhase::Inactive;
        info!("AR session ended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_never_starts() {
        let mut ar = ArSession::default();
        assert!(ar.request_start().is_none());
        ar.support_resolved(Err(XrError::Unavailable));
        assert!(ar.request_start().is_none());
    }

    #[test]
    fn test_session_lifecycle() {
        let mut ar = ArSession::default();
        ar.support_resolved(Ok(true));

        let request = ar.request_start().unwrap();
        assert_eq!(request.mode, "immersive-ar");
        assert_eq!(request.required_features, vec!["local-floor"]);
        assert_eq!(request.optional_features, vec!["hit-test"]);
        assert!(ar.request_start().is_none());
        assert!(!ar.is_active());

        assert!(!ar.started(Ok(())));
        assert!(ar.is_active());
        assert!(ar.request_stop());
        assert!(ar.is_active());
        ar.ended(Ok(()));
        assert!(!ar.is_active());
    }

    #[test]
    fn test_failed_start_reverts() {
        let mut ar = ArSession::default();
        ar.support_resolved(Ok(true));
        ar.request_start();
        ar.started(Err(XrError::SessionFailed("NotAllowedError".into())));
        assert_eq!(ar.phase(), ArPhase::Inactive);
        assert!(ar.request_start().is_some());
    }

    #[test]
    fn test_session_started_after_cancel_is_ended() {
        let mut ar = ArSession::default();
        ar.support_resolved(Ok(true));
        ar.request_start();
        assert!(!ar.request_stop());
        assert_eq!(ar.phase(), ArPhase::Inactive);

        assert!(ar.started(Ok(())));
        assert_eq!(ar.phase(), ArPhase::Ending);
        assert!(ar.request_start().is_none());
        ar.ended(Ok(()));
        assert_eq!(ar.phase(), ArPhase::Inactive);
        assert!(ar.request_start().is_some());
    }

    #[test]
    fn test_platform_ended_session() {
        let mut ar = ArSession::default();
        ar.support_resolved(Ok(true));
        ar.request_start();
        ar.started(Ok(()));
        ar.ended(Ok(()));
        assert!(!ar.is_active());
        assert!(!ar.request_stop());
    }
}
