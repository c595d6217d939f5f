//! Who drives the camera
//!
//! Flights and orientation fusion both write the camera pose, and orbit-drag
//! writes it whenever neither does. All three claims go through
//! `AuthorityArbiter`, which is the only place that enables or disables the
//! orbit controller.

use tracing::debug;

use crate::orbit::OrbitControls;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraAuthority {
    #[default]
    OrbitDrag,
    Flight,
    OrientationFusion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorityChange {
    BeginFlight,
    EndFlight,
    BeginFusion,
    EndFusion,
}

/// Tracks the active claims. A flight outranks fusion while it runs; fusion
/// resumes once the flight lands.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthorityArbiter {
    flight: bool,
    fusion: bool,
}

impl AuthorityArbiter {
    pub fn current(&self) -> CameraAuthority {
        if self.flight {
            CameraAuthority::Flight
        } else if self.fusion {
            CameraAuthority::OrientationFusion
        } else {
            CameraAuthority::OrbitDrag
        }
    }

    pub fn flight_active(&self) -> bool {
        self.flight
    }

    pub fn fusion_active(&self) -> bool {
        self.fusion
    }

    /// Record a claim change and gate the orbit controller accordingly.
    pub fn apply(
        &mut self,
        change: AuthorityChange,
        orbit: &mut dyn OrbitControls,
    ) -> CameraAuthority {
        match change {
            AuthorityChange::BeginFlight => self.flight = true,
            AuthorityChange::EndFlight => self.flight = false,
            AuthorityChange::BeginFusion => self.fusion = true,
            AuthorityChange::EndFusion => self.fusion = false,
        }
        let current = self.current();
        orbit.set_enabled(current == CameraAuthority::OrbitDrag);
        debug!(?change, ?current, "Camera authority changed");
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrbitConfig;
    use crate::orbit::OrbitRig;

    #[test]
    fn test_orbit_enabled_only_without_claims() {
        let mut arbiter = AuthorityArbiter::default();
        let mut orbit = OrbitRig::new(OrbitConfig::default());
        assert_eq!(arbiter.current(), CameraAuthority::OrbitDrag);

        arbiter.apply(AuthorityChange::BeginFusion, &mut orbit);
        assert!(!orbit.enabled());
        assert_eq!(
            arbiter.apply(AuthorityChange::BeginFlight, &mut orbit),
            CameraAuthority::Flight
        );
        assert!(!orbit.enabled());

        // Flight lands while fusion is still on: fusion keeps the camera
        assert_eq!(
            arbiter.apply(AuthorityChange::EndFlight, &mut orbit),
            CameraAuthority::OrientationFusion
        );
        assert!(!orbit.enabled());

        assert_eq!(
            arbiter.apply(AuthorityChange::EndFusion, &mut orbit),
            CameraAuthority::OrbitDrag
        );
        assert!(orbit.enabled());
    }

    #[test]
    fn test_fusion_ending_mid_flight_waits_for_landing() {
        let mut arbiter = AuthorityArbiter::default();
        let mut orbit = OrbitRig::new(OrbitConfig::default());
        arbiter.apply(AuthorityChange::BeginFusion, &mut orbit);
        arbiter.apply(AuthorityChange::BeginFlight, &mut orbit);
        arbiter.apply(AuthorityChange::EndFusion, &mut orbit);
        assert_eq!(arbiter.current(), CameraAuthority::Flight);
        assert!(!orbit.enabled());
        arbiter.apply(AuthorityChange::EndFlight, &mut orbit);
        assert!(orbit.enabled());
    }
}
