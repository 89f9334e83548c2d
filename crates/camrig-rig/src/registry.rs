//! Session registry and selector.
//!
//! Enumerates devices once at startup, assigns stable friendly IDs, owns all
//! camera sessions, and tracks which one is active for operator commands.
//! Selection is explicit registry state returned to the caller, not a
//! mutable global.

use crate::detect::Detector;
use crate::device::{DeviceBackend, DeviceDescriptor};
use crate::error::RigError;
use crate::session::{CameraSession, SessionConfig};
use crate::worker::spawn_acquisition;

/// Which frame the fused view treats as the world origin.
///
/// Set at configuration time; never inferred from enumeration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldAnchor {
    /// The shared pose fiducial's frame is the world frame (default): every
    /// camera's pose is solved against it.
    Fiducial,
    /// A designated camera's frame is the world frame; that camera carries
    /// an identity-equivalent pose.
    Camera(u32),
}

/// Rig-wide configuration.
#[derive(Debug, Clone)]
pub struct RigConfig {
    pub session: SessionConfig,
    pub anchor: WorldAnchor,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            anchor: WorldAnchor::Fiducial,
        }
    }
}

/// Owns every [`CameraSession`] plus the active-selection index and the
/// world anchor.
pub struct SessionRegistry {
    sessions: Vec<CameraSession>,
    active: u32,
    anchor: WorldAnchor,
}

impl SessionRegistry {
    /// Enumerate devices and build one session per device.
    ///
    /// Friendly IDs are assigned by sorting device unique IDs in descending
    /// order and numbering from 1. The ordering is stable across runs, so
    /// stored calibration records stay attached to their cameras. Fails with
    /// [`RigError::NoDevicesFound`] on an empty enumeration.
    pub fn discover(
        backend: &dyn DeviceBackend,
        mut make_detector: impl FnMut(&DeviceDescriptor) -> Box<dyn Detector>,
        config: &RigConfig,
    ) -> Result<Self, RigError> {
        let mut devices = backend.enumerate();
        if devices.is_empty() {
            return Err(RigError::NoDevicesFound);
        }
        log::info!("found {} devices", devices.len());

        devices.sort_by(|a, b| b.unique_id.cmp(&a.unique_id));

        let mut sessions = Vec::with_capacity(devices.len());
        for (index, descriptor) in devices.into_iter().enumerate() {
            let friendly_id = index as u32 + 1;
            let source = backend.open(&descriptor)?;
            let feed = spawn_acquisition(descriptor.unique_id.clone(), source);
            let detector = make_detector(&descriptor);
            sessions.push(CameraSession::new(
                descriptor,
                friendly_id,
                feed,
                detector,
                &config.session,
            ));
        }

        Ok(Self {
            sessions,
            active: 1,
            anchor: config.anchor,
        })
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn anchor(&self) -> WorldAnchor {
        self.anchor
    }

    /// Make the camera with the given friendly ID active.
    ///
    /// Out-of-range IDs are logged and ignored, returning `None` and leaving
    /// the previous selection unchanged.
    pub fn select(&mut self, friendly_id: u32) -> Option<u32> {
        if friendly_id == 0 || friendly_id as usize > self.sessions.len() {
            log::warn!("ignoring out-of-range camera selection {friendly_id}");
            return None;
        }
        self.active = friendly_id;
        log::info!("selected camera {friendly_id}");
        Some(friendly_id)
    }

    pub fn active_id(&self) -> u32 {
        self.active
    }

    pub fn active(&self) -> &CameraSession {
        &self.sessions[self.active as usize - 1]
    }

    pub fn active_mut(&mut self) -> &mut CameraSession {
        &mut self.sessions[self.active as usize - 1]
    }

    pub fn session(&self, friendly_id: u32) -> Option<&CameraSession> {
        let index = (friendly_id as usize).checked_sub(1)?;
        self.sessions.get(index)
    }

    pub fn sessions(&self) -> &[CameraSession] {
        &self.sessions
    }

    pub fn sessions_mut(&mut self) -> &mut [CameraSession] {
        &mut self.sessions
    }

    /// Advance every session's per-tick refresh, in friendly-ID order.
    pub fn update_all(&mut self) {
        for session in &mut self.sessions {
            session.update();
        }
    }
}
