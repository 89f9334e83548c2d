//! Device enumeration and frame acquisition collaborators.

use crate::error::RigError;
use crate::frame::Frame;

/// Descriptor of a connected camera device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Stable unique identifier, usable as a sort key across runs.
    pub unique_id: String,
    /// Human-readable product name, when known.
    pub name: Option<String>,
}

impl DeviceDescriptor {
    pub fn new(unique_id: impl Into<String>) -> Self {
        Self {
            unique_id: unique_id.into(),
            name: None,
        }
    }
}

/// Per-device frame acquisition.
///
/// Implementations run on a dedicated acquisition thread and may block in
/// `next_frame`, but must eventually return so the worker can observe
/// shutdown.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Frame, RigError>;
}

/// Device enumeration and opening.
pub trait DeviceBackend {
    /// List connected devices. Order is irrelevant; the registry sorts by
    /// `unique_id` before assigning friendly IDs.
    fn enumerate(&self) -> Vec<DeviceDescriptor>;

    /// Open a device for acquisition.
    fn open(&self, descriptor: &DeviceDescriptor) -> Result<Box<dyn FrameSource>, RigError>;
}
