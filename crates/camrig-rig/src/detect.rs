//! Detection collaborator.
//!
//! Fiducial extraction and object detection are consumed as black boxes: a
//! detector turns frames into 2D board/pixel correspondences for calibration
//! or into 3D points (camera-local coordinates) for tracking.

use camrig_core::{Pt2, Pt3, Real};

use crate::frame::Frame;

/// One fiducial correspondence: a known point on the calibration target and
/// the pixel it was observed at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FiducialHit {
    /// Location on the target, in board-plane coordinates.
    pub board: Pt2,
    /// Observed pixel position.
    pub pixel: Pt2,
}

/// A detected object in the owning camera's own coordinate frame.
///
/// Transient: recreated every frame and meaningless without the camera's
/// current pose when world coordinates are needed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedObject {
    /// Object centre in camera-local coordinates.
    pub point: Pt3,
    /// Approximate radius, when the detector estimates one.
    pub extent: Option<Real>,
}

/// External detection routine.
pub trait Detector {
    /// Extract fiducial correspondences from a frame. An empty result means
    /// no usable pattern was visible.
    fn detect_fiducials(&mut self, frame: &Frame) -> Vec<FiducialHit>;

    /// Detect objects in a frame, as 3D points in the camera's own frame.
    /// An empty result is normal, not an error.
    fn detect_objects(&mut self, frame: &Frame) -> Vec<DetectedObject>;
}
