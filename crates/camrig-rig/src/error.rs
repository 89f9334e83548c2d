//! Rig-level error taxonomy.
//!
//! Only [`RigError::NoDevicesFound`] is fatal; every other variant is
//! surfaced to the operator and leaves the affected session in its prior
//! state so the command can simply be retried.

use camrig_calib::PnpError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RigError {
    /// Device enumeration returned an empty list; nothing to operate on.
    #[error("no camera devices found")]
    NoDevicesFound,

    /// The detector found no usable fiducial pattern in the captured frame.
    #[error("no fiducial pattern found in frame")]
    NoFiducialFound,

    /// Intrinsics computation was requested with too few samples.
    #[error("not enough calibration samples: got {got}, need {need}")]
    InsufficientSamples { got: usize, need: usize },

    /// The reprojection-error minimisation failed to reach the configured
    /// error bound.
    #[error("calibration did not converge: {0}")]
    CalibrationDidNotConverge(String),

    /// The perspective-pose solve rejected the correspondence set.
    #[error("pose solve failed")]
    PoseSolveFailed(#[source] PnpError),

    /// Pose estimation requires computed intrinsics.
    #[error("intrinsics not calibrated")]
    IntrinsicsNotCalibrated,

    /// A stored calibration record could not be read back; in-memory state
    /// is left untouched.
    #[error("calibration data corrupt: {0}")]
    CalibrationDataCorrupt(String),

    /// A frame could not be obtained from the acquisition worker.
    #[error("frame acquisition failed: {0}")]
    Acquisition(String),
}
