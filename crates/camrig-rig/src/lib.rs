//! Rig management for `camrig-rs`.
//!
//! Owns the per-camera calibration state machine and the cross-camera
//! composition: each [`CameraSession`] accumulates calibration samples,
//! computes intrinsics and solves its pose against the shared fiducial world
//! frame through its [`Calibrator`]; the [`SessionRegistry`] enumerates
//! devices, assigns stable friendly IDs and tracks the active session; the
//! fusion module folds every posed camera and its detections into one
//! top-down scene.
//!
//! Hardware, detection inference and display are collaborator traits
//! ([`DeviceBackend`], [`Detector`], [`Display`]); this crate contains no
//! device code.

pub mod calibrator;
pub mod detect;
pub mod device;
pub mod display;
pub mod error;
pub mod frame;
pub mod fusion;
pub mod registry;
pub mod session;
pub mod storage;
pub mod worker;

pub use calibrator::{CalibrationSample, Calibrator, CalibratorConfig, ExtrinsicPose};
pub use detect::{DetectedObject, Detector, FiducialHit};
pub use device::{DeviceBackend, DeviceDescriptor, FrameSource};
pub use display::{Display, NullDisplay};
pub use error::RigError;
pub use frame::{DepthImage, Frame};
pub use fusion::{
    compose_scene, comparison_markers, palette_color, render_scene, CameraGlyph, ComparisonOverlay,
    DetectionDot, FusedScene,
};
pub use registry::{RigConfig, SessionRegistry, WorldAnchor};
pub use session::{CameraSession, SessionState};
pub use storage::{CalibrationRecord, CalibrationStore, JsonCalibrationStore};
pub use worker::{spawn_acquisition, FrameFeed};
