//! Per-camera operator session.
//!
//! A session owns one device's acquisition feed, its detector, and its
//! calibrator, and exposes the small state machine the operator drives:
//!
//! ```text
//! Idle → CollectingCalibration → Calibrated → PoseEstimated
//! ```
//!
//! Command failures are surfaced as [`RigError`] and never advance the
//! state; the operator simply retries.

use std::time::Duration;

use camrig_core::{Iso3, Pt2, Pt3};

use crate::calibrator::{Calibrator, CalibratorConfig};
use crate::detect::{DetectedObject, Detector};
use crate::device::DeviceDescriptor;
use crate::display::Display;
use crate::error::RigError;
use crate::frame::Frame;
use crate::storage::CalibrationStore;
use crate::worker::FrameFeed;

/// Operator-facing calibration progress of one camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No samples collected yet.
    Idle,
    /// Calibration samples are being gathered.
    CollectingCalibration,
    /// Intrinsics are valid.
    Calibrated,
    /// Extrinsics are valid; re-enterable by estimating again.
    PoseEstimated,
}

/// Per-session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub calibrator: CalibratorConfig,
    /// Maps board-plane coordinates of the pose fiducial into the world
    /// frame. Identity means the fiducial *is* the world frame.
    pub board_to_world: Iso3,
    /// How long capture commands wait for a frame.
    pub capture_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            calibrator: CalibratorConfig::default(),
            board_to_world: Iso3::identity(),
            capture_timeout: Duration::from_secs(2),
        }
    }
}

/// One camera's session: device, feed, detector, calibrator, live
/// detections, display flags.
pub struct CameraSession {
    descriptor: DeviceDescriptor,
    friendly_id: u32,
    state: SessionState,
    calibrator: Calibrator,
    feed: FrameFeed,
    detector: Box<dyn Detector>,
    detected: Vec<DetectedObject>,
    latest_frame: Option<Frame>,
    show_depth: bool,
    board_to_world: Iso3,
    capture_timeout: Duration,
}

impl CameraSession {
    pub fn new(
        descriptor: DeviceDescriptor,
        friendly_id: u32,
        feed: FrameFeed,
        detector: Box<dyn Detector>,
        config: &SessionConfig,
    ) -> Self {
        Self {
            descriptor,
            friendly_id,
            state: SessionState::Idle,
            calibrator: Calibrator::new(config.calibrator),
            feed,
            detector,
            detected: Vec::new(),
            latest_frame: None,
            show_depth: false,
            board_to_world: config.board_to_world,
            capture_timeout: config.capture_timeout,
        }
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub fn friendly_id(&self) -> u32 {
        self.friendly_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn calibrator(&self) -> &Calibrator {
        &self.calibrator
    }

    pub fn calibrator_mut(&mut self) -> &mut Calibrator {
        &mut self.calibrator
    }

    pub fn detected_objects(&self) -> &[DetectedObject] {
        &self.detected
    }

    pub fn show_depth(&self) -> bool {
        self.show_depth
    }

    /// Flip the depth-view flag. No validation; display-only concern.
    pub fn toggle_depth_view(&mut self) -> bool {
        self.show_depth = !self.show_depth;
        self.show_depth
    }

    /// Per-tick refresh: pull the newest frame (non-blocking) and re-run
    /// object detection on it. No frame or no detections is not an error.
    pub fn update(&mut self) {
        if let Some(frame) = self.feed.latest() {
            self.detected = self.detector.detect_objects(&frame);
            self.latest_frame = Some(frame);
        }
    }

    /// Capture one calibration frame and append a sample.
    ///
    /// Starts (or continues) a collection: on success the session is in
    /// `CollectingCalibration`, whatever state it was in before.
    pub fn capture_calibration_frame(&mut self) -> Result<usize, RigError> {
        let frame = self.feed.wait_latest(self.capture_timeout)?;
        let hits = self.detector.detect_fiducials(&frame);
        let count = self.calibrator.add_sample(&hits)?;
        self.state = SessionState::CollectingCalibration;
        log::info!(
            "camera {}: captured calibration frame ({count} samples)",
            self.friendly_id
        );
        Ok(count)
    }

    /// Compute intrinsics from the collected samples and persist the result.
    ///
    /// On success the session is `Calibrated`; on failure the error is
    /// surfaced and the state (and calibrator) are unchanged.
    pub fn compute_and_save(&mut self, store: &dyn CalibrationStore) -> Result<(), RigError> {
        self.calibrator.compute_intrinsics()?;
        self.state = SessionState::Calibrated;
        self.calibrator.save_to(store, self.friendly_id)
    }

    /// Capture a frame of the pose fiducial and solve this camera's pose in
    /// the world frame.
    ///
    /// Only valid once intrinsics exist (`Calibrated` or `PoseEstimated`).
    pub fn estimate_pose(&mut self) -> Result<(), RigError> {
        if !matches!(
            self.state,
            SessionState::Calibrated | SessionState::PoseEstimated
        ) {
            return Err(RigError::IntrinsicsNotCalibrated);
        }

        let frame = self.feed.wait_latest(self.capture_timeout)?;
        let hits = self.detector.detect_fiducials(&frame);
        if hits.is_empty() {
            return Err(RigError::NoFiducialFound);
        }

        let world_points: Vec<Pt3> = hits
            .iter()
            .map(|h| {
                self.board_to_world
                    .transform_point(&Pt3::new(h.board.x, h.board.y, 0.0))
            })
            .collect();
        let pixels: Vec<Pt2> = hits.iter().map(|h| h.pixel).collect();

        self.calibrator.compute_pose(&world_points, &pixels)?;
        self.state = SessionState::PoseEstimated;
        Ok(())
    }

    /// Restore a previously saved calibration for this camera.
    ///
    /// Advances the state to match the restored record. A missing record is
    /// `Ok(false)`; a corrupt one fails and changes nothing.
    pub fn load_calibration(&mut self, store: &dyn CalibrationStore) -> Result<bool, RigError> {
        if !self.calibrator.load_from(store, self.friendly_id)? {
            return Ok(false);
        }
        self.state = if self.calibrator.pose().is_some() {
            SessionState::PoseEstimated
        } else {
            SessionState::Calibrated
        };
        log::info!("camera {}: restored calibration", self.friendly_id);
        Ok(true)
    }

    /// Capture one decoded frame; optionally emit it on the display.
    pub fn capture_still(
        &mut self,
        show: bool,
        display: &mut dyn Display,
    ) -> Result<Frame, RigError> {
        let frame = self.feed.wait_latest(self.capture_timeout)?;
        if show {
            display.show(&format!("camera {}", self.friendly_id), &frame.color);
        }
        Ok(frame)
    }
}
