//! Per-camera calibration state: sample buffer, intrinsics, extrinsic pose.

use camrig_calib::{
    dlt_homography, intrinsics_from_homographies, pack_initial_params, pose_from_homography,
    refine_planar_intrinsics, solve_pnp, LmBackend, PlanarIntrinsicsProblem,
    PlanarViewObservations, SolveOptions,
};
use camrig_core::{
    camera_to_world, rotation_orthonormality_error, CameraModel, Distortion, Iso3, Mat4, Pt2, Pt3,
    Real, Vec3, ORTHONORMALITY_TOL,
};
use serde::{Deserialize, Serialize};

use crate::detect::FiducialHit;
use crate::error::RigError;
use crate::storage::{CalibrationRecord, CalibrationStore};

/// One captured calibration observation. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSample {
    board_points: Vec<Pt2>,
    pixel_points: Vec<Pt2>,
}

impl CalibrationSample {
    pub fn board_points(&self) -> &[Pt2] {
        &self.board_points
    }

    pub fn pixel_points(&self) -> &[Pt2] {
        &self.pixel_points
    }

    pub fn len(&self) -> usize {
        self.board_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.board_points.is_empty()
    }
}

/// Serialized form of [`ExtrinsicPose`]: the two solver vectors. The
/// camera-to-world transform is derived state and is rebuilt on load.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct PoseVectors {
    rvec: Vec3,
    tvec: Vec3,
}

/// A camera's pose relative to the shared world frame.
///
/// `rvec`/`tvec` express world→camera in the solver convention (axis-angle
/// plus translation); the derived camera-to-world transform places the
/// camera inside the world.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "PoseVectors", into = "PoseVectors")]
pub struct ExtrinsicPose {
    rvec: Vec3,
    tvec: Vec3,
    cam_to_world: Iso3,
}

impl ExtrinsicPose {
    /// Build from the world→camera solver output.
    pub fn from_world_to_camera(world_to_cam: &Iso3) -> Self {
        Self::from_vectors(
            world_to_cam.rotation.scaled_axis(),
            world_to_cam.translation.vector,
        )
    }

    /// Build from raw axis-angle + translation vectors (world→camera).
    pub fn from_vectors(rvec: Vec3, tvec: Vec3) -> Self {
        Self {
            rvec,
            tvec,
            cam_to_world: camera_to_world(&rvec, &tvec),
        }
    }

    /// Axis-angle rotation vector, world→camera.
    pub fn rvec(&self) -> Vec3 {
        self.rvec
    }

    /// Translation vector, world→camera.
    pub fn tvec(&self) -> Vec3 {
        self.tvec
    }

    /// The camera-to-world rigid transform.
    pub fn cam_to_world(&self) -> &Iso3 {
        &self.cam_to_world
    }

    /// The camera-to-world transform as a homogeneous 4×4 matrix.
    pub fn cam_to_world_matrix(&self) -> Mat4 {
        self.cam_to_world.to_homogeneous()
    }

    /// The camera origin expressed in world coordinates.
    pub fn position(&self) -> Pt3 {
        self.cam_to_world.transform_point(&Pt3::origin())
    }

    /// Check the rigid-body invariant on the derived transform.
    pub fn is_rigid(&self) -> bool {
        let r_binding = self.cam_to_world.rotation.to_rotation_matrix();
        rotation_orthonormality_error(r_binding.matrix()) < ORTHONORMALITY_TOL
    }
}

impl From<PoseVectors> for ExtrinsicPose {
    fn from(v: PoseVectors) -> Self {
        Self::from_vectors(v.rvec, v.tvec)
    }
}

impl From<ExtrinsicPose> for PoseVectors {
    fn from(p: ExtrinsicPose) -> Self {
        Self {
            rvec: p.rvec,
            tvec: p.tvec,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CalibratorConfig {
    /// Minimum number of calibration samples before intrinsics can be
    /// computed.
    pub min_samples: usize,
    /// Mean pixel reprojection error above which a calibration run is
    /// rejected.
    pub max_mean_reproj_error: Real,
    /// Solver options for the refinement stage.
    pub solve: SolveOptions,
}

impl Default for CalibratorConfig {
    fn default() -> Self {
        Self {
            min_samples: 4,
            max_mean_reproj_error: 2.0,
            solve: SolveOptions::default(),
        }
    }
}

/// Owns one camera's calibration data: the sample buffer, the computed
/// camera model, and the solved pose.
#[derive(Debug)]
pub struct Calibrator {
    config: CalibratorConfig,
    samples: Vec<CalibrationSample>,
    camera: Option<CameraModel>,
    pose: Option<ExtrinsicPose>,
    last_mean_reproj_error: Option<Real>,
}

impl Calibrator {
    pub fn new(config: CalibratorConfig) -> Self {
        Self {
            config,
            samples: Vec::new(),
            camera: None,
            pose: None,
            last_mean_reproj_error: None,
        }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Drop all buffered samples. Computed parameters are unaffected.
    pub fn clear_samples(&mut self) {
        self.samples.clear();
    }

    pub fn camera(&self) -> Option<&CameraModel> {
        self.camera.as_ref()
    }

    pub fn pose(&self) -> Option<&ExtrinsicPose> {
        self.pose.as_ref()
    }

    /// Camera origin in world coordinates, once a pose has been solved.
    pub fn position(&self) -> Option<Pt3> {
        self.pose.as_ref().map(ExtrinsicPose::position)
    }

    /// Mean reprojection error of the most recent successful intrinsics run.
    pub fn mean_reproj_error(&self) -> Option<Real> {
        self.last_mean_reproj_error
    }

    /// Append one calibration sample built from detector output.
    ///
    /// Fails with [`RigError::NoFiducialFound`] when the hits do not contain
    /// a usable pattern (fewer than the 4 correspondences a homography
    /// needs); the sample is discarded, not stored.
    pub fn add_sample(&mut self, hits: &[FiducialHit]) -> Result<usize, RigError> {
        if hits.len() < 4 {
            return Err(RigError::NoFiducialFound);
        }
        self.samples.push(CalibrationSample {
            board_points: hits.iter().map(|h| h.board).collect(),
            pixel_points: hits.iter().map(|h| h.pixel).collect(),
        });
        Ok(self.samples.len())
    }

    /// Solve for intrinsics and distortion from the buffered samples.
    ///
    /// Pipeline: per-view DLT homography → Zhang closed-form initialisation
    /// → per-view pose initialisation → joint LM refinement of intrinsics,
    /// distortion and poses. On success the camera model is overwritten, any
    /// previously solved pose is invalidated (it was solved under the old
    /// model), and the sample buffer is cleared. On failure all state is
    /// left untouched.
    pub fn compute_intrinsics(&mut self) -> Result<&CameraModel, RigError> {
        let got = self.samples.len();
        if got < self.config.min_samples {
            return Err(RigError::InsufficientSamples {
                got,
                need: self.config.min_samples,
            });
        }

        let homographies: Result<Vec<_>, _> = self
            .samples
            .iter()
            .map(|s| dlt_homography(&s.board_points, &s.pixel_points))
            .collect();
        let homographies = homographies
            .map_err(|e| RigError::CalibrationDidNotConverge(format!("homography: {e}")))?;

        let k_init = intrinsics_from_homographies(&homographies)
            .map_err(|e| RigError::CalibrationDidNotConverge(format!("initialisation: {e}")))?;

        let kmtx = k_init.k_matrix();
        let pose_init: Result<Vec<Iso3>, _> = homographies
            .iter()
            .map(|h| pose_from_homography(&kmtx, h))
            .collect();
        let pose_init = pose_init
            .map_err(|e| RigError::CalibrationDidNotConverge(format!("pose init: {e}")))?;

        let views = self
            .samples
            .iter()
            .map(|s| {
                let board_3d: Vec<Pt3> =
                    s.board_points.iter().map(|p| Pt3::new(p.x, p.y, 0.0)).collect();
                PlanarViewObservations::new(board_3d, s.pixel_points.clone())
            })
            .collect();

        let problem = PlanarIntrinsicsProblem::new(views);
        let x0 = pack_initial_params(&CameraModel::new(k_init, Distortion::default()), &pose_init);
        let result = refine_planar_intrinsics(&LmBackend, &problem, x0, &self.config.solve);

        if !result.report.converged {
            return Err(RigError::CalibrationDidNotConverge(format!(
                "solver stopped after {} evaluations at cost {:.3e}",
                result.report.iterations, result.report.final_cost
            )));
        }
        if result.mean_reproj_error > self.config.max_mean_reproj_error {
            return Err(RigError::CalibrationDidNotConverge(format!(
                "mean reprojection error {:.3} px exceeds bound {:.3} px",
                result.mean_reproj_error, self.config.max_mean_reproj_error
            )));
        }

        log::info!(
            "intrinsics solved: fx={:.1} fy={:.1} cx={:.1} cy={:.1}, reproj {:.3} px over {} views",
            result.camera.intrinsics.fx,
            result.camera.intrinsics.fy,
            result.camera.intrinsics.cx,
            result.camera.intrinsics.cy,
            result.mean_reproj_error,
            got
        );

        self.camera = Some(result.camera);
        self.pose = None;
        self.last_mean_reproj_error = Some(result.mean_reproj_error);
        self.samples.clear();

        Ok(self.camera.as_ref().unwrap())
    }

    /// Solve the camera's pose from 3D world points and their observed
    /// pixels.
    ///
    /// Requires computed intrinsics. On failure the prior pose (if any) is
    /// kept.
    pub fn compute_pose(
        &mut self,
        world_points: &[Pt3],
        pixels: &[Pt2],
    ) -> Result<&ExtrinsicPose, RigError> {
        let camera = self.camera.ok_or(RigError::IntrinsicsNotCalibrated)?;

        let world_to_cam = solve_pnp(
            world_points,
            pixels,
            &camera.intrinsics,
            &camera.distortion,
        )
        .map_err(RigError::PoseSolveFailed)?;

        let pose = ExtrinsicPose::from_world_to_camera(&world_to_cam);
        debug_assert!(pose.is_rigid());

        let p = pose.position();
        log::info!("pose solved: camera at ({:.3}, {:.3}, {:.3})", p.x, p.y, p.z);

        self.pose = Some(pose);
        Ok(self.pose.as_ref().unwrap())
    }

    /// Snapshot of the persistable state, or `None` before intrinsics exist.
    pub fn record(&self) -> Option<CalibrationRecord> {
        self.camera.map(|camera| CalibrationRecord {
            camera,
            pose: self.pose,
        })
    }

    /// Replace camera model and pose atomically from a stored record.
    pub fn apply_record(&mut self, record: CalibrationRecord) {
        self.camera = Some(record.camera);
        self.pose = record.pose;
    }

    /// Persist the current calibration under the given camera ID.
    ///
    /// Fails with [`RigError::IntrinsicsNotCalibrated`] when there is nothing
    /// to save yet.
    pub fn save_to(&self, store: &dyn CalibrationStore, id: u32) -> Result<(), RigError> {
        let record = self.record().ok_or(RigError::IntrinsicsNotCalibrated)?;
        store.save(id, &record)
    }

    /// Restore calibration from storage.
    ///
    /// `Ok(false)` when no record exists for the ID. A corrupt record fails
    /// with [`RigError::CalibrationDataCorrupt`] and leaves in-memory state
    /// untouched.
    pub fn load_from(&mut self, store: &dyn CalibrationStore, id: u32) -> Result<bool, RigError> {
        match store.load(id)? {
            Some(record) => {
                self.apply_record(record);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
