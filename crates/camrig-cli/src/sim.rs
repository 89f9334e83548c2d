//! Simulated rig backend.
//!
//! Stands in for real hardware so the full calibrate → pose → fuse workflow
//! can be exercised anywhere: a handful of virtual cameras ring the world
//! origin, a virtual calibration board can be waved around or homed onto the
//! origin, and a couple of objects orbit the scene.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use camrig_core::{synthetic, CameraIntrinsics, CameraModel, Distortion, Iso3, Pt2, Pt3, Real};
use camrig_rig::{
    DetectedObject, Detector, DeviceBackend, DeviceDescriptor, FiducialHit, Frame, FrameSource,
    RigError,
};
use image::RgbImage;
use nalgebra::{Rotation3, Translation3, Vector3};

/// Shared mutable state of the simulated scene.
pub struct SimWorld {
    /// Pose of the calibration board in the world frame. Identity means the
    /// board sits exactly on the world origin (its home position).
    board_in_world: Mutex<Iso3>,
    wave_counter: AtomicU64,
}

impl SimWorld {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            board_in_world: Mutex::new(Iso3::identity()),
            wave_counter: AtomicU64::new(0),
        })
    }

    /// Move the board to the next pose of a deterministic wave: varied tilts
    /// and standoffs around the origin, the diversity intrinsic calibration
    /// needs.
    pub fn wave_board(&self) {
        let k = self.wave_counter.fetch_add(1, Ordering::Relaxed) as Real;
        let rot = Rotation3::from_euler_angles(
            0.35 * (0.9 * k).sin(),
            0.30 * (0.7 * k + 1.0).cos(),
            0.10 * (0.5 * k).sin(),
        );
        let offset = Vector3::new(0.08 * (1.3 * k).cos(), 0.08 * (1.1 * k).sin(), 0.0);
        *self.board_in_world.lock().unwrap() =
            Iso3::from_parts(Translation3::from(offset), rot.into());
        log::info!("board waved to pose #{k}");
    }

    /// Park the board back on the world origin, where pose estimation
    /// expects it.
    pub fn home_board(&self) {
        *self.board_in_world.lock().unwrap() = Iso3::identity();
        log::info!("board homed onto the world origin");
    }

    fn board_pose(&self) -> Iso3 {
        *self.board_in_world.lock().unwrap()
    }

    /// World positions of the simulated objects at a given frame sequence.
    fn objects_at(seq: u64) -> Vec<Pt3> {
        let angle = seq as Real * 0.05;
        vec![
            Pt3::new(0.8 * angle.cos(), 0.8 * angle.sin(), 0.3),
            Pt3::new(-0.5 * (angle * 0.6).cos(), 0.5 * (angle * 0.6).sin(), 0.2),
        ]
    }
}

/// One virtual camera: ground-truth model and placement.
#[derive(Clone)]
struct SimCamera {
    unique_id: String,
    model: CameraModel,
    /// World → camera.
    world_to_cam: Iso3,
}

fn ring_camera(index: usize, count: usize) -> SimCamera {
    let theta = index as Real / count as Real * std::f64::consts::TAU;
    let eye = Pt3::new(1.8 * theta.cos(), 1.8 * theta.sin(), 1.2);

    // Face the world origin; +Z is the camera's viewing direction.
    let cam_to_world = Iso3::face_towards(&eye, &Pt3::origin(), &Vector3::z());

    SimCamera {
        // IDs sort descending like real device serials would.
        unique_id: format!("14442C10D{index:04}"),
        model: CameraModel::new(
            CameraIntrinsics {
                fx: 790.0 + 7.0 * index as Real,
                fy: 788.0 + 6.0 * index as Real,
                cx: 640.0,
                cy: 360.0,
                skew: 0.0,
            },
            Distortion {
                k1: -0.06 + 0.01 * index as Real,
                k2: 0.004,
                p1: 0.0003,
                p2: -0.0002,
                k3: 0.0,
            },
        ),
        world_to_cam: cam_to_world.inverse(),
    }
}

/// Simulated device backend: `count` cameras ringed around the origin.
pub struct SimBackend {
    cameras: Vec<SimCamera>,
    frame_interval: Duration,
}

impl SimBackend {
    pub fn new(count: usize) -> Self {
        Self {
            cameras: (0..count).map(|i| ring_camera(i, count)).collect(),
            frame_interval: Duration::from_millis(33),
        }
    }

    /// Ground-truth detector for one device, sharing the world state.
    pub fn detector_for(&self, descriptor: &DeviceDescriptor, world: Arc<SimWorld>) -> Box<dyn Detector> {
        let camera = self
            .cameras
            .iter()
            .find(|c| c.unique_id == descriptor.unique_id)
            .cloned()
            .expect("descriptor from this backend");
        Box::new(SimDetector {
            camera,
            world,
            board: synthetic::grid_points(6, 5, 0.05),
        })
    }
}

impl DeviceBackend for SimBackend {
    fn enumerate(&self) -> Vec<DeviceDescriptor> {
        self.cameras
            .iter()
            .map(|c| DeviceDescriptor {
                unique_id: c.unique_id.clone(),
                name: Some("SimCam".to_string()),
            })
            .collect()
    }

    fn open(&self, descriptor: &DeviceDescriptor) -> Result<Box<dyn FrameSource>, RigError> {
        if !self.cameras.iter().any(|c| c.unique_id == descriptor.unique_id) {
            return Err(RigError::Acquisition(format!(
                "unknown device {}",
                descriptor.unique_id
            )));
        }
        Ok(Box::new(SimSource {
            device_id: descriptor.unique_id.clone(),
            seq: 0,
            interval: self.frame_interval,
        }))
    }
}

struct SimSource {
    device_id: String,
    seq: u64,
    interval: Duration,
}

impl FrameSource for SimSource {
    fn next_frame(&mut self) -> Result<Frame, RigError> {
        thread::sleep(self.interval);
        self.seq += 1;
        Ok(Frame {
            device_id: self.device_id.clone(),
            seq: self.seq,
            color: RgbImage::new(64, 64),
            depth: None,
        })
    }
}

/// Projects the virtual board and objects through the device's ground-truth
/// camera, exactly what a real fiducial/object detector would report.
struct SimDetector {
    camera: SimCamera,
    world: Arc<SimWorld>,
    board: Vec<Pt3>,
}

impl Detector for SimDetector {
    fn detect_fiducials(&mut self, _frame: &Frame) -> Vec<FiducialHit> {
        let cam_from_board = self.camera.world_to_cam * self.world.board_pose();

        let mut hits = Vec::with_capacity(self.board.len());
        for pb in &self.board {
            let p_cam = cam_from_board.transform_point(pb);
            let Some(pixel) = self.camera.model.project_point(&p_cam) else {
                // Board partially behind this camera: treat as not detected.
                return Vec::new();
            };
            hits.push(FiducialHit {
                board: Pt2::new(pb.x, pb.y),
                pixel,
            });
        }
        hits
    }

    fn detect_objects(&mut self, frame: &Frame) -> Vec<DetectedObject> {
        SimWorld::objects_at(frame.seq)
            .into_iter()
            .filter_map(|pw| {
                let p_cam = self.camera.world_to_cam.transform_point(&pw);
                (p_cam.z > 0.0).then_some(DetectedObject {
                    point: p_cam,
                    extent: Some(0.1),
                })
            })
            .collect()
    }
}
