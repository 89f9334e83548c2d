//! Calibration persistence.
//!
//! A calibration record round-trips {camera model, extrinsic pose} exactly:
//! JSON floats are written in shortest round-trip form, so a save/load cycle
//! reproduces bit-identical parameters.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use camrig_core::CameraModel;
use serde::{Deserialize, Serialize};

use crate::calibrator::ExtrinsicPose;
use crate::error::RigError;

/// Persistable calibration state of one camera.
///
/// Either the whole record is present and consistent, or calibration is
/// considered absent; there is no partial form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub camera: CameraModel,
    pub pose: Option<ExtrinsicPose>,
}

/// Keyed storage for per-camera calibration records.
pub trait CalibrationStore {
    fn save(&self, id: u32, record: &CalibrationRecord) -> Result<(), RigError>;

    /// `Ok(None)` when no record exists for the ID; a present-but-unreadable
    /// record is [`RigError::CalibrationDataCorrupt`].
    fn load(&self, id: u32) -> Result<Option<CalibrationRecord>, RigError>;
}

/// JSON files in a directory, one per camera: `camera_<id>.json`.
#[derive(Debug, Clone)]
pub struct JsonCalibrationStore {
    dir: PathBuf,
}

impl JsonCalibrationStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn record_path(&self, id: u32) -> PathBuf {
        self.dir.join(format!("camera_{id}.json"))
    }

    fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path)
    }
}

impl CalibrationStore for JsonCalibrationStore {
    fn save(&self, id: u32, record: &CalibrationRecord) -> Result<(), RigError> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| RigError::CalibrationDataCorrupt(format!("create dir: {e}")))?;

        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| RigError::CalibrationDataCorrupt(format!("encode: {e}")))?;

        let path = self.record_path(id);
        Self::write_atomic(&path, &json)
            .map_err(|e| RigError::CalibrationDataCorrupt(format!("write {path:?}: {e}")))?;

        log::debug!("saved calibration record for camera {id} to {path:?}");
        Ok(())
    }

    fn load(&self, id: u32) -> Result<Option<CalibrationRecord>, RigError> {
        let path = self.record_path(id);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(RigError::CalibrationDataCorrupt(format!(
                    "read {path:?}: {e}"
                )))
            }
        };

        let record = serde_json::from_slice(&bytes)
            .map_err(|e| RigError::CalibrationDataCorrupt(format!("decode {path:?}: {e}")))?;
        Ok(Some(record))
    }
}
