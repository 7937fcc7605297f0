//! Conversion of target poses observed by the camera into the base frame of the robot.
//!
//! The extrinsic calibration is a fixed 4x4 homogeneous transform (base from sensor) stored
//! as a CSV table of 16 numbers, row-major. A typical identity calibration looks like:
//! ```text
//! 1,0,0,0
//! 0,1,0,0
//! 0,0,1,0
//! 0,0,0,1
//! ```
//! The calibration file is re-read on every conversion so that the camera can be re-calibrated
//! while the process keeps running. Callers that need a consistent snapshot across several
//! conversions should take [`FrameTransform::snapshot`] once and use [`convert_with`].

use crate::pose::{OrientationSingularity, Pose6D};
use nalgebra::{Isometry3, Matrix3, Matrix4, Rotation3, Translation3, UnitQuaternion};
use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Tolerance how much the rotation block may deviate from being orthonormal, and how much
/// the bottom row may deviate from [0, 0, 0, 1].
pub const RIGID_TOLERANCE: f64 = 1e-3;

/// Validated rigid homogeneous transform, base from sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HomogeneousTransform {
    /// The matrix as loaded, for reference and diagnostics.
    pub matrix: Matrix4<f64>,

    /// The same transform with rotation re-orthonormalized; this is what is applied.
    pub isometry: Isometry3<f64>,
}

impl HomogeneousTransform {
    pub fn identity() -> Self {
        HomogeneousTransform {
            matrix: Matrix4::identity(),
            isometry: Isometry3::identity(),
        }
    }

    /// Validates the matrix as a proper rigid transform.
    pub fn from_matrix(matrix: Matrix4<f64>) -> Result<Self, CalibrationError> {
        if matrix.iter().any(|v| !v.is_finite()) {
            return Err(CalibrationError::NotRigid("matrix contains non-finite values".into()));
        }

        let bottom = [matrix[(3, 0)], matrix[(3, 1)], matrix[(3, 2)], matrix[(3, 3)] - 1.0];
        if bottom.iter().any(|v| v.abs() > RIGID_TOLERANCE) {
            return Err(CalibrationError::NotRigid(format!(
                "bottom row must be [0, 0, 0, 1], got [{}, {}, {}, {}]",
                matrix[(3, 0)], matrix[(3, 1)], matrix[(3, 2)], matrix[(3, 3)]
            )));
        }

        let rotation: Matrix3<f64> = matrix.fixed_view::<3, 3>(0, 0).into_owned();
        let deviation = (rotation.transpose() * rotation - Matrix3::identity()).abs().max();
        if deviation > RIGID_TOLERANCE {
            return Err(CalibrationError::NotRigid(format!(
                "rotation block is not orthonormal (deviation {:.6})",
                deviation
            )));
        }
        if rotation.determinant() < 0.0 {
            return Err(CalibrationError::NotRigid("rotation block is a reflection".into()));
        }

        // Direct quaternion extraction, renormalized to remove the small skew of the stored
        // values. Iterative projection from the identity stalls on half turns.
        let extracted = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rotation));
        let orientation = UnitQuaternion::new_normalize(extracted.into_inner());
        let translation = Translation3::new(matrix[(0, 3)], matrix[(1, 3)], matrix[(2, 3)]);
        Ok(HomogeneousTransform {
            matrix,
            isometry: Isometry3::from_parts(translation, orientation),
        })
    }

    /// Reads the 16 row-major values from the CSV file. Rows may be split in any way
    /// (4x4 or a single row), empty fields are ignored.
    pub fn from_csv_file<P: AsRef<Path>>(path: P) -> Result<Self, CalibrationError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| CalibrationError::IoError {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let mut values = Vec::with_capacity(16);
        for (row, record) in reader.records().enumerate() {
            let record = record.map_err(|e| CalibrationError::ParseError(format!("{}", e)))?;
            for field in record.iter().filter(|f| !f.is_empty()) {
                let value: f64 = field.parse().map_err(|_| {
                    CalibrationError::ParseError(format!(
                        "row {}: '{}' is not a number",
                        row + 1,
                        field
                    ))
                })?;
                values.push(value);
            }
        }
        if values.len() != 16 {
            return Err(CalibrationError::InvalidLength { expected: 16, found: values.len() });
        }

        debug!("Calibration loaded from {}", path.display());
        HomogeneousTransform::from_matrix(Matrix4::from_row_slice(&values))
    }

    /// Maps the pose from the sensor frame to the base frame.
    pub fn apply(&self, pose: &Pose6D) -> Result<Pose6D, OrientationSingularity> {
        Pose6D::from_isometry(&(self.isometry * pose.to_isometry()))
    }

    /// Maps the pose from the base frame back to the sensor frame.
    pub fn inverse_apply(&self, pose: &Pose6D) -> Result<Pose6D, OrientationSingularity> {
        Pose6D::from_isometry(&(self.isometry.inverse() * pose.to_isometry()))
    }
}

/// Converts poses from the sensor frame into the robot base frame, reading the calibration
/// from the file on every call.
#[derive(Debug, Clone)]
pub struct FrameTransform {
    calibration_path: PathBuf,
}

impl FrameTransform {
    pub fn new<P: Into<PathBuf>>(calibration_path: P) -> Self {
        FrameTransform { calibration_path: calibration_path.into() }
    }

    pub fn calibration_path(&self) -> &Path {
        &self.calibration_path
    }

    /// Loads the calibration as it currently is on disk.
    pub fn snapshot(&self) -> Result<HomogeneousTransform, CalibrationError> {
        HomogeneousTransform::from_csv_file(&self.calibration_path)
    }

    /// Target pose in the sensor frame to the same target in the base frame.
    pub fn convert(&self, target_in_sensor_frame: &Pose6D) -> Result<Pose6D, FrameError> {
        let calibration = self.snapshot()?;
        convert_with(&calibration, target_in_sensor_frame)
    }
}

/// Pure conversion over an already loaded calibration.
pub fn convert_with(calibration: &HomogeneousTransform, target_in_sensor_frame: &Pose6D)
    -> Result<Pose6D, FrameError> {
    let in_base = calibration.apply(target_in_sensor_frame)?;
    debug!("Target {} in sensor frame is {} in base frame", target_in_sensor_frame, in_base);
    Ok(in_base)
}

/// The calibration artifact cannot be used.
#[derive(Debug)]
pub enum CalibrationError {
    IoError { path: PathBuf, source: io::Error },
    ParseError(String),
    InvalidLength { expected: usize, found: usize },
    NotRigid(String),
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            CalibrationError::IoError { ref path, ref source } =>
                write!(f, "Calibration load error: cannot read {}: {}", path.display(), source),
            CalibrationError::ParseError(ref msg) =>
                write!(f, "Calibration load error: {}", msg),
            CalibrationError::InvalidLength { expected, found } =>
                write!(f, "Calibration load error: expected {} values, found {}", expected, found),
            CalibrationError::NotRigid(ref msg) =>
                write!(f, "Calibration load error: not a rigid transform: {}", msg),
        }
    }
}

impl std::error::Error for CalibrationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CalibrationError::IoError { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Failure of the sensor to base conversion.
#[derive(Debug)]
pub enum FrameError {
    Calibration(CalibrationError),
    Singularity(OrientationSingularity),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FrameError::Calibration(err) => write!(f, "{}", err),
            FrameError::Singularity(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for FrameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FrameError::Calibration(err) => Some(err),
            FrameError::Singularity(err) => Some(err),
        }
    }
}

impl From<CalibrationError> for FrameError {
    fn from(err: CalibrationError) -> Self {
        FrameError::Calibration(err)
    }
}

impl From<OrientationSingularity> for FrameError {
    fn from(err: OrientationSingularity) -> Self {
        FrameError::Singularity(err)
    }
}
