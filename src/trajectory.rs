//! Ordered sequence of tool poses, either the demonstrated reference or its adapted copy.
//!
//! On disk a trajectory is a CSV table with one pose per row:
//! ```text
//! x,y,z,roll,pitch,yaw
//! 0.30,0.00,0.20,3.14,0.0,0.0
//! 0.31,0.01,0.21,3.14,0.0,0.05
//! ```
//! The header row is optional.

use crate::pose::Pose6D;
use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::slice::Iter;

/// Minimal number of waypoints a reference trajectory must have to be adapted.
pub const MIN_REFERENCE_WAYPOINTS: usize = 2;

const HEADER: [&str; 6] = ["x", "y", "z", "roll", "pitch", "yaw"];

/// Waypoints in the order of the original demonstration. The length does not change
/// after the trajectory is built.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    poses: Vec<Pose6D>,
}

impl Trajectory {
    pub fn new(poses: Vec<Pose6D>) -> Self {
        Trajectory { poses }
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Pose6D> {
        self.poses.get(index)
    }

    pub fn first(&self) -> Option<&Pose6D> {
        self.poses.first()
    }

    pub fn last(&self) -> Option<&Pose6D> {
        self.poses.last()
    }

    pub fn iter(&self) -> Iter<'_, Pose6D> {
        self.poses.iter()
    }

    pub fn poses(&self) -> &[Pose6D] {
        &self.poses
    }

    /// Loads the reference trajectory and checks it has enough waypoints to be adapted.
    pub fn load_reference<P: AsRef<Path>>(path: P) -> Result<Self, ReferenceTrajectoryError> {
        let path = path.as_ref();
        let trajectory = Trajectory::from_csv_file(path)?;
        if trajectory.len() < MIN_REFERENCE_WAYPOINTS {
            return Err(ReferenceTrajectoryError::TooShort {
                path: Some(path.to_path_buf()),
                found: trajectory.len(),
            });
        }
        Ok(trajectory)
    }

    /// Checks the trajectory has enough waypoints to be adapted.
    pub fn check_reference(&self) -> Result<(), ReferenceTrajectoryError> {
        if self.poses.len() < MIN_REFERENCE_WAYPOINTS {
            return Err(ReferenceTrajectoryError::TooShort { path: None, found: self.poses.len() });
        }
        Ok(())
    }

    /// Reads one pose per row, 6 values each. A non-numeric first row is taken as a header.
    pub fn from_csv_file<P: AsRef<Path>>(path: P) -> Result<Self, ReferenceTrajectoryError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ReferenceTrajectoryError::IoError {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let mut poses = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record.map_err(|e| ReferenceTrajectoryError::ParseError {
                row: row + 1,
                message: format!("{}", e),
            })?;
            let fields: Vec<&str> = record.iter().filter(|f| !f.is_empty()).collect();
            if fields.is_empty() {
                continue;
            }
            let parsed: Result<Vec<f64>, _> = fields.iter().map(|f| f.parse::<f64>()).collect();
            let values = match parsed {
                Ok(values) => values,
                Err(_) if row == 0 => continue, // header
                Err(e) => {
                    return Err(ReferenceTrajectoryError::ParseError {
                        row: row + 1,
                        message: format!("{}", e),
                    });
                }
            };
            if values.len() != 6 {
                return Err(ReferenceTrajectoryError::ParseError {
                    row: row + 1,
                    message: format!("expected 6 values, found {}", values.len()),
                });
            }
            let pose = Pose6D::from_array([values[0], values[1], values[2], values[3], values[4], values[5]]);
            if !pose.is_finite() {
                return Err(ReferenceTrajectoryError::ParseError {
                    row: row + 1,
                    message: "non-finite value".into(),
                });
            }
            poses.push(pose);
        }
        Ok(Trajectory { poses })
    }

    /// Writes the trajectory in the same format as it is read, with a header row.
    pub fn save_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), ReferenceTrajectoryError> {
        let path = path.as_ref();
        let io_error = |e: csv::Error| ReferenceTrajectoryError::IoError {
            path: path.to_path_buf(),
            source: io::Error::other(e),
        };
        let mut writer = csv::Writer::from_path(path).map_err(io_error)?;
        writer.write_record(HEADER).map_err(io_error)?;
        for pose in &self.poses {
            writer
                .write_record(pose.to_array().iter().map(|v| v.to_string()))
                .map_err(io_error)?;
        }
        writer.flush().map_err(|source| ReferenceTrajectoryError::IoError {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl<'a> IntoIterator for &'a Trajectory {
    type Item = &'a Pose6D;
    type IntoIter = Iter<'a, Pose6D>;

    fn into_iter(self) -> Self::IntoIter {
        self.poses.iter()
    }
}

/// The reference trajectory is missing or cannot be used. This is not a transient
/// condition and is never retried.
#[derive(Debug)]
pub enum ReferenceTrajectoryError {
    IoError { path: PathBuf, source: io::Error },
    ParseError { row: usize, message: String },
    /// Fewer than [`MIN_REFERENCE_WAYPOINTS`]. The path is absent if the trajectory was
    /// not loaded from a file.
    TooShort { path: Option<PathBuf>, found: usize },
}

impl fmt::Display for ReferenceTrajectoryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ReferenceTrajectoryError::IoError { ref path, ref source } =>
                write!(f, "Reference trajectory error: {}: {}", path.display(), source),
            ReferenceTrajectoryError::ParseError { row, ref message } =>
                write!(f, "Reference trajectory error: row {}: {}", row, message),
            ReferenceTrajectoryError::TooShort { ref path, found } =>
                write!(
                    f,
                    "Reference trajectory error: {} has {} waypoints, at least {} required",
                    path.as_ref().map_or("reference".into(), |p| p.display().to_string()),
                    found,
                    MIN_REFERENCE_WAYPOINTS
                ),
        }
    }
}

impl std::error::Error for ReferenceTrajectoryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReferenceTrajectoryError::IoError { source, .. } => Some(source),
            _ => None,
        }
    }
}
