//! Value types shared by the whole pipeline: the Cartesian pose of the tool (Pose6D) and
//! the joint configuration of the arm (JointState).
//!
//! Orientation is always given as roll, pitch and yaw in radians, with the rotation
//! composed as `R = Rz(yaw) * Ry(pitch) * Rx(roll)`: the tool is first rolled about the
//! fixed X axis, then pitched about fixed Y, then yawed about fixed Z. This is the same
//! convention as `nalgebra::Rotation3::from_euler_angles`.
//!
//! ```
//! use rs_arm_replay::pose::Pose6D;
//!
//! let pose = Pose6D::new(0.3, 0.1, 0.25, 0.1, 0.2, 0.3);
//! let isometry = pose.to_isometry();
//! let back = Pose6D::from_isometry(&isometry).expect("pitch is far from 90 degrees");
//! assert!(pose.approx_eq(&back, 1e-9, 1e-9));
//! ```

use nalgebra::{Isometry3, Matrix3, Rotation3, Translation3, UnitQuaternion, Vector3};
use std::f64::consts::PI;
use std::fmt;

/// Below this value of cos(pitch) roll and yaw can no longer be told apart (gimbal lock).
pub const GIMBAL_LOCK_TOLERANCE: f64 = 1e-6;

/// Position and orientation of the tool, 6 degrees of freedom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose6D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Rotation about X, radians
    pub roll: f64,
    /// Rotation about Y, radians
    pub pitch: f64,
    /// Rotation about Z, radians
    pub yaw: f64,
}

impl Pose6D {
    pub const fn new(x: f64, y: f64, z: f64, roll: f64, pitch: f64, yaw: f64) -> Self {
        Pose6D { x, y, z, roll, pitch, yaw }
    }

    /// Builds the pose from the [x, y, z, roll, pitch, yaw] layout used by the artifacts
    /// and the controller.
    pub fn from_array(values: [f64; 6]) -> Self {
        Pose6D::new(values[0], values[1], values[2], values[3], values[4], values[5])
    }

    pub fn to_array(&self) -> [f64; 6] {
        [self.x, self.y, self.z, self.roll, self.pitch, self.yaw]
    }

    pub fn position(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    pub fn rotation(&self) -> Rotation3<f64> {
        Rotation3::from_euler_angles(self.roll, self.pitch, self.yaw)
    }

    pub fn to_isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(
            Translation3::new(self.x, self.y, self.z),
            UnitQuaternion::from_rotation_matrix(&self.rotation()),
        )
    }

    /// Decomposes the isometry back into position and roll, pitch, yaw.
    /// Fails near pitch = ±90° where roll and yaw are coupled.
    pub fn from_isometry(isometry: &Isometry3<f64>) -> Result<Self, OrientationSingularity> {
        let translation = isometry.translation.vector;
        let rotation = isometry.rotation.to_rotation_matrix();
        let (roll, pitch, yaw) = euler_from_matrix(rotation.matrix())?;
        Ok(Pose6D::new(translation.x, translation.y, translation.z, roll, pitch, yaw))
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }

    /// Euclidean distance between the positions, orientation ignored.
    pub fn distance_to(&self, other: &Pose6D) -> f64 {
        (self.position() - other.position()).norm()
    }

    /// True if both poses are within the given translation and rotation tolerance.
    /// Rotations are compared as rotations, so equivalent Euler triples compare equal.
    pub fn approx_eq(&self, other: &Pose6D, distance_tolerance: f64, angular_tolerance: f64) -> bool {
        if self.distance_to(other) > distance_tolerance {
            return false;
        }
        let difference = UnitQuaternion::from_rotation_matrix(&self.rotation())
            .rotation_to(&UnitQuaternion::from_rotation_matrix(&other.rotation()));
        let q = difference.quaternion();
        // atan2 stays accurate for tiny angles where acos of the trace does not
        2.0 * q.imag().norm().atan2(q.w.abs()) <= angular_tolerance
    }
}

impl fmt::Display for Pose6D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.4}, {:.4}, {:.4}] rpy [{:.4}, {:.4}, {:.4}]",
            self.x, self.y, self.z, self.roll, self.pitch, self.yaw
        )
    }
}

/// Roll, pitch, yaw of the rotation matrix in the convention of this module.
pub(crate) fn euler_from_matrix(r: &Matrix3<f64>) -> Result<(f64, f64, f64), OrientationSingularity> {
    let cos_pitch = (r[(0, 0)] * r[(0, 0)] + r[(1, 0)] * r[(1, 0)]).sqrt();
    let pitch = f64::atan2(-r[(2, 0)], cos_pitch);
    if !(cos_pitch >= GIMBAL_LOCK_TOLERANCE) {
        // Also catches NaN in the matrix
        return Err(OrientationSingularity { pitch });
    }
    let roll = f64::atan2(r[(2, 1)], r[(2, 2)]);
    let yaw = f64::atan2(r[(1, 0)], r[(0, 0)]);
    Ok((roll, pitch, yaw))
}

/// Wraps the angle into (-PI, PI]
pub fn wrap_angle(angle: f64) -> f64 {
    let two_pi = 2.0 * PI;
    let wrapped = angle - two_pi * (angle / two_pi).round();
    if wrapped <= -PI { wrapped + two_pi } else { wrapped }
}

/// Raised when the orientation lands in gimbal lock (pitch close to ±90°) and cannot
/// be expressed as a unique roll, pitch, yaw triple.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationSingularity {
    /// Pitch of the offending orientation, radians.
    pub pitch: f64,
}

impl fmt::Display for OrientationSingularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Orientation singularity: pitch {:.4} rad is too close to ±90°, roll and yaw are coupled",
            self.pitch
        )
    }
}

impl std::error::Error for OrientationSingularity {}

/// Joint angles of the arm, ordered from the base. The number of joints is the arm DOF
/// (7 for the arm this was built for), units are those of the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct JointState(Vec<f64>);

impl JointState {
    pub fn new(angles: Vec<f64>) -> Self {
        JointState(angles)
    }

    pub fn dof(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|q| q.is_finite())
    }
}

impl From<Vec<f64>> for JointState {
    fn from(angles: Vec<f64>) -> Self {
        JointState(angles)
    }
}

impl<const N: usize> From<[f64; N]> for JointState {
    fn from(angles: [f64; N]) -> Self {
        JointState(angles.to_vec())
    }
}

impl fmt::Display for JointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joints: Vec<String> = self.0.iter().map(|q| format!("{:5.2}", q)).collect();
        write!(f, "[{}]", joints.join(" "))
    }
}
