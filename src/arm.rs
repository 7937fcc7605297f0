//! The narrow hardware contract the executor drives. Implementations own the connection
//! to one physical arm; the executor owns the implementation for the whole control session.
//!
//! Every motion command blocks until the controller acknowledges completion or failure.
//! Each implementation must bound this wait (see `command_timeout_ms` of the configuration)
//! and report [`CommandError::Timeout`] rather than hang.

use crate::pose::{JointState, Pose6D};
use std::fmt;
use std::time::Duration;

pub trait ArmInterface {
    /// Joint-space move to the given configuration. Velocity is in controller units
    /// (percent of the maximal speed for most controllers).
    fn move_to_joint(&mut self, joints: &JointState, velocity: f64) -> Result<(), CommandError>;

    /// Move of the tool to the given pose in the base frame (joint-interpolated, the
    /// controller resolves the inverse kinematics).
    fn move_to_pose(&mut self, pose: &Pose6D, velocity: f64) -> Result<(), CommandError>;

    fn get_current_pose(&mut self) -> Result<Pose6D, CommandError>;

    fn get_current_joint(&mut self) -> Result<JointState, CommandError>;

    /// Stops any motion in progress.
    fn stop(&mut self) -> Result<(), CommandError>;
}

impl<A: ArmInterface + ?Sized> ArmInterface for Box<A> {
    fn move_to_joint(&mut self, joints: &JointState, velocity: f64) -> Result<(), CommandError> {
        (**self).move_to_joint(joints, velocity)
    }

    fn move_to_pose(&mut self, pose: &Pose6D, velocity: f64) -> Result<(), CommandError> {
        (**self).move_to_pose(pose, velocity)
    }

    fn get_current_pose(&mut self) -> Result<Pose6D, CommandError> {
        (**self).get_current_pose()
    }

    fn get_current_joint(&mut self) -> Result<JointState, CommandError> {
        (**self).get_current_joint()
    }

    fn stop(&mut self) -> Result<(), CommandError> {
        (**self).stop()
    }
}

/// Failure of a single command. All variants count as a failed command for the
/// retry and fallback policy of the executor.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandError {
    /// The controller refused or failed the command, with its error code.
    Rejected(i32),
    /// No acknowledgment within the command timeout.
    Timeout(Duration),
    /// The connection to the controller is lost or unusable.
    Disconnected(String),
}

impl CommandError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, CommandError::Timeout(_))
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CommandError::Rejected(code) =>
                write!(f, "Command rejected by the controller, code {}", code),
            CommandError::Timeout(after) =>
                write!(f, "Hardware command timeout after {:?}", after),
            CommandError::Disconnected(reason) =>
                write!(f, "Controller disconnected: {}", reason),
        }
    }
}

impl std::error::Error for CommandError {}
