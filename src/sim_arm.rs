//! In-process arm for dry runs. The workspace is a sphere of `reach` around the base origin,
//! cut by the `floor` plane; poses outside are rejected as the controller would reject
//! poses without inverse kinematic solution.

use crate::arm::{ArmInterface, CommandError};
use crate::pose::{JointState, Pose6D};
use std::time::Duration;
use tracing::debug;

/// Error code for a pose outside the workspace.
pub const UNREACHABLE: i32 = 1;
/// Error code for a joint configuration with the wrong number of joints.
pub const WRONG_DOF: i32 = 2;

/// Command as received by the simulated arm, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum SimulatedCommand {
    MoveJoint(JointState),
    MovePose(Pose6D),
    Stop,
}

#[derive(Debug, Clone)]
pub struct SimulatedArm {
    pose: Pose6D,
    joints: JointState,

    /// Maximal distance of the tool from the base origin.
    pub reach: f64,

    /// Lowest reachable tool z.
    pub floor: f64,

    /// Time a motion takes on this arm. If longer than `timeout`, commands time out.
    pub motion_time: Duration,

    /// Upper bound of any blocking command.
    pub timeout: Duration,

    /// Joint configurations with known tool pose, applied on joint moves.
    configurations: Vec<(JointState, Pose6D)>,

    log: Vec<SimulatedCommand>,
}

impl SimulatedArm {
    pub fn new(pose: Pose6D, joints: JointState, reach: f64) -> Self {
        SimulatedArm {
            pose,
            joints,
            reach,
            floor: f64::NEG_INFINITY,
            motion_time: Duration::ZERO,
            timeout: Duration::from_secs(30),
            configurations: Vec::new(),
            log: Vec::new(),
        }
    }

    /// Declares the tool pose the arm ends up in after a joint move to `joints`.
    pub fn with_configuration(mut self, joints: JointState, pose: Pose6D) -> Self {
        self.configurations.push((joints, pose));
        self
    }

    pub fn reachable(&self, pose: &Pose6D) -> bool {
        pose.is_finite() && pose.position().norm() <= self.reach && pose.z >= self.floor
    }

    /// Commands received so far.
    pub fn log(&self) -> &[SimulatedCommand] {
        &self.log
    }

    fn check_time(&self) -> Result<(), CommandError> {
        if self.motion_time > self.timeout {
            return Err(CommandError::Timeout(self.timeout));
        }
        Ok(())
    }
}

impl ArmInterface for SimulatedArm {
    fn move_to_joint(&mut self, joints: &JointState, velocity: f64) -> Result<(), CommandError> {
        self.log.push(SimulatedCommand::MoveJoint(joints.clone()));
        if joints.dof() != self.joints.dof() || !joints.is_finite() {
            return Err(CommandError::Rejected(WRONG_DOF));
        }
        self.check_time()?;
        if let Some((_, pose)) = self.configurations.iter().find(|(known, _)| known == joints) {
            self.pose = *pose;
        }
        self.joints = joints.clone();
        debug!("Simulated joint move to {} at velocity {}", joints, velocity);
        Ok(())
    }

    fn move_to_pose(&mut self, pose: &Pose6D, velocity: f64) -> Result<(), CommandError> {
        self.log.push(SimulatedCommand::MovePose(*pose));
        if !self.reachable(pose) {
            return Err(CommandError::Rejected(UNREACHABLE));
        }
        self.check_time()?;
        self.pose = *pose;
        debug!("Simulated move to {} at velocity {}", pose, velocity);
        Ok(())
    }

    fn get_current_pose(&mut self) -> Result<Pose6D, CommandError> {
        Ok(self.pose)
    }

    fn get_current_joint(&mut self) -> Result<JointState, CommandError> {
        Ok(self.joints.clone())
    }

    fn stop(&mut self) -> Result<(), CommandError> {
        self.log.push(SimulatedCommand::Stop);
        Ok(())
    }
}
