//! Defines the executor configuration

use crate::parameter_error::ParameterError;
use crate::pose::JointState;
use crate::sampler::{WaypointSampler, DEFAULT_STRIDE, DEFAULT_WINDOW};
use std::path::PathBuf;
use std::time::Duration;

/// Degrees of freedom of the arm the defaults are prepared for.
pub const DEFAULT_DOF: usize = 7;

/// Options recognized by the executor. See [config_from_file.rs](config_from_file.rs)
/// for the YAML format.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    /// Velocity used for all motion commands, controller units (percent for most controllers).
    pub arm_velocity_default: f64,

    /// Indices of the adapted trajectory the arm must pass through before the goal.
    /// Strictly increasing.
    pub milestone_indices: Vec<usize>,

    /// How far before the milestone the candidate waypoints start.
    pub milestone_window: usize,

    /// Step between candidate waypoints, at least 1.
    pub milestone_stride: usize,

    /// If the goal cannot be reached directly, go through the fallback configuration
    /// and try once more.
    pub fallback_enabled: bool,

    /// Known safe configuration used for fallback (the "middle" state of the arm).
    pub fallback_joint_state: JointState,

    /// Configuration the arm returns to between tasks.
    pub home_state: JointState,

    /// Upper bound for any blocking hardware command.
    pub command_timeout_ms: u64,

    /// CSV file with the camera to base calibration matrix.
    pub calibration_path: PathBuf,

    /// CSV file with the demonstrated reference trajectory.
    pub reference_trajectory_path: PathBuf,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            arm_velocity_default: 15.0,
            milestone_indices: Vec::new(),
            milestone_window: DEFAULT_WINDOW,
            milestone_stride: DEFAULT_STRIDE,
            fallback_enabled: false,
            fallback_joint_state: JointState::from([0.0; DEFAULT_DOF]),
            home_state: JointState::from([0.0; DEFAULT_DOF]),
            command_timeout_ms: 30_000,
            calibration_path: PathBuf::from("cfg/cam2base_H.csv"),
            reference_trajectory_path: PathBuf::from("cfg/refer_tjt.csv"),
        }
    }
}

impl ExecutorConfig {
    /// Checks the values are usable, reporting the first problem found.
    pub fn validate(&self) -> Result<(), ParameterError> {
        if !self.arm_velocity_default.is_finite() || self.arm_velocity_default <= 0.0 {
            return Err(ParameterError::InvalidValue(format!(
                "arm_velocity_default must be positive (got {})",
                self.arm_velocity_default
            )));
        }
        if self.milestone_stride == 0 {
            return Err(ParameterError::InvalidValue("milestone_stride must be at least 1".into()));
        }
        if let Some(pair) = self.milestone_indices.windows(2).find(|pair| pair[0] >= pair[1]) {
            return Err(ParameterError::InvalidValue(format!(
                "milestone_indices must be strictly increasing ({} is followed by {})",
                pair[0], pair[1]
            )));
        }
        for (name, joints) in [
            ("fallback_joint_state", &self.fallback_joint_state),
            ("home_state", &self.home_state),
        ] {
            if joints.dof() == 0 || !joints.is_finite() {
                return Err(ParameterError::InvalidValue(format!(
                    "{} must be a non-empty list of finite joint values", name
                )));
            }
        }
        if self.fallback_joint_state.dof() != self.home_state.dof() {
            return Err(ParameterError::InvalidLength {
                expected: self.home_state.dof(),
                found: self.fallback_joint_state.dof(),
            });
        }
        if self.command_timeout_ms == 0 {
            return Err(ParameterError::InvalidValue("command_timeout_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn sampler(&self) -> Result<WaypointSampler, ParameterError> {
        WaypointSampler::new(self.milestone_window, self.milestone_stride)
            .ok_or_else(|| ParameterError::InvalidValue("milestone_stride must be at least 1".into()))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Outputs the configuration in the YAML format that `from_yaml_file` reads.
    pub fn to_yaml(&self) -> String {
        fn list<T: ToString>(values: &[T]) -> String {
            values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ")
        }
        format!(
            "arm_velocity_default: {}\n\
             milestone_indices: [{}]\n\
             milestone_window: {}\n\
             milestone_stride: {}\n\
             fallback_enabled: {}\n\
             fallback_joint_state: [{}]\n\
             home_state: [{}]\n\
             command_timeout_ms: {}\n\
             calibration_path: {}\n\
             reference_trajectory_path: {}\n",
            self.arm_velocity_default,
            list(&self.milestone_indices),
            self.milestone_window,
            self.milestone_stride,
            self.fallback_enabled,
            list(self.fallback_joint_state.as_slice()),
            list(self.home_state.as_slice()),
            self.command_timeout_ms,
            self.calibration_path.display(),
            self.reference_trajectory_path.display(),
        )
    }
}
