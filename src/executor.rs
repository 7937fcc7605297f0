//! Fault tolerant execution of the adapted trajectory.
//!
//! The executor reads the current pose of the arm, adapts the reference trajectory to
//! reach the goal, passes the milestones of the adapted trajectory one by one and finally
//! commands the goal itself:
//!
//! ```text
//! Planning -> ExecutingMilestones -> ExecutingGoal -> Succeeded
//!                                                   | SucceededWithFallback
//!                                                   | FailedWithFallback
//!                                                   | Failed
//!                        (any boundary, on stop) -> Cancelled
//! ```
//!
//! Failures are absorbed locally where possible: a milestone is passed if the arm accepts
//! any candidate waypoint in the sampling window around it, and a failed goal command
//! is retried once through the safe fallback configuration if fallback is enabled.
//! The first milestone that cannot be passed ends the execution; the goal is then never
//! commanded.
//!
//! ```
//! use rs_arm_replay::config::ExecutorConfig;
//! use rs_arm_replay::executor::{ExecutionState, MotionExecutor};
//! use rs_arm_replay::pose::{JointState, Pose6D};
//! use rs_arm_replay::sim_arm::SimulatedArm;
//!
//! let start = Pose6D::new(0.3, 0.0, 0.3, 3.14, 0.0, 0.0);
//! let arm = SimulatedArm::new(start, JointState::from([0.0; 7]), 0.8);
//! let mut executor = MotionExecutor::new(arm, &ExecutorConfig::default()).unwrap();
//!
//! // Without milestones only the goal is commanded and no reference is needed
//! let goal = Pose6D::new(0.4, 0.1, 0.2, 3.14, 0.0, 0.5);
//! let result = executor.execute_direct(&goal, false);
//! assert_eq!(result.state, ExecutionState::Succeeded);
//! ```

use crate::adapter::{OffsetBlend, TrajectoryAdapter};
use crate::arm::{ArmInterface, CommandError};
use crate::config::ExecutorConfig;
use crate::parameter_error::ParameterError;
use crate::pose::{JointState, Pose6D};
use crate::sampler::WaypointSampler;
use crate::telemetry::{ExecutionEvent, ExecutionObserver, TracingObserver};
use crate::trajectory::{ReferenceTrajectoryError, Trajectory};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Idle,
    Planning,
    ExecutingMilestones,
    ExecutingGoal,
    /// All milestones and the goal reached on the first attempt.
    Succeeded,
    /// Goal reached after going through the fallback configuration.
    SucceededWithFallback,
    /// Goal not reached even after the fallback.
    FailedWithFallback,
    Failed,
    Cancelled,
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionState::Succeeded
                | ExecutionState::SucceededWithFallback
                | ExecutionState::FailedWithFallback
                | ExecutionState::Failed
                | ExecutionState::Cancelled
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionState::Succeeded | ExecutionState::SucceededWithFallback)
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionState::Idle => "idle",
            ExecutionState::Planning => "planning",
            ExecutionState::ExecutingMilestones => "executing milestones",
            ExecutionState::ExecutingGoal => "executing goal",
            ExecutionState::Succeeded => "succeeded",
            ExecutionState::SucceededWithFallback => "succeeded with fallback",
            ExecutionState::FailedWithFallback => "failed with fallback",
            ExecutionState::Failed => "failed",
            ExecutionState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Stage at which the execution failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    None,
    Waypoint,
    Goal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionResult {
    pub success: bool,
    pub failure_stage: FailureStage,

    /// Terminal state, tells a clean success from the one recovered by fallback.
    pub state: ExecutionState,

    /// The fallback configuration has been commanded.
    pub fallback_used: bool,

    /// Number of milestones passed.
    pub milestones_reached: usize,

    /// The milestone that could not be passed, if the execution failed on one.
    pub failed_milestone: Option<usize>,
}

impl ExecutionResult {
    fn new(state: ExecutionState, failure_stage: FailureStage, milestones_reached: usize) -> Self {
        ExecutionResult {
            success: state.is_success(),
            failure_stage,
            state,
            fallback_used: matches!(
                state,
                ExecutionState::SucceededWithFallback | ExecutionState::FailedWithFallback
            ),
            milestones_reached,
            failed_milestone: None,
        }
    }

    /// The unsuccessful outcomes as errors, for callers that prefer `?`.
    pub fn into_result(self) -> Result<ExecutionResult, ExecutionError> {
        match self.state {
            ExecutionState::Cancelled => Err(ExecutionError::Cancelled),
            _ if self.success => Ok(self),
            _ => match (self.failure_stage, self.failed_milestone) {
                (FailureStage::Waypoint, Some(milestone)) =>
                    Err(ExecutionError::MilestoneUnreachable { milestone }),
                _ => Err(ExecutionError::GoalUnreachable { fallback_used: self.fallback_used }),
            },
        }
    }
}

/// Errors of the execution. The first three are returned by `execute` directly and
/// mean the motion has not started; the others are produced from an unsuccessful
/// [`ExecutionResult`] by [`ExecutionResult::into_result`].
#[derive(Debug)]
pub enum ExecutionError {
    ReferenceTrajectory(ReferenceTrajectoryError),
    InvalidMilestones(String),
    /// Querying the arm state failed.
    Hardware(CommandError),
    MilestoneUnreachable { milestone: usize },
    GoalUnreachable { fallback_used: bool },
    Cancelled,
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExecutionError::ReferenceTrajectory(err) => write!(f, "{}", err),
            ExecutionError::InvalidMilestones(msg) => write!(f, "Invalid milestones: {}", msg),
            ExecutionError::Hardware(err) => write!(f, "Hardware error: {}", err),
            ExecutionError::MilestoneUnreachable { milestone } =>
                write!(f, "Milestone {} unreachable", milestone),
            ExecutionError::GoalUnreachable { fallback_used: true } =>
                write!(f, "Goal unreachable, also after fallback"),
            ExecutionError::GoalUnreachable { fallback_used: false } =>
                write!(f, "Goal unreachable"),
            ExecutionError::Cancelled => write!(f, "Execution cancelled"),
        }
    }
}

impl std::error::Error for ExecutionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExecutionError::ReferenceTrajectory(err) => Some(err),
            ExecutionError::Hardware(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ReferenceTrajectoryError> for ExecutionError {
    fn from(err: ReferenceTrajectoryError) -> Self {
        ExecutionError::ReferenceTrajectory(err)
    }
}

/// Requests the executor to stop. Can be cloned and used from another thread. The request
/// is observed at the next milestone, goal or fallback boundary and stays in effect until
/// [`MotionExecutor::clear_stop`].
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drives one arm for the duration of a control session. The executor owns the arm
/// handle; only one command is in flight at any time.
pub struct MotionExecutor<A: ArmInterface> {
    arm: A,
    adapter: Box<dyn TrajectoryAdapter>,
    observer: Box<dyn ExecutionObserver>,
    sampler: WaypointSampler,
    config: ExecutorConfig,
    stop: StopHandle,
    state: ExecutionState,

    /// If set, every adapted trajectory is written here for inspection.
    trajectory_dump: Option<PathBuf>,
}

impl<A: ArmInterface> MotionExecutor<A> {
    pub fn new(arm: A, config: &ExecutorConfig) -> Result<Self, ParameterError> {
        config.validate()?;
        Ok(MotionExecutor {
            arm,
            adapter: Box::new(OffsetBlend),
            observer: Box::new(TracingObserver),
            sampler: config.sampler()?,
            config: config.clone(),
            stop: StopHandle::default(),
            state: ExecutionState::Idle,
            trajectory_dump: None,
        })
    }

    /// Replaces the trajectory warping strategy.
    pub fn with_adapter(mut self, adapter: Box<dyn TrajectoryAdapter>) -> Self {
        self.adapter = adapter;
        self
    }

    pub fn with_observer(mut self, observer: Box<dyn ExecutionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_trajectory_dump<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.trajectory_dump = Some(path.into());
        self
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn arm(&self) -> &A {
        &self.arm
    }

    pub fn arm_mut(&mut self) -> &mut A {
        &mut self.arm
    }

    /// Ends the session, returning the arm handle.
    pub fn into_arm(self) -> A {
        self.arm
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Same as `stop_handle().stop()`.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Withdraws the stop request so that the executor can be used again.
    pub fn clear_stop(&mut self) {
        self.stop.clear();
    }

    pub fn current_pose(&mut self) -> Result<Pose6D, CommandError> {
        self.arm.get_current_pose()
    }

    pub fn current_joints(&mut self) -> Result<JointState, CommandError> {
        self.arm.get_current_joint()
    }

    /// Joint move to the configured home state.
    pub fn go_home(&mut self) -> Result<(), CommandError> {
        let home = self.config.home_state.clone();
        info!("Moving home to {}", home);
        self.arm.move_to_joint(&home, self.config.arm_velocity_default)
    }

    /// `execute` with the milestones, reference and fallback policy of the configuration.
    pub fn execute_configured(&mut self, goal: &Pose6D) -> Result<ExecutionResult, ExecutionError> {
        let milestones = self.config.milestone_indices.clone();
        let reference = self.config.reference_trajectory_path.clone();
        let fallback_enabled = self.config.fallback_enabled;
        self.execute(goal, &milestones, &reference, fallback_enabled)
    }

    /// Adapts the reference to the current pose and `goal`, passes the `milestones`
    /// (indices into the adapted trajectory, strictly increasing) and commands the goal.
    ///
    /// Returns an error only if the motion could not start: the reference trajectory
    /// cannot be used, the milestones do not fit the adapted trajectory or the current
    /// pose cannot be read. Everything that happens once the arm moves is reported in
    /// the returned [`ExecutionResult`].
    pub fn execute(
        &mut self,
        goal: &Pose6D,
        milestones: &[usize],
        reference_path: &Path,
        fallback_enabled: bool,
    ) -> Result<ExecutionResult, ExecutionError> {
        self.transition(ExecutionState::Planning);
        if self.stop.is_stop_requested() {
            return Ok(self.cancel(FailureStage::None, 0));
        }

        let initial = self.arm.get_current_pose().map_err(|err| {
            self.transition(ExecutionState::Failed);
            ExecutionError::Hardware(err)
        })?;
        let trajectory = match self.adapter.adapt(reference_path, &initial, goal) {
            Ok(trajectory) => trajectory,
            Err(err) => {
                warn!("Planning failed: {}", err);
                self.transition(ExecutionState::Failed);
                return Err(err.into());
            }
        };
        self.emit(ExecutionEvent::TrajectoryAdapted { waypoints: trajectory.len() });
        self.dump_trajectory(&trajectory);

        if let Err(reason) = check_milestones(milestones, trajectory.len()) {
            self.transition(ExecutionState::Failed);
            return Err(ExecutionError::InvalidMilestones(reason));
        }

        self.transition(ExecutionState::ExecutingMilestones);
        for (reached, &milestone) in milestones.iter().enumerate() {
            if self.stop.is_stop_requested() {
                return Ok(self.cancel(FailureStage::Waypoint, reached));
            }
            if !self.pass_milestone(&trajectory, milestone) {
                self.emit(ExecutionEvent::MilestoneFailed { milestone });
                let mut result = ExecutionResult::new(ExecutionState::Failed, FailureStage::Waypoint, reached);
                result.failed_milestone = Some(milestone);
                return Ok(self.finish(result));
            }
        }

        self.transition(ExecutionState::ExecutingGoal);
        Ok(self.approach_goal(goal, fallback_enabled, milestones.len()))
    }

    /// Commands the goal without any trajectory replay, with the same fallback policy.
    pub fn execute_direct(&mut self, goal: &Pose6D, fallback_enabled: bool) -> ExecutionResult {
        self.transition(ExecutionState::ExecutingGoal);
        self.approach_goal(goal, fallback_enabled, 0)
    }

    /// Approaches the goal always through the safe fallback configuration: joint move
    /// there first, then a single goal command. No trajectory is replayed.
    pub fn execute_via_safe_configuration(&mut self, goal: &Pose6D) -> ExecutionResult {
        self.transition(ExecutionState::ExecutingGoal);
        if self.stop.is_stop_requested() {
            return self.cancel(FailureStage::Goal, 0);
        }
        let safe = self.config.fallback_joint_state.clone();
        if let Err(error) = self.arm.move_to_joint(&safe, self.config.arm_velocity_default) {
            self.emit(ExecutionEvent::FallbackConfigurationFailed { error });
            return self.finish(ExecutionResult::new(ExecutionState::Failed, FailureStage::Goal, 0));
        }
        if self.stop.is_stop_requested() {
            return self.cancel(FailureStage::Goal, 0);
        }
        let state = match self.command_goal(goal, 1) {
            Ok(()) => ExecutionState::Succeeded,
            Err(_) => ExecutionState::Failed,
        };
        let stage = if state.is_success() { FailureStage::None } else { FailureStage::Goal };
        self.finish(ExecutionResult::new(state, stage, 0))
    }

    /// Tries the candidates around the milestone in order, stopping at the first one the
    /// arm accepts.
    fn pass_milestone(&mut self, trajectory: &Trajectory, milestone: usize) -> bool {
        let sampler = self.sampler;
        for candidate in sampler.sample_near(trajectory, milestone) {
            self.emit(ExecutionEvent::MilestoneAttempted { milestone, index: candidate.index });
            match self.arm.move_to_pose(&candidate.pose, self.config.arm_velocity_default) {
                Ok(()) => {
                    self.emit(ExecutionEvent::MilestoneReached { milestone, index: candidate.index });
                    return true;
                }
                Err(error) => {
                    self.emit(ExecutionEvent::CandidateRejected {
                        milestone,
                        index: candidate.index,
                        error,
                    });
                }
            }
        }
        false
    }

    fn approach_goal(&mut self, goal: &Pose6D, fallback_enabled: bool, reached: usize) -> ExecutionResult {
        if self.stop.is_stop_requested() {
            return self.cancel(FailureStage::Goal, reached);
        }
        if self.command_goal(goal, 1).is_ok() {
            return self.finish(ExecutionResult::new(ExecutionState::Succeeded, FailureStage::None, reached));
        }
        if !fallback_enabled {
            return self.finish(ExecutionResult::new(ExecutionState::Failed, FailureStage::Goal, reached));
        }

        if self.stop.is_stop_requested() {
            return self.cancel(FailureStage::Goal, reached);
        }
        self.emit(ExecutionEvent::FallbackTriggered);
        let safe = self.config.fallback_joint_state.clone();
        if let Err(error) = self.arm.move_to_joint(&safe, self.config.arm_velocity_default) {
            self.emit(ExecutionEvent::FallbackConfigurationFailed { error });
            return self.finish(ExecutionResult::new(
                ExecutionState::FailedWithFallback,
                FailureStage::Goal,
                reached,
            ));
        }

        if self.stop.is_stop_requested() {
            let mut result = self.cancel(FailureStage::Goal, reached);
            result.fallback_used = true;
            return result;
        }
        match self.command_goal(goal, 2) {
            Ok(()) => self.finish(ExecutionResult::new(
                ExecutionState::SucceededWithFallback,
                FailureStage::None,
                reached,
            )),
            Err(_) => self.finish(ExecutionResult::new(
                ExecutionState::FailedWithFallback,
                FailureStage::Goal,
                reached,
            )),
        }
    }

    fn command_goal(&mut self, goal: &Pose6D, attempt: u32) -> Result<(), CommandError> {
        self.emit(ExecutionEvent::GoalAttempted { attempt });
        match self.arm.move_to_pose(goal, self.config.arm_velocity_default) {
            Ok(()) => {
                self.emit(ExecutionEvent::GoalReached { attempt });
                Ok(())
            }
            Err(error) => {
                self.emit(ExecutionEvent::GoalFailed { attempt, error: error.clone() });
                Err(error)
            }
        }
    }

    fn cancel(&mut self, failure_stage: FailureStage, reached: usize) -> ExecutionResult {
        self.emit(ExecutionEvent::StopObserved { state: self.state });
        if let Err(err) = self.arm.stop() {
            warn!("Stop command failed: {}", err);
        }
        self.finish(ExecutionResult::new(ExecutionState::Cancelled, failure_stage, reached))
    }

    fn finish(&mut self, result: ExecutionResult) -> ExecutionResult {
        self.transition(result.state);
        self.emit(ExecutionEvent::Finished { state: result.state });
        result
    }

    fn transition(&mut self, to: ExecutionState) {
        let from = self.state;
        self.state = to;
        self.emit(ExecutionEvent::StateChanged { from, to });
    }

    fn emit(&mut self, event: ExecutionEvent) {
        self.observer.on_event(&event);
    }

    fn dump_trajectory(&self, trajectory: &Trajectory) {
        if let Some(path) = &self.trajectory_dump {
            match trajectory.save_csv(path) {
                Ok(()) => info!("Adapted trajectory saved to {}", path.display()),
                Err(err) => warn!("Adapted trajectory not saved: {}", err),
            }
        }
    }
}

/// Milestones must be strictly increasing and inside the trajectory.
fn check_milestones(milestones: &[usize], trajectory_len: usize) -> Result<(), String> {
    if let Some(pair) = milestones.windows(2).find(|pair| pair[0] >= pair[1]) {
        return Err(format!("{} is followed by {}, must be strictly increasing", pair[0], pair[1]));
    }
    match milestones.last() {
        Some(&last) if last >= trajectory_len => Err(format!(
            "milestone {} is outside the adapted trajectory of {} waypoints",
            last, trajectory_len
        )),
        _ => Ok(()),
    }
}
