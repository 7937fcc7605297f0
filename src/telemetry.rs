//! Structured events emitted by the executor while it drives the arm. Observability is
//! decoupled from control flow: the executor only reports, observers decide what to do
//! with the reports.

use crate::arm::CommandError;
use crate::executor::ExecutionState;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEvent {
    StateChanged { from: ExecutionState, to: ExecutionState },

    /// The reference trajectory has been adapted to the current and goal pose.
    TrajectoryAdapted { waypoints: usize },

    /// Motion command issued to the candidate waypoint `index` of the `milestone`.
    MilestoneAttempted { milestone: usize, index: usize },

    /// The arm did not accept the candidate waypoint.
    CandidateRejected { milestone: usize, index: usize, error: CommandError },

    MilestoneReached { milestone: usize, index: usize },

    /// No candidate around the milestone was accepted.
    MilestoneFailed { milestone: usize },

    /// Motion command to the goal, attempt 1 is direct, attempt 2 follows the fallback.
    GoalAttempted { attempt: u32 },

    GoalFailed { attempt: u32, error: CommandError },

    GoalReached { attempt: u32 },

    /// Moving to the safe fallback configuration before retrying the goal.
    FallbackTriggered,

    FallbackConfigurationFailed { error: CommandError },

    /// Stop has been requested and observed at a boundary.
    StopObserved { state: ExecutionState },

    Finished { state: ExecutionState },
}

/// Receives the events of the executor, in order.
pub trait ExecutionObserver {
    fn on_event(&mut self, event: &ExecutionEvent);
}

/// Logs events through `tracing`. Default observer of the executor.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ExecutionObserver for TracingObserver {
    fn on_event(&mut self, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::StateChanged { from, to } =>
                debug!("Executor state {} -> {}", from, to),
            ExecutionEvent::TrajectoryAdapted { waypoints } =>
                info!("Adapted trajectory has {} waypoints", waypoints),
            ExecutionEvent::MilestoneAttempted { milestone, index } =>
                debug!("Milestone {}: trying waypoint {}", milestone, index),
            ExecutionEvent::CandidateRejected { milestone, index, error } =>
                debug!("Milestone {}: waypoint {} failed: {}", milestone, index, error),
            ExecutionEvent::MilestoneReached { milestone, index } =>
                info!("Milestone {} reached at waypoint {}", milestone, index),
            ExecutionEvent::MilestoneFailed { milestone } =>
                warn!("Milestone {} unreachable, no waypoint in the window accepted", milestone),
            ExecutionEvent::GoalAttempted { attempt } =>
                debug!("Goal attempt {}", attempt),
            ExecutionEvent::GoalFailed { attempt, error } =>
                warn!("Goal attempt {} failed: {}", attempt, error),
            ExecutionEvent::GoalReached { attempt } =>
                info!("Goal reached on attempt {}", attempt),
            ExecutionEvent::FallbackTriggered =>
                warn!("Fallback triggered, moving to the safe configuration"),
            ExecutionEvent::FallbackConfigurationFailed { error } =>
                warn!("Safe configuration not reached: {}", error),
            ExecutionEvent::StopObserved { state } =>
                warn!("Stop requested, cancelling in state {}", state),
            ExecutionEvent::Finished { state } =>
                info!("Execution finished: {}", state),
        }
    }
}

/// Keeps all events; clones share the same record, so a clone can be handed to the
/// executor and the original inspected later.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<ExecutionEvent>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events recorded so far.
    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }
}

impl ExecutionObserver for RecordingObserver {
    fn on_event(&mut self, event: &ExecutionEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
