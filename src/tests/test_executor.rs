#[cfg(test)]
mod tests {
    use crate::adapter::{OffsetBlend, TrajectoryAdapter};
    use crate::arm::CommandError;
    use crate::config::ExecutorConfig;
    use crate::executor::{ExecutionError, ExecutionState, FailureStage, MotionExecutor};
    use crate::frame_transform::FrameTransform;
    use crate::pose::{JointState, Pose6D};
    use crate::sim_arm::SimulatedArm;
    use crate::telemetry::{ExecutionEvent, RecordingObserver};
    use crate::tests::test_utils::{data, rejected, ScriptedArm};
    use crate::trajectory::Trajectory;
    use std::time::Duration;

    fn start() -> Pose6D {
        Pose6D::new(0.45, 0.0, 0.3, 3.1, 0.0, 0.0)
    }

    fn goal() -> Pose6D {
        Pose6D::new(0.3, 0.2, 0.25, 3.1, 0.1, 1.2)
    }

    fn safe_state() -> JointState {
        JointState::from([0.0, 20.0, 0.0, 70.0, 0.0, 90.0, 0.0])
    }

    fn config(milestones: Vec<usize>, fallback_enabled: bool) -> ExecutorConfig {
        ExecutorConfig {
            milestone_indices: milestones,
            fallback_enabled,
            fallback_joint_state: safe_state(),
            reference_trajectory_path: data("reference_door.csv"),
            ..ExecutorConfig::default()
        }
    }

    fn executor(arm: ScriptedArm, config: &ExecutorConfig) -> MotionExecutor<ScriptedArm> {
        MotionExecutor::new(arm, config).expect("Invalid configuration")
    }

    fn adapted() -> Trajectory {
        OffsetBlend
            .adapt(&data("reference_door.csv"), &start(), &goal())
            .expect("Failed to adapt")
    }

    #[test]
    fn test_clean_success() {
        let mut executor = executor(ScriptedArm::new(start()), &config(vec![10, 20, 30], true));
        let result = executor.execute_configured(&goal()).expect("Execution did not start");

        assert!(result.success);
        assert_eq!(result.state, ExecutionState::Succeeded);
        assert_eq!(result.failure_stage, FailureStage::None);
        assert!(!result.fallback_used);
        assert_eq!(result.milestones_reached, 3);
        assert_eq!(executor.state(), ExecutionState::Succeeded);

        // First candidate of each milestone accepted, then the goal
        let trajectory = adapted();
        let expected: Vec<Pose6D> = [5, 15, 25]
            .iter()
            .map(|&i| trajectory.poses()[i])
            .chain(std::iter::once(goal()))
            .collect();
        let arm = executor.into_arm();
        assert_eq!(arm.pose_commands(), expected);
        assert!(arm.joint_commands().is_empty());
        assert_eq!(arm.pose, goal());
    }

    #[test]
    fn test_milestone_passed_on_later_candidate() {
        let arm = ScriptedArm::new(start()).with_pose_script(vec![rejected(), rejected(), Ok(())]);
        let recorder = RecordingObserver::new();
        let mut executor = executor(arm, &config(vec![20], false))
            .with_observer(Box::new(recorder.clone()));
        let result = executor.execute_configured(&goal()).unwrap();

        assert_eq!(result.state, ExecutionState::Succeeded);
        let events = recorder.events();
        let attempted: Vec<usize> = events
            .iter()
            .filter_map(|event| match event {
                ExecutionEvent::MilestoneAttempted { milestone: 20, index } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(attempted, vec![15, 18, 21]);
        assert!(events.contains(&ExecutionEvent::MilestoneReached { milestone: 20, index: 21 }));
    }

    #[test]
    fn test_unreachable_milestone_ends_execution() {
        let arm = ScriptedArm::new(start()).with_pose_script(vec![rejected(), rejected(), rejected()]);
        let recorder = RecordingObserver::new();
        let mut executor = executor(arm, &config(vec![20, 30], true))
            .with_observer(Box::new(recorder.clone()));
        let result = executor.execute_configured(&goal()).unwrap();

        assert!(!result.success);
        assert_eq!(result.state, ExecutionState::Failed);
        assert_eq!(result.failure_stage, FailureStage::Waypoint);
        assert_eq!(result.failed_milestone, Some(20));
        assert_eq!(result.milestones_reached, 0);
        assert!(!result.fallback_used);

        // The goal stage is never entered
        assert!(!recorder.events().contains(&ExecutionEvent::StateChanged {
            from: ExecutionState::ExecutingMilestones,
            to: ExecutionState::ExecutingGoal,
        }));
        let arm = executor.into_arm();
        assert_eq!(arm.pose_commands().len(), 3);
        assert!(!arm.pose_commands().contains(&goal()));
        assert!(arm.joint_commands().is_empty());

        assert!(matches!(
            result.into_result(),
            Err(ExecutionError::MilestoneUnreachable { milestone: 20 })
        ));
    }

    #[test]
    fn test_goal_reached_through_fallback() {
        let arm = ScriptedArm::new(start()).with_pose_script(vec![Ok(()), rejected(), Ok(())]);
        let mut executor = executor(arm, &config(vec![20], true));
        let result = executor.execute_configured(&goal()).unwrap();

        assert!(result.success);
        assert_eq!(result.state, ExecutionState::SucceededWithFallback);
        assert_eq!(result.failure_stage, FailureStage::None);
        assert!(result.fallback_used);

        let arm = executor.into_arm();
        assert_eq!(arm.joint_commands(), vec![safe_state()]);
        let poses = arm.pose_commands();
        assert_eq!(poses.len(), 3);
        assert_eq!(poses[1], goal());
        assert_eq!(poses[2], goal());
    }

    #[test]
    fn test_goal_unreachable_after_fallback() {
        let arm = ScriptedArm::new(start()).with_pose_script(vec![Ok(()), rejected(), rejected()]);
        let mut executor = executor(arm, &config(vec![20], true));
        let result = executor.execute_configured(&goal()).unwrap();

        assert!(!result.success);
        assert_eq!(result.state, ExecutionState::FailedWithFallback);
        assert_eq!(result.failure_stage, FailureStage::Goal);
        assert!(result.fallback_used);

        // Exactly one fallback move and one retry
        let arm = executor.into_arm();
        assert_eq!(arm.joint_commands().len(), 1);
        assert_eq!(arm.pose_commands().len(), 3);
    }

    #[test]
    fn test_goal_failure_without_fallback() {
        let arm = ScriptedArm::new(start()).with_pose_script(vec![Ok(()), rejected()]);
        let mut executor = executor(arm, &config(vec![20], false));
        let result = executor.execute_configured(&goal()).unwrap();

        assert_eq!(result.state, ExecutionState::Failed);
        assert_eq!(result.failure_stage, FailureStage::Goal);
        assert!(!result.fallback_used);
        let arm = executor.into_arm();
        assert!(arm.joint_commands().is_empty());
        assert_eq!(arm.pose_commands().len(), 2);
    }

    #[test]
    fn test_timeout_counts_as_failure() {
        let timeout = Err(CommandError::Timeout(Duration::from_secs(30)));
        let arm = ScriptedArm::new(start()).with_pose_script(vec![Ok(()), timeout]);
        let mut executor = executor(arm, &config(vec![20], true));
        let result = executor.execute_configured(&goal()).unwrap();

        assert_eq!(result.state, ExecutionState::SucceededWithFallback);
        assert_eq!(executor.arm().joint_commands(), vec![safe_state()]);
    }

    #[test]
    fn test_failed_fallback_move() {
        let arm = ScriptedArm::new(start())
            .with_pose_script(vec![Ok(()), rejected()])
            .with_joint_script(vec![rejected()]);
        let mut executor = executor(arm, &config(vec![20], true));
        let result = executor.execute_configured(&goal()).unwrap();

        assert_eq!(result.state, ExecutionState::FailedWithFallback);
        assert_eq!(result.failure_stage, FailureStage::Goal);
        // No retry of the goal from an unknown configuration
        assert_eq!(executor.arm().pose_commands().len(), 2);
    }

    #[test]
    fn test_unusable_reference_is_fatal() {
        let mut config = config(vec![], true);
        config.reference_trajectory_path = data("reference_short.csv");
        let mut executor = executor(ScriptedArm::new(start()), &config);
        let result = executor.execute_configured(&goal());

        assert!(matches!(result, Err(ExecutionError::ReferenceTrajectory(_))));
        assert_eq!(executor.state(), ExecutionState::Failed);
        assert!(executor.arm().log.is_empty());
    }

    #[test]
    fn test_milestones_outside_trajectory() {
        let mut executor = executor(ScriptedArm::new(start()), &config(vec![], false));
        let reference = data("reference_door.csv");

        let result = executor.execute(&goal(), &[10, 40], &reference, false);
        assert!(matches!(result, Err(ExecutionError::InvalidMilestones(_))));
        let result = executor.execute(&goal(), &[20, 10], &reference, false);
        assert!(matches!(result, Err(ExecutionError::InvalidMilestones(_))));
        assert!(executor.arm().log.is_empty());
    }

    #[test]
    fn test_no_milestones() {
        let mut executor = executor(ScriptedArm::new(start()), &config(vec![], false));
        let result = executor.execute_configured(&goal()).unwrap();
        assert_eq!(result.state, ExecutionState::Succeeded);
        assert_eq!(executor.arm().pose_commands(), vec![goal()]);
    }

    #[test]
    fn test_stop_before_start() {
        let mut executor = executor(ScriptedArm::new(start()), &config(vec![10, 20], true));
        executor.stop_handle().stop();
        let result = executor.execute_configured(&goal()).unwrap();

        assert_eq!(result.state, ExecutionState::Cancelled);
        assert!(!result.success);
        assert!(executor.arm().pose_commands().is_empty());
        assert_eq!(executor.arm().stop_commands(), 1);

        // Stop stays in effect until cleared
        let result = executor.execute_configured(&goal()).unwrap();
        assert_eq!(result.state, ExecutionState::Cancelled);

        executor.clear_stop();
        let result = executor.execute_configured(&goal()).unwrap();
        assert_eq!(result.state, ExecutionState::Succeeded);
    }

    #[test]
    fn test_stop_between_milestones() {
        let recorder = RecordingObserver::new();
        let mut executor = executor(ScriptedArm::new(start()), &config(vec![10, 20], true))
            .with_observer(Box::new(recorder.clone()));
        let handle = executor.stop_handle();
        executor.arm_mut().stop_after = Some((1, handle));

        let result = executor.execute_configured(&goal()).unwrap();
        assert_eq!(result.state, ExecutionState::Cancelled);
        assert_eq!(result.milestones_reached, 1);
        assert_eq!(executor.arm().pose_commands().len(), 1);
        assert_eq!(executor.arm().stop_commands(), 1);
        assert!(recorder.events().contains(&ExecutionEvent::StopObserved {
            state: ExecutionState::ExecutingMilestones
        }));
    }

    #[test]
    fn test_events_of_clean_run() {
        let recorder = RecordingObserver::new();
        let mut executor = executor(ScriptedArm::new(start()), &config(vec![20], false))
            .with_observer(Box::new(recorder.clone()));
        executor.execute_configured(&goal()).unwrap();

        let events = recorder.events();
        assert_eq!(
            events.first(),
            Some(&ExecutionEvent::StateChanged {
                from: ExecutionState::Idle,
                to: ExecutionState::Planning
            })
        );
        assert_eq!(events.last(), Some(&ExecutionEvent::Finished { state: ExecutionState::Succeeded }));
        assert!(events.contains(&ExecutionEvent::TrajectoryAdapted { waypoints: 40 }));
        assert!(events.contains(&ExecutionEvent::GoalReached { attempt: 1 }));
        assert!(!events.contains(&ExecutionEvent::FallbackTriggered));
    }

    #[test]
    fn test_via_safe_configuration() {
        let mut executor = executor(ScriptedArm::new(start()), &config(vec![], true));
        let result = executor.execute_via_safe_configuration(&goal());

        assert_eq!(result.state, ExecutionState::Succeeded);
        let arm = executor.into_arm();
        assert_eq!(arm.joint_commands(), vec![safe_state()]);
        assert_eq!(arm.pose_commands(), vec![goal()]);
    }

    #[test]
    fn test_go_home() {
        let mut executor = executor(ScriptedArm::new(start()), &config(vec![], true));
        executor.go_home().expect("Home not reached");
        assert_eq!(executor.current_joints().unwrap(), JointState::from([0.0; 7]));
        assert_eq!(executor.arm().joint_commands(), vec![JointState::from([0.0; 7])]);
        assert_eq!(executor.current_pose().unwrap(), start());
    }

    #[test]
    fn test_dry_run_on_simulated_arm() {
        let config = ExecutorConfig::from_yaml_file(data("config.yaml")).expect("Configuration");
        let detected = Pose6D::new(-0.2, 0.1, 0.5, 0.0, 0.0, 0.5);
        let goal = FrameTransform::new(&config.calibration_path)
            .convert(&detected)
            .expect("Conversion failed");

        let mut arm = SimulatedArm::new(start(), config.home_state.clone(), 1.0);
        arm.timeout = config.command_timeout();
        let mut executor = MotionExecutor::new(arm, &config).unwrap();
        let result = executor.execute_configured(&goal).unwrap();

        assert_eq!(result.state, ExecutionState::Succeeded);
        assert_eq!(result.milestones_reached, 2);
        let reached = executor.current_pose().unwrap();
        assert!(reached.approx_eq(&goal, 1e-12, 1e-12));
    }

    #[test]
    fn test_dry_run_goal_out_of_reach() {
        let config = ExecutorConfig::from_yaml_file(data("config.yaml")).expect("Configuration");
        let goal = Pose6D::new(0.9, 0.5, 0.3, 3.1, 0.0, 0.0);

        let arm = SimulatedArm::new(start(), config.home_state.clone(), 0.8)
            .with_configuration(config.fallback_joint_state.clone(), start());
        let mut executor = MotionExecutor::new(arm, &config).unwrap();
        let result = executor.execute(&goal, &[], &config.reference_trajectory_path, true).unwrap();

        assert_eq!(result.state, ExecutionState::FailedWithFallback);
        assert_eq!(executor.current_pose().unwrap(), start());
    }
}
