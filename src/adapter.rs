//! Adapting the demonstrated reference trajectory to new start and goal poses.
//!
//! The way the reference is warped is a strategy behind the [`TrajectoryAdapter`] trait, so
//! the executor does not depend on it. Two strategies are provided:
//!
//! - [`OffsetBlend`] shifts every reference waypoint by a blend of the start and goal
//!   offsets. The shape of the demonstration is kept exactly, only gradually displaced.
//! - [`AxisScaling`] stretches the positions per axis so that the demonstrated start-to-end
//!   displacement becomes the initial-to-goal displacement, as movement primitives do.
//!
//! Both are deterministic and both return a trajectory of the same length as the reference
//! that starts exactly at the initial pose and ends exactly at the goal pose.

use crate::pose::{wrap_angle, Pose6D};
use crate::trajectory::{ReferenceTrajectoryError, Trajectory};
use std::path::Path;
use tracing::debug;

/// Reference displacement along an axis below which the axis is treated as not moving.
const STILL_AXIS: f64 = 1e-9;

/// Produces the adapted trajectory from the reference file and the new boundary poses.
pub trait TrajectoryAdapter {
    /// Loads the reference (at least 2 waypoints) and warps it so that it starts at
    /// `initial` and ends at `goal`. Same inputs always give the same output.
    fn adapt(&self, reference_path: &Path, initial: &Pose6D, goal: &Pose6D)
             -> Result<Trajectory, ReferenceTrajectoryError> {
        let reference = Trajectory::load_reference(reference_path)?;
        debug!(
            "Adapting {} waypoints from {} to start {} and goal {}",
            reference.len(),
            reference_path.display(),
            initial,
            goal
        );
        self.warp(&reference, initial, goal)
    }

    /// Warps the already loaded reference. Fails with `TooShort` if it has fewer than
    /// 2 waypoints.
    fn warp(&self, reference: &Trajectory, initial: &Pose6D, goal: &Pose6D)
            -> Result<Trajectory, ReferenceTrajectoryError>;
}

/// Shifts each reference waypoint by `(1 - s) * start_offset + s * goal_offset`, where `s`
/// runs from 0 at the first waypoint to 1 at the last.
#[derive(Debug, Clone, Copy, Default)]
pub struct OffsetBlend;

impl TrajectoryAdapter for OffsetBlend {
    fn warp(&self, reference: &Trajectory, initial: &Pose6D, goal: &Pose6D)
            -> Result<Trajectory, ReferenceTrajectoryError> {
        let (first, last) = boundaries(reference)?;
        let start_offset = offsets(&first, initial);
        let goal_offset = offsets(&last, goal);

        let poses = blend(reference, |s, pose| {
            let mut values = pose.to_array();
            for axis in 0..6 {
                values[axis] += (1.0 - s) * start_offset[axis] + s * goal_offset[axis];
            }
            Pose6D::from_array(values)
        });
        Ok(pin_boundaries(poses, initial, goal))
    }
}

/// Scales positions per axis by `(goal - initial) / (last - first)` of the reference,
/// anchored at the initial pose. Axes where the reference does not move, and all
/// orientation angles, are offset-blended instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct AxisScaling;

impl TrajectoryAdapter for AxisScaling {
    fn warp(&self, reference: &Trajectory, initial: &Pose6D, goal: &Pose6D)
            -> Result<Trajectory, ReferenceTrajectoryError> {
        let (first, last) = boundaries(reference)?;
        let start_offset = offsets(&first, initial);
        let goal_offset = offsets(&last, goal);
        let reference_span = [last.x - first.x, last.y - first.y, last.z - first.z];
        let target_span = [goal.x - initial.x, goal.y - initial.y, goal.z - initial.z];
        let anchor = [initial.x, initial.y, initial.z];
        let origin = [first.x, first.y, first.z];

        let poses = blend(reference, |s, pose| {
            let mut values = pose.to_array();
            for axis in 0..6 {
                values[axis] = if axis < 3 && reference_span[axis].abs() > STILL_AXIS {
                    let scale = target_span[axis] / reference_span[axis];
                    anchor[axis] + (values[axis] - origin[axis]) * scale
                } else {
                    values[axis] + (1.0 - s) * start_offset[axis] + s * goal_offset[axis]
                };
            }
            Pose6D::from_array(values)
        });
        Ok(pin_boundaries(poses, initial, goal))
    }
}

fn boundaries(reference: &Trajectory) -> Result<(Pose6D, Pose6D), ReferenceTrajectoryError> {
    reference.check_reference()?;
    let poses = reference.poses();
    Ok((poses[0], poses[poses.len() - 1]))
}

/// Offsets from `from` to `to`, angles taken the short way round.
fn offsets(from: &Pose6D, to: &Pose6D) -> [f64; 6] {
    [
        to.x - from.x,
        to.y - from.y,
        to.z - from.z,
        wrap_angle(to.roll - from.roll),
        wrap_angle(to.pitch - from.pitch),
        wrap_angle(to.yaw - from.yaw),
    ]
}

/// Applies the warp to each waypoint with its normalized progress `s` in [0, 1].
fn blend<F>(reference: &Trajectory, warp: F) -> Vec<Pose6D>
where
    F: Fn(f64, &Pose6D) -> Pose6D,
{
    let last_index = (reference.len() - 1).max(1) as f64;
    reference
        .iter()
        .enumerate()
        .map(|(i, pose)| warp(i as f64 / last_index, pose))
        .collect()
}

/// The boundary waypoints are set to the requested poses exactly, so floating point
/// error and angle wrapping never leave the arm short of the goal.
fn pin_boundaries(mut poses: Vec<Pose6D>, initial: &Pose6D, goal: &Pose6D) -> Trajectory {
    if let Some(first) = poses.first_mut() {
        *first = *initial;
    }
    if let Some(last) = poses.last_mut() {
        *last = *goal;
    }
    Trajectory::new(poses)
}
