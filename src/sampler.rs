//! Sampling of candidate waypoints around a milestone of the adapted trajectory.
//!
//! The pose exactly at the milestone index may be unreachable or singular for the arm,
//! while a pose a few waypoints earlier or later is fine. The sampler offers the
//! neighbourhood of the milestone so the executor can try these one by one.

use crate::pose::Pose6D;
use crate::trajectory::Trajectory;

pub const DEFAULT_WINDOW: usize = 5;
pub const DEFAULT_STRIDE: usize = 3;

/// Defines the neighbourhood around the milestone. Candidates start `window` waypoints
/// before the milestone and advance by `stride` while the whole stride still fits before
/// `milestone + window`. For milestone 20 with window 5 and stride 3 this gives 15, 18, 21.
/// The candidates always reach the milestone: stepping continues until one candidate is
/// at or past it, so window 2 with stride 3 gives 18, 21. If the window is narrower
/// than one stride, only the milestone itself is offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaypointSampler {
    window: usize,
    stride: usize,
}

/// Candidate waypoint with its index in the trajectory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Waypoint {
    pub index: usize,
    pub pose: Pose6D,
}

impl Default for WaypointSampler {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            stride: DEFAULT_STRIDE,
        }
    }
}

impl WaypointSampler {
    /// Returns None if stride is zero.
    pub fn new(window: usize, stride: usize) -> Option<Self> {
        if stride == 0 {
            return None;
        }
        Some(WaypointSampler { window, stride })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Lazily yields the candidate waypoints around `target_index`, ascending. Indices
    /// outside the trajectory are clamped into it and repeated indices are skipped, so
    /// every produced index is valid and strictly larger than the previous one.
    pub fn sample_near<'a>(&self, trajectory: &'a Trajectory, target_index: usize) -> SampleNear<'a> {
        let target = target_index as i64;
        let first = if 2 * self.window < self.stride {
            target
        } else {
            target - self.window as i64
        };
        SampleNear {
            trajectory,
            next: first,
            stride: self.stride as i64,
            window_end: target + self.window as i64,
            target,
            reached_target: false,
            last_emitted: None,
        }
    }
}

/// Iterator over the candidates of one milestone, see [`WaypointSampler::sample_near`].
#[derive(Debug, Clone)]
pub struct SampleNear<'a> {
    trajectory: &'a Trajectory,
    next: i64,
    stride: i64,
    window_end: i64,
    target: i64,
    reached_target: bool,
    last_emitted: Option<usize>,
}

impl Iterator for SampleNear<'_> {
    type Item = Waypoint;

    fn next(&mut self) -> Option<Self::Item> {
        if self.trajectory.is_empty() {
            return None;
        }
        let last_index = (self.trajectory.len() - 1) as i64;
        loop {
            let raw = self.next;
            if raw + self.stride > self.window_end && self.reached_target {
                return None;
            }
            self.next += self.stride;
            self.reached_target |= raw >= self.target;

            let index = raw.clamp(0, last_index) as usize;
            if self.last_emitted.is_some_and(|previous| index <= previous) {
                continue;
            }
            self.last_emitted = Some(index);
            return Some(Waypoint {
                index,
                pose: self.trajectory.poses()[index],
            });
        }
    }
}
