//! Replays a demonstrated reference trajectory of a robotic arm towards a goal detected
//! by a camera, with local retry around milestones and a fallback through a known safe
//! configuration.
//!
//! # Features
//!
//! - The goal pose, detected in the camera (sensor) frame, is converted into the base frame
//!   of the arm with a hand-eye calibration matrix stored as CSV. The calibration is
//!   validated to be a rigid transform and re-read on every conversion.
//! - The reference trajectory is warped so that it starts at the current pose of the arm
//!   and ends exactly at the goal. Warping strategies are pluggable.
//! - Milestones of the adapted trajectory are passed with a window of candidate waypoints
//!   around each of them. If the arm refuses one candidate, the next one is tried.
//! - If the goal cannot be reached directly, the arm can go through a safe joint
//!   configuration and try once more.
//! - Execution can be stopped from another thread, and every decision is reported
//!   as a structured event.
//! - Configuration can be read from YAML (feature `allow_filesystem`).
//!
//! # Conventions
//!
//! Poses are `[x, y, z, roll, pitch, yaw]`, positions in the units of the calibration
//! (typically meters), angles in radians, with the rotation `R = Rz(yaw)·Ry(pitch)·Rx(roll)`.
//!
//! The hardware is reached through the [`arm::ArmInterface`] trait. A simulated arm is
//! provided for dry runs and testing.

pub mod pose;

pub mod frame_transform;

pub mod trajectory;
pub mod adapter;
pub mod sampler;

pub mod arm;
pub mod sim_arm;

pub mod executor;
pub mod telemetry;

pub mod config;
pub mod parameter_error;

#[cfg(feature = "allow_filesystem")]
pub mod config_from_file;

#[cfg(test)]
#[cfg(feature = "allow_filesystem")]
mod tests;
