//! Integration tests for the sim solver crates.
//!
//! These tests drive [`sim_constraint::SequentialImpulseConstraintSolver`]
//! through whole simulation loops:
//! - Ball joint convergence and a locked hinge under torque
//! - Contact impulse clamping and the friction bound
//! - Warm-started resting contact as a fixed point
//! - Joint breaking
//! - Split impulse penetration recovery
//! - Per-point path against the cache-friendly path
//! - Reproducible row order

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::cast_precision_loss
)]

pub mod breaking;
pub mod contacts;
pub mod determinism;
pub mod joints;
pub mod per_point_path;
pub mod solver_test_utils;
pub mod split_impulse;
pub mod warm_start;
