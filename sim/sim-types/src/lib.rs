//! Core types for impulse-based rigid body simulation.
//!
//! This crate provides the data the constraint solver reads and writes:
//!
//! - [`RigidBody`] - Pose, velocities, inverse mass and inertia of a body
//! - [`RigidBodySet`] - Indexed body storage with a shared fixed body
//! - [`ContactSolverInfo`] - Timestep, iteration count, Baumgarte and
//!   split-impulse settings, [`SolverMode`] flags
//! - [`SimError`] - Errors reported before a solve starts
//!
//! # Design Philosophy
//!
//! Bodies own their state; solvers borrow it. A body exposes the impulse
//! primitives (`apply_impulse`, `internal_apply_impulse`, ...) that both the
//! contact functions and the joint constraints are written against, so the
//! two layers agree on sign and scaling conventions.
//!
//! # Layer 0
//!
//! This is a Layer 0 crate with **no engine or renderer dependencies**. It can be used in:
//!
//! - Headless simulation loops
//! - Tests and benchmarks
//! - Other engines
//!
//! # Example
//!
//! ```
//! use sim_types::{BodyId, MassProperties, Pose, RigidBody, RigidBodySet};
//! use nalgebra::Point3;
//!
//! let mut bodies = RigidBodySet::new();
//! let ball = bodies.insert(RigidBody::new(
//!     MassProperties::sphere(1.0, 0.5),
//!     Pose::from_position(Point3::new(0.0, 0.0, 1.0)),
//! ));
//!
//! assert_eq!(ball, BodyId::new(0));
//! assert!(bodies.get(BodyId::FIXED).is_some_and(RigidBody::is_static));
//! ```

#![doc(html_root_url = "https://docs.rs/sim-types/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
// Allow certain clippy lints that are overly pedantic for type definitions
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
    clippy::cast_precision_loss,       // usize to f64 is fine for counts
    clippy::missing_errors_doc,        // Error docs added where non-obvious
)]

mod body;
mod config;
mod error;
pub mod math;
mod rigid_body;
mod set;

pub use body::{BodyId, MassProperties, Pose};
pub use config::{ContactSolverInfo, SolverMode};
pub use error::SimError;
pub use rigid_body::{ContactSolverType, RigidBody};
pub use set::RigidBodySet;

// Re-export math types for convenience
pub use nalgebra::{Matrix3, Point3, UnitQuaternion, Vector3};

/// Result type for simulation operations.
pub type Result<T> = std::result::Result<T, SimError>;
