//! Contact manifolds and per-point impulse resolution.
//!
//! This crate holds the contact data that narrow-phase collision detection
//! hands to the constraint solver, and the functions that resolve one
//! contact point at a time:
//!
//! - [`ContactManifold`] / [`ManifoldPoint`] - Up to four persistent points
//!   per body pair, carrying accumulated impulses across frames
//! - [`ConstraintPersistentData`] - Per-point solver cache (effective masses,
//!   tangents, angular components)
//! - [`JacobianEntry`] - Effective mass of a single constraint axis
//! - [`resolve_single_collision`], [`resolve_single_friction`],
//!   [`resolve_single_collision_combined`], [`resolve_single_bilateral`]
//! - [`ContactDispatch`] - Function tables selected by [`ContactSolverType`]
//!
//! # Impulse Model
//!
//! Contacts are velocity constraints. For a point with normal `n`, the
//! normal impulse is
//!
//! ```text
//! λ = (erp/dt · (-penetration) + restitution - n·(v_A - v_B)) / (J M⁻¹ Jᵀ)
//! ```
//!
//! and the accumulated value is clamped to `λ ≥ 0`, so contacts push but
//! never pull. Friction along each tangent is clamped to `±μλ`.
//!
//! # Example
//!
//! ```
//! use sim_contact::{ContactManifold, ManifoldPoint, combine_friction};
//! use sim_types::BodyId;
//! use nalgebra::{Point3, Vector3};
//!
//! let mut manifold = ContactManifold::new(BodyId::new(0), BodyId::FIXED);
//! let point = ManifoldPoint::new(
//!     Point3::new(0.0, 0.0, -0.01),
//!     Point3::new(0.0, 0.0, 0.0),
//!     Vector3::z(),
//!     -0.01,
//! )
//! .with_material(combine_friction(0.8, 0.6), 0.0);
//!
//! assert_eq!(manifold.add_point(point), Some(0));
//! assert!(manifold.points()[0].is_touching());
//! ```
//!
//! # Layer 0 Crate
//!
//! This is a Layer 0 crate with **no engine or renderer dependencies**. It can be used in:
//!
//! - Headless simulation loops
//! - Custom solvers that only need the per-point functions
//! - Other physics engines

#![doc(html_root_url = "https://docs.rs/sim-contact/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(missing_docs)]
#![allow(clippy::missing_const_for_fn)]

mod dispatch;
mod jacobian;
mod manifold;
mod persistent;
mod resolve;

pub use dispatch::{ContactDispatch, ContactSolverFn};
pub use jacobian::{JacobianEntry, calculate_angular_diagonal_inv, calculate_diagonal_inv};
pub use manifold::{
    ContactManifold, MANIFOLD_CACHE_SIZE, ManifoldPoint, combine_friction, combine_restitution,
};
pub use persistent::ConstraintPersistentData;
pub use resolve::{
    resolve_single_bilateral, resolve_single_collision, resolve_single_collision_combined,
    resolve_single_friction,
};

// Re-export types needed for contact resolution
pub use sim_types::{BodyId, ContactSolverInfo, ContactSolverType, RigidBody, Vector3};

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use nalgebra::Point3;
    use sim_types::{MassProperties, Pose};

    #[test]
    fn test_dispatch_resolves_prepared_point() {
        let mut ball = RigidBody::new(
            MassProperties::sphere(2.0, 0.5),
            Pose::from_position(Point3::new(0.0, 0.0, 0.5)),
        )
        .with_velocity(Vector3::new(0.0, 0.0, -1.0), Vector3::zeros());
        let mut ground = RigidBody::fixed();

        let mut point = ManifoldPoint::new(Point3::origin(), Point3::origin(), Vector3::z(), 0.0);
        let mut cpd = ConstraintPersistentData::new();
        cpd.jac_diag_ab_inv = 2.0;
        point.user_persistent_data = Some(cpd);

        let dispatch = ContactDispatch::default();
        let func = dispatch.contact_func(ball.contact_solver_type, ground.contact_solver_type);
        let impulse = func(&mut ball, &mut ground, &mut point, &ContactSolverInfo::default());

        assert!((impulse - 2.0).abs() < 1e-12);
        assert!(ball.linear_velocity.z.abs() < 1e-12);
    }
}
