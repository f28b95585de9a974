//! Sequential impulse constraint solver for contacts and joints.
//!
//! This crate resolves one island of rigid bodies per call: contact
//! manifolds from collision detection plus the joints connecting the bodies.
//!
//! # Joint Types
//!
//! - [`Point2PointConstraint`]: Ball joint, optionally a rod of fixed length
//! - [`Point2PointConstraintArray`]: Many ball joints stored as one constraint
//! - [`HingeConstraint`]: Revolute joint with limit and motor
//! - [`ConeTwistConstraint`]: Elliptic swing cone plus a twist limit
//! - [`Generic6DofConstraint`]: Every axis free, locked or limited, with motors
//! - [`Generic6DofSpringConstraint`]: The same with per-axis springs
//! - [`SliderConstraint`]: Prismatic joint that can also turn about its axis
//!
//! Every joint implements [`TypedConstraint`]: `build_jacobian` once per
//! solve, `solve_constraint` once per iteration, and a breaking threshold.
//!
//! # Contacts
//!
//! On the default (cache-friendly) path every touching point becomes one
//! normal [`SolverConstraint`] row and two friction rows between pooled
//! [`SolverBody`] snapshots. Without [`SolverMode::CACHE_FRIENDLY`] each point
//! is resolved by the function pair that the bodies'
//! [`ContactSolverType`](sim_types::ContactSolverType)s select.
//!
//! # Example
//!
//! ```
//! use sim_constraint::{Point2PointConstraint, SequentialImpulseConstraintSolver, TypedConstraint};
//! use sim_types::{ContactSolverInfo, MassProperties, Pose, RigidBody, RigidBodySet};
//! use nalgebra::{Point3, Vector3};
//!
//! let mut bodies = RigidBodySet::new();
//! let a = bodies.insert(RigidBody::new(
//!     MassProperties::sphere(1.0, 0.5),
//!     Pose::from_position(Point3::new(-1.0, 0.0, 0.0)),
//! ));
//! let b = bodies.insert(RigidBody::new(
//!     MassProperties::sphere(1.0, 0.5),
//!     Pose::from_position(Point3::new(1.0, 0.0, 0.0)),
//! ));
//!
//! // rod of length 2 between the centers
//! let rod = Point2PointConstraint::new(a, b, Point3::origin(), Point3::origin())
//!     .with_rest_length(2.0);
//! let mut joints: Vec<Box<dyn TypedConstraint>> = vec![Box::new(rod)];
//!
//! bodies.get_mut(b).unwrap().linear_velocity = Vector3::new(1.0, 0.0, 0.0);
//!
//! let mut solver = SequentialImpulseConstraintSolver::new();
//! let stats = solver
//!     .solve_group(&mut bodies, &[a, b], &mut [], &mut joints, &ContactSolverInfo::default())
//!     .unwrap();
//!
//! assert_eq!(stats.joints, 1);
//! let va = bodies.get(a).unwrap().linear_velocity;
//! let vb = bodies.get(b).unwrap().linear_velocity;
//! assert!((vb.x - va.x).abs() < 1e-6);
//! ```
//!
//! # Layer 0 Crate
//!
//! This is a Layer 0 crate with **no engine or renderer dependencies**. It can be used in:
//!
//! - Headless simulation loops
//! - Custom physics worlds that bring their own collision detection
//! - Benchmarks and regression tests

#![doc(html_root_url = "https://docs.rs/sim-constraint/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,
    clippy::suboptimal_flops,
    clippy::cast_precision_loss,
    clippy::similar_names
)]

mod constraint;
mod limit_motor;
mod solver;
mod solver_body;
mod solver_constraint;

pub use constraint::{
    ConeTwistConstraint, ConstraintBase, ConstraintSetting, ConstraintType, Frame,
    Generic6DofConstraint, Generic6DofSpringConstraint, HingeConstraint, Point2PointConstraint,
    Point2PointConstraintArray, SliderConstraint, SliderParams, TypedConstraint,
};
pub use limit_motor::{LimitState, RotationalLimitMotor, TranslationalLimitMotor};
pub use solver::{SequentialImpulseConstraintSolver, SolverStats, rand_int2, shuffle};
pub use solver_body::{SolverBody, SolverBodyId};
pub use solver_constraint::{
    ContactPointRef, SolverConstraint, SolverConstraintId, SolverConstraintType,
};

// Re-export types needed to drive a solve
pub use sim_types::{BodyId, ContactSolverInfo, Pose, SolverMode, Vector3};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use nalgebra::Point3;
    use sim_types::{MassProperties, RigidBody, RigidBodySet};

    #[test]
    fn test_broken_joint_skipped() {
        let mut bodies = RigidBodySet::new();
        let ball = bodies.insert(
            RigidBody::new(MassProperties::sphere(1.0, 0.5), Pose::identity())
                .with_velocity(Vector3::new(0.0, -3.0, 0.0), Vector3::zeros()),
        );
        let mut anchor =
            Point2PointConstraint::with_fixed(ball, bodies.get(ball).unwrap(), Point3::origin());
        anchor.set_broken(true);
        let mut joints: Vec<Box<dyn TypedConstraint>> = vec![Box::new(anchor)];

        let stats = SequentialImpulseConstraintSolver::new()
            .solve_group(&mut bodies, &[ball], &mut [], &mut joints, &ContactSolverInfo::default())
            .unwrap();

        assert_eq!(stats.broken_joints, 1);
        assert_eq!(bodies.get(ball).unwrap().linear_velocity.y, -3.0);
    }

    #[test]
    fn test_joint_types() {
        let hinge = HingeConstraint::new(
            BodyId::new(0),
            BodyId::new(1),
            Point3::origin(),
            Point3::origin(),
            &Vector3::z(),
            &Vector3::z(),
        );
        assert_eq!(hinge.constraint_type(), ConstraintType::Hinge);

        let slider =
            SliderConstraint::new(BodyId::new(0), BodyId::FIXED, &Pose::identity(), &Pose::identity(), true);
        assert_eq!(slider.constraint_type(), ConstraintType::Slider);
        assert_eq!(slider.body_b(), BodyId::FIXED);
    }
}
