//! Joint constraints solved alongside contacts.
//!
//! Every joint follows the same two-phase contract:
//!
//! 1. [`TypedConstraint::build_jacobian`] runs once per solve, reading the
//!    current body transforms to set up effective masses and limit states.
//! 2. [`TypedConstraint::solve_constraint`] runs once per iteration and
//!    applies velocity impulses directly to the rigid bodies.
//!
//! Body A always receives `+impulse` and body B `-impulse` along the same
//! axis. A joint whose corrective impulse exceeds its breaking threshold
//! marks itself broken and stops contributing; removing it is up to the
//! caller.

mod cone_twist;
mod generic6dof;
mod generic6dof_spring;
mod hinge;
mod point2point;
mod point2point_array;
mod slider;

pub use cone_twist::ConeTwistConstraint;
pub use generic6dof::Generic6DofConstraint;
pub use generic6dof_spring::Generic6DofSpringConstraint;
pub use hinge::HingeConstraint;
pub use point2point::{ConstraintSetting, Point2PointConstraint};
pub use point2point_array::Point2PointConstraintArray;
pub use slider::{SliderConstraint, SliderParams};

use nalgebra::{Matrix3, Point3, Vector3};
use sim_contact::calculate_diagonal_inv;
use sim_types::{
    BodyId, ContactSolverInfo, Pose, RigidBody, RigidBodySet,
    math::{EPSILON, plane_space},
};
use tracing::warn;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Trait for all joint constraints.
pub trait TypedConstraint: std::fmt::Debug {
    /// Get the joint kind.
    fn constraint_type(&self) -> ConstraintType;

    /// Shared state (bodies, accumulated impulse, breaking).
    fn base(&self) -> &ConstraintBase;

    /// Mutable shared state.
    fn base_mut(&mut self) -> &mut ConstraintBase;

    /// Prepare effective masses and limit states from the current transforms.
    fn build_jacobian(&mut self, bodies: &RigidBodySet, info: &ContactSolverInfo);

    /// Apply one iteration of velocity impulses.
    fn solve_constraint(&mut self, bodies: &mut RigidBodySet, time_step: f64);

    /// Call `visitor` with every body the joint touches.
    fn visit_bodies(&self, visitor: &mut dyn FnMut(BodyId)) {
        visitor(self.body_a());
        visitor(self.body_b());
    }

    /// Get the first body.
    fn body_a(&self) -> BodyId {
        self.base().body_a
    }

    /// Get the second body.
    fn body_b(&self) -> BodyId {
        self.base().body_b
    }

    /// Get the impulse accumulated during the last solve.
    fn applied_impulse(&self) -> f64 {
        self.base().applied_impulse
    }

    /// Get the breaking threshold.
    fn breaking_impulse_threshold(&self) -> f64 {
        self.base().breaking_impulse_threshold
    }

    /// Set the breaking threshold. `f64::INFINITY` never breaks.
    fn set_breaking_impulse_threshold(&mut self, threshold: f64) {
        self.base_mut().breaking_impulse_threshold = threshold;
    }

    /// Whether the joint has broken.
    fn is_broken(&self) -> bool {
        self.base().is_broken
    }

    /// Mark the joint broken or re-enable it.
    fn set_broken(&mut self, broken: bool) {
        self.base_mut().is_broken = broken;
    }
}

/// Kind of joint constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConstraintType {
    /// Ball joint (3 linear rows).
    Point2Point,
    /// Batched ball joints.
    Point2PointArray,
    /// Revolute joint (1 angular DOF).
    Hinge,
    /// Swing cone plus twist limit.
    ConeTwist,
    /// Six individually limited DOF.
    D6,
    /// Prismatic joint with rotation about the slide axis.
    Slider,
}

/// State shared by every joint.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConstraintBase {
    /// First body.
    pub body_a: BodyId,
    /// Second body ([`BodyId::FIXED`] for world-anchored joints).
    pub body_b: BodyId,
    /// Impulse accumulated during the last solve.
    pub applied_impulse: f64,
    /// Impulse magnitude above which the joint breaks.
    pub breaking_impulse_threshold: f64,
    /// Set once the threshold is exceeded.
    pub is_broken: bool,
}

impl Default for ConstraintBase {
    fn default() -> Self {
        Self::new(BodyId::FIXED, BodyId::FIXED)
    }
}

impl ConstraintBase {
    /// Unbreakable joint between two bodies.
    #[must_use]
    pub fn new(body_a: BodyId, body_b: BodyId) -> Self {
        Self {
            body_a,
            body_b,
            applied_impulse: 0.0,
            breaking_impulse_threshold: f64::INFINITY,
            is_broken: false,
        }
    }

    /// Returns `true` if the joint is (now) broken and `impulse` must not be
    /// applied. The threshold is kept as it was.
    pub fn check_breaking(&mut self, impulse: f64) -> bool {
        if self.is_broken {
            return true;
        }
        if impulse.abs() > self.breaking_impulse_threshold {
            self.is_broken = true;
            warn!(
                body_a = %self.body_a,
                body_b = %self.body_b,
                impulse,
                threshold = self.breaking_impulse_threshold,
                "joint broken"
            );
            return true;
        }
        false
    }
}

/// Rigid frame: an orthonormal (possibly reflected) basis and an origin.
///
/// Joint frames are stored relative to their body. Unlike [`Pose`] the basis
/// may be improper; the hinge flips one column of its second frame so both
/// frames agree on the hinge axis direction.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Frame {
    /// Columns are the frame axes.
    pub basis: Matrix3<f64>,
    /// Frame origin.
    pub origin: Point3<f64>,
}

impl Default for Frame {
    fn default() -> Self {
        Self::identity()
    }
}

impl Frame {
    /// Identity frame.
    #[must_use]
    pub fn identity() -> Self {
        Self {
            basis: Matrix3::identity(),
            origin: Point3::origin(),
        }
    }

    /// Frame from explicit axis columns.
    #[must_use]
    pub fn from_columns(
        x: &Vector3<f64>,
        y: &Vector3<f64>,
        z: &Vector3<f64>,
        origin: Point3<f64>,
    ) -> Self {
        Self {
            basis: Matrix3::from_columns(&[*x, *y, *z]),
            origin,
        }
    }

    /// Frame with the rotation and position of a pose.
    #[must_use]
    pub fn from_pose(pose: &Pose) -> Self {
        Self {
            basis: pose.basis(),
            origin: pose.position,
        }
    }

    /// Axis `i` of the frame.
    #[must_use]
    pub fn axis(&self, i: usize) -> Vector3<f64> {
        self.basis.column(i).into_owned()
    }

    /// Express this body-relative frame in world coordinates.
    #[must_use]
    pub fn to_world(&self, pose: &Pose) -> Self {
        Self {
            basis: pose.basis() * self.basis,
            origin: pose.transform_point(&self.origin),
        }
    }
}

/// Positional correction factor of the pivot rows.
const PIVOT_TAU: f64 = 0.3;

/// Three linear rows keeping two pivots together.
///
/// The first row points from pivot A to pivot B (x when they coincide), the
/// other two complete an orthonormal basis.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub(crate) struct PivotRows {
    axes: [Vector3<f64>; 3],
    jac_diag_ab_inv: [f64; 3],
}

impl PivotRows {
    pub(crate) fn build(
        rb_a: &RigidBody,
        rb_b: &RigidBody,
        pivot_in_a: &Point3<f64>,
        pivot_in_b: &Point3<f64>,
    ) -> Self {
        let pivot_a_in_w = rb_a.pose.transform_point(pivot_in_a);
        let pivot_b_in_w = rb_b.pose.transform_point(pivot_in_b);
        let rel_pos = pivot_b_in_w - pivot_a_in_w;

        let normal0 = if rel_pos.norm_squared() > EPSILON {
            rel_pos.normalize()
        } else {
            Vector3::x()
        };
        let (normal1, normal2) = plane_space(&normal0);
        let axes = [normal0, normal1, normal2];

        let rel_pos1 = pivot_a_in_w - rb_a.center_of_mass_position();
        let rel_pos2 = pivot_b_in_w - rb_b.center_of_mass_position();
        let basis_a = rb_a.pose.basis();
        let basis_b = rb_b.pose.basis();
        let jac_diag_ab_inv = axes.map(|normal| {
            calculate_diagonal_inv(
                &basis_a,
                &basis_b,
                &rel_pos1,
                &rel_pos2,
                &normal,
                rb_a.inv_inertia_local(),
                rb_a.inverse_mass(),
                rb_b.inv_inertia_local(),
                rb_b.inverse_mass(),
            )
        });

        Self {
            axes,
            jac_diag_ab_inv,
        }
    }

    /// Apply one iteration. Returns `false` if the joint broke.
    pub(crate) fn solve(
        &self,
        base: &mut ConstraintBase,
        rb_a: &mut RigidBody,
        rb_b: &mut RigidBody,
        pivot_in_a: &Point3<f64>,
        pivot_in_b: &Point3<f64>,
        time_step: f64,
    ) -> bool {
        let pivot_a_in_w = rb_a.pose.transform_point(pivot_in_a);
        let pivot_b_in_w = rb_b.pose.transform_point(pivot_in_b);
        let rel_pos1 = pivot_a_in_w - rb_a.center_of_mass_position();
        let rel_pos2 = pivot_b_in_w - rb_b.center_of_mass_position();

        let vel = rb_a.velocity_in_local_point(&rel_pos1) - rb_b.velocity_in_local_point(&rel_pos2);
        let error = pivot_a_in_w - pivot_b_in_w;

        for (normal, jac_inv) in self.axes.iter().zip(&self.jac_diag_ab_inv) {
            let rel_vel = normal.dot(&vel);
            let depth = -error.dot(normal);
            let impulse = (depth * PIVOT_TAU / time_step - rel_vel) * jac_inv;
            if base.check_breaking(impulse) {
                return false;
            }

            base.applied_impulse += impulse;
            let impulse_vector = normal * impulse;
            rb_a.apply_impulse(&impulse_vector, &rel_pos1);
            rb_b.apply_impulse(&-impulse_vector, &rel_pos2);
        }
        true
    }
}

/// Combined inverse inertia of two bodies about `axis`.
pub(crate) fn angular_denominator(rb_a: &RigidBody, rb_b: &RigidBody, axis: &Vector3<f64>) -> f64 {
    rb_a.compute_angular_impulse_denominator(axis) + rb_b.compute_angular_impulse_denominator(axis)
}

/// `1 / denominator`, or 0 for an immovable axis.
pub(crate) fn inverse_or_zero(denominator: f64) -> f64 {
    if denominator > 0.0 { 1.0 / denominator } else { 0.0 }
}

/// Immutable lookup of both joint bodies.
pub(crate) fn body_pair(
    bodies: &RigidBodySet,
    a: BodyId,
    b: BodyId,
) -> Option<(&RigidBody, &RigidBody)> {
    Some((bodies.get(a)?, bodies.get(b)?))
}
