//! Ball-and-socket joint.

use nalgebra::{Point3, Vector3};
use sim_contact::JacobianEntry;
use sim_types::{BodyId, ContactSolverInfo, RigidBody, RigidBodySet, math::EPSILON};

use super::{ConstraintBase, ConstraintType, TypedConstraint, body_pair};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Solver settings of a ball joint.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConstraintSetting {
    /// Fraction of the positional error corrected per second (scaled by 1/dt).
    pub tau: f64,
    /// Fraction of the relative velocity removed per iteration.
    pub damping: f64,
    /// Per-iteration impulse cap, 0 for none.
    pub impulse_clamp: f64,
}

impl Default for ConstraintSetting {
    fn default() -> Self {
        Self {
            tau: 0.3,
            damping: 1.0,
            impulse_clamp: 0.0,
        }
    }
}

/// Error between two world pivots after removing the rest length.
pub(crate) fn pivot_error(pivot_a: &Point3<f64>, pivot_b: &Point3<f64>, rest_length: f64) -> Vector3<f64> {
    let error = pivot_a - pivot_b;
    if rest_length > 0.0 {
        let len = error.norm();
        if len > EPSILON {
            return error * ((len - rest_length) / len);
        }
    }
    error
}

/// One iteration of the three world-axis rows of a ball joint.
///
/// Returns the sum of the applied impulses. An impulse above the breaking
/// threshold is returned as the error and neither it nor any later row is
/// applied.
#[allow(clippy::too_many_arguments)]
pub(crate) fn solve_pivot_rows(
    body_a: &mut RigidBody,
    body_b: &mut RigidBody,
    pivot_in_a: &Point3<f64>,
    pivot_in_b: &Point3<f64>,
    jac_diag_ab_inv: &[f64; 3],
    rest_length: f64,
    setting: &ConstraintSetting,
    breaking_impulse_threshold: f64,
    time_step: f64,
) -> Result<f64, f64> {
    let pivot_a_in_w = body_a.pose.transform_point(pivot_in_a);
    let pivot_b_in_w = body_b.pose.transform_point(pivot_in_b);
    let rel_pos1 = pivot_a_in_w - body_a.center_of_mass_position();
    let rel_pos2 = pivot_b_in_w - body_b.center_of_mass_position();
    let error = pivot_error(&pivot_a_in_w, &pivot_b_in_w, rest_length);

    let mut total = 0.0;
    for (i, jac_inv) in jac_diag_ab_inv.iter().enumerate() {
        let mut normal = Vector3::zeros();
        normal[i] = 1.0;

        let vel = body_a.velocity_in_local_point(&rel_pos1) - body_b.velocity_in_local_point(&rel_pos2);
        let rel_vel = normal.dot(&vel);
        let depth = -error.dot(&normal);

        let mut impulse =
            depth * setting.tau / time_step * jac_inv - setting.damping * rel_vel * jac_inv;
        if setting.impulse_clamp > 0.0 {
            impulse = impulse.clamp(-setting.impulse_clamp, setting.impulse_clamp);
        }
        if impulse.abs() > breaking_impulse_threshold {
            return Err(impulse);
        }

        total += impulse;
        let impulse_vector = normal * impulse;
        body_a.apply_impulse(&impulse_vector, &rel_pos1);
        body_b.apply_impulse(&-impulse_vector, &rel_pos2);
    }
    Ok(total)
}

/// Inverse effective masses of the three world-axis rows.
pub(crate) fn pivot_jacobians(
    body_a: &RigidBody,
    body_b: &RigidBody,
    pivot_in_a: &Point3<f64>,
    pivot_in_b: &Point3<f64>,
) -> [f64; 3] {
    let rel_pos1 = body_a.pose.transform_point(pivot_in_a) - body_a.center_of_mass_position();
    let rel_pos2 = body_b.pose.transform_point(pivot_in_b) - body_b.center_of_mass_position();
    let mut jac = [0.0; 3];
    for (i, slot) in jac.iter_mut().enumerate() {
        let mut axis = Vector3::zeros();
        axis[i] = 1.0;
        let diag = JacobianEntry::between(body_a, body_b, &rel_pos1, &rel_pos2, &axis).diagonal();
        *slot = if diag > 0.0 { 1.0 / diag } else { 0.0 };
    }
    jac
}

/// Keeps a pivot on body A coincident with a pivot on body B.
///
/// With a positive `rest_length` the pivots are held that far apart instead,
/// which turns the joint into a stiff distance constraint.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Point2PointConstraint {
    base: ConstraintBase,
    pivot_in_a: Point3<f64>,
    pivot_in_b: Point3<f64>,
    jac_diag_ab_inv: [f64; 3],
    /// Solver settings.
    pub setting: ConstraintSetting,
    /// Target distance between the world pivots.
    pub rest_length: f64,
}

impl Point2PointConstraint {
    /// Joint between two bodies with pivots in each body's frame.
    #[must_use]
    pub fn new(body_a: BodyId, body_b: BodyId, pivot_in_a: Point3<f64>, pivot_in_b: Point3<f64>) -> Self {
        Self {
            base: ConstraintBase::new(body_a, body_b),
            pivot_in_a,
            pivot_in_b,
            jac_diag_ab_inv: [0.0; 3],
            setting: ConstraintSetting::default(),
            rest_length: 0.0,
        }
    }

    /// Pin body A to the world at the current world position of its pivot.
    #[must_use]
    pub fn with_fixed(body_a: BodyId, rb_a: &RigidBody, pivot_in_a: Point3<f64>) -> Self {
        let pivot_in_b = rb_a.pose.transform_point(&pivot_in_a);
        Self::new(body_a, BodyId::FIXED, pivot_in_a, pivot_in_b)
    }

    /// Set the rest length.
    #[must_use]
    pub fn with_rest_length(mut self, rest_length: f64) -> Self {
        self.rest_length = rest_length;
        self
    }

    /// Set the solver settings.
    #[must_use]
    pub fn with_setting(mut self, setting: ConstraintSetting) -> Self {
        self.setting = setting;
        self
    }

    /// Get the pivot in body A's frame.
    #[must_use]
    pub fn pivot_in_a(&self) -> Point3<f64> {
        self.pivot_in_a
    }

    /// Get the pivot in body B's frame.
    #[must_use]
    pub fn pivot_in_b(&self) -> Point3<f64> {
        self.pivot_in_b
    }

    /// Move the pivot on body A.
    pub fn set_pivot_a(&mut self, pivot: Point3<f64>) {
        self.pivot_in_a = pivot;
    }

    /// Move the pivot on body B.
    pub fn set_pivot_b(&mut self, pivot: Point3<f64>) {
        self.pivot_in_b = pivot;
    }
}

impl TypedConstraint for Point2PointConstraint {
    fn constraint_type(&self) -> ConstraintType {
        ConstraintType::Point2Point
    }

    fn base(&self) -> &ConstraintBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ConstraintBase {
        &mut self.base
    }

    fn build_jacobian(&mut self, bodies: &RigidBodySet, _info: &ContactSolverInfo) {
        self.base.applied_impulse = 0.0;
        let Some((rb_a, rb_b)) = body_pair(bodies, self.base.body_a, self.base.body_b) else {
            return;
        };
        self.jac_diag_ab_inv = pivot_jacobians(rb_a, rb_b, &self.pivot_in_a, &self.pivot_in_b);
    }

    fn solve_constraint(&mut self, bodies: &mut RigidBodySet, time_step: f64) {
        if self.base.is_broken {
            return;
        }
        let Some((rb_a, rb_b)) = bodies.pair_mut(self.base.body_a, self.base.body_b) else {
            return;
        };
        match solve_pivot_rows(
            rb_a,
            rb_b,
            &self.pivot_in_a,
            &self.pivot_in_b,
            &self.jac_diag_ab_inv,
            self.rest_length,
            &self.setting,
            self.base.breaking_impulse_threshold,
            time_step,
        ) {
            Ok(impulse) => self.base.applied_impulse += impulse,
            Err(impulse) => {
                self.base.check_breaking(impulse);
            }
        }
    }
}
