//! Many ball joints stored as one constraint.

use nalgebra::Point3;
use sim_types::{BodyId, ContactSolverInfo, RigidBodySet};
use tracing::warn;

use super::point2point::{pivot_jacobians, solve_pivot_rows};
use super::{ConstraintBase, ConstraintSetting, ConstraintType, TypedConstraint, body_pair};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Ball joints sharing one setting, stored column-wise.
///
/// Each joint breaks on its own; the array as a whole reports broken once
/// every joint in it has. The shared [`ConstraintBase`] uses
/// [`BodyId::FIXED`] for both bodies, so the bodies actually touched are
/// reported through [`TypedConstraint::visit_bodies`].
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Point2PointConstraintArray {
    base: ConstraintBase,
    body_a: Vec<BodyId>,
    body_b: Vec<BodyId>,
    pivot_in_a: Vec<Point3<f64>>,
    pivot_in_b: Vec<Point3<f64>>,
    jac_diag_ab_inv: Vec<[f64; 3]>,
    applied_impulse: Vec<f64>,
    broken: Vec<bool>,
    /// Settings shared by every joint.
    pub setting: ConstraintSetting,
}

impl Point2PointConstraintArray {
    /// Empty array.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty array with room for `capacity` joints.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            body_a: Vec::with_capacity(capacity),
            body_b: Vec::with_capacity(capacity),
            pivot_in_a: Vec::with_capacity(capacity),
            pivot_in_b: Vec::with_capacity(capacity),
            jac_diag_ab_inv: Vec::with_capacity(capacity),
            applied_impulse: Vec::with_capacity(capacity),
            broken: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Add a joint and return its index.
    pub fn push(
        &mut self,
        body_a: BodyId,
        body_b: BodyId,
        pivot_in_a: Point3<f64>,
        pivot_in_b: Point3<f64>,
    ) -> usize {
        self.body_a.push(body_a);
        self.body_b.push(body_b);
        self.pivot_in_a.push(pivot_in_a);
        self.pivot_in_b.push(pivot_in_b);
        self.jac_diag_ab_inv.push([0.0; 3]);
        self.applied_impulse.push(0.0);
        self.broken.push(false);
        self.base.is_broken = false;
        self.body_a.len() - 1
    }

    /// Number of joints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.body_a.len()
    }

    /// Whether the array holds no joints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body_a.is_empty()
    }

    /// Whether joint `index` has broken.
    #[must_use]
    pub fn is_row_broken(&self, index: usize) -> bool {
        self.broken.get(index).copied().unwrap_or(false)
    }

    /// Impulse accumulated by joint `index` during the last solve.
    #[must_use]
    pub fn row_applied_impulse(&self, index: usize) -> f64 {
        self.applied_impulse.get(index).copied().unwrap_or(0.0)
    }
}

impl TypedConstraint for Point2PointConstraintArray {
    fn constraint_type(&self) -> ConstraintType {
        ConstraintType::Point2PointArray
    }

    fn base(&self) -> &ConstraintBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ConstraintBase {
        &mut self.base
    }

    fn visit_bodies(&self, visitor: &mut dyn FnMut(BodyId)) {
        for (a, b) in self.body_a.iter().zip(&self.body_b) {
            visitor(*a);
            visitor(*b);
        }
    }

    fn build_jacobian(&mut self, bodies: &RigidBodySet, _info: &ContactSolverInfo) {
        self.base.applied_impulse = 0.0;
        for i in 0..self.len() {
            self.applied_impulse[i] = 0.0;
            if let Some((rb_a, rb_b)) = body_pair(bodies, self.body_a[i], self.body_b[i]) {
                self.jac_diag_ab_inv[i] =
                    pivot_jacobians(rb_a, rb_b, &self.pivot_in_a[i], &self.pivot_in_b[i]);
            }
        }
    }

    fn solve_constraint(&mut self, bodies: &mut RigidBodySet, time_step: f64) {
        if self.base.is_broken {
            return;
        }
        for i in 0..self.len() {
            if self.broken[i] {
                continue;
            }
            let Some((rb_a, rb_b)) = bodies.pair_mut(self.body_a[i], self.body_b[i]) else {
                continue;
            };
            match solve_pivot_rows(
                rb_a,
                rb_b,
                &self.pivot_in_a[i],
                &self.pivot_in_b[i],
                &self.jac_diag_ab_inv[i],
                0.0,
                &self.setting,
                self.base.breaking_impulse_threshold,
                time_step,
            ) {
                Ok(impulse) => {
                    self.applied_impulse[i] += impulse;
                    self.base.applied_impulse += impulse;
                }
                Err(impulse) => {
                    self.broken[i] = true;
                    warn!(
                        row = i,
                        body_a = %self.body_a[i],
                        body_b = %self.body_b[i],
                        impulse,
                        threshold = self.base.breaking_impulse_threshold,
                        "joint broken"
                    );
                }
            }
        }
        if !self.broken.is_empty() && self.broken.iter().all(|b| *b) {
            self.base.is_broken = true;
        }
    }

    fn set_broken(&mut self, broken: bool) {
        self.base.is_broken = broken;
        self.broken.fill(broken);
    }
}
