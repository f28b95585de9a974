//! Pooled constraint rows for the cache-friendly contact path.

use nalgebra::Vector3;

use crate::SolverBodyId;

/// Index of a [`SolverConstraint`] in one of the solver's row arenas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SolverConstraintId(pub usize);

impl SolverConstraintId {
    /// Position in the arena.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Kind of a pooled row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverConstraintType {
    /// Non-penetration along the contact normal.
    #[default]
    Contact1D,
    /// Friction along one tangent.
    Friction1D,
}

/// Contact point this row was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactPointRef {
    /// Manifold index in the slice passed to the solve.
    pub manifold: usize,
    /// Point index within the manifold.
    pub point: usize,
}

/// One scalar velocity constraint between two solver bodies.
///
/// A normal row stores the index of its first friction row in
/// `friction_index`; the second friction row follows it directly. A friction
/// row stores the index of its normal row there instead.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverConstraint {
    /// `r_A × n`.
    pub rel_pos1_cross_normal: Vector3<f64>,
    /// Row direction (contact normal or friction tangent).
    pub contact_normal: Vector3<f64>,
    /// `r_B × n`.
    pub rel_pos2_cross_normal: Vector3<f64>,
    /// `I_A⁻¹ (r_A × n)`.
    pub angular_component_a: Vector3<f64>,
    /// `I_B⁻¹ (r_B × n)`.
    pub angular_component_b: Vector3<f64>,
    /// Accumulated split-impulse (pseudo velocity) impulse.
    pub applied_push_impulse: f64,
    /// Accumulated impulse.
    pub applied_impulse: f64,
    /// Combined friction coefficient.
    pub friction: f64,
    /// Restitution velocity target.
    pub restitution: f64,
    /// Inverse effective mass of the row.
    pub jac_diag_ab_inv: f64,
    /// Penetration (non-positive) after slop.
    pub penetration: f64,
    /// Row kind.
    pub constraint_type: SolverConstraintType,
    /// Linked row in the other arena.
    pub friction_index: SolverConstraintId,
    /// First body.
    pub solver_body_a: SolverBodyId,
    /// Second body.
    pub solver_body_b: SolverBodyId,
    /// Point the row writes its impulse back to.
    pub original_contact_point: Option<ContactPointRef>,
}

impl SolverConstraint {
    /// An empty row of the given kind between two solver bodies.
    #[must_use]
    pub fn new(
        constraint_type: SolverConstraintType,
        solver_body_a: SolverBodyId,
        solver_body_b: SolverBodyId,
    ) -> Self {
        Self {
            rel_pos1_cross_normal: Vector3::zeros(),
            contact_normal: Vector3::zeros(),
            rel_pos2_cross_normal: Vector3::zeros(),
            angular_component_a: Vector3::zeros(),
            angular_component_b: Vector3::zeros(),
            applied_push_impulse: 0.0,
            applied_impulse: 0.0,
            friction: 0.0,
            restitution: 0.0,
            jac_diag_ab_inv: 0.0,
            penetration: 0.0,
            constraint_type,
            friction_index: SolverConstraintId(0),
            solver_body_a,
            solver_body_b,
            original_contact_point: None,
        }
    }

    /// Total normal impulse including the split-impulse part.
    #[must_use]
    pub fn total_impulse(&self) -> f64 {
        self.applied_impulse + self.applied_push_impulse
    }
}
