//! Per-contact solver cache for the per-point resolution path.

use nalgebra::Vector3;

use crate::ContactSolverFn;

/// Solver state attached to one [`ManifoldPoint`](crate::ManifoldPoint).
///
/// Created the first time the per-point path sees a contact and reused
/// while the contact persists. The solver compares `persistent_life_time`
/// against the point's life time to detect a recycled contact and calls
/// [`reset`](Self::reset) in that case.
#[derive(Debug, Clone, Default)]
pub struct ConstraintPersistentData {
    /// Accumulated normal impulse.
    pub applied_impulse: f64,
    /// Normal impulse at the start of this frame.
    pub prev_applied_impulse: f64,
    /// Accumulated impulse along the first tangent.
    pub accumulated_tangent_impulse0: f64,
    /// Accumulated impulse along the second tangent.
    pub accumulated_tangent_impulse1: f64,

    /// Inverse effective mass along the normal.
    pub jac_diag_ab_inv: f64,
    /// Inverse effective mass along the first tangent.
    pub jac_diag_ab_inv_tangent0: f64,
    /// Inverse effective mass along the second tangent.
    pub jac_diag_ab_inv_tangent1: f64,
    /// Life time the cache was last synchronized with.
    pub persistent_life_time: i32,
    /// Restitution velocity target.
    pub restitution: f64,
    /// Combined friction coefficient.
    pub friction: f64,
    /// Penetration used for positional correction (0 when restitution dominates).
    pub penetration: f64,

    /// First friction tangent.
    pub friction_world_tangential0: Vector3<f64>,
    /// Second friction tangent.
    pub friction_world_tangential1: Vector3<f64>,

    /// `I_A⁻¹ (r_A × t0)`.
    pub friction_angular_component0_a: Vector3<f64>,
    /// `I_B⁻¹ (r_B × t0)`.
    pub friction_angular_component0_b: Vector3<f64>,
    /// `I_A⁻¹ (r_A × t1)`.
    pub friction_angular_component1_a: Vector3<f64>,
    /// `I_B⁻¹ (r_B × t1)`.
    pub friction_angular_component1_b: Vector3<f64>,

    /// `I_A⁻¹ (r_A × n)`.
    pub angular_component_a: Vector3<f64>,
    /// `I_B⁻¹ (r_B × n)`.
    pub angular_component_b: Vector3<f64>,

    /// Normal resolution function selected for this body pair.
    pub contact_solver_func: Option<ContactSolverFn>,
    /// Friction resolution function selected for this body pair.
    pub friction_solver_func: Option<ContactSolverFn>,
}

impl ConstraintPersistentData {
    /// Create zeroed data.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero every accumulator and cached quantity and forget the solver functions.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
