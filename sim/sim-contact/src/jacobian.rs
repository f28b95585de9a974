//! Effective mass along a single constraint axis.
//!
//! The diagonal of `J M⁻¹ Jᵀ` for one row is
//!
//! ```text
//! invMassA + invMassB + (I_A⁻¹ (r_A × n))·(r_A × n) + (I_B⁻¹ (r_B × n))·(r_B × n)
//! ```
//!
//! computed here in each body's principal frame, so only the diagonal of the
//! local inverse inertia is needed.

use nalgebra::{Matrix3, Vector3};
use sim_types::RigidBody;

/// One precomputed Jacobian row between two bodies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JacobianEntry {
    /// Linear axis (zero for angular-only rows).
    pub linear_joint_axis: Vector3<f64>,
    /// Angular Jacobian of A in A's principal frame.
    pub a_j: Vector3<f64>,
    /// Angular Jacobian of B in B's principal frame.
    pub b_j: Vector3<f64>,
    /// `I_A⁻¹ a_j`.
    pub a_minv_jt: Vector3<f64>,
    /// `I_B⁻¹ b_j`.
    pub b_minv_jt: Vector3<f64>,
    /// The diagonal `J M⁻¹ Jᵀ`.
    pub adiag: f64,
}

impl JacobianEntry {
    /// Row for a translational constraint along `joint_axis`.
    ///
    /// `world_to_a`/`world_to_b` map world vectors into each body's principal
    /// frame (the transpose of the body basis).
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn linear(
        world_to_a: &Matrix3<f64>,
        world_to_b: &Matrix3<f64>,
        rel_pos1: &Vector3<f64>,
        rel_pos2: &Vector3<f64>,
        joint_axis: &Vector3<f64>,
        inertia_inv_a: &Vector3<f64>,
        mass_inv_a: f64,
        inertia_inv_b: &Vector3<f64>,
        mass_inv_b: f64,
    ) -> Self {
        let a_j = world_to_a * rel_pos1.cross(joint_axis);
        let b_j = world_to_b * rel_pos2.cross(&(-joint_axis));
        let a_minv_jt = inertia_inv_a.component_mul(&a_j);
        let b_minv_jt = inertia_inv_b.component_mul(&b_j);
        let adiag = mass_inv_a + a_minv_jt.dot(&a_j) + mass_inv_b + b_minv_jt.dot(&b_j);

        Self {
            linear_joint_axis: *joint_axis,
            a_j,
            b_j,
            a_minv_jt,
            b_minv_jt,
            adiag,
        }
    }

    /// Row for a rotational constraint about `joint_axis`.
    #[must_use]
    pub fn angular(
        joint_axis: &Vector3<f64>,
        world_to_a: &Matrix3<f64>,
        world_to_b: &Matrix3<f64>,
        inertia_inv_a: &Vector3<f64>,
        inertia_inv_b: &Vector3<f64>,
    ) -> Self {
        let a_j = world_to_a * joint_axis;
        let b_j = world_to_b * (-joint_axis);
        let a_minv_jt = inertia_inv_a.component_mul(&a_j);
        let b_minv_jt = inertia_inv_b.component_mul(&b_j);
        let adiag = a_minv_jt.dot(&a_j) + b_minv_jt.dot(&b_j);

        Self {
            linear_joint_axis: Vector3::zeros(),
            a_j,
            b_j,
            a_minv_jt,
            b_minv_jt,
            adiag,
        }
    }

    /// Linear row between two rigid bodies at world offsets `rel_pos1`/`rel_pos2`.
    #[must_use]
    pub fn between(
        body_a: &RigidBody,
        body_b: &RigidBody,
        rel_pos1: &Vector3<f64>,
        rel_pos2: &Vector3<f64>,
        joint_axis: &Vector3<f64>,
    ) -> Self {
        Self::linear(
            &body_a.pose.basis().transpose(),
            &body_b.pose.basis().transpose(),
            rel_pos1,
            rel_pos2,
            joint_axis,
            body_a.inv_inertia_local(),
            body_a.inverse_mass(),
            body_b.inv_inertia_local(),
            body_b.inverse_mass(),
        )
    }

    /// Angular row between two rigid bodies.
    #[must_use]
    pub fn angular_between(body_a: &RigidBody, body_b: &RigidBody, joint_axis: &Vector3<f64>) -> Self {
        Self::angular(
            joint_axis,
            &body_a.pose.basis().transpose(),
            &body_b.pose.basis().transpose(),
            body_a.inv_inertia_local(),
            body_b.inv_inertia_local(),
        )
    }

    /// The diagonal `J M⁻¹ Jᵀ`.
    #[must_use]
    pub fn diagonal(&self) -> f64 {
        self.adiag
    }

    /// Inverse of the diagonal, or 0 when the row has no mass.
    ///
    /// A non-positive diagonal means two immovable bodies share a constrained
    /// axis; callers are expected to filter such pairs.
    #[must_use]
    pub fn diagonal_inv(&self) -> f64 {
        debug_assert!(
            self.adiag > 0.0,
            "constraint row between two immovable bodies (diagonal {})",
            self.adiag
        );
        if self.adiag > 0.0 { 1.0 / self.adiag } else { 0.0 }
    }

    /// Relative velocity along this row.
    #[must_use]
    pub fn relative_velocity(
        &self,
        lin_vel_a: &Vector3<f64>,
        ang_vel_a: &Vector3<f64>,
        lin_vel_b: &Vector3<f64>,
        ang_vel_b: &Vector3<f64>,
    ) -> f64 {
        let lin_rel = (lin_vel_a - lin_vel_b).component_mul(&self.linear_joint_axis);
        let ang = ang_vel_a.component_mul(&self.a_j) + ang_vel_b.component_mul(&self.b_j) + lin_rel;
        ang.x + ang.y + ang.z
    }
}

/// Inverse effective mass for a translational row between two bodies.
///
/// `basis_a`/`basis_b` are the bodies' world rotation matrices.
#[allow(clippy::too_many_arguments)]
#[must_use]
pub fn calculate_diagonal_inv(
    basis_a: &Matrix3<f64>,
    basis_b: &Matrix3<f64>,
    rel_pos1: &Vector3<f64>,
    rel_pos2: &Vector3<f64>,
    axis: &Vector3<f64>,
    inv_inertia_local_a: &Vector3<f64>,
    inv_mass_a: f64,
    inv_inertia_local_b: &Vector3<f64>,
    inv_mass_b: f64,
) -> f64 {
    JacobianEntry::linear(
        &basis_a.transpose(),
        &basis_b.transpose(),
        rel_pos1,
        rel_pos2,
        axis,
        inv_inertia_local_a,
        inv_mass_a,
        inv_inertia_local_b,
        inv_mass_b,
    )
    .diagonal_inv()
}

/// Inverse effective inertia for a rotational row between two bodies.
#[must_use]
pub fn calculate_angular_diagonal_inv(
    axis: &Vector3<f64>,
    basis_a: &Matrix3<f64>,
    basis_b: &Matrix3<f64>,
    inv_inertia_local_a: &Vector3<f64>,
    inv_inertia_local_b: &Vector3<f64>,
) -> f64 {
    JacobianEntry::angular(
        axis,
        &basis_a.transpose(),
        &basis_b.transpose(),
        inv_inertia_local_a,
        inv_inertia_local_b,
    )
    .diagonal_inv()
}
