//! Per-point contact resolution.
//!
//! These functions run on the per-point solver path. Each one reads the
//! [`ConstraintPersistentData`](crate::ConstraintPersistentData) prepared for
//! the point during setup, computes a correcting impulse, clamps the
//! accumulated value and applies the change to both bodies.
//!
//! A point without persistent data was never prepared; the functions treat it
//! as inactive and return 0.

use nalgebra::{Point3, Vector3};
use sim_types::{ContactSolverInfo, RigidBody, math::EPSILON};

use crate::{JacobianEntry, ManifoldPoint};

/// Damping factor of the bilateral velocity constraint.
const BILATERAL_CONTACT_DAMPING: f64 = 0.2;

/// Velocity constraint between two points, without accumulation.
///
/// Returns the impulse along `normal` that removes a fifth of the relative
/// velocity of `pos1` on `body1` and `pos2` on `body2`. Returns 0 for a
/// normal that is not unit length.
#[must_use]
pub fn resolve_single_bilateral(
    body1: &RigidBody,
    pos1: &Point3<f64>,
    body2: &RigidBody,
    pos2: &Point3<f64>,
    normal: &Vector3<f64>,
) -> f64 {
    let normal_len_sqr = normal.norm_squared();
    if normal_len_sqr > 1.1 {
        return 0.0;
    }

    let rel_pos1 = pos1 - body1.center_of_mass_position();
    let rel_pos2 = pos2 - body2.center_of_mass_position();

    let vel1 = body1.velocity_in_local_point(&rel_pos1);
    let vel2 = body2.velocity_in_local_point(&rel_pos2);
    let vel = vel1 - vel2;

    let jac = JacobianEntry::between(body1, body2, &rel_pos1, &rel_pos2, normal);
    let rel_vel = normal.dot(&vel);

    -BILATERAL_CONTACT_DAMPING * rel_vel * jac.diagonal_inv()
}

/// Normal impulse for one contact, with Baumgarte position correction.
///
/// Returns the impulse applied this call (the change in the accumulated
/// normal impulse, which never drops below 0).
pub fn resolve_single_collision(
    body1: &mut RigidBody,
    body2: &mut RigidBody,
    contact_point: &mut ManifoldPoint,
    info: &ContactSolverInfo,
) -> f64 {
    let normal = contact_point.normal_world_on_b;
    let rel_pos1 = contact_point.position_world_on_a - body1.center_of_mass_position();
    let rel_pos2 = contact_point.position_world_on_b - body2.center_of_mass_position();

    let Some(cpd) = contact_point.user_persistent_data.as_mut() else {
        return 0.0;
    };

    let vel = body1.velocity_in_local_point(&rel_pos1) - body2.velocity_in_local_point(&rel_pos2);
    let rel_vel = normal.dot(&vel);

    let k_cor = info.erp / info.time_step;
    let positional_error = k_cor * -cpd.penetration;
    let velocity_error = cpd.restitution - rel_vel;

    let normal_impulse = (positional_error + velocity_error) * cpd.jac_diag_ab_inv;

    let old_normal_impulse = cpd.applied_impulse;
    cpd.applied_impulse = (old_normal_impulse + normal_impulse).max(0.0);
    let normal_impulse = cpd.applied_impulse - old_normal_impulse;

    let inv_mass1 = body1.inverse_mass();
    if inv_mass1 != 0.0 {
        body1.internal_apply_impulse(&(normal * inv_mass1), &cpd.angular_component_a, normal_impulse);
    }
    let inv_mass2 = body2.inverse_mass();
    if inv_mass2 != 0.0 {
        body2.internal_apply_impulse(&(normal * inv_mass2), &cpd.angular_component_b, -normal_impulse);
    }

    normal_impulse
}

/// Friction impulses along the two cached tangents of one contact.
///
/// Each tangent accumulator stays within ±(normal impulse × friction).
/// Nothing is applied while the contact carries no normal impulse. Returns
/// the accumulated normal impulse.
pub fn resolve_single_friction(
    body1: &mut RigidBody,
    body2: &mut RigidBody,
    contact_point: &mut ManifoldPoint,
    _info: &ContactSolverInfo,
) -> f64 {
    let rel_pos1 = contact_point.position_world_on_a - body1.center_of_mass_position();
    let rel_pos2 = contact_point.position_world_on_b - body2.center_of_mass_position();

    let Some(cpd) = contact_point.user_persistent_data.as_mut() else {
        return 0.0;
    };

    if cpd.applied_impulse <= 0.0 {
        return cpd.applied_impulse;
    }
    let limit = cpd.applied_impulse * cpd.friction;

    let vel = body1.velocity_in_local_point(&rel_pos1) - body2.velocity_in_local_point(&rel_pos2);

    let j1 = {
        let vrel = cpd.friction_world_tangential0.dot(&vel);
        let old = cpd.accumulated_tangent_impulse0;
        cpd.accumulated_tangent_impulse0 =
            (old - vrel * cpd.jac_diag_ab_inv_tangent0).max(-limit).min(limit);
        cpd.accumulated_tangent_impulse0 - old
    };
    let j2 = {
        let vrel = cpd.friction_world_tangential1.dot(&vel);
        let old = cpd.accumulated_tangent_impulse1;
        cpd.accumulated_tangent_impulse1 =
            (old - vrel * cpd.jac_diag_ab_inv_tangent1).max(-limit).min(limit);
        cpd.accumulated_tangent_impulse1 - old
    };

    let inv_mass1 = body1.inverse_mass();
    if inv_mass1 != 0.0 {
        body1.internal_apply_impulse(
            &(cpd.friction_world_tangential0 * inv_mass1),
            &cpd.friction_angular_component0_a,
            j1,
        );
        body1.internal_apply_impulse(
            &(cpd.friction_world_tangential1 * inv_mass1),
            &cpd.friction_angular_component1_a,
            j2,
        );
    }
    let inv_mass2 = body2.inverse_mass();
    if inv_mass2 != 0.0 {
        body2.internal_apply_impulse(
            &(cpd.friction_world_tangential0 * inv_mass2),
            &cpd.friction_angular_component0_b,
            -j1,
        );
        body2.internal_apply_impulse(
            &(cpd.friction_world_tangential1 * inv_mass2),
            &cpd.friction_angular_component1_b,
            -j2,
        );
    }

    cpd.applied_impulse
}

/// Normal impulse followed by a single friction impulse along the current
/// sliding direction.
///
/// The friction direction is recomputed from the post-normal relative
/// velocity instead of using the cached tangents, and its magnitude is
/// clamped to ±(accumulated normal impulse × friction). Returns the normal
/// impulse applied this call.
pub fn resolve_single_collision_combined(
    body1: &mut RigidBody,
    body2: &mut RigidBody,
    contact_point: &mut ManifoldPoint,
    info: &ContactSolverInfo,
) -> f64 {
    let normal_impulse = resolve_single_collision(body1, body2, contact_point, info);

    let normal = contact_point.normal_world_on_b;
    let rel_pos1 = contact_point.position_world_on_a - body1.center_of_mass_position();
    let rel_pos2 = contact_point.position_world_on_b - body2.center_of_mass_position();

    let Some(cpd) = contact_point.user_persistent_data.as_ref() else {
        return normal_impulse;
    };
    if cpd.applied_impulse <= 0.0 {
        return normal_impulse;
    }

    let vel = body1.velocity_in_local_point(&rel_pos1) - body2.velocity_in_local_point(&rel_pos2);
    let rel_vel = normal.dot(&vel);
    let lat_vel = vel - normal * rel_vel;
    let lat_rel_vel = lat_vel.norm();
    if lat_rel_vel <= EPSILON {
        return normal_impulse;
    }

    let lat_dir = lat_vel / lat_rel_vel;
    let temp1 = (body1.inv_inertia_world() * rel_pos1.cross(&lat_dir)).cross(&rel_pos1);
    let temp2 = (body2.inv_inertia_world() * rel_pos2.cross(&lat_dir)).cross(&rel_pos2);
    let denom = body1.inverse_mass() + body2.inverse_mass() + lat_dir.dot(&(temp1 + temp2));

    let limit = cpd.applied_impulse * cpd.friction;
    let friction_impulse = (lat_rel_vel / denom).max(-limit).min(limit);

    body1.apply_impulse(&(lat_dir * -friction_impulse), &rel_pos1);
    body2.apply_impulse(&(lat_dir * friction_impulse), &rel_pos2);

    normal_impulse
}
