//! Per-axis limit and motor state for the six-degree-of-freedom joints.
//!
//! [`RotationalLimitMotor`] handles one Euler angle; [`TranslationalLimitMotor`]
//! handles all three linear axes. Both accumulate impulses across one solve
//! and are reset by the owning joint's build step.

use nalgebra::{Point3, Vector3};
use sim_types::{RigidBody, math::EPSILON};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Accumulated impulses beyond this magnitude are discarded.
const ACCUMULATOR_BOUND: f64 = 1e30;

/// Which side of a rotational range the angle is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LimitState {
    /// Inside the range, or the axis is free.
    #[default]
    Free,
    /// Below the lower limit.
    AtLower,
    /// Above the upper limit.
    AtUpper,
}

/// Limit and motor on one rotational axis.
///
/// The axis is limited when `lo_limit <= hi_limit`; the default range
/// (`1 > -1`) leaves it free.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RotationalLimitMotor {
    /// Lower angle limit.
    pub lo_limit: f64,
    /// Upper angle limit.
    pub hi_limit: f64,
    /// Motor target angular velocity.
    pub target_velocity: f64,
    /// Maximum motor force (scaled by the time step into an impulse).
    pub max_motor_force: f64,
    /// Maximum force used to hold the limit.
    pub max_limit_force: f64,
    /// Velocity damping in the correction.
    pub damping: f64,
    /// Scale applied to the correction velocity.
    pub limit_softness: f64,
    /// Error reduction for limit violations.
    pub erp: f64,
    /// Restitution at the limit.
    pub bounce: f64,
    /// Whether the velocity motor is active.
    pub enable_motor: bool,

    /// Limit state from the last [`test_limit_value`](Self::test_limit_value).
    pub current_limit: LimitState,
    /// Signed angle past the violated limit.
    pub current_limit_error: f64,
    /// Impulse accumulated during the current solve.
    pub accumulated_impulse: f64,
}

impl Default for RotationalLimitMotor {
    fn default() -> Self {
        Self {
            lo_limit: 1.0,
            hi_limit: -1.0,
            target_velocity: 0.0,
            max_motor_force: 0.1,
            max_limit_force: 300.0,
            damping: 1.0,
            limit_softness: 0.5,
            erp: 0.5,
            bounce: 0.0,
            enable_motor: false,
            current_limit: LimitState::Free,
            current_limit_error: 0.0,
            accumulated_impulse: 0.0,
        }
    }
}

impl RotationalLimitMotor {
    /// Whether the range is active.
    #[must_use]
    pub fn is_limited(&self) -> bool {
        self.lo_limit <= self.hi_limit
    }

    /// Whether the solver has anything to do on this axis.
    #[must_use]
    pub fn need_apply_torques(&self) -> bool {
        self.current_limit != LimitState::Free || self.enable_motor
    }

    /// Classify `angle` against the range and record the error.
    ///
    /// Returns the new state.
    pub fn test_limit_value(&mut self, angle: f64) -> LimitState {
        self.current_limit_error = 0.0;
        self.current_limit = if !self.is_limited() {
            LimitState::Free
        } else if angle < self.lo_limit {
            self.current_limit_error = angle - self.lo_limit;
            LimitState::AtLower
        } else if angle > self.hi_limit {
            self.current_limit_error = angle - self.hi_limit;
            LimitState::AtUpper
        } else {
            LimitState::Free
        };
        self.current_limit
    }

    /// Apply one limit or motor impulse about `axis` and return it.
    ///
    /// The angle rate is `(w_a - w_b) · axis`; a positive impulse turns A
    /// forward and B back. An impulse above `breaking_impulse_threshold` is
    /// returned as the error and not applied; the accumulator keeps its old
    /// value.
    pub fn solve_angular_limits(
        &mut self,
        time_step: f64,
        axis: &Vector3<f64>,
        jac_diag_ab_inv: f64,
        body_a: &mut RigidBody,
        body_b: &mut RigidBody,
        breaking_impulse_threshold: f64,
    ) -> Result<f64, f64> {
        if !self.need_apply_torques() {
            return Ok(0.0);
        }

        let (target_velocity, max_force) = if self.current_limit == LimitState::Free {
            (self.target_velocity, self.max_motor_force)
        } else {
            (-self.erp * self.current_limit_error / time_step, self.max_limit_force)
        };
        let max_impulse = max_force * time_step;

        let rel_vel = axis.dot(&(body_a.angular_velocity - body_b.angular_velocity));
        let motor_relvel = self.limit_softness * (target_velocity - self.damping * rel_vel);
        if motor_relvel.abs() < EPSILON {
            return Ok(0.0);
        }

        let unclipped = (1.0 + self.bounce) * motor_relvel * jac_diag_ab_inv;
        let clipped = unclipped.min(max_impulse).max(-max_impulse);

        let old = self.accumulated_impulse;
        let sum = old + clipped;
        let accumulated = if sum.abs() > ACCUMULATOR_BOUND { 0.0 } else { sum };
        let impulse = accumulated - old;
        if impulse.abs() > breaking_impulse_threshold {
            return Err(impulse);
        }
        self.accumulated_impulse = accumulated;

        let torque = axis * impulse;
        body_a.apply_torque_impulse(&torque);
        body_b.apply_torque_impulse(&-torque);
        Ok(impulse)
    }
}

/// Limits and motors on the three linear axes.
///
/// Axis `i` is limited when `upper_limit[i] >= lower_limit[i]`; equal limits
/// lock it. The default locks all three at zero.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TranslationalLimitMotor {
    /// Lower limit per axis.
    pub lower_limit: Vector3<f64>,
    /// Upper limit per axis.
    pub upper_limit: Vector3<f64>,
    /// Limit impulses accumulated during the current solve.
    pub accumulated_impulse: Vector3<f64>,
    /// Scale applied to the correction.
    pub limit_softness: f64,
    /// Velocity damping in the correction.
    pub damping: f64,
    /// Fraction of the position error corrected per step.
    pub restitution: f64,

    /// Whether each axis' velocity motor is active.
    pub enable_motor: [bool; 3],
    /// Motor target rate of change of the separation, per axis.
    pub target_velocity: Vector3<f64>,
    /// Maximum motor force per axis.
    pub max_motor_force: Vector3<f64>,
    /// Motor impulses accumulated during the current solve.
    pub accumulated_motor_impulse: Vector3<f64>,
}

impl Default for TranslationalLimitMotor {
    fn default() -> Self {
        Self {
            lower_limit: Vector3::zeros(),
            upper_limit: Vector3::zeros(),
            accumulated_impulse: Vector3::zeros(),
            limit_softness: 0.7,
            damping: 1.0,
            restitution: 0.5,
            enable_motor: [false; 3],
            target_velocity: Vector3::zeros(),
            max_motor_force: Vector3::zeros(),
            accumulated_motor_impulse: Vector3::zeros(),
        }
    }
}

impl TranslationalLimitMotor {
    /// Whether axis `i` has an active range.
    #[must_use]
    pub fn is_limited(&self, limit_index: usize) -> bool {
        self.upper_limit[limit_index] >= self.lower_limit[limit_index]
    }

    /// Whether axis `i` needs solving at all.
    #[must_use]
    pub fn need_apply_force(&self, limit_index: usize) -> bool {
        self.is_limited(limit_index) || self.enable_motor[limit_index]
    }

    /// Zero both accumulators.
    pub fn reset_accumulators(&mut self) {
        self.accumulated_impulse = Vector3::zeros();
        self.accumulated_motor_impulse = Vector3::zeros();
    }

    /// Apply the limit and motor impulses for one axis and return their sum.
    ///
    /// `point_in_a` and `point_in_b` are the world frame origins; the
    /// separation along `axis` is `(point_in_b - point_in_a) · axis`. Both
    /// impulses act at `anchor`. The first impulse above
    /// `breaking_impulse_threshold` is returned as the error; neither it nor
    /// anything after it is applied.
    #[allow(clippy::too_many_arguments)]
    pub fn solve_linear_axis(
        &mut self,
        time_step: f64,
        jac_diag_ab_inv: f64,
        body_a: &mut RigidBody,
        point_in_a: &Point3<f64>,
        body_b: &mut RigidBody,
        point_in_b: &Point3<f64>,
        limit_index: usize,
        axis: &Vector3<f64>,
        anchor: &Point3<f64>,
        breaking_impulse_threshold: f64,
    ) -> Result<f64, f64> {
        let rel_pos_a = anchor - body_a.center_of_mass_position();
        let rel_pos_b = anchor - body_b.center_of_mass_position();

        let mut total = 0.0;

        if self.is_limited(limit_index) {
            let rel_vel = axis.dot(
                &(body_a.velocity_in_local_point(&rel_pos_a)
                    - body_b.velocity_in_local_point(&rel_pos_b)),
            );
            let mut depth = -(point_in_a - point_in_b).dot(axis);
            let mut lo = -ACCUMULATOR_BOUND;
            let mut hi = ACCUMULATOR_BOUND;

            let lower = self.lower_limit[limit_index];
            let upper = self.upper_limit[limit_index];
            let active = if lower < upper {
                if depth > upper {
                    depth -= upper;
                    lo = 0.0;
                    true
                } else if depth < lower {
                    depth -= lower;
                    hi = 0.0;
                    true
                } else {
                    false
                }
            } else {
                true
            };

            if active {
                let normal_impulse = self.limit_softness
                    * (self.restitution * depth / time_step - self.damping * rel_vel)
                    * jac_diag_ab_inv;

                let old = self.accumulated_impulse[limit_index];
                let sum = old + normal_impulse;
                let accumulated = if sum > hi || sum < lo { 0.0 } else { sum };
                let impulse = accumulated - old;
                if impulse.abs() > breaking_impulse_threshold {
                    return Err(impulse);
                }
                self.accumulated_impulse[limit_index] = accumulated;

                let impulse_vector = axis * impulse;
                body_a.apply_impulse(&impulse_vector, &rel_pos_a);
                body_b.apply_impulse(&-impulse_vector, &rel_pos_b);
                total += impulse;
            }
        }

        if self.enable_motor[limit_index] {
            let rel_vel = axis.dot(
                &(body_a.velocity_in_local_point(&rel_pos_a)
                    - body_b.velocity_in_local_point(&rel_pos_b)),
            );
            let max_impulse = self.max_motor_force[limit_index] * time_step;
            let unclipped = (-self.target_velocity[limit_index] - rel_vel) * jac_diag_ab_inv;

            let old = self.accumulated_motor_impulse[limit_index];
            let accumulated = (old + unclipped).min(max_impulse).max(-max_impulse);
            let impulse = accumulated - old;
            if impulse.abs() > breaking_impulse_threshold {
                return Err(impulse);
            }
            self.accumulated_motor_impulse[limit_index] = accumulated;

            let impulse_vector = axis * impulse;
            body_a.apply_impulse(&impulse_vector, &rel_pos_a);
            body_b.apply_impulse(&-impulse_vector, &rel_pos_b);
            total += impulse;
        }

        Ok(total)
    }
}
