//! Prismatic joint that also allows rotation about its axis.

use nalgebra::Vector3;
use sim_contact::calculate_diagonal_inv;
use sim_types::{BodyId, ContactSolverInfo, Pose, RigidBody, RigidBodySet};

use super::{
    ConstraintBase, ConstraintType, Frame, TypedConstraint, angular_denominator, body_pair,
    inverse_or_zero,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Below this length an angular correction direction is ignored.
const ANGULAR_EPSILON: f64 = 1e-5;

/// Softness, restitution and damping for one class of slider row.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SliderParams {
    /// Overall scale on the impulse.
    pub softness: f64,
    /// Fraction of the position error corrected per step.
    pub restitution: f64,
    /// Scale on the velocity term.
    pub damping: f64,
}

impl Default for SliderParams {
    fn default() -> Self {
        Self {
            softness: 1.0,
            restitution: 0.7,
            damping: 1.0,
        }
    }
}

impl SliderParams {
    fn undamped() -> Self {
        Self {
            damping: 0.0,
            ..Self::default()
        }
    }
}

/// Slider: frame B's origin moves along frame A's x axis, and B may rotate
/// about that axis.
///
/// # Constraint Formulation
///
/// - 1 linear row along the axis, active past the linear limits
/// - 2 linear rows orthogonal to the axis
/// - an angular correction keeping the x axes parallel
/// - 1 angular row about the axis, active past the angular limits
/// - optional velocity motors along and about the axis
///
/// The linear range defaults to free (`1 > -1`); the angular range defaults
/// to `[0, 0]`, which locks rotation.
///
/// With `use_linear_reference_frame_a == false` the roles of the two bodies
/// are swapped, so the axis and limits are measured in frame B.
#[derive(Debug, Clone, PartialEq)]
pub struct SliderConstraint {
    base: ConstraintBase,
    frame_a: Frame,
    frame_b: Frame,
    use_linear_reference_frame_a: bool,

    lower_linear_limit: f64,
    upper_linear_limit: f64,
    lower_angular_limit: f64,
    upper_angular_limit: f64,

    /// Row along the axis inside the linear limits.
    pub dir_linear: SliderParams,
    /// Row about the axis inside the angular limits.
    pub dir_angular: SliderParams,
    /// Row along the axis past a linear limit.
    pub limit_linear: SliderParams,
    /// Row about the axis past an angular limit.
    pub limit_angular: SliderParams,
    /// Linear rows orthogonal to the axis.
    pub ortho_linear: SliderParams,
    /// Angular correction orthogonal to the axis.
    pub ortho_angular: SliderParams,

    solve_lin_lim: bool,
    solve_ang_lim: bool,

    jac_lin_axes: [Vector3<f64>; 3],
    jac_lin_diag_ab_inv: [f64; 3],
    calculated_transform_a: Frame,
    calculated_transform_b: Frame,
    depth: Vector3<f64>,
    rel_pos_a: Vector3<f64>,
    rel_pos_b: Vector3<f64>,
    linear_position: f64,
    angular_position: f64,
    k_angle: f64,

    powered_linear_motor: bool,
    target_linear_motor_velocity: f64,
    max_linear_motor_force: f64,
    accumulated_linear_motor_impulse: f64,

    powered_angular_motor: bool,
    target_angular_motor_velocity: f64,
    max_angular_motor_force: f64,
    accumulated_angular_motor_impulse: f64,
}

impl SliderConstraint {
    /// Slider between two bodies from frames in each body's space.
    #[must_use]
    pub fn new(
        body_a: BodyId,
        body_b: BodyId,
        frame_a: &Pose,
        frame_b: &Pose,
        use_linear_reference_frame_a: bool,
    ) -> Self {
        Self {
            base: ConstraintBase::new(body_a, body_b),
            frame_a: Frame::from_pose(frame_a),
            frame_b: Frame::from_pose(frame_b),
            use_linear_reference_frame_a,
            lower_linear_limit: 1.0,
            upper_linear_limit: -1.0,
            lower_angular_limit: 0.0,
            upper_angular_limit: 0.0,
            dir_linear: SliderParams::undamped(),
            dir_angular: SliderParams::undamped(),
            limit_linear: SliderParams::default(),
            limit_angular: SliderParams::default(),
            ortho_linear: SliderParams::default(),
            ortho_angular: SliderParams::default(),
            solve_lin_lim: false,
            solve_ang_lim: false,
            jac_lin_axes: [Vector3::x(), Vector3::y(), Vector3::z()],
            jac_lin_diag_ab_inv: [0.0; 3],
            calculated_transform_a: Frame::identity(),
            calculated_transform_b: Frame::identity(),
            depth: Vector3::zeros(),
            rel_pos_a: Vector3::zeros(),
            rel_pos_b: Vector3::zeros(),
            linear_position: 0.0,
            angular_position: 0.0,
            k_angle: 0.0,
            powered_linear_motor: false,
            target_linear_motor_velocity: 0.0,
            max_linear_motor_force: 0.0,
            accumulated_linear_motor_impulse: 0.0,
            powered_angular_motor: false,
            target_angular_motor_velocity: 0.0,
            max_angular_motor_force: 0.0,
            accumulated_angular_motor_impulse: 0.0,
        }
    }

    /// Set the linear range along the axis.
    #[must_use]
    pub fn with_linear_limit(mut self, lower: f64, upper: f64) -> Self {
        self.set_linear_limit(lower, upper);
        self
    }

    /// Set the linear range along the axis. `lower > upper` frees it.
    pub fn set_linear_limit(&mut self, lower: f64, upper: f64) {
        self.lower_linear_limit = lower;
        self.upper_linear_limit = upper;
    }

    /// Set the angular range about the axis. `lower > upper` frees it.
    pub fn set_angular_limit(&mut self, lower: f64, upper: f64) {
        self.lower_angular_limit = lower;
        self.upper_angular_limit = upper;
    }

    /// Lower linear limit.
    #[must_use]
    pub fn lower_linear_limit(&self) -> f64 {
        self.lower_linear_limit
    }

    /// Upper linear limit.
    #[must_use]
    pub fn upper_linear_limit(&self) -> f64 {
        self.upper_linear_limit
    }

    /// Lower angular limit.
    #[must_use]
    pub fn lower_angular_limit(&self) -> f64 {
        self.lower_angular_limit
    }

    /// Upper angular limit.
    #[must_use]
    pub fn upper_angular_limit(&self) -> f64 {
        self.upper_angular_limit
    }

    /// Drive the separation along the axis at `target_velocity`.
    ///
    /// `max_impulse` bounds the total motor impulse per step.
    pub fn set_linear_motor(&mut self, powered: bool, target_velocity: f64, max_impulse: f64) {
        self.powered_linear_motor = powered;
        self.target_linear_motor_velocity = target_velocity;
        self.max_linear_motor_force = max_impulse;
    }

    /// Drive the rotation of A relative to B about the axis at
    /// `target_velocity`.
    ///
    /// `max_impulse` bounds the total motor impulse per step.
    pub fn set_angular_motor(&mut self, powered: bool, target_velocity: f64, max_impulse: f64) {
        self.powered_angular_motor = powered;
        self.target_angular_motor_velocity = target_velocity;
        self.max_angular_motor_force = max_impulse;
    }

    /// Whether the linear motor is on.
    #[must_use]
    pub fn powered_linear_motor(&self) -> bool {
        self.powered_linear_motor
    }

    /// Whether the angular motor is on.
    #[must_use]
    pub fn powered_angular_motor(&self) -> bool {
        self.powered_angular_motor
    }

    /// Separation along the axis at the last build.
    #[must_use]
    pub fn linear_position(&self) -> f64 {
        self.linear_position
    }

    /// Angle past the violated angular limit at the last build.
    #[must_use]
    pub fn angular_position(&self) -> f64 {
        self.angular_position
    }

    /// Whether the last build found a linear limit violated.
    #[must_use]
    pub fn solve_linear_limit(&self) -> bool {
        self.solve_lin_lim
    }

    /// Whether the last build found an angular limit violated.
    #[must_use]
    pub fn solve_angular_limit(&self) -> bool {
        self.solve_ang_lim
    }

    /// World frame of the reference body at the last build.
    #[must_use]
    pub fn calculated_transform_a(&self) -> &Frame {
        &self.calculated_transform_a
    }

    /// World frame of the other body at the last build.
    #[must_use]
    pub fn calculated_transform_b(&self) -> &Frame {
        &self.calculated_transform_b
    }

    /// Whether limits are measured in frame A.
    #[must_use]
    pub fn use_linear_reference_frame_a(&self) -> bool {
        self.use_linear_reference_frame_a
    }

    fn build_jacobian_int(
        &mut self,
        rb_a: &RigidBody,
        rb_b: &RigidBody,
        frame_in_a: Frame,
        frame_in_b: Frame,
    ) {
        self.calculated_transform_a = frame_in_a.to_world(&rb_a.pose);
        self.calculated_transform_b = frame_in_b.to_world(&rb_b.pose);

        let pivot_a_in_w = self.calculated_transform_a.origin;
        let pivot_b_in_w = self.calculated_transform_b.origin;
        let slider_axis = self.calculated_transform_a.axis(0);
        let delta = pivot_b_in_w - pivot_a_in_w;
        let proj_pivot_in_w = pivot_a_in_w + slider_axis * slider_axis.dot(&delta);

        self.rel_pos_a = proj_pivot_in_w - rb_a.center_of_mass_position();
        self.rel_pos_b = pivot_b_in_w - rb_b.center_of_mass_position();

        let basis_a = rb_a.pose.basis();
        let basis_b = rb_b.pose.basis();
        for i in 0..3 {
            let normal = self.calculated_transform_a.axis(i);
            self.jac_lin_axes[i] = normal;
            self.jac_lin_diag_ab_inv[i] = calculate_diagonal_inv(
                &basis_a,
                &basis_b,
                &self.rel_pos_a,
                &self.rel_pos_b,
                &normal,
                rb_a.inv_inertia_local(),
                rb_a.inverse_mass(),
                rb_b.inv_inertia_local(),
                rb_b.inverse_mass(),
            );
            self.depth[i] = delta.dot(&normal);
        }

        self.test_lin_limits();
        self.test_ang_limits();

        self.k_angle = inverse_or_zero(angular_denominator(rb_a, rb_b, &slider_axis));
        self.accumulated_linear_motor_impulse = 0.0;
        self.accumulated_angular_motor_impulse = 0.0;
    }

    fn test_lin_limits(&mut self) {
        self.solve_lin_lim = false;
        self.linear_position = self.depth.x;
        if self.lower_linear_limit <= self.upper_linear_limit {
            if self.depth.x > self.upper_linear_limit {
                self.depth.x -= self.upper_linear_limit;
                self.solve_lin_lim = true;
            } else if self.depth.x < self.lower_linear_limit {
                self.depth.x -= self.lower_linear_limit;
                self.solve_lin_lim = true;
            } else {
                self.depth.x = 0.0;
            }
        } else {
            self.depth.x = 0.0;
        }
    }

    fn test_ang_limits(&mut self) {
        self.angular_position = 0.0;
        self.solve_ang_lim = false;
        if self.lower_angular_limit <= self.upper_angular_limit {
            let axis_a0 = self.calculated_transform_a.axis(1);
            let axis_a1 = self.calculated_transform_a.axis(2);
            let axis_b0 = self.calculated_transform_b.axis(1);
            let rot = axis_b0.dot(&axis_a1).atan2(axis_b0.dot(&axis_a0));
            if rot < self.lower_angular_limit {
                self.angular_position = rot - self.lower_angular_limit;
                self.solve_ang_lim = true;
            } else if rot > self.upper_angular_limit {
                self.angular_position = rot - self.upper_angular_limit;
                self.solve_ang_lim = true;
            }
        }
    }

    fn solve_constraint_int(&mut self, rb_a: &mut RigidBody, rb_b: &mut RigidBody, time_step: f64) {
        let vel = rb_a.velocity_in_local_point(&self.rel_pos_a)
            - rb_b.velocity_in_local_point(&self.rel_pos_b);

        for i in 0..3 {
            let normal = self.jac_lin_axes[i];
            let rel_vel = normal.dot(&vel);
            let params = if i != 0 {
                self.ortho_linear
            } else if self.solve_lin_lim {
                self.limit_linear
            } else {
                self.dir_linear
            };
            let impulse = params.softness
                * (params.restitution * self.depth[i] / time_step - params.damping * rel_vel)
                * self.jac_lin_diag_ab_inv[i];
            if self.base.check_breaking(impulse) {
                return;
            }
            self.base.applied_impulse += impulse;

            let impulse_vector = normal * impulse;
            rb_a.apply_impulse(&impulse_vector, &self.rel_pos_a);
            rb_b.apply_impulse(&-impulse_vector, &self.rel_pos_b);

            if i == 0
                && self.powered_linear_motor
                && self.accumulated_linear_motor_impulse < self.max_linear_motor_force
            {
                let motor_rel_vel = self.target_linear_motor_velocity + rel_vel;
                let unclamped = -motor_rel_vel * self.jac_lin_diag_ab_inv[i];
                let new_acc = (self.accumulated_linear_motor_impulse + unclamped.abs())
                    .min(self.max_linear_motor_force);
                let delta = new_acc - self.accumulated_linear_motor_impulse;
                let motor_impulse = if unclamped < 0.0 { -delta } else { delta };
                self.accumulated_linear_motor_impulse = new_acc;

                let impulse_vector = normal * motor_impulse;
                rb_a.apply_impulse(&impulse_vector, &self.rel_pos_a);
                rb_b.apply_impulse(&-impulse_vector, &self.rel_pos_b);
            }
        }

        let axis_a = self.calculated_transform_a.axis(0);
        let axis_b = self.calculated_transform_b.axis(0);
        let ang_vel_a = rb_a.angular_velocity;
        let ang_vel_b = rb_b.angular_velocity;

        let ang_vel_around_axis_a = axis_a * axis_a.dot(&ang_vel_a);
        let ang_vel_around_axis_b = axis_b * axis_b.dot(&ang_vel_b);

        let mut vel_rel_orthogonal =
            (ang_vel_a - ang_vel_around_axis_a) - (ang_vel_b - ang_vel_around_axis_b);
        let len = vel_rel_orthogonal.norm();
        if len > ANGULAR_EPSILON {
            let normal = vel_rel_orthogonal / len;
            let denominator = angular_denominator(rb_a, rb_b, &normal);
            vel_rel_orthogonal *= inverse_or_zero(denominator)
                * self.ortho_angular.damping
                * self.ortho_angular.softness;
        } else {
            vel_rel_orthogonal = Vector3::zeros();
        }

        let mut angular_error = axis_a.cross(&axis_b) / time_step;
        let len2 = angular_error.norm();
        if len2 > ANGULAR_EPSILON {
            let normal = angular_error / len2;
            let denominator = angular_denominator(rb_a, rb_b, &normal);
            angular_error *= inverse_or_zero(denominator)
                * self.ortho_angular.restitution
                * self.ortho_angular.softness;
        } else {
            angular_error = Vector3::zeros();
        }

        rb_a.apply_torque_impulse(&(angular_error - vel_rel_orthogonal));
        rb_b.apply_torque_impulse(&(vel_rel_orthogonal - angular_error));

        let params = if self.solve_ang_lim {
            self.limit_angular
        } else {
            self.dir_angular
        };
        let impulse_mag = ((ang_vel_b - ang_vel_a).dot(&axis_a) * params.damping
            + self.angular_position * params.restitution / time_step)
            * self.k_angle
            * params.softness;
        if self.base.check_breaking(impulse_mag) {
            return;
        }
        let impulse = axis_a * impulse_mag;
        rb_a.apply_torque_impulse(&impulse);
        rb_b.apply_torque_impulse(&-impulse);

        if self.powered_angular_motor
            && self.accumulated_angular_motor_impulse < self.max_angular_motor_force
        {
            let proj_rel_vel = (ang_vel_around_axis_a - ang_vel_around_axis_b).dot(&axis_a);
            let unclamped = self.k_angle * (self.target_angular_motor_velocity - proj_rel_vel);
            if self.base.check_breaking(unclamped) {
                return;
            }
            let new_acc = (self.accumulated_angular_motor_impulse + unclamped.abs())
                .min(self.max_angular_motor_force);
            let delta = new_acc - self.accumulated_angular_motor_impulse;
            let motor_impulse = if unclamped < 0.0 { -delta } else { delta };
            self.accumulated_angular_motor_impulse = new_acc;

            let impulse = axis_a * motor_impulse;
            rb_a.apply_torque_impulse(&impulse);
            rb_b.apply_torque_impulse(&-impulse);
        }
    }
}

impl TypedConstraint for SliderConstraint {
    fn constraint_type(&self) -> ConstraintType {
        ConstraintType::Slider
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
        if self.use_linear_reference_frame_a {
            self.build_jacobian_int(rb_a, rb_b, self.frame_a, self.frame_b);
        } else {
            self.build_jacobian_int(rb_b, rb_a, self.frame_b, self.frame_a);
        }
    }

    fn solve_constraint(&mut self, bodies: &mut RigidBodySet, time_step: f64) {
        if self.base.is_broken {
            return;
        }
        let Some((rb_a, rb_b)) = bodies.pair_mut(self.base.body_a, self.base.body_b) else {
            return;
        };
        if self.use_linear_reference_frame_a {
            self.solve_constraint_int(rb_a, rb_b, time_step);
        } else {
            self.solve_constraint_int(rb_b, rb_a, time_step);
        }
    }
}
