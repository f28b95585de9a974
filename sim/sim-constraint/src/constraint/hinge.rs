//! Revolute joint with optional angular limit and motor.

use nalgebra::{Point3, Vector3};
use sim_types::{
    BodyId, ContactSolverInfo, Pose, RigidBody, RigidBodySet,
    math::{EPSILON, shortest_arc},
};

use super::{
    ConstraintBase, ConstraintType, Frame, PivotRows, TypedConstraint, angular_denominator,
    body_pair, inverse_or_zero,
};

/// Below this length an angular correction direction is ignored.
const ANGULAR_EPSILON: f64 = 1e-5;

/// Revolute joint: the frames' origins coincide and their z axes stay
/// aligned, leaving rotation about that axis free.
///
/// # Constraint Formulation
///
/// - 3 linear rows keep the pivots together (skipped when `angular_only`)
/// - 2 angular rows remove relative rotation orthogonal to the hinge axis
/// - 1 optional limit row on the hinge angle
/// - 1 optional velocity motor about the hinge axis
///
/// Frame B's z axis points opposite to frame A's; the constructors take care
/// of that, so callers pass frames whose z axes agree.
#[derive(Debug, Clone, PartialEq)]
pub struct HingeConstraint {
    base: ConstraintBase,
    frame_a: Frame,
    frame_b: Frame,
    linear_rows: PivotRows,

    motor_target_velocity: f64,
    max_motor_impulse: f64,
    enable_angular_motor: bool,

    limit_softness: f64,
    bias_factor: f64,
    relaxation_factor: f64,
    lower_limit: f64,
    upper_limit: f64,

    k_hinge: f64,
    limit_sign: f64,
    correction: f64,
    acc_limit_impulse: f64,
    solve_limit: bool,

    angular_only: bool,
}

/// Frame for a hinge on one body: origin at the pivot, z along `axis`.
fn frame_from_axis(pivot: Point3<f64>, axis: &Vector3<f64>) -> Frame {
    let reference = Vector3::x();
    let projection = axis.dot(&reference);

    let (axis1, axis2) = if projection >= 1.0 - EPSILON {
        (-Vector3::z(), Vector3::y())
    } else if projection <= -1.0 + EPSILON {
        (Vector3::z(), Vector3::y())
    } else {
        let axis2 = axis.cross(&reference).normalize();
        (axis2.cross(axis), axis2)
    };
    Frame::from_columns(&axis1, &axis2, axis, pivot)
}

fn flip_axis(mut frame: Frame) -> Frame {
    frame.basis.set_column(2, &-frame.axis(2));
    frame
}

impl HingeConstraint {
    fn with_frames(body_a: BodyId, body_b: BodyId, frame_a: Frame, frame_b: Frame) -> Self {
        Self {
            base: ConstraintBase::new(body_a, body_b),
            frame_a,
            frame_b,
            linear_rows: PivotRows::default(),
            motor_target_velocity: 0.0,
            max_motor_impulse: 0.0,
            enable_angular_motor: false,
            // start free
            limit_softness: 0.9,
            bias_factor: 0.3,
            relaxation_factor: 1.0,
            lower_limit: 1e308,
            upper_limit: -1e308,
            k_hinge: 0.0,
            limit_sign: 0.0,
            correction: 0.0,
            acc_limit_impulse: 0.0,
            solve_limit: false,
            angular_only: false,
        }
    }

    /// Hinge between two bodies from pivots and axes in each body's frame.
    ///
    /// The current configuration is the zero angle.
    #[must_use]
    pub fn new(
        body_a: BodyId,
        body_b: BodyId,
        pivot_in_a: Point3<f64>,
        pivot_in_b: Point3<f64>,
        axis_in_a: &Vector3<f64>,
        axis_in_b: &Vector3<f64>,
    ) -> Self {
        let axis_a = axis_in_a.normalize();
        let axis_b = axis_in_b.normalize();
        let frame_a = frame_from_axis(pivot_in_a, &axis_a);

        let rotation_arc = shortest_arc(&axis_a, &axis_b);
        let axis_b1 = rotation_arc * frame_a.axis(0);
        let axis_b2 = axis_b.cross(&axis_b1);
        let frame_b = Frame::from_columns(&axis_b1, &axis_b2, &-axis_b, pivot_in_b);

        Self::with_frames(body_a, body_b, frame_a, frame_b)
    }

    /// Hinge between body A and the world, fixed at the current world
    /// position and direction of the pivot and axis.
    #[must_use]
    pub fn with_fixed(
        body_a: BodyId,
        rb_a: &RigidBody,
        pivot_in_a: Point3<f64>,
        axis_in_a: &Vector3<f64>,
    ) -> Self {
        let frame_a = frame_from_axis(pivot_in_a, &axis_in_a.normalize());
        let frame_b = flip_axis(frame_a.to_world(&rb_a.pose));
        Self::with_frames(body_a, BodyId::FIXED, frame_a, frame_b)
    }

    /// Hinge between two bodies from full frames (z is the hinge axis).
    #[must_use]
    pub fn from_frames(body_a: BodyId, body_b: BodyId, frame_a: &Pose, frame_b: &Pose) -> Self {
        Self::with_frames(
            body_a,
            body_b,
            Frame::from_pose(frame_a),
            flip_axis(Frame::from_pose(frame_b)),
        )
    }

    /// Hinge between body A and the world from a frame on A.
    #[must_use]
    pub fn from_frame(body_a: BodyId, rb_a: &RigidBody, frame_a: &Pose) -> Self {
        let frame_a = Frame::from_pose(frame_a);
        let frame_b = flip_axis(frame_a.to_world(&rb_a.pose));
        Self::with_frames(body_a, BodyId::FIXED, frame_a, frame_b)
    }

    /// Set the angular limit with default softness, bias and relaxation.
    #[must_use]
    pub fn with_limit(mut self, low: f64, high: f64) -> Self {
        self.set_limit(low, high, 0.9, 0.3, 1.0);
        self
    }

    /// Set the angular limit.
    ///
    /// `low > high` leaves the hinge free; `low == high` locks it.
    pub fn set_limit(&mut self, low: f64, high: f64, softness: f64, bias: f64, relaxation: f64) {
        self.lower_limit = low;
        self.upper_limit = high;
        self.limit_softness = softness;
        self.bias_factor = bias;
        self.relaxation_factor = relaxation;
    }

    /// Drive the relative angular velocity about the hinge axis.
    pub fn enable_angular_motor(&mut self, enable: bool, target_velocity: f64, max_motor_impulse: f64) {
        self.enable_angular_motor = enable;
        self.motor_target_velocity = target_velocity;
        self.max_motor_impulse = max_motor_impulse;
    }

    /// Skip the linear rows.
    pub fn set_angular_only(&mut self, angular_only: bool) {
        self.angular_only = angular_only;
    }

    /// Whether the linear rows are skipped.
    #[must_use]
    pub fn angular_only(&self) -> bool {
        self.angular_only
    }

    /// Whether the motor is on.
    #[must_use]
    pub fn angular_motor_enabled(&self) -> bool {
        self.enable_angular_motor
    }

    /// Motor target velocity.
    #[must_use]
    pub fn motor_target_velocity(&self) -> f64 {
        self.motor_target_velocity
    }

    /// Motor impulse cap per iteration.
    #[must_use]
    pub fn max_motor_impulse(&self) -> f64 {
        self.max_motor_impulse
    }

    /// Lower angle limit.
    #[must_use]
    pub fn lower_limit(&self) -> f64 {
        self.lower_limit
    }

    /// Upper angle limit.
    #[must_use]
    pub fn upper_limit(&self) -> f64 {
        self.upper_limit
    }

    /// Whether the last build found the hinge against a limit.
    #[must_use]
    pub fn solve_limit(&self) -> bool {
        self.solve_limit
    }

    /// +1 at the lower limit, -1 at the upper, 0 otherwise.
    #[must_use]
    pub fn limit_sign(&self) -> f64 {
        self.limit_sign
    }

    /// Joint frame on body A.
    #[must_use]
    pub fn frame_a(&self) -> &Frame {
        &self.frame_a
    }

    /// Joint frame on body B (z axis flipped).
    #[must_use]
    pub fn frame_b(&self) -> &Frame {
        &self.frame_b
    }

    /// Current angle of A relative to B about the hinge axis.
    #[must_use]
    pub fn hinge_angle(&self, bodies: &RigidBodySet) -> f64 {
        body_pair(bodies, self.base.body_a, self.base.body_b)
            .map_or(0.0, |(rb_a, rb_b)| self.angle_between(&rb_a.pose, &rb_b.pose))
    }

    fn angle_between(&self, pose_a: &Pose, pose_b: &Pose) -> f64 {
        let ref_axis0 = pose_a.transform_vector(&self.frame_a.axis(0));
        let ref_axis1 = pose_a.transform_vector(&self.frame_a.axis(1));
        let swing_axis = pose_b.transform_vector(&self.frame_b.axis(1));
        swing_axis.dot(&ref_axis0).atan2(swing_axis.dot(&ref_axis1))
    }
}

impl TypedConstraint for HingeConstraint {
    fn constraint_type(&self) -> ConstraintType {
        ConstraintType::Hinge
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

        if !self.angular_only {
            self.linear_rows =
                PivotRows::build(rb_a, rb_b, &self.frame_a.origin, &self.frame_b.origin);
        }

        let hinge_angle = self.angle_between(&rb_a.pose, &rb_b.pose);

        self.correction = 0.0;
        self.limit_sign = 0.0;
        self.solve_limit = false;
        self.acc_limit_impulse = 0.0;

        if self.lower_limit <= self.upper_limit {
            if hinge_angle <= self.lower_limit * self.limit_softness {
                self.correction = self.lower_limit - hinge_angle;
                self.limit_sign = 1.0;
                self.solve_limit = true;
            } else if hinge_angle >= self.upper_limit * self.limit_softness {
                self.correction = self.upper_limit - hinge_angle;
                self.limit_sign = -1.0;
                self.solve_limit = true;
            }
        }

        let axis_a = rb_a.pose.transform_vector(&self.frame_a.axis(2));
        self.k_hinge = inverse_or_zero(angular_denominator(rb_a, rb_b, &axis_a));
    }

    fn solve_constraint(&mut self, bodies: &mut RigidBodySet, time_step: f64) {
        if self.base.is_broken {
            return;
        }
        let Some((rb_a, rb_b)) = bodies.pair_mut(self.base.body_a, self.base.body_b) else {
            return;
        };

        if !self.angular_only
            && !self.linear_rows.solve(
                &mut self.base,
                rb_a,
                rb_b,
                &self.frame_a.origin,
                &self.frame_b.origin,
                time_step,
            )
        {
            return;
        }

        let axis_a = rb_a.pose.transform_vector(&self.frame_a.axis(2));
        let axis_b = rb_b.pose.transform_vector(&self.frame_b.axis(2));

        // orthogonal angular velocity correction
        let ang_vel_a = rb_a.angular_velocity;
        let ang_vel_b = rb_b.angular_velocity;
        let ortho_a = ang_vel_a - axis_a * axis_a.dot(&ang_vel_a);
        let ortho_b = ang_vel_b - axis_b * axis_b.dot(&ang_vel_b);
        let mut vel_rel_orthogonal = ortho_a - ortho_b;

        let len = vel_rel_orthogonal.norm();
        if len > ANGULAR_EPSILON {
            let normal = vel_rel_orthogonal / len;
            let denominator = angular_denominator(rb_a, rb_b, &normal);
            if denominator > 0.0 {
                vel_rel_orthogonal *= self.relaxation_factor / denominator;
            }
        }

        // angular positional correction
        let mut angular_error = -axis_a.cross(&axis_b) / time_step;
        let len2 = angular_error.norm();
        if len2 > ANGULAR_EPSILON {
            let normal = angular_error / len2;
            let denominator = angular_denominator(rb_a, rb_b, &normal);
            if denominator > 0.0 {
                angular_error /= denominator;
            }
        }

        rb_a.apply_torque_impulse(&(angular_error - vel_rel_orthogonal));
        rb_b.apply_torque_impulse(&(vel_rel_orthogonal - angular_error));

        if self.solve_limit {
            let rel = rb_b.angular_velocity - rb_a.angular_velocity;
            let amplitude = (rel.dot(&axis_a) * self.relaxation_factor
                + self.correction / time_step * self.bias_factor)
                * self.limit_sign;

            let impulse_mag = amplitude * self.k_hinge;
            if self.base.check_breaking(impulse_mag) {
                return;
            }
            let previous = self.acc_limit_impulse;
            self.acc_limit_impulse = (self.acc_limit_impulse + impulse_mag).max(0.0);
            let impulse_mag = self.acc_limit_impulse - previous;

            let impulse = axis_a * (impulse_mag * self.limit_sign);
            rb_a.apply_torque_impulse(&impulse);
            rb_b.apply_torque_impulse(&-impulse);
        }

        if self.enable_angular_motor {
            let proj_rel_vel = (rb_a.angular_velocity - rb_b.angular_velocity).dot(&axis_a);
            let motor_rel_vel = self.motor_target_velocity - proj_rel_vel;

            let unclipped = self.k_hinge * motor_rel_vel;
            if self.base.check_breaking(unclipped) {
                return;
            }
            let clipped = unclipped.min(self.max_motor_impulse).max(-self.max_motor_impulse);
            let motor_imp = axis_a * clipped;
            rb_a.apply_torque_impulse(&motor_imp);
            rb_b.apply_torque_impulse(&-motor_imp);
        }
    }
}
