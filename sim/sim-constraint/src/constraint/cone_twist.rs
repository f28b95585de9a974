//! Ball joint with an elliptical swing cone and a twist limit.

use nalgebra::Vector3;
use sim_types::{
    BodyId, ContactSolverInfo, Pose, RigidBody, RigidBodySet,
    math::shortest_arc,
};

use super::{
    ConstraintBase, ConstraintType, Frame, PivotRows, TypedConstraint, angular_denominator,
    body_pair, inverse_or_zero,
};

/// Spans below this are treated as locked.
const MIN_SPAN: f64 = 0.05;

/// Small-angle damping of the swing estimate near the cone axis.
const SWING_THRESHOLD: f64 = 10.0;

/// Shoulder-style joint.
///
/// The x axis of frame B must stay inside an elliptical cone around the x axis
/// of frame A, with half-angles `swing_span1` (towards A's y) and
/// `swing_span2` (towards A's z). Rotation of B about its own x axis is
/// limited to `±twist_span`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConeTwistConstraint {
    base: ConstraintBase,
    frame_a: Frame,
    frame_b: Frame,
    linear_rows: PivotRows,

    limit_softness: f64,
    bias_factor: f64,
    relaxation_factor: f64,

    swing_span1: f64,
    swing_span2: f64,
    twist_span: f64,

    swing_axis: Vector3<f64>,
    twist_axis: Vector3<f64>,
    k_swing: f64,
    k_twist: f64,

    twist_limit_sign: f64,
    swing_correction: f64,
    twist_correction: f64,
    acc_swing_limit_impulse: f64,
    acc_twist_limit_impulse: f64,

    angular_only: bool,
    solve_twist_limit: bool,
    solve_swing_limit: bool,
}

impl ConeTwistConstraint {
    fn with_frames(body_a: BodyId, body_b: BodyId, frame_a: Frame, frame_b: Frame) -> Self {
        Self {
            base: ConstraintBase::new(body_a, body_b),
            frame_a,
            frame_b,
            linear_rows: PivotRows::default(),
            limit_softness: 0.8,
            bias_factor: 0.3,
            relaxation_factor: 1.0,
            swing_span1: 1e308,
            swing_span2: 1e308,
            twist_span: 1e308,
            swing_axis: Vector3::zeros(),
            twist_axis: Vector3::zeros(),
            k_swing: 0.0,
            k_twist: 0.0,
            twist_limit_sign: 0.0,
            swing_correction: 0.0,
            twist_correction: 0.0,
            acc_swing_limit_impulse: 0.0,
            acc_twist_limit_impulse: 0.0,
            angular_only: false,
            solve_twist_limit: false,
            solve_swing_limit: false,
        }
    }

    /// Joint between two bodies from frames in each body's space.
    #[must_use]
    pub fn new(body_a: BodyId, body_b: BodyId, frame_a: &Pose, frame_b: &Pose) -> Self {
        Self::with_frames(body_a, body_b, Frame::from_pose(frame_a), Frame::from_pose(frame_b))
    }

    /// Joint between body A and the world, fixed at the current world
    /// placement of `frame_a`.
    #[must_use]
    pub fn with_fixed(body_a: BodyId, rb_a: &RigidBody, frame_a: &Pose) -> Self {
        let frame_a = Frame::from_pose(frame_a);
        let frame_b = frame_a.to_world(&rb_a.pose);
        Self::with_frames(body_a, BodyId::FIXED, frame_a, frame_b)
    }

    /// Set spans with default softness (0.8), bias (0.3) and relaxation (1).
    #[must_use]
    pub fn with_limit(mut self, swing_span1: f64, swing_span2: f64, twist_span: f64) -> Self {
        self.set_limit(swing_span1, swing_span2, twist_span, 0.8, 0.3, 1.0);
        self
    }

    /// Set the cone half-angles, twist span and solver factors.
    pub fn set_limit(
        &mut self,
        swing_span1: f64,
        swing_span2: f64,
        twist_span: f64,
        softness: f64,
        bias: f64,
        relaxation: f64,
    ) {
        self.swing_span1 = swing_span1;
        self.swing_span2 = swing_span2;
        self.twist_span = twist_span;
        self.limit_softness = softness;
        self.bias_factor = bias;
        self.relaxation_factor = relaxation;
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

    /// Whether the last build found the swing outside the cone.
    #[must_use]
    pub fn solve_swing_limit(&self) -> bool {
        self.solve_swing_limit
    }

    /// Whether the last build found the twist past its span.
    #[must_use]
    pub fn solve_twist_limit(&self) -> bool {
        self.solve_twist_limit
    }

    /// -1 past the negative twist span, +1 past the positive one.
    #[must_use]
    pub fn twist_limit_sign(&self) -> f64 {
        self.twist_limit_sign
    }

    /// Half-angle of the cone towards frame A's y axis.
    #[must_use]
    pub fn swing_span1(&self) -> f64 {
        self.swing_span1
    }

    /// Half-angle of the cone towards frame A's z axis.
    #[must_use]
    pub fn swing_span2(&self) -> f64 {
        self.swing_span2
    }

    /// Allowed twist either way.
    #[must_use]
    pub fn twist_span(&self) -> f64 {
        self.twist_span
    }

    #[allow(clippy::too_many_arguments)]
    fn solve_limit_row(
        rb_a: &mut RigidBody,
        rb_b: &mut RigidBody,
        axis: &Vector3<f64>,
        amplitude_scale: f64,
        correction_velocity: f64,
        k: f64,
        accumulated: &mut f64,
        base: &mut ConstraintBase,
    ) {
        let rel = rb_b.angular_velocity - rb_a.angular_velocity;
        let amplitude = rel.dot(axis) * amplitude_scale + correction_velocity;

        let previous = *accumulated;
        *accumulated = (*accumulated + amplitude * k).max(0.0);
        let impulse_mag = *accumulated - previous;

        if base.check_breaking(impulse_mag) {
            return;
        }
        let impulse = axis * impulse_mag;
        rb_a.apply_torque_impulse(&impulse);
        rb_b.apply_torque_impulse(&-impulse);
    }
}

/// Swing angle of `b2_axis1` towards `b1_axis_other`, damped near the cone axis.
fn damped_swing(b2_axis1: &Vector3<f64>, b1_axis1: &Vector3<f64>, b1_axis_other: &Vector3<f64>) -> f64 {
    let swx = b2_axis1.dot(b1_axis1);
    let swy = b2_axis1.dot(b1_axis_other);
    let fact = (swy * swy + swx * swx) * SWING_THRESHOLD * SWING_THRESHOLD;
    swy.atan2(swx) * (fact / (fact + 1.0))
}

impl TypedConstraint for ConeTwistConstraint {
    fn constraint_type(&self) -> ConstraintType {
        ConstraintType::ConeTwist
    }

    fn base(&self) -> &ConstraintBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ConstraintBase {
        &mut self.base
    }

    fn build_jacobian(&mut self, bodies: &RigidBodySet, _info: &ContactSolverInfo) {
        self.base.applied_impulse = 0.0;

        self.swing_correction = 0.0;
        self.twist_limit_sign = 0.0;
        self.solve_twist_limit = false;
        self.solve_swing_limit = false;
        self.acc_twist_limit_impulse = 0.0;
        self.acc_swing_limit_impulse = 0.0;

        let Some((rb_a, rb_b)) = body_pair(bodies, self.base.body_a, self.base.body_b) else {
            return;
        };

        if !self.angular_only {
            self.linear_rows =
                PivotRows::build(rb_a, rb_b, &self.frame_a.origin, &self.frame_b.origin);
        }

        let b1_axis1 = rb_a.pose.transform_vector(&self.frame_a.axis(0));
        let b1_axis2 = rb_a.pose.transform_vector(&self.frame_a.axis(1));
        let b1_axis3 = rb_a.pose.transform_vector(&self.frame_a.axis(2));
        let b2_axis1 = rb_b.pose.transform_vector(&self.frame_b.axis(0));

        let swing1 = if self.swing_span1 >= MIN_SPAN {
            damped_swing(&b2_axis1, &b1_axis1, &b1_axis2)
        } else {
            0.0
        };
        let swing2 = if self.swing_span2 >= MIN_SPAN {
            damped_swing(&b2_axis1, &b1_axis1, &b1_axis3)
        } else {
            0.0
        };

        // a span below MIN_SPAN leaves its axis free and adds no term
        let ellipse_term = |swing: f64, span: f64| {
            if span >= MIN_SPAN { swing * swing / (span * span) } else { 0.0 }
        };
        let ellipse_angle =
            ellipse_term(swing1, self.swing_span1) + ellipse_term(swing2, self.swing_span2);

        if ellipse_angle > 1.0 {
            self.swing_correction = ellipse_angle - 1.0;
            self.solve_swing_limit = true;

            let projected = b1_axis2 * b2_axis1.dot(&b1_axis2) + b1_axis3 * b2_axis1.dot(&b1_axis3);
            let swing_axis = b2_axis1.cross(&projected);
            let norm = swing_axis.norm();
            let sign = if b2_axis1.dot(&b1_axis1) >= 0.0 { 1.0 } else { -1.0 };
            self.swing_axis = if norm > 0.0 { swing_axis * (sign / norm) } else { Vector3::zeros() };

            self.k_swing = inverse_or_zero(angular_denominator(rb_a, rb_b, &self.swing_axis));
        }

        if self.twist_span >= 0.0 {
            let b2_axis2 = rb_b.pose.transform_vector(&self.frame_b.axis(1));
            let rotation_arc = shortest_arc(&b2_axis1, &b1_axis1);
            let twist_ref = rotation_arc * b2_axis2;
            let twist = twist_ref.dot(&b1_axis3).atan2(twist_ref.dot(&b1_axis2));

            let locked_free_factor = if self.twist_span > MIN_SPAN { self.limit_softness } else { 0.0 };
            let mid_axis = (b2_axis1 + b1_axis1) * 0.5;
            let mid_norm = mid_axis.norm();
            let mid_axis = if mid_norm > 0.0 { mid_axis / mid_norm } else { b1_axis1 };

            if twist <= -self.twist_span * locked_free_factor {
                self.twist_correction = -(twist + self.twist_span);
                self.solve_twist_limit = true;
                self.twist_limit_sign = -1.0;
                self.twist_axis = -mid_axis;
            } else if twist > self.twist_span * locked_free_factor {
                self.twist_correction = twist - self.twist_span;
                self.solve_twist_limit = true;
                self.twist_limit_sign = 1.0;
                self.twist_axis = mid_axis;
            }
            if self.solve_twist_limit {
                self.k_twist = inverse_or_zero(angular_denominator(rb_a, rb_b, &self.twist_axis));
            }
        }
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

        let amplitude_scale = self.relaxation_factor * self.relaxation_factor;

        if self.solve_swing_limit {
            Self::solve_limit_row(
                rb_a,
                rb_b,
                &self.swing_axis,
                amplitude_scale,
                self.swing_correction / time_step * self.bias_factor,
                self.k_swing,
                &mut self.acc_swing_limit_impulse,
                &mut self.base,
            );
        }

        if self.solve_twist_limit && !self.base.is_broken {
            Self::solve_limit_row(
                rb_a,
                rb_b,
                &self.twist_axis,
                amplitude_scale,
                self.twist_correction / time_step * self.bias_factor,
                self.k_twist,
                &mut self.acc_twist_limit_impulse,
                &mut self.base,
            );
        }
    }
}
