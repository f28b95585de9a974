//! Six-degree-of-freedom joint with per-axis limits and motors.

use nalgebra::{Point3, Vector3};
use sim_contact::{calculate_angular_diagonal_inv, calculate_diagonal_inv};
use sim_types::{
    BodyId, ContactSolverInfo, Pose, RigidBody, RigidBodySet, math::matrix_to_euler_xyz,
};

use super::{ConstraintBase, ConstraintType, Frame, TypedConstraint, body_pair};
use crate::limit_motor::{RotationalLimitMotor, TranslationalLimitMotor};

/// Joint whose six relative degrees of freedom are each free, limited or
/// locked.
///
/// Axes 0..3 are the linear axes of frame A (or B, see
/// [`use_linear_reference_frame_a`](Self::use_linear_reference_frame_a)),
/// measured as `A⁻¹ · (origin_B - origin_A)`. Axes 3..6 are XYZ Euler angles
/// of frame A relative to frame B.
///
/// An axis is free when its lower limit exceeds its upper limit, locked when
/// they are equal, and ranged otherwise. By default the linear axes are
/// locked at zero and the angular axes are free, which makes a ball joint.
///
/// # Example
///
/// ```
/// use sim_constraint::Generic6DofConstraint;
/// use sim_types::{BodyId, Pose};
///
/// let mut joint = Generic6DofConstraint::new(
///     BodyId::new(0),
///     BodyId::new(1),
///     &Pose::identity(),
///     &Pose::identity(),
///     true,
/// );
/// // allow rotation about the x axis only
/// joint.set_limit(3, -0.5, 0.5);
/// joint.set_limit(4, 0.0, 0.0);
/// joint.set_limit(5, 0.0, 0.0);
/// assert!(joint.is_limited(3));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Generic6DofConstraint {
    base: ConstraintBase,
    frame_a: Frame,
    frame_b: Frame,

    linear_limits: TranslationalLimitMotor,
    angular_limits: [RotationalLimitMotor; 3],

    jac_linear: [f64; 3],
    jac_angular: [f64; 3],

    calculated_transform_a: Frame,
    calculated_transform_b: Frame,
    calculated_axis_angle_diff: Vector3<f64>,
    calculated_axis: [Vector3<f64>; 3],
    calculated_linear_diff: Vector3<f64>,
    anchor_pos: Point3<f64>,

    use_linear_reference_frame_a: bool,
}

impl Generic6DofConstraint {
    /// Joint between two bodies from frames in each body's space.
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
            linear_limits: TranslationalLimitMotor::default(),
            angular_limits: [RotationalLimitMotor::default(); 3],
            jac_linear: [0.0; 3],
            jac_angular: [0.0; 3],
            calculated_transform_a: Frame::identity(),
            calculated_transform_b: Frame::identity(),
            calculated_axis_angle_diff: Vector3::zeros(),
            calculated_axis: [Vector3::x(), Vector3::y(), Vector3::z()],
            calculated_linear_diff: Vector3::zeros(),
            anchor_pos: Point3::origin(),
            use_linear_reference_frame_a,
        }
    }

    /// Set the limits of axis `axis` (0..3 linear, 3..6 angular).
    ///
    /// Out-of-range axes are ignored.
    pub fn set_limit(&mut self, axis: usize, lo: f64, hi: f64) {
        match axis {
            0..=2 => {
                self.linear_limits.lower_limit[axis] = lo;
                self.linear_limits.upper_limit[axis] = hi;
            }
            3..=5 => {
                let motor = &mut self.angular_limits[axis - 3];
                motor.lo_limit = lo;
                motor.hi_limit = hi;
            }
            _ => {}
        }
    }

    /// Whether axis `axis` (0..6) has an active range.
    #[must_use]
    pub fn is_limited(&self, axis: usize) -> bool {
        match axis {
            0..=2 => self.linear_limits.is_limited(axis),
            3..=5 => self.angular_limits[axis - 3].is_limited(),
            _ => false,
        }
    }

    /// Set all three linear lower limits.
    pub fn set_linear_lower_limit(&mut self, lower: Vector3<f64>) {
        self.linear_limits.lower_limit = lower;
    }

    /// Set all three linear upper limits.
    pub fn set_linear_upper_limit(&mut self, upper: Vector3<f64>) {
        self.linear_limits.upper_limit = upper;
    }

    /// Set all three angular lower limits.
    pub fn set_angular_lower_limit(&mut self, lower: Vector3<f64>) {
        for (motor, lo) in self.angular_limits.iter_mut().zip(lower.iter()) {
            motor.lo_limit = *lo;
        }
    }

    /// Set all three angular upper limits.
    pub fn set_angular_upper_limit(&mut self, upper: Vector3<f64>) {
        for (motor, hi) in self.angular_limits.iter_mut().zip(upper.iter()) {
            motor.hi_limit = *hi;
        }
    }

    /// Linear lower limits.
    #[must_use]
    pub fn linear_lower_limit(&self) -> Vector3<f64> {
        self.linear_limits.lower_limit
    }

    /// Linear upper limits.
    #[must_use]
    pub fn linear_upper_limit(&self) -> Vector3<f64> {
        self.linear_limits.upper_limit
    }

    /// Angular lower limits.
    #[must_use]
    pub fn angular_lower_limit(&self) -> Vector3<f64> {
        Vector3::from_fn(|i, _| self.angular_limits[i].lo_limit)
    }

    /// Angular upper limits.
    #[must_use]
    pub fn angular_upper_limit(&self) -> Vector3<f64> {
        Vector3::from_fn(|i, _| self.angular_limits[i].hi_limit)
    }

    /// Limit motor of angular axis `index` (0..3).
    #[must_use]
    pub fn rotational_limit_motor(&self, index: usize) -> &RotationalLimitMotor {
        &self.angular_limits[index]
    }

    /// Mutable limit motor of angular axis `index` (0..3).
    pub fn rotational_limit_motor_mut(&mut self, index: usize) -> &mut RotationalLimitMotor {
        &mut self.angular_limits[index]
    }

    /// Linear limits and motors.
    #[must_use]
    pub fn translational_limit_motor(&self) -> &TranslationalLimitMotor {
        &self.linear_limits
    }

    /// Mutable linear limits and motors.
    pub fn translational_limit_motor_mut(&mut self) -> &mut TranslationalLimitMotor {
        &mut self.linear_limits
    }

    /// Euler angle of axis `index` (0..3) from the last transform update.
    #[must_use]
    pub fn angle(&self, index: usize) -> f64 {
        self.calculated_axis_angle_diff[index]
    }

    /// World rotation axis of Euler angle `index` (0..3).
    #[must_use]
    pub fn axis(&self, index: usize) -> Vector3<f64> {
        self.calculated_axis[index]
    }

    /// Component `index` of `origin_B - origin_A` in frame A.
    #[must_use]
    pub fn relative_pivot_position(&self, index: usize) -> f64 {
        self.calculated_linear_diff[index]
    }

    /// Frame A in world space from the last transform update.
    #[must_use]
    pub fn calculated_transform_a(&self) -> &Frame {
        &self.calculated_transform_a
    }

    /// Frame B in world space from the last transform update.
    #[must_use]
    pub fn calculated_transform_b(&self) -> &Frame {
        &self.calculated_transform_b
    }

    /// Frame A in body A's space.
    #[must_use]
    pub fn frame_offset_a(&self) -> &Frame {
        &self.frame_a
    }

    /// Frame B in body B's space.
    #[must_use]
    pub fn frame_offset_b(&self) -> &Frame {
        &self.frame_b
    }

    /// Whether linear axes come from frame A rather than frame B.
    #[must_use]
    pub fn use_linear_reference_frame_a(&self) -> bool {
        self.use_linear_reference_frame_a
    }

    /// Recompute the world frames, the Euler angles and axes, and the
    /// linear offset from the bodies' current poses.
    pub fn update_transforms(&mut self, bodies: &RigidBodySet) {
        if let Some((rb_a, rb_b)) = body_pair(bodies, self.base.body_a, self.base.body_b) {
            self.calculate_transforms(rb_a, rb_b);
        }
    }

    pub(crate) fn calculate_transforms(&mut self, rb_a: &RigidBody, rb_b: &RigidBody) {
        self.calculated_transform_a = self.frame_a.to_world(&rb_a.pose);
        self.calculated_transform_b = self.frame_b.to_world(&rb_b.pose);

        let basis_a = self.calculated_transform_a.basis;
        let basis_b = self.calculated_transform_b.basis;

        self.calculated_linear_diff = basis_a.transpose()
            * (self.calculated_transform_b.origin - self.calculated_transform_a.origin);

        let relative = basis_a.transpose() * basis_b;
        let (angles, _unique) = matrix_to_euler_xyz(&relative);
        self.calculated_axis_angle_diff = angles;

        let axis0 = basis_b.column(0).into_owned();
        let axis2 = basis_a.column(2).into_owned();
        let axis1 = axis2.cross(&axis0);
        self.calculated_axis = [axis1.cross(&axis2), axis1, axis0.cross(&axis1)]
            .map(|axis| axis.try_normalize(0.0).unwrap_or(axis));
    }

    fn calc_anchor_pos(&mut self, rb_a: &RigidBody, rb_b: &RigidBody) {
        let im_a = rb_a.inverse_mass();
        let im_b = rb_b.inverse_mass();
        let weight = if im_b == 0.0 { 1.0 } else { im_a / (im_a + im_b) };
        let p_a = self.calculated_transform_a.origin.coords;
        let p_b = self.calculated_transform_b.origin.coords;
        self.anchor_pos = Point3::from(p_a * weight + p_b * (1.0 - weight));
    }

    fn linear_axis(&self, index: usize) -> Vector3<f64> {
        if self.use_linear_reference_frame_a {
            self.calculated_transform_a.axis(index)
        } else {
            self.calculated_transform_b.axis(index)
        }
    }
}

impl TypedConstraint for Generic6DofConstraint {
    fn constraint_type(&self) -> ConstraintType {
        ConstraintType::D6
    }

    fn base(&self) -> &ConstraintBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ConstraintBase {
        &mut self.base
    }

    fn build_jacobian(&mut self, bodies: &RigidBodySet, _info: &ContactSolverInfo) {
        self.base.applied_impulse = 0.0;
        self.linear_limits.reset_accumulators();
        for motor in &mut self.angular_limits {
            motor.accumulated_impulse = 0.0;
        }

        let Some((rb_a, rb_b)) = body_pair(bodies, self.base.body_a, self.base.body_b) else {
            return;
        };

        self.calculate_transforms(rb_a, rb_b);
        self.calc_anchor_pos(rb_a, rb_b);

        let basis_a = rb_a.pose.basis();
        let basis_b = rb_b.pose.basis();
        let rel_pos_a = self.anchor_pos - rb_a.center_of_mass_position();
        let rel_pos_b = self.anchor_pos - rb_b.center_of_mass_position();

        for i in 0..3 {
            if self.linear_limits.need_apply_force(i) {
                let axis = self.linear_axis(i);
                self.jac_linear[i] = calculate_diagonal_inv(
                    &basis_a,
                    &basis_b,
                    &rel_pos_a,
                    &rel_pos_b,
                    &axis,
                    rb_a.inv_inertia_local(),
                    rb_a.inverse_mass(),
                    rb_b.inv_inertia_local(),
                    rb_b.inverse_mass(),
                );
            }
        }

        for i in 0..3 {
            self.angular_limits[i].test_limit_value(self.calculated_axis_angle_diff[i]);
            if self.angular_limits[i].need_apply_torques() {
                self.jac_angular[i] = calculate_angular_diagonal_inv(
                    &self.calculated_axis[i],
                    &basis_a,
                    &basis_b,
                    rb_a.inv_inertia_local(),
                    rb_b.inv_inertia_local(),
                );
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

        let point_in_a = self.calculated_transform_a.origin;
        let point_in_b = self.calculated_transform_b.origin;

        for i in 0..3 {
            if !self.linear_limits.need_apply_force(i) {
                continue;
            }
            let axis = self.linear_axis(i);
            let impulse = self.linear_limits.solve_linear_axis(
                time_step,
                self.jac_linear[i],
                rb_a,
                &point_in_a,
                rb_b,
                &point_in_b,
                i,
                &axis,
                &self.anchor_pos,
                self.base.breaking_impulse_threshold,
            );
            match impulse {
                Ok(impulse) => self.base.applied_impulse += impulse,
                Err(impulse) => {
                    self.base.check_breaking(impulse);
                    return;
                }
            }
        }

        for i in 0..3 {
            if !self.angular_limits[i].need_apply_torques() {
                continue;
            }
            let impulse = self.angular_limits[i].solve_angular_limits(
                time_step,
                &self.calculated_axis[i],
                self.jac_angular[i],
                rb_a,
                rb_b,
                self.base.breaking_impulse_threshold,
            );
            match impulse {
                Ok(impulse) => self.base.applied_impulse += impulse,
                Err(impulse) => {
                    self.base.check_breaking(impulse);
                    return;
                }
            }
        }
    }
}
