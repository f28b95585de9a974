//! [`Generic6DofConstraint`] with a spring on any of its axes.

use sim_types::{BodyId, ContactSolverInfo, Pose, RigidBodySet};

use super::{ConstraintBase, ConstraintType, Generic6DofConstraint, TypedConstraint, body_pair};

/// Six-degree-of-freedom joint whose axes can be sprung towards an
/// equilibrium point.
///
/// A spring drives its axis through the axis motor. Each build sets the
/// motor target velocity to
/// `-(damping / (time_step * num_iterations)) * stiffness * (position - equilibrium)`
/// and caps the motor force at `stiffness * |position - equilibrium|`, so the
/// motor impulse over one step never exceeds the spring force. A sprung axis
/// should be left free; an active limit takes precedence over its motor.
#[derive(Debug, Clone, PartialEq)]
pub struct Generic6DofSpringConstraint {
    inner: Generic6DofConstraint,
    spring_enabled: [bool; 6],
    equilibrium_point: [f64; 6],
    spring_stiffness: [f64; 6],
    spring_damping: [f64; 6],
}

impl Generic6DofSpringConstraint {
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
            inner: Generic6DofConstraint::new(
                body_a,
                body_b,
                frame_a,
                frame_b,
                use_linear_reference_frame_a,
            ),
            spring_enabled: [false; 6],
            equilibrium_point: [0.0; 6],
            spring_stiffness: [0.0; 6],
            spring_damping: [1.0; 6],
        }
    }

    /// The underlying joint, for limits and axis queries.
    #[must_use]
    pub fn generic6dof(&self) -> &Generic6DofConstraint {
        &self.inner
    }

    /// Mutable access to the underlying joint.
    pub fn generic6dof_mut(&mut self) -> &mut Generic6DofConstraint {
        &mut self.inner
    }

    /// Turn the spring on axis `index` (0..6) on or off.
    ///
    /// This also switches the axis motor.
    pub fn enable_spring(&mut self, index: usize, on: bool) {
        if index >= 6 {
            return;
        }
        self.spring_enabled[index] = on;
        if index < 3 {
            self.inner.translational_limit_motor_mut().enable_motor[index] = on;
        } else {
            self.inner.rotational_limit_motor_mut(index - 3).enable_motor = on;
        }
    }

    /// Whether the spring on axis `index` is on.
    #[must_use]
    pub fn is_spring_enabled(&self, index: usize) -> bool {
        self.spring_enabled.get(index).copied().unwrap_or(false)
    }

    /// Set the stiffness of axis `index`.
    pub fn set_stiffness(&mut self, index: usize, stiffness: f64) {
        if let Some(k) = self.spring_stiffness.get_mut(index) {
            *k = stiffness;
        }
    }

    /// Set the damping of axis `index`.
    pub fn set_damping(&mut self, index: usize, damping: f64) {
        if let Some(d) = self.spring_damping.get_mut(index) {
            *d = damping;
        }
    }

    /// Use the current relative placement of the bodies as the equilibrium
    /// of every axis.
    pub fn set_equilibrium_point(&mut self, bodies: &RigidBodySet) {
        self.inner.update_transforms(bodies);
        for index in 0..6 {
            self.equilibrium_point[index] = self.current_position(index);
        }
    }

    /// Use the current position of axis `index` as its equilibrium.
    pub fn set_equilibrium_point_for_axis(&mut self, bodies: &RigidBodySet, index: usize) {
        if index >= 6 {
            return;
        }
        self.inner.update_transforms(bodies);
        self.equilibrium_point[index] = self.current_position(index);
    }

    /// Set the equilibrium of axis `index` explicitly.
    pub fn set_equilibrium_point_value(&mut self, index: usize, value: f64) {
        if let Some(eq) = self.equilibrium_point.get_mut(index) {
            *eq = value;
        }
    }

    /// Equilibrium of axis `index`.
    #[must_use]
    pub fn equilibrium_point(&self, index: usize) -> f64 {
        self.equilibrium_point.get(index).copied().unwrap_or(0.0)
    }

    fn current_position(&self, index: usize) -> f64 {
        if index < 3 {
            self.inner.relative_pivot_position(index)
        } else {
            self.inner.angle(index - 3)
        }
    }

    fn update_springs(&mut self, info: &ContactSolverInfo) {
        let fps = 1.0 / info.time_step;
        let iterations = info.num_iterations.max(1) as f64;

        for index in 0..6 {
            if !self.spring_enabled[index] {
                continue;
            }
            let delta = self.current_position(index) - self.equilibrium_point[index];
            let force = delta * self.spring_stiffness[index];
            let target_velocity = -(fps * self.spring_damping[index] / iterations) * force;

            if index < 3 {
                let motor = self.inner.translational_limit_motor_mut();
                motor.target_velocity[index] = target_velocity;
                motor.max_motor_force[index] = force.abs();
            } else {
                let motor = self.inner.rotational_limit_motor_mut(index - 3);
                motor.target_velocity = target_velocity;
                motor.max_motor_force = force.abs();
            }
        }
    }
}

impl TypedConstraint for Generic6DofSpringConstraint {
    fn constraint_type(&self) -> ConstraintType {
        ConstraintType::D6
    }

    fn base(&self) -> &ConstraintBase {
        self.inner.base()
    }

    fn base_mut(&mut self) -> &mut ConstraintBase {
        self.inner.base_mut()
    }

    fn build_jacobian(&mut self, bodies: &RigidBodySet, info: &ContactSolverInfo) {
        if let Some((rb_a, rb_b)) = body_pair(bodies, self.inner.body_a(), self.inner.body_b()) {
            self.inner.calculate_transforms(rb_a, rb_b);
            self.update_springs(info);
        }
        self.inner.build_jacobian(bodies, info);
    }

    fn solve_constraint(&mut self, bodies: &mut RigidBodySet, time_step: f64) {
        self.inner.solve_constraint(bodies, time_step);
    }
}
