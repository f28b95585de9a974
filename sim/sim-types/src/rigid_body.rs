//! Rigid body state consumed and updated by the constraint solver.

use nalgebra::{Matrix3, Point3, Vector3};

use crate::{MassProperties, Pose, math};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Selects which contact/friction resolution function a body pair uses on
/// the per-point solver path.
///
/// The solver keeps a square table indexed by the two bodies' types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ContactSolverType {
    /// Default resolution.
    #[default]
    Default,
    /// Alternative built-in slot.
    Type1,
    /// Alternative built-in slot.
    Type2,
    /// Slot reserved for user-installed functions.
    User1,
}

impl ContactSolverType {
    /// Number of distinct solver types (table dimension).
    pub const COUNT: usize = 4;

    /// All types in table order.
    pub const ALL: [Self; Self::COUNT] = [Self::Default, Self::Type1, Self::Type2, Self::User1];

    /// Table index of this type.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Default => 0,
            Self::Type1 => 1,
            Self::Type2 => 2,
            Self::User1 => 3,
        }
    }
}

/// A rigid body as seen by the constraint solver.
///
/// The pose is the center-of-mass frame. Velocities are in world
/// coordinates. The world-space inverse inertia is cached and refreshed by
/// [`RigidBody::update_inertia_tensor`] whenever the orientation changes.
///
/// # Example
///
/// ```
/// use sim_types::{MassProperties, Pose, RigidBody};
/// use nalgebra::{Point3, Vector3};
///
/// let mut body = RigidBody::new(
///     MassProperties::sphere(2.0, 0.5),
///     Pose::from_position(Point3::new(0.0, 0.0, 1.0)),
/// );
///
/// body.apply_central_impulse(&Vector3::new(2.0, 0.0, 0.0));
/// assert_eq!(body.linear_velocity.x, 1.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RigidBody {
    /// Center-of-mass pose in world coordinates.
    pub pose: Pose,
    /// Linear velocity of the center of mass (m/s).
    pub linear_velocity: Vector3<f64>,
    /// Angular velocity (rad/s).
    pub angular_velocity: Vector3<f64>,
    /// Scale applied to angular impulse response (0 locks rotation).
    pub angular_factor: f64,
    /// Friction coefficient used when combining contact materials.
    pub friction: f64,
    /// Restitution coefficient used when combining contact materials.
    pub restitution: f64,
    /// Simulation island the body belongs to; negative means inactive/static.
    pub island_tag: i32,
    /// Index of this body's solver body during a solve, if one was created.
    pub companion_id: Option<usize>,
    /// Contact function selector for the per-point path.
    pub contact_solver_type: ContactSolverType,
    /// Friction function selector for the per-point path.
    pub friction_solver_type: ContactSolverType,

    inverse_mass: f64,
    inv_inertia_local: Vector3<f64>,
    inv_inertia_world: Matrix3<f64>,
}

impl Default for RigidBody {
    fn default() -> Self {
        Self::fixed()
    }
}

impl RigidBody {
    /// Create a body from mass properties at the given pose, at rest.
    ///
    /// Dynamic bodies start in island 0; static bodies get island tag -1.
    #[must_use]
    pub fn new(mass: MassProperties, pose: Pose) -> Self {
        let mut body = Self {
            pose,
            linear_velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
            angular_factor: 1.0,
            friction: 0.5,
            restitution: 0.0,
            island_tag: -1,
            companion_id: None,
            contact_solver_type: ContactSolverType::Default,
            friction_solver_type: ContactSolverType::Default,
            inverse_mass: 0.0,
            inv_inertia_local: Vector3::zeros(),
            inv_inertia_world: Matrix3::zeros(),
        };
        body.set_mass_props(&mass);
        body
    }

    /// The immovable body: infinite mass, zero velocity, identity pose.
    #[must_use]
    pub fn fixed() -> Self {
        Self::new(MassProperties::static_body(), Pose::identity())
    }

    /// Replace the mass properties and refresh derived inertia.
    pub fn set_mass_props(&mut self, mass: &MassProperties) {
        self.inverse_mass = mass.inverse_mass();
        self.inv_inertia_local = mass.inverse_inertia_diagonal();
        self.island_tag = if mass.is_static() { -1 } else { self.island_tag.max(0) };
        self.update_inertia_tensor();
    }

    /// Set velocities.
    #[must_use]
    pub fn with_velocity(mut self, linear: Vector3<f64>, angular: Vector3<f64>) -> Self {
        self.linear_velocity = linear;
        self.angular_velocity = angular;
        self
    }

    /// Set the friction coefficient.
    #[must_use]
    pub fn with_friction(mut self, friction: f64) -> Self {
        self.friction = friction;
        self
    }

    /// Set the restitution coefficient.
    #[must_use]
    pub fn with_restitution(mut self, restitution: f64) -> Self {
        self.restitution = restitution;
        self
    }

    /// Inverse mass (0 for static bodies).
    #[must_use]
    pub fn inverse_mass(&self) -> f64 {
        self.inverse_mass
    }

    /// Inverse principal moments in the body frame.
    #[must_use]
    pub fn inv_inertia_local(&self) -> &Vector3<f64> {
        &self.inv_inertia_local
    }

    /// Inverse inertia tensor in world coordinates.
    #[must_use]
    pub fn inv_inertia_world(&self) -> &Matrix3<f64> {
        &self.inv_inertia_world
    }

    /// Whether the body has infinite mass.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.inverse_mass == 0.0
    }

    /// Center of mass in world coordinates.
    #[must_use]
    pub fn center_of_mass_position(&self) -> Point3<f64> {
        self.pose.position
    }

    /// Set the pose and refresh the world inertia.
    pub fn set_pose(&mut self, pose: Pose) {
        self.pose = pose;
        self.update_inertia_tensor();
    }

    /// Recompute `R * diag(inv_inertia_local) * Rᵀ`.
    pub fn update_inertia_tensor(&mut self) {
        let basis = self.pose.basis();
        self.inv_inertia_world =
            basis * Matrix3::from_diagonal(&self.inv_inertia_local) * basis.transpose();
    }

    /// Velocity of a point given relative to the center of mass.
    #[must_use]
    pub fn velocity_in_local_point(&self, rel_pos: &Vector3<f64>) -> Vector3<f64> {
        self.linear_velocity + self.angular_velocity.cross(rel_pos)
    }

    /// Apply a linear impulse through the center of mass.
    pub fn apply_central_impulse(&mut self, impulse: &Vector3<f64>) {
        self.linear_velocity += impulse * self.inverse_mass;
    }

    /// Apply an angular impulse.
    pub fn apply_torque_impulse(&mut self, torque: &Vector3<f64>) {
        self.angular_velocity += self.inv_inertia_world * torque;
    }

    /// Apply an impulse at `rel_pos` (relative to the center of mass).
    ///
    /// No-op for static bodies.
    pub fn apply_impulse(&mut self, impulse: &Vector3<f64>, rel_pos: &Vector3<f64>) {
        if self.inverse_mass == 0.0 {
            return;
        }
        self.apply_central_impulse(impulse);
        if self.angular_factor != 0.0 {
            self.apply_torque_impulse(&(rel_pos.cross(impulse) * self.angular_factor));
        }
    }

    /// Apply a precomputed impulse: `linear_component` is already scaled by
    /// the inverse mass and `angular_component` by the inverse inertia.
    pub fn internal_apply_impulse(
        &mut self,
        linear_component: &Vector3<f64>,
        angular_component: &Vector3<f64>,
        impulse_magnitude: f64,
    ) {
        if self.inverse_mass != 0.0 {
            self.linear_velocity += linear_component * impulse_magnitude;
            self.angular_velocity += angular_component * (impulse_magnitude * self.angular_factor);
        }
    }

    /// Effective inverse mass of this body along `normal` at world point `pos`.
    #[must_use]
    pub fn compute_impulse_denominator(&self, pos: &Point3<f64>, normal: &Vector3<f64>) -> f64 {
        let r0 = pos - self.center_of_mass_position();
        let c0 = r0.cross(normal);
        let vec = (self.inv_inertia_world.transpose() * c0).cross(&r0);
        self.inverse_mass + normal.dot(&vec)
    }

    /// Effective inverse inertia of this body about `axis`.
    #[must_use]
    pub fn compute_angular_impulse_denominator(&self, axis: &Vector3<f64>) -> f64 {
        axis.dot(&(self.inv_inertia_world.transpose() * axis))
    }

    /// Semi-implicit velocity update under gravity.
    pub fn integrate_velocities(&mut self, gravity: &Vector3<f64>, dt: f64) {
        if self.is_static() {
            return;
        }
        self.linear_velocity += gravity * dt;
    }

    /// Advance the pose by the current velocities.
    pub fn integrate_transform(&mut self, dt: f64) {
        if self.is_static() {
            return;
        }
        let pose =
            math::integrate_transform(&self.pose, &self.linear_velocity, &self.angular_velocity, dt);
        self.set_pose(pose);
    }
}
