//! Pooled per-body velocity state used while solving contact rows.

use nalgebra::{Point3, Vector3};
use sim_types::{BodyId, RigidBody, RigidBodySet, math};

/// Index of a [`SolverBody`] in the solver's body arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SolverBodyId(pub usize);

impl SolverBodyId {
    /// Position in the arena.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Velocity snapshot of one rigid body for the duration of a solve.
///
/// Contact rows mutate these copies instead of the bodies themselves; the
/// results are written back at the end of the solve. The push/turn
/// velocities hold the split-impulse pseudo velocities, which only ever
/// move the pose and never show up in the real velocity.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverBody {
    /// Linear velocity.
    pub linear_velocity: Vector3<f64>,
    /// Angular velocity.
    pub angular_velocity: Vector3<f64>,
    /// Center of mass at the start of the solve.
    pub center_of_mass_position: Point3<f64>,
    /// Friction coefficient of the body.
    pub friction: f64,
    /// Inverse mass; 0 for bodies treated as static.
    pub inv_mass: f64,
    /// Scale applied to angular impulses.
    pub angular_factor: f64,
    /// Split-impulse linear pseudo velocity.
    pub push_velocity: Vector3<f64>,
    /// Split-impulse angular pseudo velocity.
    pub turn_velocity: Vector3<f64>,
    /// Body this entry was created for.
    pub original_body: BodyId,
}

impl SolverBody {
    /// Snapshot a dynamic body.
    #[must_use]
    pub fn new(id: BodyId, body: &RigidBody) -> Self {
        Self {
            linear_velocity: body.linear_velocity,
            angular_velocity: body.angular_velocity,
            center_of_mass_position: body.center_of_mass_position(),
            friction: body.friction,
            inv_mass: body.inverse_mass(),
            angular_factor: body.angular_factor,
            push_velocity: Vector3::zeros(),
            turn_velocity: Vector3::zeros(),
            original_body: id,
        }
    }

    /// Snapshot a body that must not move during this solve.
    ///
    /// The velocity is kept so relative velocities stay correct, but the
    /// inverse mass is 0, so no impulse changes it and nothing is written back.
    #[must_use]
    pub fn new_static(id: BodyId, body: &RigidBody) -> Self {
        Self {
            inv_mass: 0.0,
            ..Self::new(id, body)
        }
    }

    /// Whether impulses move this body.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.inv_mass != 0.0
    }

    /// Velocity of a point given relative to the center of mass.
    #[must_use]
    pub fn velocity_in_local_point(&self, rel_pos: &Vector3<f64>) -> Vector3<f64> {
        self.linear_velocity + self.angular_velocity.cross(rel_pos)
    }

    /// Apply a precomputed impulse.
    ///
    /// `linear_component` is already scaled by the inverse mass and
    /// `angular_component` by the inverse inertia.
    pub fn internal_apply_impulse(
        &mut self,
        linear_component: &Vector3<f64>,
        angular_component: &Vector3<f64>,
        impulse_magnitude: f64,
    ) {
        if self.inv_mass != 0.0 {
            self.linear_velocity += linear_component * impulse_magnitude;
            self.angular_velocity +=
                angular_component * (impulse_magnitude * self.angular_factor);
        }
    }

    /// Same as [`internal_apply_impulse`](Self::internal_apply_impulse) on the
    /// pseudo velocities.
    pub fn internal_apply_push_impulse(
        &mut self,
        linear_component: &Vector3<f64>,
        angular_component: &Vector3<f64>,
        impulse_magnitude: f64,
    ) {
        if self.inv_mass != 0.0 {
            self.push_velocity += linear_component * impulse_magnitude;
            self.turn_velocity += angular_component * (impulse_magnitude * self.angular_factor);
        }
    }

    /// Copy the velocities back to the original body.
    pub fn writeback_velocity(&self, bodies: &mut RigidBodySet) {
        if self.inv_mass == 0.0 {
            return;
        }
        if let Some(body) = bodies.get_mut(self.original_body) {
            body.linear_velocity = self.linear_velocity;
            body.angular_velocity = self.angular_velocity;
        }
    }

    /// Copy the velocities back and move the pose by the pseudo velocities.
    pub fn writeback_velocity_and_integrate(&self, bodies: &mut RigidBodySet, time_step: f64) {
        if self.inv_mass == 0.0 {
            return;
        }
        if let Some(body) = bodies.get_mut(self.original_body) {
            body.linear_velocity = self.linear_velocity;
            body.angular_velocity = self.angular_velocity;
            let pose = math::integrate_transform(
                &body.pose,
                &self.push_velocity,
                &self.turn_velocity,
                time_step,
            );
            body.set_pose(pose);
        }
    }

    /// Refresh the velocities from the original body.
    pub fn read_velocity(&mut self, bodies: &RigidBodySet) {
        if self.inv_mass == 0.0 {
            return;
        }
        if let Some(body) = bodies.get(self.original_body) {
            self.linear_velocity = body.linear_velocity;
            self.angular_velocity = body.angular_velocity;
        }
    }
}

/// Borrow two distinct entries of the arena mutably.
pub(crate) fn pair_mut(
    bodies: &mut [SolverBody],
    a: SolverBodyId,
    b: SolverBodyId,
) -> Option<(&mut SolverBody, &mut SolverBody)> {
    let (i, j) = (a.index(), b.index());
    if i == j || i.max(j) >= bodies.len() {
        return None;
    }
    if i < j {
        let (lo, hi) = bodies.split_at_mut(j);
        Some((&mut lo[i], &mut hi[0]))
    } else {
        let (lo, hi) = bodies.split_at_mut(i);
        Some((&mut hi[0], &mut lo[j]))
    }
}
