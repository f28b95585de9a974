//! Persistent contact manifolds produced by narrow-phase collision detection.
//!
//! The solver only consumes these: it reads geometry and material data and
//! writes back accumulated impulses so the next frame can warm start.

use nalgebra::{Point3, Vector3};
use sim_types::BodyId;

use crate::ConstraintPersistentData;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Maximum number of points kept per manifold.
pub const MANIFOLD_CACHE_SIZE: usize = 4;

/// One persistent contact between two bodies.
///
/// The normal points from body B towards body A; `distance` is negative
/// when the bodies overlap.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ManifoldPoint {
    /// Contact point on body A in world coordinates.
    pub position_world_on_a: Point3<f64>,
    /// Contact point on body B in world coordinates.
    pub position_world_on_b: Point3<f64>,
    /// Contact normal on B in world coordinates (unit length).
    pub normal_world_on_b: Vector3<f64>,
    /// Signed separation along the normal (negative = penetrating).
    pub distance: f64,
    /// Friction coefficient combined from both materials.
    pub combined_friction: f64,
    /// Restitution coefficient combined from both materials.
    pub combined_restitution: f64,

    /// Accumulated normal impulse from the last solve.
    pub applied_impulse: f64,
    /// Accumulated impulse along the first friction direction.
    pub applied_impulse_lateral1: f64,
    /// Accumulated impulse along the second friction direction.
    pub applied_impulse_lateral2: f64,
    /// Cached first friction direction.
    pub lateral_friction_dir1: Vector3<f64>,
    /// Cached second friction direction.
    pub lateral_friction_dir2: Vector3<f64>,
    /// Whether the friction directions above are valid.
    pub lateral_friction_initialized: bool,
    /// Number of frames this point has persisted.
    pub life_time: i32,

    /// Solver cache for the per-point path; dropped when the contact is destroyed.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub user_persistent_data: Option<ConstraintPersistentData>,
}

impl ManifoldPoint {
    /// Create a fresh contact point with zeroed solver state.
    #[must_use]
    pub fn new(
        position_world_on_a: Point3<f64>,
        position_world_on_b: Point3<f64>,
        normal_world_on_b: Vector3<f64>,
        distance: f64,
    ) -> Self {
        Self {
            position_world_on_a,
            position_world_on_b,
            normal_world_on_b,
            distance,
            combined_friction: 0.0,
            combined_restitution: 0.0,
            applied_impulse: 0.0,
            applied_impulse_lateral1: 0.0,
            applied_impulse_lateral2: 0.0,
            lateral_friction_dir1: Vector3::zeros(),
            lateral_friction_dir2: Vector3::zeros(),
            lateral_friction_initialized: false,
            life_time: 0,
            user_persistent_data: None,
        }
    }

    /// Set the combined material coefficients.
    #[must_use]
    pub fn with_material(mut self, friction: f64, restitution: f64) -> Self {
        self.combined_friction = friction;
        self.combined_restitution = restitution;
        self
    }

    /// Whether the bodies touch or overlap at this point.
    #[must_use]
    pub fn is_touching(&self) -> bool {
        self.distance <= 0.0
    }

    /// Clear everything carried across frames.
    pub fn reset_solver_state(&mut self) {
        self.applied_impulse = 0.0;
        self.applied_impulse_lateral1 = 0.0;
        self.applied_impulse_lateral2 = 0.0;
        self.lateral_friction_initialized = false;
        self.life_time = 0;
        self.user_persistent_data = None;
    }
}

/// Combine two friction coefficients (geometric, clamped to ±10).
#[must_use]
pub fn combine_friction(a: f64, b: f64) -> f64 {
    const MAX_FRICTION: f64 = 10.0;
    (a * b).clamp(-MAX_FRICTION, MAX_FRICTION)
}

/// Combine two restitution coefficients (product).
#[must_use]
pub fn combine_restitution(a: f64, b: f64) -> f64 {
    a * b
}

/// Up to [`MANIFOLD_CACHE_SIZE`] contact points between one pair of bodies.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactManifold {
    /// First body (A).
    pub body0: BodyId,
    /// Second body (B).
    pub body1: BodyId,
    points: Vec<ManifoldPoint>,
}

impl ContactManifold {
    /// Create an empty manifold for a body pair.
    #[must_use]
    pub fn new(body0: BodyId, body1: BodyId) -> Self {
        Self {
            body0,
            body1,
            points: Vec::with_capacity(MANIFOLD_CACHE_SIZE),
        }
    }

    /// Add a point; returns its index, or `None` when the cache is full.
    pub fn add_point(&mut self, point: ManifoldPoint) -> Option<usize> {
        if self.points.len() >= MANIFOLD_CACHE_SIZE {
            return None;
        }
        self.points.push(point);
        Some(self.points.len() - 1)
    }

    /// Replace the geometry of an existing point.
    ///
    /// Accumulated impulses, life time and the solver cache carry over, so
    /// a refreshed contact keeps warm starting.
    pub fn replace_point(&mut self, index: usize, mut point: ManifoldPoint) {
        let Some(old) = self.points.get_mut(index) else {
            return;
        };
        point.applied_impulse = old.applied_impulse;
        point.applied_impulse_lateral1 = old.applied_impulse_lateral1;
        point.applied_impulse_lateral2 = old.applied_impulse_lateral2;
        point.life_time = old.life_time;
        point.user_persistent_data = old.user_persistent_data.take();
        *old = point;
    }

    /// Remove a point (the contact was destroyed).
    pub fn remove_point(&mut self, index: usize) -> Option<ManifoldPoint> {
        (index < self.points.len()).then(|| self.points.swap_remove(index))
    }

    /// Drop all points and their cached solver state.
    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Advance every point's life time by one frame.
    pub fn age_points(&mut self) {
        for p in &mut self.points {
            p.life_time += 1;
        }
    }

    /// Number of points.
    #[must_use]
    pub fn num_contacts(&self) -> usize {
        self.points.len()
    }

    /// Point by index.
    #[must_use]
    pub fn point(&self, index: usize) -> Option<&ManifoldPoint> {
        self.points.get(index)
    }

    /// Mutable point by index.
    pub fn point_mut(&mut self, index: usize) -> Option<&mut ManifoldPoint> {
        self.points.get_mut(index)
    }

    /// All points.
    #[must_use]
    pub fn points(&self) -> &[ManifoldPoint] {
        &self.points
    }

    /// All points, mutably.
    pub fn points_mut(&mut self) -> &mut [ManifoldPoint] {
        &mut self.points
    }
}
