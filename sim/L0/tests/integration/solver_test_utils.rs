//! Shared scene builders for solver tests.
//!
//! Collision detection is out of the solver's hands, so the tests build
//! their manifolds from sphere geometry directly: a sphere against the
//! ground plane `z = 0` (the fixed body) and sphere against sphere.
//!
//! # Tolerance Hierarchy
//!
//! ```text
//! EXACT_TOL = 1e-9 ─── single-row results that have a closed form
//!     │
//! CONVERGED_TOL = 1e-6 ─── quantities after many steps of geometric decay
//!     │
//! DRIFT_TOL = 1e-3 ─── joint drift and cross-path comparisons
//! ```

use nalgebra::{Point3, Vector3};
use sim_constraint::{SequentialImpulseConstraintSolver, SolverStats, TypedConstraint};
use sim_contact::{ContactManifold, ManifoldPoint};
use sim_types::{BodyId, ContactSolverInfo, MassProperties, Pose, RigidBody, RigidBodySet};

// ============================================================================
// Tolerances
// ============================================================================

/// Closed-form single-solve results.
pub const EXACT_TOL: f64 = 1e-9;

/// Values reached by geometric decay over a few hundred steps.
pub const CONVERGED_TOL: f64 = 1e-6;

/// Joint drift and comparisons between solver paths.
pub const DRIFT_TOL: f64 = 1e-3;

/// Standard gravity along -z.
pub const GRAVITY: Vector3<f64> = Vector3::new(0.0, 0.0, -9.81);

// ============================================================================
// Bodies
// ============================================================================

/// Insert a solid sphere at rest.
pub fn sphere(bodies: &mut RigidBodySet, position: Point3<f64>, radius: f64, mass: f64) -> BodyId {
    bodies.insert(RigidBody::new(
        MassProperties::sphere(mass, radius),
        Pose::from_position(position),
    ))
}

// ============================================================================
// Contacts
// ============================================================================

/// Contact point of a sphere on the ground plane.
pub fn ground_point(body: &RigidBody, radius: f64, friction: f64) -> ManifoldPoint {
    let center = body.pose.position;
    ManifoldPoint::new(
        Point3::new(center.x, center.y, center.z - radius),
        Point3::new(center.x, center.y, 0.0),
        Vector3::z(),
        center.z - radius,
    )
    .with_material(friction, 0.0)
}

/// Contact point between two spheres; the normal points from B to A.
pub fn sphere_point(a: &RigidBody, radius_a: f64, b: &RigidBody, radius_b: f64, friction: f64) -> ManifoldPoint {
    let delta = a.pose.position - b.pose.position;
    let distance = delta.norm();
    let normal = if distance > 0.0 { delta / distance } else { Vector3::z() };
    ManifoldPoint::new(
        a.pose.position - normal * radius_a,
        b.pose.position + normal * radius_b,
        normal,
        distance - radius_a - radius_b,
    )
    .with_material(friction, 0.0)
}

/// A sphere's manifold against the ground.
pub fn ground_manifold(bodies: &RigidBodySet, id: BodyId, radius: f64, friction: f64) -> ContactManifold {
    let mut manifold = ContactManifold::new(id, BodyId::FIXED);
    if let Some(body) = bodies.get(id) {
        manifold.add_point(ground_point(body, radius, friction));
    }
    manifold
}

/// Sphere shapes of a scene, for refreshing manifolds between steps.
#[derive(Debug, Clone)]
pub struct SphereScene {
    /// Body handles.
    pub ids: Vec<BodyId>,
    /// Radius per body.
    pub radii: Vec<f64>,
    /// Friction used for every contact.
    pub friction: f64,
    /// One manifold per touching or nearly touching pair.
    pub manifolds: Vec<ContactManifold>,
}

impl SphereScene {
    /// Scene with ground manifolds for every sphere and sphere manifolds for
    /// every pair closer than `margin`.
    pub fn new(bodies: &RigidBodySet, spheres: &[(BodyId, f64)], friction: f64, margin: f64) -> Self {
        let ids: Vec<BodyId> = spheres.iter().map(|&(id, _)| id).collect();
        let radii: Vec<f64> = spheres.iter().map(|&(_, r)| r).collect();

        let mut manifolds = Vec::new();
        for (&id, &radius) in ids.iter().zip(&radii) {
            manifolds.push(ground_manifold(bodies, id, radius, friction));
        }
        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                let (a, b) = (bodies.get(ids[i]).unwrap(), bodies.get(ids[j]).unwrap());
                let point = sphere_point(a, radii[i], b, radii[j], friction);
                if point.distance < margin {
                    let mut manifold = ContactManifold::new(ids[i], ids[j]);
                    manifold.add_point(point);
                    manifolds.push(manifold);
                }
            }
        }

        Self {
            ids,
            radii,
            friction,
            manifolds,
        }
    }

    fn radius_of(&self, id: BodyId) -> f64 {
        self.ids
            .iter()
            .position(|&other| other == id)
            .map_or(0.0, |i| self.radii[i])
    }

    /// Recompute every point from the current poses, keeping the stored
    /// impulses, and age the points by one frame.
    pub fn refresh(&mut self, bodies: &RigidBodySet) {
        let radii: Vec<(f64, f64)> = self
            .manifolds
            .iter()
            .map(|m| (self.radius_of(m.body0), self.radius_of(m.body1)))
            .collect();

        for (manifold, (radius0, radius1)) in self.manifolds.iter_mut().zip(radii) {
            let a = bodies.get(manifold.body0).unwrap();
            let point = if manifold.body1.is_fixed() {
                ground_point(a, radius0, self.friction)
            } else {
                sphere_point(a, radius0, bodies.get(manifold.body1).unwrap(), radius1, self.friction)
            };
            manifold.replace_point(0, point);
            manifold.age_points();
        }
    }
}

// ============================================================================
// Stepping
// ============================================================================

/// One frame: gravity, solve, integrate poses.
pub fn step(
    solver: &mut SequentialImpulseConstraintSolver,
    bodies: &mut RigidBodySet,
    ids: &[BodyId],
    manifolds: &mut [ContactManifold],
    joints: &mut [Box<dyn TypedConstraint>],
    gravity: &Vector3<f64>,
    info: &ContactSolverInfo,
) -> SolverStats {
    for &id in ids {
        if let Some(body) = bodies.get_mut(id) {
            body.integrate_velocities(gravity, info.time_step);
        }
    }

    let stats = solver
        .solve_group(bodies, ids, manifolds, joints, info)
        .unwrap();

    for &id in ids {
        if let Some(body) = bodies.get_mut(id) {
            body.integrate_transform(info.time_step);
        }
    }
    stats
}
