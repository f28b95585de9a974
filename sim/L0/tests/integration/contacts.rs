//! Contact rows over whole simulation runs.

use approx::assert_relative_eq;
use nalgebra::{Point3, Vector3};
use sim_constraint::{SequentialImpulseConstraintSolver, TypedConstraint};
use sim_contact::ContactManifold;
use sim_types::{BodyId, ContactSolverInfo, RigidBodySet};

use crate::solver_test_utils::{EXACT_TOL, GRAVITY, SphereScene, ground_point, sphere, step};

fn no_joints() -> Vec<Box<dyn TypedConstraint>> {
    Vec::new()
}

// ============================================================================
// Impulse bounds
// ============================================================================

/// Two spheres on the ground with a third resting in the gap between them.
/// Every stored normal impulse stays non-negative and every friction impulse
/// stays inside its cone, frame after frame.
#[test]
fn test_pile_impulse_bounds() {
    let mut bodies = RigidBodySet::new();
    let radius = 0.5;
    let left = sphere(&mut bodies, Point3::new(-0.5, 0.0, 0.5), radius, 1.0);
    let right = sphere(&mut bodies, Point3::new(0.5, 0.0, 0.5), radius, 1.0);
    let top = sphere(&mut bodies, Point3::new(0.0, 0.0, 0.5 + 0.866), radius, 1.0);

    let mut scene = SphereScene::new(
        &bodies,
        &[(left, radius), (right, radius), (top, radius)],
        0.5,
        0.01,
    );
    assert_eq!(scene.manifolds.len(), 6);

    let info = ContactSolverInfo::default();
    let mut solver = SequentialImpulseConstraintSolver::new();
    let mut joints = no_joints();
    let ids = scene.ids.clone();

    for frame in 0..120 {
        let stats = step(&mut solver, &mut bodies, &ids, &mut scene.manifolds, &mut joints, &GRAVITY, &info);
        assert_eq!(stats.friction_rows, 2 * stats.contact_rows);
        assert!(stats.max_normal_impulse >= 0.0);

        for manifold in &scene.manifolds {
            for point in manifold.points() {
                let limit = point.combined_friction * point.applied_impulse + EXACT_TOL;
                assert!(point.applied_impulse >= 0.0, "frame {frame}: negative normal impulse");
                assert!(
                    point.applied_impulse_lateral1.abs() <= limit,
                    "frame {frame}: lateral1 {} over limit {limit}",
                    point.applied_impulse_lateral1
                );
                assert!(
                    point.applied_impulse_lateral2.abs() <= limit,
                    "frame {frame}: lateral2 {} over limit {limit}",
                    point.applied_impulse_lateral2
                );
            }
        }
        scene.refresh(&bodies);
    }

    // nothing falls through the floor
    for &id in &ids {
        assert!(bodies.get(id).unwrap().pose.position.z > radius - 0.05);
    }
}

// ============================================================================
// Friction
// ============================================================================

/// A sliding ball loses `mu * g * dt` of speed every frame until it rolls.
#[test]
fn test_sliding_ball_decelerates_at_friction_limit() {
    let mut bodies = RigidBodySet::new();
    let radius = 0.5;
    let mu = 0.5;
    let ball = sphere(&mut bodies, Point3::new(0.0, 0.0, radius), radius, 1.0);
    bodies.get_mut(ball).unwrap().linear_velocity = Vector3::new(5.0, 0.0, 0.0);

    let mut scene = SphereScene::new(&bodies, &[(ball, radius)], mu, 0.01);
    let info = ContactSolverInfo::default();
    let mut solver = SequentialImpulseConstraintSolver::new();
    let mut joints = no_joints();

    let frames = 10;
    for _ in 0..frames {
        step(&mut solver, &mut bodies, &[ball], &mut scene.manifolds, &mut joints, &GRAVITY, &info);
        scene.refresh(&bodies);
    }

    let body = bodies.get(ball).unwrap();
    let g = -GRAVITY.z;
    let expected = 5.0 - f64::from(frames) * mu * g * info.time_step;
    assert_relative_eq!(body.linear_velocity.x, expected, epsilon = 1e-9);
    assert_relative_eq!(body.linear_velocity.z, 0.0, epsilon = 1e-9);
    // friction at the bottom spins the ball forward
    assert!(body.angular_velocity.y > 0.0);
    assert_relative_eq!(body.pose.position.z, radius, epsilon = 1e-9);
}

#[test]
fn test_frictionless_ball_keeps_sliding() {
    let mut bodies = RigidBodySet::new();
    let ball = sphere(&mut bodies, Point3::new(0.0, 0.0, 0.5), 0.5, 1.0);
    bodies.get_mut(ball).unwrap().linear_velocity = Vector3::new(3.0, -1.0, 0.0);

    let mut scene = SphereScene::new(&bodies, &[(ball, 0.5)], 0.0, 0.01);
    let info = ContactSolverInfo::default();
    let mut solver = SequentialImpulseConstraintSolver::new();
    let mut joints = no_joints();

    for _ in 0..30 {
        step(&mut solver, &mut bodies, &[ball], &mut scene.manifolds, &mut joints, &GRAVITY, &info);
        scene.refresh(&bodies);
    }

    let body = bodies.get(ball).unwrap();
    assert_relative_eq!(body.linear_velocity, Vector3::new(3.0, -1.0, 0.0), epsilon = 1e-9);
    assert_relative_eq!(body.angular_velocity.norm(), 0.0, epsilon = 1e-9);
}

// ============================================================================
// Restitution
// ============================================================================

#[test]
fn test_restitution_bounce() {
    let mut bodies = RigidBodySet::new();
    let ball = sphere(&mut bodies, Point3::new(0.0, 0.0, 0.5), 0.5, 1.0);
    bodies.get_mut(ball).unwrap().linear_velocity = Vector3::new(0.0, 0.0, -4.0);

    let mut manifold = ContactManifold::new(ball, BodyId::FIXED);
    let mut point = ground_point(bodies.get(ball).unwrap(), 0.5, 0.0);
    point.combined_restitution = 0.5;
    manifold.add_point(point);
    let mut manifolds = vec![manifold];

    let stats = SequentialImpulseConstraintSolver::new()
        .solve_group(&mut bodies, &[ball], &mut manifolds, &mut no_joints(), &ContactSolverInfo::deterministic())
        .unwrap();

    assert_eq!(stats.contact_rows, 1);
    assert_relative_eq!(bodies.get(ball).unwrap().linear_velocity.z, 2.0, epsilon = EXACT_TOL);
    assert_relative_eq!(manifolds[0].points()[0].applied_impulse, 6.0, epsilon = EXACT_TOL);
    assert_relative_eq!(stats.max_normal_impulse, 6.0, epsilon = EXACT_TOL);
}

/// An approaching ball that is still separated gets no contact row.
#[test]
fn test_separated_point_has_no_row() {
    let mut bodies = RigidBodySet::new();
    let ball = sphere(&mut bodies, Point3::new(0.0, 0.0, 0.6), 0.5, 1.0);
    bodies.get_mut(ball).unwrap().linear_velocity = Vector3::new(0.0, 0.0, -1.0);

    let mut manifolds = vec![SphereScene::new(&bodies, &[(ball, 0.5)], 0.5, 1.0).manifolds.remove(0)];
    let stats = SequentialImpulseConstraintSolver::new()
        .solve_group(&mut bodies, &[ball], &mut manifolds, &mut no_joints(), &ContactSolverInfo::default())
        .unwrap();

    assert_eq!(stats.contact_rows, 0);
    assert_eq!(bodies.get(ball).unwrap().linear_velocity.z, -1.0);
}
