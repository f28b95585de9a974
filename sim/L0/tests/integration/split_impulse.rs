//! Penetration recovery with and without split impulses.
//!
//! A ball starts 0.1 deep in the floor with gravity off. Baumgarte
//! stabilization alone pushes it out with real velocity; the split pass
//! moves it with pseudo velocity that is discarded after each frame.

use approx::assert_relative_eq;
use nalgebra::{Point3, Vector3};
use sim_constraint::{SequentialImpulseConstraintSolver, TypedConstraint};
use sim_types::{BodyId, ContactSolverInfo, RigidBodySet};

use crate::solver_test_utils::{EXACT_TOL, SphereScene, sphere, step};

const RADIUS: f64 = 0.5;
const DEPTH: f64 = 0.1;

fn sunk_ball() -> (RigidBodySet, BodyId, SphereScene) {
    let mut bodies = RigidBodySet::new();
    let ball = sphere(&mut bodies, Point3::new(0.0, 0.0, RADIUS - DEPTH), RADIUS, 1.0);
    let scene = SphereScene::new(&bodies, &[(ball, RADIUS)], 0.5, 0.01);
    (bodies, ball, scene)
}

#[test]
fn test_baumgarte_injects_velocity() {
    let (mut bodies, ball, mut scene) = sunk_ball();
    let info = ContactSolverInfo::default().with_split_impulse(false);
    let mut joints: Vec<Box<dyn TypedConstraint>> = Vec::new();

    step(
        &mut SequentialImpulseConstraintSolver::new(),
        &mut bodies,
        &[ball],
        &mut scene.manifolds,
        &mut joints,
        &Vector3::zeros(),
        &info,
    );

    let expected = info.erp * DEPTH / info.time_step;
    assert_relative_eq!(bodies.get(ball).unwrap().linear_velocity.z, expected, epsilon = EXACT_TOL);
    assert!(expected > 1.0);
}

#[test]
fn test_split_impulse_recovers_without_launching() {
    let (mut bodies, ball, mut scene) = sunk_ball();
    let info = ContactSolverInfo::default().with_split_impulse(true);
    let mut joints: Vec<Box<dyn TypedConstraint>> = Vec::new();
    let mut solver = SequentialImpulseConstraintSolver::new();

    // first frame: only the pseudo velocity moves the ball
    step(&mut solver, &mut bodies, &[ball], &mut scene.manifolds, &mut joints, &Vector3::zeros(), &info);
    let body = bodies.get(ball).unwrap();
    assert_relative_eq!(body.linear_velocity.z, 0.0, epsilon = EXACT_TOL);
    assert_relative_eq!(
        body.pose.position.z,
        RADIUS - DEPTH + info.erp2 * DEPTH,
        epsilon = EXACT_TOL
    );
    scene.refresh(&bodies);

    let mut max_speed: f64 = 0.0;
    for _ in 0..59 {
        step(&mut solver, &mut bodies, &[ball], &mut scene.manifolds, &mut joints, &Vector3::zeros(), &info);
        scene.refresh(&bodies);
        max_speed = max_speed.max(bodies.get(ball).unwrap().linear_velocity.norm());
    }

    // once shallower than the split threshold, Baumgarte finishes the job
    // with at most erp * threshold / dt
    let bound = info.erp * -info.split_impulse_penetration_threshold / info.time_step;
    assert!(max_speed <= bound + EXACT_TOL, "speed {max_speed} over {bound}");
    assert!(max_speed < 0.3);
    assert!(scene.manifolds[0].points()[0].distance > info.split_impulse_penetration_threshold);
}
