//! Warm-started resting contact.
//!
//! A body at rest on the ground is a fixed point of the solver: the stored
//! normal impulse carries exactly the weight of one frame, and the ball
//! sits at the allowed slop depth.

use approx::assert_relative_eq;
use nalgebra::Point3;
use sim_constraint::{SequentialImpulseConstraintSolver, TypedConstraint};
use sim_types::{ContactSolverInfo, RigidBodySet, SolverMode};

use crate::solver_test_utils::{CONVERGED_TOL, EXACT_TOL, GRAVITY, SphereScene, sphere, step};

const RADIUS: f64 = 0.5;
const SLOP: f64 = 0.005;

fn resting_info() -> ContactSolverInfo {
    ContactSolverInfo {
        linear_slop: SLOP,
        ..ContactSolverInfo::deterministic()
    }
}

#[test]
fn test_resting_contact_reaches_fixed_point() {
    let mut bodies = RigidBodySet::new();
    let ball = sphere(&mut bodies, Point3::new(0.0, 0.0, RADIUS - 0.01), RADIUS, 2.0);
    let mut scene = SphereScene::new(&bodies, &[(ball, RADIUS)], 0.5, 0.01);
    let mut joints: Vec<Box<dyn TypedConstraint>> = Vec::new();
    let info = resting_info();
    let mut solver = SequentialImpulseConstraintSolver::new();

    let mut impulses = Vec::new();
    for _ in 0..300 {
        step(&mut solver, &mut bodies, &[ball], &mut scene.manifolds, &mut joints, &GRAVITY, &info);
        scene.refresh(&bodies);

        let point = &scene.manifolds[0].points()[0];
        assert!(point.distance <= 0.0, "ball left the ground");
        impulses.push(point.applied_impulse);
    }

    let weight = 2.0 * -GRAVITY.z * info.time_step;
    let last = impulses[impulses.len() - 1];
    let previous = impulses[impulses.len() - 2];
    assert!((last - previous).abs() < CONVERGED_TOL);
    assert_relative_eq!(last, weight, epsilon = CONVERGED_TOL);

    let point = &scene.manifolds[0].points()[0];
    assert_relative_eq!(point.distance, -SLOP, epsilon = CONVERGED_TOL);
    assert_relative_eq!(bodies.get(ball).unwrap().linear_velocity.z, 0.0, epsilon = CONVERGED_TOL);
    assert_eq!(point.life_time, 300);
}

/// Two spheres stacked on the ground with two sweeps per frame. With warm
/// starting the impulses found in earlier frames keep the stack shallow;
/// without it the bottom contact sinks deeper. Both settle on the same
/// impulses: the bottom contact carries both spheres.
#[test]
fn test_warm_start_keeps_stack_shallow() {
    let run = |mode: SolverMode| {
        let mut bodies = RigidBodySet::new();
        let bottom = sphere(&mut bodies, Point3::new(0.0, 0.0, RADIUS - 0.003), RADIUS, 1.0);
        let top = sphere(&mut bodies, Point3::new(0.0, 0.0, 3.0 * RADIUS - 0.006), RADIUS, 1.0);
        let mut scene = SphereScene::new(&bodies, &[(bottom, RADIUS), (top, RADIUS)], 0.5, 0.01);
        let mut joints: Vec<Box<dyn TypedConstraint>> = Vec::new();
        let info = resting_info().with_iterations(2).with_mode(mode);
        let mut solver = SequentialImpulseConstraintSolver::new();

        for _ in 0..300 {
            step(&mut solver, &mut bodies, &[bottom, top], &mut scene.manifolds, &mut joints, &GRAVITY, &info);
            scene.refresh(&bodies);
        }
        // ground under bottom, ground under top (never touching), bottom-top
        assert_eq!(scene.manifolds.len(), 3);
        let ground = scene.manifolds[0].points()[0].clone();
        let stacked = scene.manifolds[2].points()[0].clone();
        (ground, stacked, info.time_step)
    };

    let (warm_ground, warm_stacked, dt) =
        run(SolverMode::CACHE_FRIENDLY | SolverMode::USE_WARMSTARTING);
    let (cold_ground, cold_stacked, _) = run(SolverMode::CACHE_FRIENDLY);

    assert!(
        warm_ground.distance > cold_ground.distance,
        "warm {} vs cold {}",
        warm_ground.distance,
        cold_ground.distance
    );

    let weight = -GRAVITY.z * dt;
    for (ground, stacked) in [(&warm_ground, &warm_stacked), (&cold_ground, &cold_stacked)] {
        assert_relative_eq!(ground.applied_impulse, 2.0 * weight, epsilon = CONVERGED_TOL);
        assert_relative_eq!(stacked.applied_impulse, weight, epsilon = CONVERGED_TOL);
        // the upper contact starts inside the slop and never sinks past it
        assert!(stacked.distance > -SLOP - EXACT_TOL);
    }
}
