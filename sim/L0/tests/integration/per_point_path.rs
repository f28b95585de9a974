//! The per-point path against the cache-friendly row path.
//!
//! For a single contact both paths solve the same equations, so whole runs
//! must agree even though the per-point path keeps its state in the
//! points' persistent data instead of pooled rows.

use approx::assert_relative_eq;
use nalgebra::{Point3, Vector3};
use sim_constraint::{SequentialImpulseConstraintSolver, SolverStats, TypedConstraint};
use sim_types::{ContactSolverInfo, RigidBody, RigidBodySet, SolverMode};

use crate::solver_test_utils::{CONVERGED_TOL, DRIFT_TOL, GRAVITY, SphereScene, sphere, step};

const RADIUS: f64 = 0.5;

fn per_point_info() -> ContactSolverInfo {
    ContactSolverInfo::default().with_mode(SolverMode::USE_WARMSTARTING)
}

fn cache_friendly_info() -> ContactSolverInfo {
    ContactSolverInfo::deterministic()
}

/// Run one ball for `frames` frames and return the final body, the last
/// stored normal impulse and the last stats.
fn run_ball(
    info: &ContactSolverInfo,
    start: Point3<f64>,
    velocity: Vector3<f64>,
    friction: f64,
    frames: usize,
) -> (RigidBody, f64, SolverStats) {
    let mut bodies = RigidBodySet::new();
    let ball = sphere(&mut bodies, start, RADIUS, 1.0);
    bodies.get_mut(ball).unwrap().linear_velocity = velocity;

    let mut scene = SphereScene::new(&bodies, &[(ball, RADIUS)], friction, 0.01);
    let mut joints: Vec<Box<dyn TypedConstraint>> = Vec::new();
    let mut solver = SequentialImpulseConstraintSolver::new();

    let mut stats = SolverStats::empty();
    for _ in 0..frames {
        stats = step(&mut solver, &mut bodies, &[ball], &mut scene.manifolds, &mut joints, &GRAVITY, info);
        scene.refresh(&bodies);
    }

    let impulse = scene.manifolds[0].points()[0].applied_impulse;
    (bodies.get(ball).unwrap().clone(), impulse, stats)
}

#[test]
fn test_per_point_matches_rows_for_resting_ball() {
    let start = Point3::new(0.0, 0.0, RADIUS - 0.01);
    let (per_point, per_point_impulse, per_point_stats) =
        run_ball(&per_point_info(), start, Vector3::zeros(), 0.5, 60);
    let (rows, rows_impulse, rows_stats) =
        run_ball(&cache_friendly_info(), start, Vector3::zeros(), 0.5, 60);

    assert_relative_eq!(per_point.pose.position, rows.pose.position, epsilon = DRIFT_TOL);
    assert_relative_eq!(per_point.pose.position.z, rows.pose.position.z, epsilon = CONVERGED_TOL);
    assert_relative_eq!(per_point_impulse, rows_impulse, epsilon = CONVERGED_TOL);
    assert_relative_eq!(per_point_impulse, -GRAVITY.z / 60.0, epsilon = CONVERGED_TOL);

    // the per-point path has no solver body pool
    assert_eq!(per_point_stats.solver_bodies, 0);
    assert_eq!(rows_stats.solver_bodies, 2);
    assert_eq!(per_point_stats.contact_rows, rows_stats.contact_rows);
    assert_eq!(per_point_stats.friction_rows, rows_stats.friction_rows);
}

#[test]
fn test_per_point_matches_rows_for_sliding_ball() {
    let start = Point3::new(0.0, 0.0, RADIUS);
    let velocity = Vector3::new(4.0, 0.0, 0.0);
    let (per_point, _, _) = run_ball(&per_point_info(), start, velocity, 0.4, 10);
    let (rows, _, _) = run_ball(&cache_friendly_info(), start, velocity, 0.4, 10);

    let expected = 4.0 - 10.0 * 0.4 * -GRAVITY.z / 60.0;
    assert_relative_eq!(per_point.linear_velocity.x, expected, epsilon = 1e-9);
    assert_relative_eq!(rows.linear_velocity.x, expected, epsilon = 1e-9);
    assert_relative_eq!(per_point.angular_velocity, rows.angular_velocity, epsilon = 1e-9);
}

/// The persistent data survives while the point keeps aging one frame per
/// solve, and holds the impulses written back to the point.
#[test]
fn test_persistent_data_follows_point() {
    let mut bodies = RigidBodySet::new();
    let ball = sphere(&mut bodies, Point3::new(0.0, 0.0, RADIUS), RADIUS, 1.0);
    let mut scene = SphereScene::new(&bodies, &[(ball, RADIUS)], 0.5, 0.01);
    let mut joints: Vec<Box<dyn TypedConstraint>> = Vec::new();
    let mut solver = SequentialImpulseConstraintSolver::new();
    let info = per_point_info();

    for frame in 0..5 {
        step(&mut solver, &mut bodies, &[ball], &mut scene.manifolds, &mut joints, &GRAVITY, &info);
        let point = &scene.manifolds[0].points()[0];
        let cpd = point.user_persistent_data.as_ref().unwrap();
        assert_eq!(cpd.persistent_life_time, frame);
        assert_eq!(cpd.applied_impulse, point.applied_impulse);
        scene.refresh(&bodies);
    }
}
