//! Joint scenarios driven through the full solver loop.

use approx::assert_relative_eq;
use nalgebra::{Point3, Vector3};
use sim_constraint::{
    HingeConstraint, Point2PointConstraint, Point2PointConstraintArray,
    SequentialImpulseConstraintSolver, TypedConstraint,
};
use sim_types::{BodyId, ContactSolverInfo, MassProperties, Pose, RigidBody, RigidBodySet};

use crate::solver_test_utils::{CONVERGED_TOL, DRIFT_TOL, GRAVITY, sphere, step};

fn separation(bodies: &RigidBodySet, a: BodyId, b: BodyId) -> f64 {
    (bodies.get(a).unwrap().pose.position - bodies.get(b).unwrap().pose.position).norm()
}

// ============================================================================
// Ball joint
// ============================================================================

/// Two unit spheres at x = ±1 joined center to center: the gap closes
/// monotonically and is gone after a second of simulated time.
#[test]
fn test_point2point_converges() {
    let mut bodies = RigidBodySet::new();
    let a = sphere(&mut bodies, Point3::new(-1.0, 0.0, 0.0), 0.5, 1.0);
    let b = sphere(&mut bodies, Point3::new(1.0, 0.0, 0.0), 0.5, 1.0);

    let joint = Point2PointConstraint::new(a, b, Point3::origin(), Point3::origin());
    assert_eq!(joint.setting.tau, 0.3);
    assert_eq!(joint.setting.damping, 1.0);
    let mut joints: Vec<Box<dyn TypedConstraint>> = vec![Box::new(joint)];

    let info = ContactSolverInfo::default();
    let mut solver = SequentialImpulseConstraintSolver::new();

    let mut previous = separation(&bodies, a, b);
    for _ in 0..60 {
        step(&mut solver, &mut bodies, &[a, b], &mut [], &mut joints, &GRAVITY, &info);
        let current = separation(&bodies, a, b);
        assert!(current <= previous + 1e-12, "gap grew from {previous} to {current}");
        previous = current;
    }

    assert!(previous < DRIFT_TOL, "separation {previous}");
    assert!(!joints[0].is_broken());
}

#[test]
fn test_point2point_rest_length() {
    let mut bodies = RigidBodySet::new();
    let a = sphere(&mut bodies, Point3::new(-1.0, 0.0, 0.0), 0.5, 1.0);
    let b = sphere(&mut bodies, Point3::new(1.0, 0.0, 0.0), 0.5, 2.0);
    let mut joints: Vec<Box<dyn TypedConstraint>> = vec![Box::new(
        Point2PointConstraint::new(a, b, Point3::origin(), Point3::origin()).with_rest_length(1.5),
    )];

    let info = ContactSolverInfo::default();
    let mut solver = SequentialImpulseConstraintSolver::new();
    for _ in 0..120 {
        step(&mut solver, &mut bodies, &[a, b], &mut [], &mut joints, &GRAVITY, &info);
    }

    assert_relative_eq!(separation(&bodies, a, b), 1.5, epsilon = DRIFT_TOL);
}

/// The batched joint array behaves like the individual joints.
#[test]
fn test_point2point_array_matches_single_joints() {
    let build = || {
        let mut bodies = RigidBodySet::new();
        let ids: Vec<BodyId> = (0..4)
            .map(|i| sphere(&mut bodies, Point3::new(f64::from(i), 0.0, 0.0), 0.25, 1.0))
            .collect();
        for (i, &id) in ids.iter().enumerate() {
            bodies.get_mut(id).unwrap().linear_velocity = Vector3::new(0.0, i as f64, 0.0);
        }
        (bodies, ids)
    };
    let links = |ids: &[BodyId]| -> Vec<(BodyId, BodyId)> {
        ids.windows(2).map(|w| (w[0], w[1])).collect()
    };
    let half = Point3::new(0.5, 0.0, 0.0);
    let info = ContactSolverInfo::default();

    let (mut single_bodies, ids) = build();
    let mut singles: Vec<Box<dyn TypedConstraint>> = links(&ids)
        .into_iter()
        .map(|(a, b)| {
            Box::new(Point2PointConstraint::new(a, b, half, -half)) as Box<dyn TypedConstraint>
        })
        .collect();

    let (mut array_bodies, _) = build();
    let mut array = Point2PointConstraintArray::new();
    for (a, b) in links(&ids) {
        array.push(a, b, half, -half);
    }
    let mut batched: Vec<Box<dyn TypedConstraint>> = vec![Box::new(array)];

    let mut solver = SequentialImpulseConstraintSolver::new();
    for _ in 0..30 {
        step(&mut solver, &mut single_bodies, &ids, &mut [], &mut singles, &GRAVITY, &info);
        step(&mut solver, &mut array_bodies, &ids, &mut [], &mut batched, &GRAVITY, &info);
    }

    for &id in &ids {
        let single = single_bodies.get(id).unwrap();
        let batch = array_bodies.get(id).unwrap();
        assert_relative_eq!(single.pose.position, batch.pose.position, epsilon = CONVERGED_TOL);
        assert_relative_eq!(single.linear_velocity, batch.linear_velocity, epsilon = CONVERGED_TOL);
    }
}

// ============================================================================
// Hinge
// ============================================================================

/// A hinge locked at zero holds its angle against a constant torque.
#[test]
fn test_locked_hinge_under_torque() {
    let mut bodies = RigidBodySet::new();
    let door = bodies.insert(RigidBody::new(
        MassProperties::box_shape(1.0, Vector3::new(0.5, 0.05, 1.0)),
        Pose::identity(),
    ));
    let hinge = HingeConstraint::with_fixed(door, bodies.get(door).unwrap(), Point3::origin(), &Vector3::z())
        .with_limit(0.0, 0.0);
    let mut joints: Vec<Box<dyn TypedConstraint>> = vec![Box::new(hinge)];

    let info = ContactSolverInfo::default();
    let torque = Vector3::new(0.0, 0.0, 1.0);
    let mut solver = SequentialImpulseConstraintSolver::new();
    let mut max_angle: f64 = 0.0;

    for _ in 0..120 {
        bodies
            .get_mut(door)
            .unwrap()
            .apply_torque_impulse(&(torque * info.time_step));
        step(&mut solver, &mut bodies, &[door], &mut [], &mut joints, &Vector3::zeros(), &info);

        let hinge = &joints[0];
        assert!(!hinge.is_broken());
        max_angle = max_angle.max(bodies.get(door).unwrap().pose.rotation.angle());
    }

    // the first step can rotate freely by at most one step of torque
    assert!(max_angle < 0.01, "max angle {max_angle}");
    assert!(bodies.get(door).unwrap().pose.rotation.angle() < CONVERGED_TOL);
}

/// A chain of hinges hanging under gravity keeps its pivots together.
#[test]
fn test_hinge_chain_holds_pivots() {
    let mut bodies = RigidBodySet::new();
    let links: Vec<BodyId> = (0..3)
        .map(|i| {
            bodies.insert(RigidBody::new(
                MassProperties::box_shape(1.0, Vector3::new(0.5, 0.1, 0.1)),
                Pose::from_position(Point3::new(0.5 + f64::from(i), 0.0, 0.0)),
            ))
        })
        .collect();

    let left = Point3::new(-0.5, 0.0, 0.0);
    let right = Point3::new(0.5, 0.0, 0.0);
    let mut joints: Vec<Box<dyn TypedConstraint>> = vec![Box::new(HingeConstraint::with_fixed(
        links[0],
        bodies.get(links[0]).unwrap(),
        left,
        &Vector3::y(),
    ))];
    for pair in links.windows(2) {
        joints.push(Box::new(HingeConstraint::new(
            pair[0],
            pair[1],
            right,
            left,
            &Vector3::y(),
            &Vector3::y(),
        )));
    }

    let info = ContactSolverInfo::default().with_iterations(20);
    let mut solver = SequentialImpulseConstraintSolver::new();
    for _ in 0..120 {
        step(&mut solver, &mut bodies, &links, &mut [], &mut joints, &GRAVITY, &info);
    }

    let pose = |id: BodyId| bodies.get(id).unwrap().pose;
    assert!(pose(links[0]).transform_point(&left).coords.norm() < 0.05);
    for pair in links.windows(2) {
        let gap = pose(pair[0]).transform_point(&right) - pose(pair[1]).transform_point(&left);
        assert!(gap.norm() < 0.05, "pivot gap {}", gap.norm());
    }
    assert!(joints.iter().all(|j| !j.is_broken()));
}
