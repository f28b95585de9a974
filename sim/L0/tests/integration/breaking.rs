//! Joints that give way once their corrective impulse exceeds the threshold.

use approx::assert_relative_eq;
use nalgebra::{Point3, Vector3};
use sim_constraint::{
    Point2PointConstraint, Point2PointConstraintArray, SequentialImpulseConstraintSolver,
    TypedConstraint,
};
use sim_types::{BodyId, ContactSolverInfo, MassProperties, Pose, RigidBody, RigidBodySet};

use crate::solver_test_utils::EXACT_TOL;

fn anchored_ball(
    velocity: Vector3<f64>,
    threshold: f64,
) -> (RigidBodySet, BodyId, Vec<Box<dyn TypedConstraint>>) {
    let mut bodies = RigidBodySet::new();
    let ball = bodies.insert(
        RigidBody::new(MassProperties::sphere(1.0, 0.5), Pose::identity())
            .with_velocity(velocity, Vector3::zeros()),
    );
    let mut anchor = Point2PointConstraint::with_fixed(ball, bodies.get(ball).unwrap(), Point3::origin());
    anchor.set_breaking_impulse_threshold(threshold);
    (bodies, ball, vec![Box::new(anchor)])
}

#[test]
fn test_overloaded_joint_breaks() {
    let (mut bodies, ball, mut joints) = anchored_ball(Vector3::new(10.0, 0.0, 0.0), 1.0);
    let info = ContactSolverInfo::default();
    let mut solver = SequentialImpulseConstraintSolver::new();

    let stats = solver
        .solve_group(&mut bodies, &[ball], &mut [], &mut joints, &info)
        .unwrap();

    assert!(joints[0].is_broken());
    assert_eq!(stats.broken_joints, 1);
    // the rejected impulse is never applied
    assert_eq!(bodies.get(ball).unwrap().linear_velocity, Vector3::new(10.0, 0.0, 0.0));

    // a broken joint stays out of later solves
    solver
        .solve_group(&mut bodies, &[ball], &mut [], &mut joints, &info)
        .unwrap();
    assert!(joints[0].is_broken());
    assert_eq!(bodies.get(ball).unwrap().linear_velocity, Vector3::new(10.0, 0.0, 0.0));
}

#[test]
fn test_joint_below_threshold_holds() {
    let (mut bodies, ball, mut joints) = anchored_ball(Vector3::new(0.5, 0.0, 0.0), 1.0);

    let stats = SequentialImpulseConstraintSolver::new()
        .solve_group(&mut bodies, &[ball], &mut [], &mut joints, &ContactSolverInfo::default())
        .unwrap();

    assert!(!joints[0].is_broken());
    assert_eq!(stats.broken_joints, 0);
    assert_relative_eq!(bodies.get(ball).unwrap().linear_velocity.norm(), 0.0, epsilon = EXACT_TOL);
}

#[test]
fn test_unbreakable_by_default() {
    let (mut bodies, ball, mut joints) = anchored_ball(Vector3::new(1.0e6, 0.0, 0.0), f64::INFINITY);
    assert_eq!(joints[0].breaking_impulse_threshold(), f64::INFINITY);

    SequentialImpulseConstraintSolver::new()
        .solve_group(&mut bodies, &[ball], &mut [], &mut joints, &ContactSolverInfo::default())
        .unwrap();

    assert!(!joints[0].is_broken());
    assert_relative_eq!(bodies.get(ball).unwrap().linear_velocity.norm(), 0.0, epsilon = 1e-6);
}

/// Rows of a joint array break one at a time.
#[test]
fn test_array_rows_break_independently() {
    let mut bodies = RigidBodySet::new();
    let slow = bodies.insert(
        RigidBody::new(MassProperties::sphere(1.0, 0.5), Pose::identity())
            .with_velocity(Vector3::new(0.0, 0.5, 0.0), Vector3::zeros()),
    );
    let fast = bodies.insert(
        RigidBody::new(
            MassProperties::sphere(1.0, 0.5),
            Pose::from_position(Point3::new(2.0, 0.0, 0.0)),
        )
        .with_velocity(Vector3::new(0.0, 8.0, 0.0), Vector3::zeros()),
    );

    let mut array = Point2PointConstraintArray::new();
    array.push(slow, BodyId::FIXED, Point3::origin(), Point3::origin());
    array.push(fast, BodyId::FIXED, Point3::origin(), Point3::new(2.0, 0.0, 0.0));
    array.set_breaking_impulse_threshold(2.0);
    let mut joints: Vec<Box<dyn TypedConstraint>> = vec![Box::new(array)];

    let stats = SequentialImpulseConstraintSolver::new()
        .solve_group(&mut bodies, &[slow, fast], &mut [], &mut joints, &ContactSolverInfo::default())
        .unwrap();

    // one row left standing keeps the array alive
    assert!(!joints[0].is_broken());
    assert_eq!(stats.broken_joints, 0);
    assert_relative_eq!(bodies.get(slow).unwrap().linear_velocity.y, 0.0, epsilon = EXACT_TOL);
    assert_eq!(bodies.get(fast).unwrap().linear_velocity.y, 8.0);
}
