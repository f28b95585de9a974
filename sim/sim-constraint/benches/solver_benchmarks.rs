//! Benchmarks for the sequential impulse solver.
//!
//! Run with: cargo bench -p sim-constraint
//!
//! Scenes:
//! - `contacts/{path}/{n}`: n two-sphere stacks resting on the ground
//! - `chain/{n}`: a hanging chain of n ball joints
//! - `shuffle/{n}`: the row-order shuffle alone

#![allow(
    missing_docs,
    clippy::unwrap_used,
    clippy::cast_precision_loss,
    clippy::cast_lossless,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use nalgebra::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use sim_constraint::{
    Point2PointConstraint, SequentialImpulseConstraintSolver, TypedConstraint, shuffle,
};
use sim_contact::{ContactManifold, ManifoldPoint};
use sim_types::{BodyId, ContactSolverInfo, MassProperties, Pose, RigidBody, RigidBodySet, SolverMode};

const RADIUS: f64 = 0.5;

/// A square grid of two-sphere stacks sunk a little into the ground, with
/// jittered depths so the rows do not all look alike.
fn sphere_pile(columns: usize, rng: &mut StdRng) -> (RigidBodySet, Vec<BodyId>, Vec<ContactManifold>) {
    let side = (columns as f64).sqrt().ceil() as usize;
    let mut bodies = RigidBodySet::with_capacity(2 * columns);
    let mut ids = Vec::with_capacity(2 * columns);
    let mut manifolds = Vec::with_capacity(2 * columns);

    let ball = |bodies: &mut RigidBodySet, position: Point3<f64>, rng: &mut StdRng| {
        bodies.insert(
            RigidBody::new(MassProperties::sphere(1.0, RADIUS), Pose::from_position(position))
                .with_velocity(
                    Vector3::new(rng.gen_range(-0.1..0.1), rng.gen_range(-0.1..0.1), -0.2),
                    Vector3::zeros(),
                ),
        )
    };

    for i in 0..columns {
        let x = (i % side) as f64 * 2.0 * RADIUS;
        let y = (i / side) as f64 * 2.0 * RADIUS;
        let ground_depth = rng.gen_range(0.0..0.01);
        let stack_depth = rng.gen_range(0.0..0.01);

        let bottom_z = RADIUS - ground_depth;
        let top_z = bottom_z + 2.0 * RADIUS - stack_depth;
        let bottom = ball(&mut bodies, Point3::new(x, y, bottom_z), rng);
        let top = ball(&mut bodies, Point3::new(x, y, top_z), rng);

        let mut ground = ContactManifold::new(bottom, BodyId::FIXED);
        ground.add_point(
            ManifoldPoint::new(
                Point3::new(x, y, -ground_depth),
                Point3::new(x, y, 0.0),
                Vector3::z(),
                -ground_depth,
            )
            .with_material(0.5, 0.0),
        );

        // normal from the upper sphere (B) down to the lower one (A)
        let mut stacked = ContactManifold::new(bottom, top);
        stacked.add_point(
            ManifoldPoint::new(
                Point3::new(x, y, bottom_z + RADIUS),
                Point3::new(x, y, top_z - RADIUS),
                -Vector3::z(),
                -stack_depth,
            )
            .with_material(0.5, 0.0),
        );

        ids.extend([bottom, top]);
        manifolds.extend([ground, stacked]);
    }
    (bodies, ids, manifolds)
}

fn bench_contacts(c: &mut Criterion) {
    let mut group = c.benchmark_group("contacts");
    let mut rng = StdRng::seed_from_u64(7);

    let paths = [
        ("cache_friendly", ContactSolverInfo::default()),
        (
            "per_point",
            ContactSolverInfo::default().with_mode(SolverMode::USE_WARMSTARTING),
        ),
    ];

    for &n in &[16, 256, 1024] {
        group.throughput(Throughput::Elements(2 * n as u64));
        let (bodies, ids, manifolds) = sphere_pile(n, &mut rng);

        for (name, info) in &paths {
            group.bench_with_input(BenchmarkId::new(*name, n), &n, |b, _| {
                let mut solver = SequentialImpulseConstraintSolver::new();
                let mut joints: Vec<Box<dyn TypedConstraint>> = Vec::new();
                b.iter(|| {
                    let mut bodies = bodies.clone();
                    let mut manifolds = manifolds.clone();
                    let stats = solver
                        .solve_group(&mut bodies, &ids, &mut manifolds, &mut joints, info)
                        .unwrap();
                    black_box(stats)
                });
            });
        }
    }
    group.finish();
}

fn bench_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain");

    for &n in &[8, 64, 256] {
        let mut bodies = RigidBodySet::with_capacity(n);
        let ids: Vec<BodyId> = (0..n)
            .map(|i| {
                bodies.insert(RigidBody::new(
                    MassProperties::sphere(1.0, 0.1),
                    Pose::from_position(Point3::new(0.0, 0.0, -(i as f64) * 0.5)),
                ))
            })
            .collect();

        let mut joints: Vec<Box<dyn TypedConstraint>> = Vec::with_capacity(n);
        joints.push(Box::new(Point2PointConstraint::with_fixed(
            ids[0],
            bodies.get(ids[0]).unwrap(),
            Point3::origin(),
        )));
        for pair in ids.windows(2) {
            joints.push(Box::new(Point2PointConstraint::new(
                pair[0],
                pair[1],
                Point3::new(0.0, 0.0, -0.25),
                Point3::new(0.0, 0.0, 0.25),
            )));
        }
        for &id in &ids {
            bodies
                .get_mut(id)
                .unwrap()
                .integrate_velocities(&Vector3::new(0.0, 0.0, -9.81), 1.0 / 60.0);
        }

        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            let mut solver = SequentialImpulseConstraintSolver::new();
            let info = ContactSolverInfo::default();
            b.iter(|| {
                let mut bodies = bodies.clone();
                let stats = solver
                    .solve_group(&mut bodies, &ids, &mut [], &mut joints, &info)
                    .unwrap();
                black_box(stats)
            });
        });
    }
    group.finish();
}

fn bench_shuffle(c: &mut Criterion) {
    let mut group = c.benchmark_group("shuffle");
    for &n in &[64, 4096] {
        let mut order: Vec<usize> = (0..n).collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            let mut seed = 0_u64;
            b.iter(|| {
                shuffle(black_box(&mut order), &mut seed);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_contacts, bench_chain, bench_shuffle);
criterion_main!(benches);
