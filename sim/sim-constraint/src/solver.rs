//! Sequential impulse solver for contacts and joints.
//!
//! [`SequentialImpulseConstraintSolver::solve_group`] resolves one island of
//! bodies, contact manifolds and joints in a single synchronous call:
//!
//! 1. Every touching contact point becomes one normal row and two friction
//!    rows between pooled [`SolverBody`] snapshots, warm started from the
//!    impulses stored on the point.
//! 2. Every joint builds its Jacobians from the current transforms.
//! 3. `num_iterations` Gauss-Seidel sweeps solve the joints, then the normal
//!    rows, then the friction rows. With [`SolverMode::RANDOMIZE_ORDER`] the
//!    row order is reshuffled every 8th sweep.
//! 4. With split impulse on, deep penetrations are resolved in a separate
//!    pass on pseudo velocities that only move the pose.
//! 5. Impulses go back to the contact points and velocities to the bodies.
//!
//! Without [`SolverMode::CACHE_FRIENDLY`] the solver runs the per-point path
//! instead: each point keeps a [`ConstraintPersistentData`] cache and is
//! resolved by the contact and friction functions that the
//! [`ContactDispatch`] tables select for the two bodies.
//!
//! Joints always act on the [`RigidBody`](sim_types::RigidBody) itself. On
//! the cache-friendly path the pooled velocities of a joint's bodies are
//! written to the bodies before the joint is solved and read back after.

use nalgebra::Vector3;
use sim_contact::{
    ConstraintPersistentData, ContactDispatch, ContactManifold, ContactSolverFn, ManifoldPoint,
    calculate_diagonal_inv,
};
use sim_types::{
    BodyId, ContactSolverInfo, ContactSolverType, Result, RigidBody, RigidBodySet, SimError,
    SolverMode,
    math::{EPSILON, plane_space},
};
use tracing::{debug, trace, warn};

use crate::constraint::{TypedConstraint, inverse_or_zero};
use crate::solver_body::pair_mut;
use crate::{
    ContactPointRef, SolverBody, SolverBodyId, SolverConstraint, SolverConstraintId,
    SolverConstraintType,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// What one [`solve_group`](SequentialImpulseConstraintSolver::solve_group)
/// call worked on.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolverStats {
    /// Pooled body snapshots (0 on the per-point path).
    pub solver_bodies: usize,
    /// Normal rows, one per touching contact point.
    pub contact_rows: usize,
    /// Friction rows, two per touching contact point.
    pub friction_rows: usize,
    /// Joints passed in.
    pub joints: usize,
    /// Joints broken at the end of the solve.
    pub broken_joints: usize,
    /// Largest accumulated normal impulse.
    pub max_normal_impulse: f64,
}

impl SolverStats {
    /// Nothing was solved.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Check if nothing was solved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contact_rows == 0 && self.joints == 0
    }
}

/// Next value of the row-order generator, uniform enough in `0..n`.
///
/// A linear congruential step followed by xor-folding the high bits down, so
/// small ranges do not only see the weak low bits. The folded value is read
/// as a signed integer and reduced with `|r % n|`. Returns 0 for `n == 0`.
pub fn rand_int2(seed: &mut u64, n: usize) -> usize {
    *seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
    if n == 0 {
        return 0;
    }

    let mut r = *seed;
    if n <= 0x1_0000 {
        r ^= r >> 16;
        if n <= 0x100 {
            r ^= r >> 8;
            if n <= 0x10 {
                r ^= r >> 4;
                if n <= 4 {
                    r ^= r >> 2;
                    if n <= 2 {
                        r ^= r >> 1;
                    }
                }
            }
        }
    }
    let signed = i64::from_ne_bytes(r.to_ne_bytes());
    let n = i64::try_from(n).unwrap_or(i64::MAX);
    usize::try_from((signed % n).unsigned_abs()).unwrap_or(0)
}

/// Fisher-Yates shuffle driven by [`rand_int2`].
pub fn shuffle<T>(order: &mut [T], seed: &mut u64) {
    for j in 0..order.len() {
        let k = rand_int2(seed, j + 1);
        order.swap(j, k);
    }
}

/// Gauss-Seidel solver for contact rows and joint constraints.
///
/// The solver owns its row and body arenas and reuses them between calls;
/// they are emptied at the end of every solve. The order seed is the only
/// state carried from one solve to the next.
///
/// # Example
///
/// ```
/// use sim_constraint::SequentialImpulseConstraintSolver;
/// use sim_contact::{ContactManifold, ManifoldPoint};
/// use sim_types::{BodyId, ContactSolverInfo, MassProperties, Pose, RigidBody, RigidBodySet};
/// use nalgebra::{Point3, Vector3};
///
/// let mut bodies = RigidBodySet::new();
/// let ball = bodies.insert(
///     RigidBody::new(
///         MassProperties::sphere(1.0, 0.5),
///         Pose::from_position(Point3::new(0.0, 0.0, 0.5)),
///     )
///     .with_velocity(Vector3::new(0.0, 0.0, -2.0), Vector3::zeros()),
/// );
///
/// let mut manifold = ContactManifold::new(ball, BodyId::FIXED);
/// manifold.add_point(ManifoldPoint::new(
///     Point3::origin(),
///     Point3::origin(),
///     Vector3::z(),
///     0.0,
/// ));
///
/// let mut solver = SequentialImpulseConstraintSolver::new();
/// let stats = solver
///     .solve_group(
///         &mut bodies,
///         &[ball],
///         std::slice::from_mut(&mut manifold),
///         &mut [],
///         &ContactSolverInfo::default(),
///     )
///     .unwrap();
///
/// assert_eq!(stats.contact_rows, 1);
/// assert!(bodies.get(ball).unwrap().linear_velocity.z.abs() < 1e-9);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SequentialImpulseConstraintSolver {
    solver_bodies: Vec<SolverBody>,
    contact_constraints: Vec<SolverConstraint>,
    friction_constraints: Vec<SolverConstraint>,
    order_contact: Vec<SolverConstraintId>,
    order_friction: Vec<SolverConstraintId>,
    order_points: Vec<(usize, usize)>,
    dispatch: ContactDispatch,
    rand_seed: u64,
    scratch: Vec<BodyId>,
}

impl SequentialImpulseConstraintSolver {
    /// Create a solver with the built-in contact functions and seed 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the row-order seed, so the next solves repeat the order of a
    /// fresh solver.
    pub fn reset(&mut self) {
        self.rand_seed = 0;
    }

    /// Current row-order seed.
    #[must_use]
    pub fn rand_seed(&self) -> u64 {
        self.rand_seed
    }

    /// Set the row-order seed.
    pub fn set_rand_seed(&mut self, seed: u64) {
        self.rand_seed = seed;
    }

    /// Contact and friction function tables of the per-point path.
    #[must_use]
    pub fn dispatch(&self) -> &ContactDispatch {
        &self.dispatch
    }

    /// Use `func` to resolve contacts between bodies of the two types.
    pub fn set_contact_solver_func(
        &mut self,
        func: ContactSolverFn,
        type0: ContactSolverType,
        type1: ContactSolverType,
    ) {
        self.dispatch.set_contact_func(func, type0, type1);
    }

    /// Use `func` to resolve friction between bodies of the two types.
    pub fn set_friction_solver_func(
        &mut self,
        func: ContactSolverFn,
        type0: ContactSolverType,
        type1: ContactSolverType,
    ) {
        self.dispatch.set_friction_func(func, type0, type1);
    }

    /// Solve one island.
    ///
    /// `body_ids` lists the island's bodies; manifolds and joints may also
    /// reference [`BodyId::FIXED`]. Body velocities, contact point impulses
    /// and (with split impulse) body poses are updated in place. Broken
    /// joints are skipped; joints that break during the solve stay in the
    /// slice with [`TypedConstraint::is_broken`] set.
    ///
    /// # Errors
    ///
    /// Returns an error if `info` is invalid or a body id is unknown. Nothing
    /// is modified in that case.
    pub fn solve_group(
        &mut self,
        bodies: &mut RigidBodySet,
        body_ids: &[BodyId],
        manifolds: &mut [ContactManifold],
        constraints: &mut [Box<dyn TypedConstraint>],
        info: &ContactSolverInfo,
    ) -> Result<SolverStats> {
        info.validate()?;
        check_bodies(bodies, body_ids, manifolds, constraints)?;

        if manifolds.is_empty() && constraints.is_empty() {
            return Ok(SolverStats::empty());
        }

        let stats = if info.has_mode(SolverMode::CACHE_FRIENDLY) {
            self.solve_cache_friendly(bodies, body_ids, manifolds, constraints, info)
        } else {
            self.solve_per_point(bodies, manifolds, constraints, info)
        };

        debug!(
            solver_bodies = stats.solver_bodies,
            contact_rows = stats.contact_rows,
            friction_rows = stats.friction_rows,
            joints = stats.joints,
            broken_joints = stats.broken_joints,
            "solved island"
        );
        Ok(stats)
    }

    fn solve_cache_friendly(
        &mut self,
        bodies: &mut RigidBodySet,
        body_ids: &[BodyId],
        manifolds: &mut [ContactManifold],
        constraints: &mut [Box<dyn TypedConstraint>],
        info: &ContactSolverInfo,
    ) -> SolverStats {
        for &id in body_ids {
            if let Some(body) = bodies.get_mut(id) {
                body.companion_id = None;
            }
        }

        self.setup_contacts(bodies, manifolds, info);
        for constraint in constraints.iter_mut() {
            constraint.build_jacobian(bodies, info);
        }

        self.iterate(bodies, constraints, info);
        if info.split_impulse {
            self.solve_split_impulse(info);
        }

        self.finish(bodies, manifolds, constraints, info)
    }

    /// Solver body for `id`, created on first use.
    ///
    /// Bodies outside an active island get a fresh static snapshot per call.
    fn solver_body_for(&mut self, bodies: &mut RigidBodySet, id: BodyId) -> SolverBodyId {
        if let Some(index) = companion_of(bodies, &self.solver_bodies, id) {
            return SolverBodyId(index);
        }

        let index = self.solver_bodies.len();
        let body = bodies.get(id).unwrap_or_else(|| bodies.fixed());
        if body.island_tag >= 0 && !id.is_fixed() {
            self.solver_bodies.push(SolverBody::new(id, body));
            if let Some(body) = bodies.get_mut(id) {
                body.companion_id = Some(index);
            }
        } else {
            self.solver_bodies.push(SolverBody::new_static(id, body));
        }
        SolverBodyId(index)
    }

    fn setup_contacts(
        &mut self,
        bodies: &mut RigidBodySet,
        manifolds: &mut [ContactManifold],
        info: &ContactSolverInfo,
    ) {
        for (manifold_index, manifold) in manifolds.iter_mut().enumerate() {
            let (id0, id1) = (manifold.body0, manifold.body1);
            if manifold.num_contacts() == 0 || id0 == id1 {
                continue;
            }
            if both_static(bodies, id0, id1) {
                warn!(body0 = %id0, body1 = %id1, "manifold between two static bodies skipped");
                continue;
            }

            let sb_a = self.solver_body_for(bodies, id0);
            let sb_b = self.solver_body_for(bodies, id1);
            let (Some(rb0), Some(rb1)) = (bodies.get(id0), bodies.get(id1)) else {
                continue;
            };

            for (point_index, cp) in manifold.points_mut().iter_mut().enumerate() {
                if cp.distance > 0.0 {
                    continue;
                }
                let point = ContactPointRef {
                    manifold: manifold_index,
                    point: point_index,
                };
                self.add_contact_rows(rb0, rb1, sb_a, sb_b, cp, point, info);
            }
        }

        self.order_contact.clear();
        self.order_contact
            .extend((0..self.contact_constraints.len()).map(SolverConstraintId));
        self.order_friction.clear();
        self.order_friction
            .extend((0..self.friction_constraints.len()).map(SolverConstraintId));
    }

    /// One normal row and two friction rows for a touching point.
    #[allow(clippy::too_many_arguments)]
    fn add_contact_rows(
        &mut self,
        rb0: &RigidBody,
        rb1: &RigidBody,
        sb_a: SolverBodyId,
        sb_b: SolverBodyId,
        cp: &mut ManifoldPoint,
        point: ContactPointRef,
        info: &ContactSolverInfo,
    ) {
        let dynamic_a = self.solver_bodies[sb_a.index()].is_dynamic();
        let dynamic_b = self.solver_bodies[sb_b.index()].is_dynamic();
        let warmstart = info.has_mode(SolverMode::USE_WARMSTARTING);

        let rel_pos1 = cp.position_world_on_a - rb0.center_of_mass_position();
        let rel_pos2 = cp.position_world_on_b - rb1.center_of_mass_position();
        let normal = cp.normal_world_on_b;

        let normal_index = SolverConstraintId(self.contact_constraints.len());
        let friction_index = SolverConstraintId(self.friction_constraints.len());

        let mut row = row_along(
            SolverConstraintType::Contact1D,
            sb_a,
            sb_b,
            &normal,
            (rb0, dynamic_a, &rel_pos1),
            (rb1, dynamic_b, &rel_pos2),
        );

        let vel = rb0.velocity_in_local_point(&rel_pos1) - rb1.velocity_in_local_point(&rel_pos2);
        let rel_vel = normal.dot(&vel);

        row.friction = cp.combined_friction;
        row.friction_index = friction_index;
        row.original_contact_point = Some(point);
        row.penetration = (cp.distance + info.linear_slop).min(0.0);
        row.restitution = (-cp.combined_restitution * rel_vel).max(0.0);
        // restitution already separates faster than the penetration would
        if row.restitution > -row.penetration / info.time_step {
            row.penetration = 0.0;
        }

        row.applied_impulse = if warmstart {
            cp.applied_impulse * info.warmstarting_factor
        } else {
            0.0
        };
        self.warm_start(&row);
        self.contact_constraints.push(row);

        if !cp.lateral_friction_initialized {
            let lateral = vel - normal * rel_vel;
            let (dir1, dir2) = if lateral.norm_squared() > EPSILON {
                let dir1 = lateral.normalize();
                (dir1, dir1.cross(&normal).normalize())
            } else {
                plane_space(&normal)
            };
            cp.lateral_friction_dir1 = dir1;
            cp.lateral_friction_dir2 = dir2;
            cp.lateral_friction_initialized = true;
        }

        let laterals = [
            (cp.lateral_friction_dir1, cp.applied_impulse_lateral1),
            (cp.lateral_friction_dir2, cp.applied_impulse_lateral2),
        ];
        for (dir, stored) in laterals {
            let mut row = row_along(
                SolverConstraintType::Friction1D,
                sb_a,
                sb_b,
                &dir,
                (rb0, dynamic_a, &rel_pos1),
                (rb1, dynamic_b, &rel_pos2),
            );
            row.friction = cp.combined_friction;
            row.friction_index = normal_index;
            row.original_contact_point = Some(point);
            row.applied_impulse = if warmstart {
                stored * info.warmstarting_factor
            } else {
                0.0
            };
            self.warm_start(&row);
            self.friction_constraints.push(row);
        }
    }

    fn warm_start(&mut self, row: &SolverConstraint) {
        if row.applied_impulse == 0.0 {
            return;
        }
        if let Some((a, b)) = pair_mut(&mut self.solver_bodies, row.solver_body_a, row.solver_body_b) {
            let linear_a = row.contact_normal * a.inv_mass;
            let linear_b = row.contact_normal * b.inv_mass;
            a.internal_apply_impulse(&linear_a, &row.angular_component_a, row.applied_impulse);
            b.internal_apply_impulse(&linear_b, &row.angular_component_b, -row.applied_impulse);
        }
    }

    fn iterate(
        &mut self,
        bodies: &mut RigidBodySet,
        constraints: &mut [Box<dyn TypedConstraint>],
        info: &ContactSolverInfo,
    ) {
        let randomize = info.has_mode(SolverMode::RANDOMIZE_ORDER);

        for iteration in 0..info.num_iterations {
            if randomize && iteration & 7 == 0 {
                shuffle(&mut self.order_contact, &mut self.rand_seed);
                shuffle(&mut self.order_friction, &mut self.rand_seed);
                trace!(iteration, seed = self.rand_seed, "reshuffled contact rows");
            }

            for constraint in constraints.iter_mut() {
                if constraint.is_broken() {
                    continue;
                }
                self.solve_joint(bodies, constraint.as_mut(), info.time_step);
            }

            for &index in &self.order_contact {
                let row = &mut self.contact_constraints[index.index()];
                resolve_contact_row(&mut self.solver_bodies, row, info);
            }

            for &index in &self.order_friction {
                let row = &mut self.friction_constraints[index.index()];
                let normal_impulse = self
                    .contact_constraints
                    .get(row.friction_index.index())
                    .map_or(0.0, SolverConstraint::total_impulse);
                resolve_friction_row(&mut self.solver_bodies, row, normal_impulse);
            }
        }
    }

    /// Solve one joint on the rigid bodies, keeping the pooled copies of its
    /// bodies in sync.
    fn solve_joint(
        &mut self,
        bodies: &mut RigidBodySet,
        constraint: &mut dyn TypedConstraint,
        time_step: f64,
    ) {
        self.scratch.clear();
        let scratch = &mut self.scratch;
        constraint.visit_bodies(&mut |id| scratch.push(id));

        for &id in &self.scratch {
            if let Some(index) = companion_of(bodies, &self.solver_bodies, id) {
                self.solver_bodies[index].writeback_velocity(bodies);
            }
        }

        constraint.solve_constraint(bodies, time_step);

        for &id in &self.scratch {
            if let Some(index) = companion_of(bodies, &self.solver_bodies, id) {
                self.solver_bodies[index].read_velocity(bodies);
            }
        }
    }

    fn solve_split_impulse(&mut self, info: &ContactSolverInfo) {
        for _ in 0..info.num_iterations {
            for &index in &self.order_contact {
                let row = &mut self.contact_constraints[index.index()];
                resolve_split_row(&mut self.solver_bodies, row, info);
            }
        }
    }

    fn finish(
        &mut self,
        bodies: &mut RigidBodySet,
        manifolds: &mut [ContactManifold],
        constraints: &[Box<dyn TypedConstraint>],
        info: &ContactSolverInfo,
    ) -> SolverStats {
        let mut max_normal_impulse: f64 = 0.0;

        for row in &self.contact_constraints {
            max_normal_impulse = max_normal_impulse.max(row.applied_impulse);
            let Some(point) = row.original_contact_point else {
                continue;
            };
            let Some(cp) = manifolds
                .get_mut(point.manifold)
                .and_then(|m| m.point_mut(point.point))
            else {
                continue;
            };
            let lateral = |offset: usize| {
                self.friction_constraints
                    .get(row.friction_index.index() + offset)
                    .map_or(0.0, |f| f.applied_impulse)
            };
            cp.applied_impulse = row.applied_impulse;
            cp.applied_impulse_lateral1 = lateral(0);
            cp.applied_impulse_lateral2 = lateral(1);
        }

        for solver_body in &self.solver_bodies {
            if info.split_impulse {
                solver_body.writeback_velocity_and_integrate(bodies, info.time_step);
            } else {
                solver_body.writeback_velocity(bodies);
            }
            if let Some(body) = bodies.get_mut(solver_body.original_body) {
                body.companion_id = None;
            }
        }

        let stats = SolverStats {
            solver_bodies: self.solver_bodies.len(),
            contact_rows: self.contact_constraints.len(),
            friction_rows: self.friction_constraints.len(),
            joints: constraints.len(),
            broken_joints: constraints.iter().filter(|c| c.is_broken()).count(),
            max_normal_impulse,
        };

        self.solver_bodies.clear();
        self.contact_constraints.clear();
        self.friction_constraints.clear();
        self.order_contact.clear();
        self.order_friction.clear();

        stats
    }

    fn solve_per_point(
        &mut self,
        bodies: &mut RigidBodySet,
        manifolds: &mut [ContactManifold],
        constraints: &mut [Box<dyn TypedConstraint>],
        info: &ContactSolverInfo,
    ) -> SolverStats {
        self.order_points.clear();
        let mut touching = 0;

        for (manifold_index, manifold) in manifolds.iter_mut().enumerate() {
            let (id0, id1) = (manifold.body0, manifold.body1);
            if manifold.num_contacts() == 0 {
                continue;
            }
            if both_static(bodies, id0, id1) {
                warn!(body0 = %id0, body1 = %id1, "manifold between two static bodies skipped");
                continue;
            }
            let Some((rb0, rb1)) = bodies.pair_mut(id0, id1) else {
                continue;
            };

            for (point_index, cp) in manifold.points_mut().iter_mut().enumerate() {
                self.order_points.push((manifold_index, point_index));
                if cp.distance <= 0.0 {
                    prepare_point(rb0, rb1, cp, &self.dispatch, info);
                    touching += 1;
                }
            }
        }

        for constraint in constraints.iter_mut() {
            constraint.build_jacobian(bodies, info);
        }

        let randomize = info.has_mode(SolverMode::RANDOMIZE_ORDER);
        for iteration in 0..info.num_iterations {
            if randomize && iteration & 7 == 0 {
                shuffle(&mut self.order_points, &mut self.rand_seed);
                trace!(iteration, seed = self.rand_seed, "reshuffled contact points");
            }

            for constraint in constraints.iter_mut() {
                if !constraint.is_broken() {
                    constraint.solve_constraint(bodies, info.time_step);
                }
            }
            for &point in &self.order_points {
                resolve_point(bodies, manifolds, point, info, PointPass::Contact);
            }
            for &point in &self.order_points {
                resolve_point(bodies, manifolds, point, info, PointPass::Friction);
            }
        }

        let mut max_normal_impulse: f64 = 0.0;
        for &(manifold_index, point_index) in &self.order_points {
            let Some(cp) = manifolds
                .get_mut(manifold_index)
                .and_then(|m| m.point_mut(point_index))
            else {
                continue;
            };
            if cp.distance > 0.0 {
                continue;
            }
            if let Some(cpd) = &cp.user_persistent_data {
                cp.applied_impulse = cpd.applied_impulse;
                cp.applied_impulse_lateral1 = cpd.accumulated_tangent_impulse0;
                cp.applied_impulse_lateral2 = cpd.accumulated_tangent_impulse1;
                max_normal_impulse = max_normal_impulse.max(cpd.applied_impulse);
            }
        }
        self.order_points.clear();

        SolverStats {
            solver_bodies: 0,
            contact_rows: touching,
            friction_rows: 2 * touching,
            joints: constraints.len(),
            broken_joints: constraints.iter().filter(|c| c.is_broken()).count(),
            max_normal_impulse,
        }
    }
}

fn check_bodies(
    bodies: &RigidBodySet,
    body_ids: &[BodyId],
    manifolds: &[ContactManifold],
    constraints: &[Box<dyn TypedConstraint>],
) -> Result<()> {
    for &id in body_ids {
        bodies.check(id)?;
    }
    for manifold in manifolds {
        bodies.check(manifold.body0)?;
        bodies.check(manifold.body1)?;
    }
    for constraint in constraints {
        let mut invalid = None;
        constraint.visit_bodies(&mut |id| {
            if invalid.is_none() && !bodies.contains(id) {
                invalid = Some(id);
            }
        });
        if let Some(id) = invalid {
            return Err(SimError::InvalidBodyId(id.raw()));
        }
    }
    Ok(())
}

fn both_static(bodies: &RigidBodySet, id0: BodyId, id1: BodyId) -> bool {
    let is_static = |id| bodies.get(id).is_none_or(RigidBody::is_static);
    is_static(id0) && is_static(id1)
}

/// Arena index of the pooled copy of `id`, if one was made this solve.
fn companion_of(bodies: &RigidBodySet, solver_bodies: &[SolverBody], id: BodyId) -> Option<usize> {
    let body = bodies.get(id)?;
    if body.island_tag < 0 {
        return None;
    }
    body.companion_id
        .filter(|&index| solver_bodies.get(index).is_some_and(|sb| sb.original_body == id))
}

/// A row along `axis` with its angular components and effective mass.
///
/// Angular components and mass terms are only taken from dynamic sides.
fn row_along(
    constraint_type: SolverConstraintType,
    sb_a: SolverBodyId,
    sb_b: SolverBodyId,
    axis: &Vector3<f64>,
    (rb0, dynamic_a, rel_pos1): (&RigidBody, bool, &Vector3<f64>),
    (rb1, dynamic_b, rel_pos2): (&RigidBody, bool, &Vector3<f64>),
) -> SolverConstraint {
    let mut row = SolverConstraint::new(constraint_type, sb_a, sb_b);
    row.contact_normal = *axis;
    row.rel_pos1_cross_normal = rel_pos1.cross(axis);
    row.rel_pos2_cross_normal = rel_pos2.cross(axis);

    let mut denominator = 0.0;
    if dynamic_a {
        row.angular_component_a = rb0.inv_inertia_world() * row.rel_pos1_cross_normal;
        denominator += rb0.inverse_mass() + axis.dot(&row.angular_component_a.cross(rel_pos1));
    }
    if dynamic_b {
        row.angular_component_b = rb1.inv_inertia_world() * row.rel_pos2_cross_normal;
        denominator += rb1.inverse_mass() + axis.dot(&row.angular_component_b.cross(rel_pos2));
    }
    debug_assert!(denominator > 0.0, "contact row between two immovable bodies");
    row.jac_diag_ab_inv = inverse_or_zero(denominator);
    row
}

/// Relative velocity of the two bodies along the row.
fn row_velocity(
    row: &SolverConstraint,
    (linear_a, angular_a): (&Vector3<f64>, &Vector3<f64>),
    (linear_b, angular_b): (&Vector3<f64>, &Vector3<f64>),
) -> f64 {
    let vel1 = row.contact_normal.dot(linear_a) + row.rel_pos1_cross_normal.dot(angular_a);
    let vel2 = row.contact_normal.dot(linear_b) + row.rel_pos2_cross_normal.dot(angular_b);
    vel1 - vel2
}

fn apply_row(a: &mut SolverBody, b: &mut SolverBody, row: &SolverConstraint, impulse: f64) {
    let linear_a = row.contact_normal * a.inv_mass;
    let linear_b = row.contact_normal * b.inv_mass;
    a.internal_apply_impulse(&linear_a, &row.angular_component_a, impulse);
    b.internal_apply_impulse(&linear_b, &row.angular_component_b, -impulse);
}

/// One normal-row update; the accumulated impulse stays non-negative.
fn resolve_contact_row(
    solver_bodies: &mut [SolverBody],
    row: &mut SolverConstraint,
    info: &ContactSolverInfo,
) -> f64 {
    let Some((a, b)) = pair_mut(solver_bodies, row.solver_body_a, row.solver_body_b) else {
        return 0.0;
    };

    let rel_vel = row_velocity(
        row,
        (&a.linear_velocity, &a.angular_velocity),
        (&b.linear_velocity, &b.angular_velocity),
    );

    // deep penetrations are left to the split pass
    let positional_error =
        if !info.split_impulse || row.penetration > info.split_impulse_penetration_threshold {
            -row.penetration * info.erp / info.time_step
        } else {
            0.0
        };
    let velocity_error = row.restitution - rel_vel;
    let impulse = (positional_error + velocity_error) * row.jac_diag_ab_inv;

    let old = row.applied_impulse;
    row.applied_impulse = (old + impulse).max(0.0);
    let impulse = row.applied_impulse - old;

    apply_row(a, b, row, impulse);
    impulse
}

/// One friction-row update, bounded by the normal impulse times friction.
fn resolve_friction_row(solver_bodies: &mut [SolverBody], row: &mut SolverConstraint, normal_impulse: f64) {
    if normal_impulse <= 0.0 {
        return;
    }
    let Some((a, b)) = pair_mut(solver_bodies, row.solver_body_a, row.solver_body_b) else {
        return;
    };

    let rel_vel = row_velocity(
        row,
        (&a.linear_velocity, &a.angular_velocity),
        (&b.linear_velocity, &b.angular_velocity),
    );
    let limit = normal_impulse * row.friction;
    let impulse = -rel_vel * row.jac_diag_ab_inv;

    let old = row.applied_impulse;
    row.applied_impulse = (old + impulse).max(-limit).min(limit);
    let impulse = row.applied_impulse - old;

    apply_row(a, b, row, impulse);
}

/// Pseudo-velocity update for a row deeper than the split threshold.
fn resolve_split_row(solver_bodies: &mut [SolverBody], row: &mut SolverConstraint, info: &ContactSolverInfo) {
    if row.penetration >= info.split_impulse_penetration_threshold {
        return;
    }
    let Some((a, b)) = pair_mut(solver_bodies, row.solver_body_a, row.solver_body_b) else {
        return;
    };

    let rel_vel = row_velocity(
        row,
        (&a.push_velocity, &a.turn_velocity),
        (&b.push_velocity, &b.turn_velocity),
    );
    let positional_error = -row.penetration * info.erp2 / info.time_step;
    let velocity_error = row.restitution - rel_vel;
    let impulse = (positional_error + velocity_error) * row.jac_diag_ab_inv;

    let old = row.applied_push_impulse;
    row.applied_push_impulse = (old + impulse).max(0.0);
    let impulse = row.applied_push_impulse - old;

    let linear_a = row.contact_normal * a.inv_mass;
    let linear_b = row.contact_normal * b.inv_mass;
    a.internal_apply_push_impulse(&linear_a, &row.angular_component_a, impulse);
    b.internal_apply_push_impulse(&linear_b, &row.angular_component_b, -impulse);
}

/// Refresh the per-point cache and apply the warm-start impulse.
fn prepare_point(
    rb0: &mut RigidBody,
    rb1: &mut RigidBody,
    cp: &mut ManifoldPoint,
    dispatch: &ContactDispatch,
    info: &ContactSolverInfo,
) {
    let pos1 = cp.position_world_on_a;
    let pos2 = cp.position_world_on_b;
    let normal = cp.normal_world_on_b;
    let distance = cp.distance;
    let combined_friction = cp.combined_friction;
    let combined_restitution = cp.combined_restitution;
    let life_time = cp.life_time;

    let cpd = cp.user_persistent_data.get_or_insert_with(|| ConstraintPersistentData {
        persistent_life_time: life_time - 1,
        ..ConstraintPersistentData::new()
    });
    cpd.persistent_life_time += 1;
    if cpd.persistent_life_time != life_time {
        cpd.reset();
        cpd.persistent_life_time = life_time;
    }

    let rel_pos1 = pos1 - rb0.center_of_mass_position();
    let rel_pos2 = pos2 - rb1.center_of_mass_position();

    cpd.jac_diag_ab_inv = calculate_diagonal_inv(
        &rb0.pose.basis(),
        &rb1.pose.basis(),
        &rel_pos1,
        &rel_pos2,
        &normal,
        rb0.inv_inertia_local(),
        rb0.inverse_mass(),
        rb1.inv_inertia_local(),
        rb1.inverse_mass(),
    );
    cpd.contact_solver_func =
        Some(dispatch.contact_func(rb0.contact_solver_type, rb1.contact_solver_type));
    cpd.friction_solver_func =
        Some(dispatch.friction_func(rb0.friction_solver_type, rb1.friction_solver_type));

    let vel = rb0.velocity_in_local_point(&rel_pos1) - rb1.velocity_in_local_point(&rel_pos2);
    let rel_vel = normal.dot(&vel);

    cpd.penetration = distance;
    cpd.friction = combined_friction;
    cpd.restitution = (-combined_restitution * rel_vel).max(0.0);
    if cpd.restitution > -cpd.penetration / info.time_step {
        cpd.penetration = 0.0;
    }

    let relaxation = info.damping;
    if info.has_mode(SolverMode::USE_WARMSTARTING) {
        cpd.applied_impulse *= relaxation;
    } else {
        cpd.applied_impulse = 0.0;
    }
    cpd.prev_applied_impulse = cpd.applied_impulse;

    // tangents are rebuilt every frame and friction starts cold
    let (t0, t1) = plane_space(&normal);
    cpd.friction_world_tangential0 = t0;
    cpd.friction_world_tangential1 = t1;
    cpd.accumulated_tangent_impulse0 = 0.0;
    cpd.accumulated_tangent_impulse1 = 0.0;

    let tangent_jac = |t: &Vector3<f64>| {
        let denominator =
            rb0.compute_impulse_denominator(&pos1, t) + rb1.compute_impulse_denominator(&pos2, t);
        relaxation * inverse_or_zero(denominator)
    };
    cpd.jac_diag_ab_inv_tangent0 = tangent_jac(&t0);
    cpd.jac_diag_ab_inv_tangent1 = tangent_jac(&t1);

    cpd.angular_component_a = rb0.inv_inertia_world() * rel_pos1.cross(&normal);
    cpd.angular_component_b = rb1.inv_inertia_world() * rel_pos2.cross(&normal);
    cpd.friction_angular_component0_a = rb0.inv_inertia_world() * rel_pos1.cross(&t0);
    cpd.friction_angular_component0_b = rb1.inv_inertia_world() * rel_pos2.cross(&t0);
    cpd.friction_angular_component1_a = rb0.inv_inertia_world() * rel_pos1.cross(&t1);
    cpd.friction_angular_component1_b = rb1.inv_inertia_world() * rel_pos2.cross(&t1);

    let total = normal * cpd.applied_impulse;
    rb0.apply_impulse(&total, &rel_pos1);
    rb1.apply_impulse(&(-total), &rel_pos2);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PointPass {
    Contact,
    Friction,
}

fn resolve_point(
    bodies: &mut RigidBodySet,
    manifolds: &mut [ContactManifold],
    (manifold_index, point_index): (usize, usize),
    info: &ContactSolverInfo,
    pass: PointPass,
) -> f64 {
    let Some(manifold) = manifolds.get_mut(manifold_index) else {
        return 0.0;
    };
    let (id0, id1) = (manifold.body0, manifold.body1);
    let Some(cp) = manifold.point_mut(point_index) else {
        return 0.0;
    };
    if cp.distance > 0.0 {
        return 0.0;
    }
    let func = cp.user_persistent_data.as_ref().and_then(|cpd| match pass {
        PointPass::Contact => cpd.contact_solver_func,
        PointPass::Friction => cpd.friction_solver_func,
    });
    let Some(func) = func else {
        return 0.0;
    };
    let Some((rb0, rb1)) = bodies.pair_mut(id0, id1) else {
        return 0.0;
    };
    func(rb0, rb1, cp, info)
}
