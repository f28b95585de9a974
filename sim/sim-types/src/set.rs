//! Storage for the rigid bodies of one simulation.

use crate::{BodyId, RigidBody, SimError};

/// Indexed collection of rigid bodies plus the shared fixed body.
///
/// Bodies are addressed by [`BodyId`]; [`BodyId::FIXED`] resolves to the
/// fixed body, which stays at rest no matter what is applied to it.
#[derive(Debug, Clone, Default)]
pub struct RigidBodySet {
    bodies: Vec<RigidBody>,
    fixed: RigidBody,
}

impl RigidBodySet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty set with room for `capacity` bodies.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bodies: Vec::with_capacity(capacity),
            fixed: RigidBody::fixed(),
        }
    }

    /// Add a body and return its handle.
    pub fn insert(&mut self, body: RigidBody) -> BodyId {
        let id = BodyId::new(self.bodies.len() as u64);
        self.bodies.push(body);
        id
    }

    /// Number of bodies (the fixed body is not counted).
    #[must_use]
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    /// Whether the set has no bodies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Whether `id` refers to the fixed body or a stored body.
    #[must_use]
    pub fn contains(&self, id: BodyId) -> bool {
        id.is_fixed() || id.index().is_some_and(|i| i < self.bodies.len())
    }

    /// Check that `id` is valid.
    pub fn check(&self, id: BodyId) -> crate::Result<()> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(SimError::InvalidBodyId(id.raw()))
        }
    }

    /// Look up a body; the fixed handle resolves to the fixed body.
    #[must_use]
    pub fn get(&self, id: BodyId) -> Option<&RigidBody> {
        match id.index() {
            None => Some(&self.fixed),
            Some(i) => self.bodies.get(i),
        }
    }

    /// Mutable lookup. The fixed body is never handed out here.
    pub fn get_mut(&mut self, id: BodyId) -> Option<&mut RigidBody> {
        self.bodies.get_mut(id.index()?)
    }

    /// The shared fixed body.
    #[must_use]
    pub fn fixed(&self) -> &RigidBody {
        &self.fixed
    }

    /// Borrow two distinct bodies mutably.
    ///
    /// Either handle may be [`BodyId::FIXED`]; the fixed body is restored to
    /// rest before it is handed out. Returns `None` if the handles are equal
    /// or either is out of range.
    pub fn pair_mut(&mut self, a: BodyId, b: BodyId) -> Option<(&mut RigidBody, &mut RigidBody)> {
        if a == b {
            return None;
        }
        self.fixed = RigidBody::fixed();

        match (a.index(), b.index()) {
            (Some(i), None) => Some((self.bodies.get_mut(i)?, &mut self.fixed)),
            (None, Some(j)) => Some((&mut self.fixed, self.bodies.get_mut(j)?)),
            (Some(i), Some(j)) => {
                if i.max(j) >= self.bodies.len() {
                    return None;
                }
                if i < j {
                    let (lo, hi) = self.bodies.split_at_mut(j);
                    Some((&mut lo[i], &mut hi[0]))
                } else {
                    let (lo, hi) = self.bodies.split_at_mut(i);
                    Some((&mut hi[0], &mut lo[j]))
                }
            }
            (None, None) => None,
        }
    }

    /// Iterate over `(id, body)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (BodyId, &RigidBody)> {
        self.bodies
            .iter()
            .enumerate()
            .map(|(i, b)| (BodyId::new(i as u64), b))
    }

    /// Iterate mutably over `(id, body)` pairs.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (BodyId, &mut RigidBody)> {
        self.bodies
            .iter_mut()
            .enumerate()
            .map(|(i, b)| (BodyId::new(i as u64), b))
    }

    /// Handles of all stored bodies.
    pub fn ids(&self) -> impl Iterator<Item = BodyId> + '_ {
        (0..self.bodies.len()).map(|i| BodyId::new(i as u64))
    }
}
