//! Selection of per-point resolution functions by body type.

use sim_types::{ContactSolverInfo, ContactSolverType, RigidBody};

use crate::{ManifoldPoint, resolve_single_collision, resolve_single_friction};

/// Signature shared by contact and friction resolution functions.
///
/// Returns the impulse the function considers relevant for its caller (the
/// applied normal impulse for the built-in functions).
pub type ContactSolverFn =
    fn(&mut RigidBody, &mut RigidBody, &mut ManifoldPoint, &ContactSolverInfo) -> f64;

const N: usize = ContactSolverType::COUNT;

/// Square tables of contact and friction functions indexed by the two
/// bodies' [`ContactSolverType`]s.
///
/// Every slot starts at [`resolve_single_collision`] /
/// [`resolve_single_friction`].
#[derive(Debug, Clone, Copy)]
pub struct ContactDispatch {
    contact: [[ContactSolverFn; N]; N],
    friction: [[ContactSolverFn; N]; N],
}

impl Default for ContactDispatch {
    fn default() -> Self {
        Self {
            contact: [[resolve_single_collision as ContactSolverFn; N]; N],
            friction: [[resolve_single_friction as ContactSolverFn; N]; N],
        }
    }
}

impl ContactDispatch {
    /// Tables with the built-in functions in every slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Contact function for a body pair.
    #[must_use]
    pub fn contact_func(&self, type0: ContactSolverType, type1: ContactSolverType) -> ContactSolverFn {
        self.contact[type0.index()][type1.index()]
    }

    /// Friction function for a body pair.
    #[must_use]
    pub fn friction_func(&self, type0: ContactSolverType, type1: ContactSolverType) -> ContactSolverFn {
        self.friction[type0.index()][type1.index()]
    }

    /// Install a contact function for one ordered pair of types.
    pub fn set_contact_func(
        &mut self,
        func: ContactSolverFn,
        type0: ContactSolverType,
        type1: ContactSolverType,
    ) {
        self.contact[type0.index()][type1.index()] = func;
    }

    /// Install a friction function for one ordered pair of types.
    pub fn set_friction_func(
        &mut self,
        func: ContactSolverFn,
        type0: ContactSolverType,
        type1: ContactSolverType,
    ) {
        self.friction[type0.index()][type1.index()] = func;
    }
}
