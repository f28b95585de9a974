//! Body identifiers, poses, and mass properties.
//!
//! These are the plain-data building blocks that [`RigidBody`](crate::RigidBody)
//! is assembled from.

use nalgebra::{Matrix3, Point3, UnitQuaternion, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Unique identifier for a rigid body in a [`RigidBodySet`](crate::RigidBodySet).
///
/// The raw value is the body's index in the set. [`BodyId::FIXED`] refers to
/// the set's shared fixed body, which stands in for a missing constraint endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BodyId(pub u64);

impl BodyId {
    /// Handle of the immovable fixed body (infinite mass, zero velocity).
    pub const FIXED: Self = Self(u64::MAX);

    /// Create a new body ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Whether this handle refers to the fixed body.
    #[must_use]
    pub const fn is_fixed(self) -> bool {
        self.0 == u64::MAX
    }

    /// Index into the body storage, `None` for the fixed body.
    #[must_use]
    pub fn index(self) -> Option<usize> {
        if self.is_fixed() {
            None
        } else {
            usize::try_from(self.0).ok()
        }
    }
}

impl From<u64> for BodyId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for BodyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_fixed() {
            write!(f, "Body(fixed)")
        } else {
            write!(f, "Body({})", self.0)
        }
    }
}

/// Position and orientation of a rigid body or a constraint frame.
///
/// # Example
///
/// ```
/// use sim_types::Pose;
/// use nalgebra::Point3;
///
/// let pose = Pose::from_position(Point3::new(1.0, 2.0, 3.0));
/// let world = pose.transform_point(&Point3::new(1.0, 0.0, 0.0));
/// assert_eq!(world, Point3::new(2.0, 2.0, 3.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Pose {
    /// Position in world coordinates.
    pub position: Point3<f64>,
    /// Orientation as a unit quaternion.
    pub rotation: UnitQuaternion<f64>,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    /// Create an identity pose (origin, no rotation).
    #[must_use]
    pub fn identity() -> Self {
        Self {
            position: Point3::origin(),
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Create a pose from position only (identity rotation).
    #[must_use]
    pub fn from_position(position: Point3<f64>) -> Self {
        Self {
            position,
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Create a pose from position and rotation.
    #[must_use]
    pub const fn from_position_rotation(
        position: Point3<f64>,
        rotation: UnitQuaternion<f64>,
    ) -> Self {
        Self { position, rotation }
    }

    /// Create a pose from a position and a rotation matrix.
    ///
    /// The matrix is re-orthonormalized through quaternion extraction.
    #[must_use]
    pub fn from_basis(position: Point3<f64>, basis: &Matrix3<f64>) -> Self {
        Self {
            position,
            rotation: UnitQuaternion::from_matrix(basis),
        }
    }

    /// Rotation as a 3x3 basis matrix (columns are the local axes in world space).
    #[must_use]
    pub fn basis(&self) -> Matrix3<f64> {
        self.rotation.to_rotation_matrix().into_inner()
    }

    /// Transform a point from local to world coordinates.
    #[must_use]
    pub fn transform_point(&self, local: &Point3<f64>) -> Point3<f64> {
        self.position + self.rotation * local.coords
    }

    /// Transform a vector from local to world coordinates (rotation only).
    #[must_use]
    pub fn transform_vector(&self, local: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * local
    }

    /// Check if the pose contains `NaN` or `Inf` values.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.position.coords.iter().all(|x| x.is_finite())
            && self.rotation.coords.iter().all(|x| x.is_finite())
    }
}

/// Mass properties of a rigid body.
///
/// The inertia tensor is expressed about the center of mass in the body's
/// principal frame; only its diagonal is used by the solver.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MassProperties {
    /// Total mass in kg. Zero or infinity marks a static body.
    pub mass: f64,
    /// Inertia tensor about center of mass in local coordinates (kg·m²).
    pub inertia: Matrix3<f64>,
}

impl MassProperties {
    /// Create mass properties with given values.
    #[must_use]
    pub const fn new(mass: f64, inertia: Matrix3<f64>) -> Self {
        Self { mass, inertia }
    }

    /// Mass properties of an immovable body.
    #[must_use]
    pub fn static_body() -> Self {
        Self {
            mass: 0.0,
            inertia: Matrix3::zeros(),
        }
    }

    /// Create mass properties for a point mass (no rotational inertia).
    #[must_use]
    pub fn point_mass(mass: f64) -> Self {
        Self {
            mass,
            inertia: Matrix3::zeros(),
        }
    }

    /// Create mass properties for a uniform sphere.
    ///
    /// Inertia of a solid sphere: I = (2/5) * m * r²
    #[must_use]
    pub fn sphere(mass: f64, radius: f64) -> Self {
        let i = 0.4 * mass * radius * radius;
        Self {
            mass,
            inertia: Matrix3::from_diagonal(&Vector3::new(i, i, i)),
        }
    }

    /// Create mass properties for a uniform box.
    ///
    /// Inertia of a solid box with dimensions (x, y, z):
    /// - Ixx = (1/12) * m * (y² + z²)
    /// - Iyy = (1/12) * m * (x² + z²)
    /// - Izz = (1/12) * m * (x² + y²)
    #[must_use]
    pub fn box_shape(mass: f64, half_extents: Vector3<f64>) -> Self {
        let x2 = 4.0 * half_extents.x * half_extents.x;
        let y2 = 4.0 * half_extents.y * half_extents.y;
        let z2 = 4.0 * half_extents.z * half_extents.z;

        Self {
            mass,
            inertia: Matrix3::from_diagonal(&Vector3::new(
                mass * (y2 + z2) / 12.0,
                mass * (x2 + z2) / 12.0,
                mass * (x2 + y2) / 12.0,
            )),
        }
    }

    /// Get the inverse mass (0 if mass is zero/infinite, i.e. static).
    #[must_use]
    pub fn inverse_mass(&self) -> f64 {
        if self.is_static() { 0.0 } else { 1.0 / self.mass }
    }

    /// Inverse of the principal moments, with zero for locked axes.
    #[must_use]
    pub fn inverse_inertia_diagonal(&self) -> Vector3<f64> {
        if self.is_static() {
            return Vector3::zeros();
        }
        self.inertia
            .diagonal()
            .map(|i| if i > 0.0 && i.is_finite() { 1.0 / i } else { 0.0 })
    }

    /// Check if this represents a static (immovable) body.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.mass <= 0.0 || self.mass.is_infinite()
    }

    /// Validate that the mass properties are physically valid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.mass < 0.0 {
            return Err(crate::SimError::invalid_mass("mass cannot be negative"));
        }

        if !self.mass.is_finite() && self.mass != f64::INFINITY {
            return Err(crate::SimError::invalid_mass(
                "mass must be finite or infinity (static)",
            ));
        }

        if self.inertia.diagonal().iter().any(|&i| i < 0.0 || i.is_nan()) {
            return Err(crate::SimError::invalid_mass(
                "principal moments must be non-negative",
            ));
        }

        Ok(())
    }
}
