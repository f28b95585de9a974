//! Small vector/rotation helpers shared by the contact and joint solvers.

use nalgebra::{Matrix3, Point3, Quaternion, UnitQuaternion, Vector3};

use crate::Pose;

/// Tolerance used for degenerate-direction guards (single-precision epsilon).
pub const EPSILON: f64 = 1.192_092_9e-7;

/// Largest rotation (radians) allowed in a single integration step.
pub const ANGULAR_MOTION_THRESHOLD: f64 = 0.5 * std::f64::consts::FRAC_PI_2;

/// Build two unit vectors `p`, `q` so that `(n, p, q)` is an orthonormal basis.
///
/// `n` must be unit length. The branch avoids the numerically weak axis.
#[must_use]
pub fn plane_space(n: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
    if n.z.abs() > std::f64::consts::FRAC_1_SQRT_2 {
        // choose p in y-z plane
        let a = n.y * n.y + n.z * n.z;
        let k = 1.0 / a.sqrt();
        let p = Vector3::new(0.0, -n.z * k, n.y * k);
        let q = Vector3::new(a * k, -n.x * p.z, n.x * p.y);
        (p, q)
    } else {
        // choose p in x-y plane
        let a = n.x * n.x + n.y * n.y;
        let k = 1.0 / a.sqrt();
        let p = Vector3::new(-n.y * k, n.x * k, 0.0);
        let q = Vector3::new(-n.z * p.y, n.z * p.x, a * k);
        (p, q)
    }
}

/// Shortest-arc rotation taking unit vector `v0` onto unit vector `v1`.
///
/// For opposite vectors any perpendicular axis is used.
#[must_use]
pub fn shortest_arc(v0: &Vector3<f64>, v1: &Vector3<f64>) -> UnitQuaternion<f64> {
    let c = v0.cross(v1);
    let d = v0.dot(v1);

    if d < -1.0 + EPSILON {
        let (n, _) = plane_space(v0);
        return UnitQuaternion::new_normalize(Quaternion::new(0.0, n.x, n.y, n.z));
    }

    let s = ((1.0 + d) * 2.0).sqrt();
    let rs = 1.0 / s;
    UnitQuaternion::new_normalize(Quaternion::new(s * 0.5, c.x * rs, c.y * rs, c.z * rs))
}

/// Advance a pose by constant linear and angular velocity over `dt`.
///
/// Uses the exponential map with a Taylor expansion for small angles and
/// clamps the per-step rotation to [`ANGULAR_MOTION_THRESHOLD`].
#[must_use]
pub fn integrate_transform(
    pose: &Pose,
    linear_velocity: &Vector3<f64>,
    angular_velocity: &Vector3<f64>,
    dt: f64,
) -> Pose {
    let position = Point3::from(pose.position.coords + linear_velocity * dt);

    let mut angle = angular_velocity.norm();
    if angle * dt > ANGULAR_MOTION_THRESHOLD {
        angle = ANGULAR_MOTION_THRESHOLD / dt;
    }

    let axis = if angle < 0.001 {
        // Taylor expansion of sin(x/2)/x
        angular_velocity * (0.5 * dt - (dt * dt * dt) * (0.020_833_333_333 * angle * angle))
    } else {
        angular_velocity * ((0.5 * angle * dt).sin() / angle)
    };

    let dorn = Quaternion::new((angle * dt * 0.5).cos(), axis.x, axis.y, axis.z);
    let rotation = UnitQuaternion::new_normalize(dorn * pose.rotation.into_inner());

    Pose::from_position_rotation(position, rotation)
}

/// Decompose a rotation matrix into XYZ Euler angles.
///
/// Elements are read column-major, so the angles describe the frame
/// composed as z about the first frame, then y, then x about the second
/// frame. The flag is `false` in the non-unique gimbal-lock branches, where
/// the middle angle is ±π/2 and the last angle is reported as zero.
#[must_use]
pub fn matrix_to_euler_xyz(mat: &Matrix3<f64>) -> (Vector3<f64>, bool) {
    let elem = |index: usize| mat[(index % 3, index / 3)];

    let fi = elem(2);
    if fi < 1.0 {
        if fi > -1.0 {
            let xyz = Vector3::new(
                (-elem(5)).atan2(elem(8)),
                fi.asin(),
                (-elem(1)).atan2(elem(0)),
            );
            (xyz, true)
        } else {
            // not unique: x - z = -atan2(r10, r11)
            let x = -elem(3).atan2(elem(4));
            (Vector3::new(x, -std::f64::consts::FRAC_PI_2, 0.0), false)
        }
    } else {
        // not unique: x + z = atan2(r10, r11)
        let x = elem(3).atan2(elem(4));
        (Vector3::new(x, std::f64::consts::FRAC_PI_2, 0.0), false)
    }
}

/// Normalize an angle into `[-π, π]`.
#[must_use]
pub fn normalize_angle(angle: f64) -> f64 {
    let two_pi = std::f64::consts::TAU;
    let a = angle % two_pi;
    if a < -std::f64::consts::PI {
        a + two_pi
    } else if a > std::f64::consts::PI {
        a - two_pi
    } else {
        a
    }
}
