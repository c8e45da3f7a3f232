//! Transform utilities: rigid offsets between hierarchical nodes.
//!
//! All offset math runs on quaternions. Scale and shear are not modelled: a pose is a rigid
//! isometry, and any scale in the host hierarchy is ignored. Euler angles appear only when a
//! sample is converted for a host that keys Euler channels, using XYZ order (X applied first).

use nalgebra::{Isometry3, Quaternion, Translation3, UnitQuaternion, Vector3};

/// World or local rigid transform.
pub type Pose = Isometry3<f64>;

/// Split a pose into translation and rotation.
#[inline]
pub fn decompose(pose: &Pose) -> (Vector3<f64>, UnitQuaternion<f64>) {
    (pose.translation.vector, pose.rotation)
}

/// Inverse of [`decompose`].
#[inline]
pub fn compose(translation: Vector3<f64>, rotation: UnitQuaternion<f64>) -> Pose {
    Isometry3::from_parts(Translation3::from(translation), rotation)
}

/// Offset, expressed in the driver's space, such that `driver * offset == driven`.
///
/// Applying it through [`apply_local_offset`] reproduces the driven world pose exactly at
/// the instant the offset was taken.
pub fn compute_local_offset(
    driven: &Pose,
    driver: &Pose,
) -> (Vector3<f64>, UnitQuaternion<f64>) {
    decompose(&(driver.inverse() * driven))
}

#[inline]
pub fn apply_local_offset(
    driver: &Pose,
    translation: &Vector3<f64>,
    rotation: &UnitQuaternion<f64>,
) -> Pose {
    driver * compose(*translation, *rotation)
}

/// Independent translation and rotation offsets.
///
/// The translation part is a world-space delta, so it never picks up the driver's rotation.
/// The rotation part is `driver⁻¹ · driven` and ignores translation entirely.
pub fn compute_split_offset(
    driven: &Pose,
    driver: &Pose,
) -> (Vector3<f64>, UnitQuaternion<f64>) {
    (
        driven.translation.vector - driver.translation.vector,
        driver.rotation.inverse() * driven.rotation,
    )
}

#[inline]
pub fn apply_translation_offset(driver: &Pose, offset: &Vector3<f64>) -> Vector3<f64> {
    driver.translation.vector + offset
}

#[inline]
pub fn apply_rotation_offset(
    driver: &Pose,
    offset: &UnitQuaternion<f64>,
) -> UnitQuaternion<f64> {
    driver.rotation * offset
}

/// Re-express a world pose in the space of `parent_world`.
#[inline]
pub fn world_to_local(parent_world: &Pose, world: &Pose) -> Pose {
    parent_world.inverse() * world
}

/// Euler angles in degrees, XYZ order.
pub fn euler_xyz_degrees(rotation: &UnitQuaternion<f64>) -> [f64; 3] {
    let (x, y, z) = rotation.euler_angles();
    [x.to_degrees(), y.to_degrees(), z.to_degrees()]
}

pub fn from_euler_xyz_degrees(angles: [f64; 3]) -> UnitQuaternion<f64> {
    UnitQuaternion::from_euler_angles(
        angles[0].to_radians(),
        angles[1].to_radians(),
        angles[2].to_radians(),
    )
}

#[inline]
pub fn vec3_to_array(v: &Vector3<f64>) -> [f64; 3] {
    [v.x, v.y, v.z]
}

#[inline]
pub fn vec3_from_array(a: [f64; 3]) -> Vector3<f64> {
    Vector3::new(a[0], a[1], a[2])
}

/// Quaternion as (x, y, z, w).
#[inline]
pub fn quat_to_xyzw(q: &UnitQuaternion<f64>) -> [f64; 4] {
    [q.i, q.j, q.k, q.w]
}

/// Quaternion from (x, y, z, w); renormalised, identity for a zero quaternion.
pub fn quat_from_xyzw(q: [f64; 4]) -> UnitQuaternion<f64> {
    let raw = Quaternion::new(q[3], q[0], q[1], q[2]);
    if raw.norm_squared() <= f64::EPSILON {
        return UnitQuaternion::identity();
    }
    UnitQuaternion::from_quaternion(raw)
}

/// Pose equality within `epsilon` (translation distance and rotation angle in radians).
pub fn poses_approx_eq(a: &Pose, b: &Pose, epsilon: f64) -> bool {
    (a.translation.vector - b.translation.vector).norm() <= epsilon
        && a.rotation.angle_to(&b.rotation) <= epsilon
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_4;

    fn pose(t: [f64; 3], axis_angle: [f64; 3]) -> Pose {
        compose(
            vec3_from_array(t),
            UnitQuaternion::from_scaled_axis(vec3_from_array(axis_angle)),
        )
    }

    fn samples() -> Vec<Pose> {
        vec![
            Pose::identity(),
            pose([3.0, 0.0, 0.0], [0.0, 0.0, 0.0]),
            pose([1.0, -2.0, 0.5], [0.0, 0.0, FRAC_PI_4]),
            pose([-4.0, 1.5, 2.0], [1.2, -0.7, 2.9]),
            pose([0.1, 0.2, 0.3], [0.0, 3.1, 0.0]),
            pose([10.0, 0.0, -7.0], [-2.0, 1.0, 0.4]),
        ]
    }

    #[test]
    fn compose_decompose_round_trip() {
        for p in samples() {
            let (t, r) = decompose(&p);
            assert_relative_eq!(compose(t, r), p, epsilon = 1e-12);
        }
    }

    #[test]
    fn local_offset_preserves_driven_pose() {
        for driver in samples() {
            for driven in samples() {
                let (t, r) = compute_local_offset(&driven, &driver);
                let out = apply_local_offset(&driver, &t, &r);
                assert!(poses_approx_eq(&out, &driven, 1e-9), "{driver:?} {driven:?}");
            }
        }
    }

    #[test]
    fn split_offset_preserves_driven_pose() {
        for driver in samples() {
            for driven in samples() {
                let (t, r) = compute_split_offset(&driven, &driver);
                let out = compose(
                    apply_translation_offset(&driver, &t),
                    apply_rotation_offset(&driver, &r),
                );
                assert!(poses_approx_eq(&out, &driven, 1e-9));
            }
        }
    }

    #[test]
    fn split_translation_ignores_driver_rotation() {
        let driver = pose([1.0, 0.0, 0.0], [0.0, 0.0, 0.0]);
        let driven = pose([3.0, 0.0, 0.0], [0.0, 0.0, 0.0]);
        let (t, _) = compute_split_offset(&driven, &driver);

        let rotated = pose([1.0, 0.0, 0.0], [0.0, 0.0, FRAC_PI_4]);
        assert_relative_eq!(
            apply_translation_offset(&rotated, &t),
            Vector3::new(3.0, 0.0, 0.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn world_to_local_inverts_parenting() {
        let parent = pose([1.0, 2.0, 3.0], [0.3, 0.2, 0.1]);
        let local = pose([0.5, 0.0, -1.0], [0.0, 1.0, 0.0]);
        let world = parent * local;
        assert_relative_eq!(world_to_local(&parent, &world), local, epsilon = 1e-12);
    }

    #[test]
    fn euler_round_trip_away_from_gimbal() {
        let angles = [10.0, -35.0, 80.0];
        let q = from_euler_xyz_degrees(angles);
        let back = euler_xyz_degrees(&q);
        for (a, b) in angles.iter().zip(back.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-9);
        }
        let z45 = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), FRAC_PI_4);
        assert_relative_eq!(euler_xyz_degrees(&z45)[2], 45.0, epsilon = 1e-9);
    }

    #[test]
    fn quat_array_conversion() {
        let q = UnitQuaternion::from_scaled_axis(Vector3::new(0.4, -0.2, 1.1));
        assert_relative_eq!(quat_from_xyzw(quat_to_xyzw(&q)), q, epsilon = 1e-12);
        assert_eq!(quat_from_xyzw([0.0; 4]), UnitQuaternion::identity());
        // non-normalised input is accepted
        let scaled = quat_from_xyzw([0.0, 0.0, 0.0, 2.0]);
        assert_relative_eq!(scaled, UnitQuaternion::identity(), epsilon = 1e-12);
    }
}
