//! 3D transformation utilities
//!
//! Euler angles follow the XYZ convention: the rotation matrix is `Rx * Ry * Rz`.

use crate::point::{Point3f, Vector3f};
use nalgebra::{Matrix3, Matrix4, Rotation3, UnitQuaternion};

/// Rotation matrix for XYZ Euler angles given in radians
pub fn rotation_from_euler(euler: &Vector3f) -> Rotation3<f32> {
    Rotation3::from_axis_angle(&Vector3f::x_axis(), euler.x)
        * Rotation3::from_axis_angle(&Vector3f::y_axis(), euler.y)
        * Rotation3::from_axis_angle(&Vector3f::z_axis(), euler.z)
}

/// XYZ Euler angles of a pure rotation matrix
pub fn euler_from_rotation(rotation: &Matrix3<f32>) -> Vector3f {
    let m13 = rotation[(0, 2)];
    let y = m13.clamp(-1.0, 1.0).asin();

    if m13.abs() < 0.99999 {
        Vector3f::new(
            (-rotation[(1, 2)]).atan2(rotation[(2, 2)]),
            y,
            (-rotation[(0, 1)]).atan2(rotation[(0, 0)]),
        )
    } else {
        // gimbal lock, z folded into x
        Vector3f::new(rotation[(2, 1)].atan2(rotation[(1, 1)]), y, 0.0)
    }
}

/// Rotation whose -Z axis points from `eye` towards `target`
pub fn look_at_rotation(eye: &Point3f, target: &Point3f, up: &Vector3f) -> Rotation3<f32> {
    let mut z = (eye - target)
        .try_normalize(f32::EPSILON)
        .unwrap_or_else(Vector3f::z);

    let mut x = up.cross(&z);
    if x.norm_squared() < f32::EPSILON {
        z.x += 0.0001;
        z.normalize_mut();
        x = up.cross(&z);
    }
    x.normalize_mut();
    let y = z.cross(&x);

    Rotation3::from_matrix_unchecked(Matrix3::from_columns(&[x, y, z]))
}

/// Local matrix `T * R * S`
pub fn compose_matrix(position: &Vector3f, rotation: &Rotation3<f32>, scale: &Vector3f) -> Matrix4<f32> {
    let mut m = rotation.to_homogeneous();
    if scale.x != 1.0 || scale.y != 1.0 || scale.z != 1.0 {
        m *= Matrix4::new_nonuniform_scaling(scale);
    }
    m.fixed_view_mut::<3, 1>(0, 3).copy_from(position);
    m
}

/// Rotation for either representation a node may carry
pub fn rotation_of(use_quaternion: bool, euler: &Vector3f, quaternion: &UnitQuaternion<f32>) -> Rotation3<f32> {
    if use_quaternion {
        quaternion.to_rotation_matrix()
    } else {
        rotation_from_euler(euler)
    }
}

/// Apply a homogeneous matrix to a point
pub fn transform_point(matrix: &Matrix4<f32>, point: &Point3f) -> Point3f {
    matrix.transform_point(point)
}

/// Apply the linear part of a matrix to a vector
pub fn transform_vector(matrix: &Matrix4<f32>, vector: &Vector3f) -> Vector3f {
    matrix.fixed_view::<3, 3>(0, 0) * vector
}

/// Translation column of a matrix
pub fn position_of(matrix: &Matrix4<f32>) -> Vector3f {
    matrix.fixed_view::<3, 1>(0, 3).into_owned()
}

/// Largest axis scale of the linear part of a matrix
pub fn max_scale_on_axis(matrix: &Matrix4<f32>) -> f32 {
    let linear = matrix.fixed_view::<3, 3>(0, 0);
    linear
        .column_iter()
        .map(|c| c.norm_squared())
        .fold(0.0f32, f32::max)
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_euler_round_trip() {
        let euler = Vector3f::new(0.3, -0.7, 1.1);
        let rotation = rotation_from_euler(&euler);
        let back = euler_from_rotation(rotation.matrix());
        assert_relative_eq!(back, euler, epsilon = 1e-5);
    }

    #[test]
    fn test_compose_matrix_order() {
        let position = Vector3f::new(1.0, 2.0, 3.0);
        let rotation = rotation_from_euler(&Vector3f::new(0.0, 0.0, std::f32::consts::FRAC_PI_2));
        let scale = Vector3f::new(2.0, 2.0, 2.0);
        let m = compose_matrix(&position, &rotation, &scale);

        // scale, then rotate +x onto +y, then translate
        let p = transform_point(&m, &Point3f::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p, Point3f::new(1.0, 4.0, 3.0), epsilon = 1e-5);
        assert_relative_eq!(max_scale_on_axis(&m), 2.0, epsilon = 1e-6);
        assert_relative_eq!(position_of(&m), position);
    }

    #[test]
    fn test_transform_vector_ignores_translation() {
        let rotation = rotation_from_euler(&Vector3f::new(0.0, 0.0, std::f32::consts::FRAC_PI_2));
        let m = compose_matrix(&Vector3f::new(5.0, 5.0, 5.0), &rotation, &Vector3f::new(3.0, 3.0, 3.0));
        let v = transform_vector(&m, &Vector3f::x());
        assert_relative_eq!(v, Vector3f::new(0.0, 3.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_look_at_points_minus_z_at_target() {
        let eye = Point3f::new(0.0, 0.0, 10.0);
        let target = Point3f::new(5.0, 0.0, 0.0);
        let rotation = look_at_rotation(&eye, &target, &Vector3f::y());

        let forward = rotation * -Vector3f::z();
        assert_relative_eq!(forward, (target - eye).normalize(), epsilon = 1e-6);
    }

    #[test]
    fn test_look_at_with_parallel_up() {
        let rotation = look_at_rotation(&Point3f::new(0.0, 10.0, 0.0), &Point3f::origin(), &Vector3f::y());
        let m = rotation.matrix();
        assert!(m.iter().all(|v| v.is_finite()));
        assert_relative_eq!(m.determinant(), 1.0, epsilon = 1e-4);
    }
}
