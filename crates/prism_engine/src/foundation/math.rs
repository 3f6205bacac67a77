//! Math utilities and types
//!
//! Fundamental math types for 3D rendering plus the small set of
//! camera helpers the renderer needs.

pub use nalgebra::{Matrix3, Matrix4, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Build a right-handed perspective projection.
///
/// `fov_y_radians` is the vertical field of view; `aspect` is
/// width / height.
pub fn perspective(fov_y_radians: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    nalgebra::Perspective3::new(aspect, fov_y_radians, near, far).to_homogeneous()
}

/// Build a right-handed look-at view matrix from a camera position and
/// a view direction (not a target point).
pub fn look_at(pos: Vec3, dir: Vec3, up: Vec3) -> Mat4 {
    let eye = nalgebra::Point3::from(pos);
    let target = nalgebra::Point3::from(pos + dir);
    Mat4::look_at_rh(&eye, &target, &up)
}

/// Strip the translation column from a view matrix, keeping only its
/// rotational part. Used for skybox rendering so the box appears
/// infinitely distant.
pub fn strip_translation(view: &Mat4) -> Mat4 {
    view.fixed_view::<3, 3>(0, 0).into_owned().to_homogeneous()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn perspective_preserves_requested_aspect() {
        let proj = perspective(45.0f32.to_radians(), 1920.0 / 1080.0, 0.1, 100.0);
        // m[1][1] = 1/tan(fov/2), m[0][0] = m[1][1]/aspect
        let aspect = proj[(1, 1)] / proj[(0, 0)];
        assert_relative_eq!(aspect, 1920.0 / 1080.0, epsilon = 1e-5);
    }

    #[test]
    fn look_at_points_down_view_direction() {
        let view = look_at(
            Vec3::new(0.0, -5.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
        );
        // A point ahead of the camera lands on the negative view-space
        // z axis in a right-handed view matrix.
        let p = view.transform_point(&nalgebra::Point3::new(0.0, 0.0, 0.0));
        assert_relative_eq!(p.z, -5.0, epsilon = 1e-5);
    }

    #[test]
    fn strip_translation_zeroes_the_translation_column() {
        let view = look_at(
            Vec3::new(3.0, -7.0, 2.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
        );
        let stripped = strip_translation(&view);
        assert_relative_eq!(stripped[(0, 3)], 0.0);
        assert_relative_eq!(stripped[(1, 3)], 0.0);
        assert_relative_eq!(stripped[(2, 3)], 0.0);
        // Rotation block is untouched.
        assert_relative_eq!(stripped[(0, 0)], view[(0, 0)]);
        assert_relative_eq!(stripped[(2, 1)], view[(2, 1)]);
    }
}
