//! 3D math helpers shared by geometry extraction, collision and movement.

pub mod mesh;

pub use mesh::{TriMesh, TriMeshEdge, TriMeshTri, VertIdx};

use cgmath::{Deg, InnerSpace, Matrix4, Rad, SquareMatrix, Vector3};

/// Returns the normalized vector. Zero vectors normalize to zero vectors;
/// the epsilon keeps NaNs from appearing.
pub fn normalized(vec: Vector3<f32>) -> Vector3<f32> {
    let inv_length = 1.0 / (vec.magnitude() + f32::EPSILON);
    vec * inv_length
}

/// Normalizes the vector in place and returns its original length.
/// Zero vectors normalize to zero vectors.
pub fn normalize_mut(vec: &mut Vector3<f32>) -> f32 {
    let length = vec.magnitude();
    let inv_length = 1.0 / (length + f32::EPSILON);
    *vec *= inv_length;
    length
}

/// Basis vectors derived from viewing angles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngleBasis {
    pub forward: Vector3<f32>,
    pub right: Vector3<f32>,
    pub up: Vector3<f32>,
}

/// Euler angles (pitch, yaw, roll; degrees) to basis vectors.
///
/// `forward = (cos p cos y, cos p sin y, -sin p)`; right and up follow from
/// the composed roll-pitch-yaw rotation.
pub fn angle_vectors(angles: Vector3<f32>) -> AngleBasis {
    let (sp, cp) = Rad::from(Deg(angles.x)).0.sin_cos();
    let (sy, cy) = Rad::from(Deg(angles.y)).0.sin_cos();
    let (sr, cr) = Rad::from(Deg(angles.z)).0.sin_cos();

    AngleBasis {
        forward: Vector3::new(cp * cy, cp * sy, -sp),
        right: Vector3::new(
            -1.0 * sr * sp * cy + -1.0 * cr * -sy,
            -1.0 * sr * sp * sy + -1.0 * cr * cy,
            -1.0 * sr * cp,
        ),
        up: Vector3::new(
            cr * sp * cy + -sr * -sy,
            cr * sp * sy + -sr * cy,
            cr * cp,
        ),
    }
}

/// Rotation matrix for object euler angles (pitch, yaw, roll; degrees).
///
/// Rotation order: first roll (X), then pitch (Y), then yaw (Z).
pub fn rotation_matrix(angles: Vector3<f32>) -> Matrix4<f32> {
    Matrix4::from_angle_z(Deg(angles.y))
        * Matrix4::from_angle_y(Deg(angles.x))
        * Matrix4::from_angle_x(Deg(angles.z))
}

/// Model transformation for an object instance: uniform scale, then
/// roll/pitch/yaw rotation, then translation.
pub fn model_transform(
    origin: Vector3<f32>,
    angles: Vector3<f32>,
    uniform_scale: f32,
) -> Matrix4<f32> {
    Matrix4::from_translation(origin)
        * rotation_matrix(angles)
        * Matrix4::from_scale(uniform_scale)
}

/// Inverse of [`model_transform`], built analytically so it stays exact for
/// pure rigid transforms with uniform scale.
pub fn inverse_model_transform(
    origin: Vector3<f32>,
    angles: Vector3<f32>,
    uniform_scale: f32,
) -> Option<Matrix4<f32>> {
    if uniform_scale == 0.0 {
        return None;
    }
    let rot_inv = rotation_matrix(angles)
        .invert()
        .unwrap_or_else(Matrix4::identity);
    Some(
        Matrix4::from_scale(1.0 / uniform_scale)
            * rot_inv
            * Matrix4::from_translation(-origin),
    )
}

/// Transform a point by a 4x4 matrix (w = 1).
pub fn transform_point(m: &Matrix4<f32>, p: Vector3<f32>) -> Vector3<f32> {
    (m * p.extend(1.0)).truncate()
}

/// Transform a direction by a 4x4 matrix (w = 0).
pub fn transform_vector(m: &Matrix4<f32>, v: Vector3<f32>) -> Vector3<f32> {
    (m * v.extend(0.0)).truncate()
}

/// Normal of a triangle whose vertices wind clockwise when viewed from the
/// front. The cross product is assumed to be nonzero.
pub fn cw_normal(v1: Vector3<f32>, v2: Vector3<f32>, v3: Vector3<f32>) -> Vector3<f32> {
    (v3 - v1).cross(v2 - v1).normalize()
}

/// True if the CW-wound triangle faces upward (normal has positive Z).
pub fn cw_triangle_faces_up(v1: Vector3<f32>, v2: Vector3<f32>, v3: Vector3<f32>) -> bool {
    let v1_to_v3 = v3 - v1;
    let v1_to_v2 = v2 - v1;
    let normal_z = v1_to_v2.y * v1_to_v3.x - v1_to_v2.x * v1_to_v3.y;
    normal_z > 0.0
}

#[cfg(test)]
pub(crate) fn assert_vec_near(a: Vector3<f32>, b: Vector3<f32>, eps: f32) {
    assert!(
        (a.x - b.x).abs() <= eps && (a.y - b.y).abs() <= eps && (a.z - b.z).abs() <= eps,
        "vectors differ: {:?} vs {:?}",
        a,
        b
    );
}
