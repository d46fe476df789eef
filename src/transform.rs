use nalgebra::{self, Rotation3};

use nalgebra::{Isometry3, Matrix4, Quaternion, Translation3, UnitQuaternion, Vector3, Vector6};

use std::ops;

/// Rigid body transform, used for camera poses (camera to world unless stated
/// otherwise).
#[derive(Clone, Debug)]
pub struct Transform(Isometry3<f32>);

impl Transform {
    /// Identity transform.
    pub fn eye() -> Self {
        Self(Isometry3::<f32>::from_parts(
            Translation3::new(0.0, 0.0, 0.0),
            UnitQuaternion::new(Vector3::<f32>::zeros()),
        ))
    }

    pub fn new(translation: &Vector3<f32>, quaternion: &Quaternion<f32>) -> Self {
        Self(Isometry3::<f32>::from_parts(
            Translation3::new(translation[0], translation[1], translation[2]),
            UnitQuaternion::from_quaternion(*quaternion),
        ))
    }

    /// Translation-only transform, identity rotation.
    pub fn from_translation(translation: &Vector3<f32>) -> Self {
        Self(Isometry3::<f32>::from_parts(
            Translation3::new(translation[0], translation[1], translation[2]),
            UnitQuaternion::identity(),
        ))
    }

    /// Exponentiates an se(3) tangent vector, translation in the first three
    /// components and the rotation axis-angle in the last three.
    pub fn from_se3_exp(translation_so3: &Vector6<f32>) -> Self {
        let translation =
            Translation3::new(translation_so3[0], translation_so3[1], translation_so3[2]);
        let so3 = Vector3::new(translation_so3[3], translation_so3[4], translation_so3[5]);

        Self(Isometry3::<f32>::from_parts(
            translation,
            UnitQuaternion::from_scaled_axis(so3),
        ))
    }

    pub fn from_matrix4(matrix: &Matrix4<f32>) -> Self {
        let translation = Translation3::new(matrix[(0, 3)], matrix[(1, 3)], matrix[(2, 3)]);
        let so3 = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix(
            &matrix.fixed_slice::<3, 3>(0, 0).into_owned(),
        ));
        Self(Isometry3::<f32>::from_parts(translation, so3))
    }

    pub fn inverse(&self) -> Self {
        Self(self.0.inverse())
    }

    /// Applies rotation and translation to a point.
    pub fn transform_vector(&self, rhs: &Vector3<f32>) -> Vector3<f32> {
        self.0 * rhs
    }

    /// Applies only the rotation part, for direction vectors and normals.
    pub fn transform_normal(&self, rhs: &Vector3<f32>) -> Vector3<f32> {
        self.0.rotation * rhs
    }

    pub fn translation(&self) -> Vector3<f32> {
        self.0.translation.vector
    }

    /// Rotation angle in radians.
    pub fn angle(&self) -> f32 {
        self.0.rotation.angle()
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::eye()
    }
}

impl ops::Mul<&Vector3<f32>> for &Transform {
    type Output = Vector3<f32>;

    fn mul(self, rhs: &Vector3<f32>) -> Self::Output {
        self.0 * rhs
    }
}

impl ops::Mul<&Transform> for &Transform {
    type Output = Transform;

    fn mul(self, rhs: &Transform) -> Self::Output {
        Transform(self.0 * rhs.0)
    }
}

impl From<Transform> for Matrix4<f32> {
    fn from(transform: Transform) -> Self {
        transform.0.into()
    }
}

impl From<&Transform> for Matrix4<f32> {
    fn from(transform: &Transform) -> Self {
        transform.0.into()
    }
}
