use nalgebra::Vector3;

use super::transform::Transform;

/// Camera intrinsic parameters.
#[derive(Clone, Debug)]
pub struct CameraIntrinsics {
    /// Focal length and pixel scale in the X-axis.
    pub fx: f64,
    /// Focal length and pixel scale in the Y-axis.
    pub fy: f64,
    /// Camera X-center.
    pub cx: f64,
    /// Camera Y-center.
    pub cy: f64,
    pub width: Option<usize>,
    pub height: Option<usize>,
}

impl CameraIntrinsics {
    pub fn from_simple_intrinsic(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            width: None,
            height: None,
        }
    }

    /// Project a 3D point in the camera frame into image space.
    ///
    /// # Arguments
    ///
    /// * point: The 3D point.
    ///
    /// # Returns
    ///
    /// * (x and y) coordinates.
    pub fn project(&self, point: &Vector3<f32>) -> (f32, f32) {
        (
            point[0] * self.fx as f32 / point[2] + self.cx as f32,
            point[1] * self.fy as f32 / point[2] + self.cy as f32,
        )
    }

    pub fn backproject(&self, x: f32, y: f32, z: f32) -> Vector3<f32> {
        Vector3::new(
            (x - self.cx as f32) * z / self.fx as f32,
            (y - self.cy as f32) * z / self.fy as f32,
            z,
        )
    }

    /// Scale the camera parameters according to the given scale.
    ///
    /// # Arguments
    ///
    /// * scale: The scale factor.
    ///
    /// # Returns
    ///
    /// * A new camera with scaled parameters.
    pub fn scale(&self, scale: f64) -> Self {
        Self {
            fx: self.fx * scale,
            fy: self.fy * scale,
            cx: self.cx * scale,
            cy: self.cy * scale,
            width: self.width,
            height: self.height,
        }
    }

    /// Intrinsics for pyramid level `level`, halving the resolution per level.
    pub fn pyramid_level(&self, level: usize) -> Self {
        self.scale(1.0 / (1 << level) as f64)
    }

    pub fn size(&mut self, width: usize, height: usize) {
        self.width = Some(width);
        self.height = Some(height);
    }
}

/// Intrinsics plus a camera pose, projecting world points and back-projecting
/// pixel rays.
#[derive(Clone, Debug)]
pub struct PinholeCamera {
    pub intrinsics: CameraIntrinsics,
    pub camera_to_world: Transform,
    world_to_camera: Transform,
    pub width: usize,
    pub height: usize,
}

impl PinholeCamera {
    pub fn new(
        intrinsics: CameraIntrinsics,
        camera_to_world: Transform,
        width: usize,
        height: usize,
    ) -> Self {
        Self {
            intrinsics,
            world_to_camera: camera_to_world.inverse(),
            camera_to_world,
            width,
            height,
        }
    }

    pub fn world_to_camera(&self) -> &Transform {
        &self.world_to_camera
    }

    /// Project a 3D world point into image space.
    ///
    /// # Arguments
    ///
    /// * point: The 3D point.
    ///
    /// # Returns
    ///
    /// * (x and y) coordinates.
    pub fn project(&self, point: &Vector3<f32>) -> (f32, f32) {
        self.intrinsics
            .project(&self.world_to_camera.transform_vector(point))
    }

    /// World-space ray direction through pixel `(x, y)`, not normalized.
    pub fn pixel_ray(&self, x: f32, y: f32) -> Vector3<f32> {
        self.camera_to_world
            .transform_normal(&self.intrinsics.backproject(x, y, 1.0))
    }
}
