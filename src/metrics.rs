use crate::{trajectory::Trajectory, transform::Transform};

/// Rotation and translation magnitude between two transforms.
#[derive(Clone, Debug, Default)]
pub struct TransformMetrics {
    /// Angle between the two transforms in radians.
    pub angle: f32,
    /// Translation vector size between the two transforms.
    pub translation: f32,
}

impl TransformMetrics {
    /// Creates a new `TransformMetrics` from two transforms.
    pub fn new(lfs: &Transform, rhs: &Transform) -> Self {
        let lfs_inv = lfs.inverse();
        let diff = &lfs_inv * rhs;

        Self {
            angle: diff.angle(),
            translation: diff.translation().norm(),
        }
    }

    /// Motion accumulated over consecutive poses: total path length and total
    /// turned angle.
    pub fn accumulated_motion(trajectory: &Trajectory) -> Self {
        let mut accum = TransformMetrics::default();
        for window in trajectory.camera_to_world.windows(2) {
            let step = Self::new(&window[0], &window[1]);
            accum.angle += step.angle;
            accum.translation += step.translation;
        }
        accum
    }

    /// Returns the total error of the two transforms.
    pub fn total(&self) -> f32 {
        self.angle + self.translation
    }
}

impl std::fmt::Display for TransformMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "angle: {:.2}°, translation: {:.5}",
            self.angle.to_degrees(),
            self.translation
        )
    }
}
