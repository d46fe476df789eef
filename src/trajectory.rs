use std::ops::Index;

use crate::transform::Transform;

/// Camera poses over time, as estimated by the tracker.
#[derive(Clone, Debug, Default)]
pub struct Trajectory {
    /// Camera poses, transforms points from camera to world.
    pub camera_to_world: Vec<Transform>,
    /// Timestamps of each pose, frame indices when the source has no clock.
    pub times: Vec<f32>,
}

impl Trajectory {
    /// Adds a new pose to the trajectory.
    pub fn push(&mut self, camera_to_world: Transform, time: f32) {
        self.camera_to_world.push(camera_to_world);
        self.times.push(time);
    }

    /// Returns the number of poses in the trajectory.
    pub fn len(&self) -> usize {
        self.camera_to_world.len()
    }

    /// Returns true if the trajectory is empty.
    pub fn is_empty(&self) -> bool {
        self.camera_to_world.is_empty()
    }

    /// Returns the transform mapping points from the `from_index` camera into
    /// the `dest_index` one.
    pub fn get_relative_transform(
        &self,
        from_index: usize,
        dest_index: usize,
    ) -> Option<Transform> {
        if from_index >= self.len() || dest_index >= self.len() {
            return None;
        }
        Some(&self.camera_to_world[dest_index].inverse() * &self.camera_to_world[from_index])
    }

    /// Returns the iterator over poses and timestamps.
    pub fn iter(&self) -> impl Iterator<Item = (Transform, f32)> + '_ {
        self.camera_to_world
            .iter()
            .zip(self.times.iter())
            .map(|(camera_to_world, time)| (camera_to_world.clone(), *time))
    }

    /// Creates a new trajectory with the poses transformed in such a way that
    /// the first pose is at origin.
    pub fn first_frame_at_origin(&self) -> Self {
        if self.camera_to_world.is_empty() {
            return self.clone();
        }

        let first_inv = self.camera_to_world[0].inverse();
        Self {
            camera_to_world: self
                .camera_to_world
                .iter()
                .map(|transform| &first_inv * transform)
                .collect::<Vec<Transform>>(),
            times: self.times.clone(),
        }
    }

    /// Gets the last pose and timestamp.
    /// If the trajectory is empty, it returns `None`.
    pub fn last(&self) -> Option<(Transform, f32)> {
        if self.is_empty() {
            None
        } else {
            Some((
                self.camera_to_world[self.len() - 1].clone(),
                self.times[self.len() - 1],
            ))
        }
    }
}

impl FromIterator<(Transform, f32)> for Trajectory {
    /// Creates a new trajectory from the `(Transform, f32)` iterator.
    /// Use with the `collect::<Trajectory>` method.
    fn from_iter<T: IntoIterator<Item = (Transform, f32)>>(iter: T) -> Self {
        let mut trajectory = Trajectory::default();
        for (transform, time) in iter {
            trajectory.push(transform, time);
        }
        trajectory
    }
}

impl Index<usize> for Trajectory {
    type Output = Transform;
    /// Returns the pose at the given index.
    fn index(&self, index: usize) -> &Self::Output {
        &self.camera_to_world[index]
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::Vector3;

    use super::Trajectory;
    use crate::transform::Transform;

    fn straight_line() -> Trajectory {
        (0..4)
            .map(|i| {
                (
                    Transform::from_translation(&Vector3::new(i as f32, 0.0, 0.0)),
                    i as f32,
                )
            })
            .collect()
    }

    #[test]
    fn test_push_and_index() {
        let trajectory = straight_line();
        assert_eq!(trajectory.len(), 4);
        assert_eq!(trajectory[2].translation(), Vector3::new(2.0, 0.0, 0.0));
        let (last, time) = trajectory.last().unwrap();
        assert_eq!(last.translation(), Vector3::new(3.0, 0.0, 0.0));
        assert_eq!(time, 3.0);
    }

    #[test]
    fn test_relative_transform_between_poses() {
        let trajectory = straight_line();
        let relative = trajectory.get_relative_transform(1, 3).unwrap();
        assert_eq!(relative.translation(), Vector3::new(-2.0, 0.0, 0.0));
        assert!(trajectory.get_relative_transform(1, 9).is_none());
    }

    #[test]
    fn test_first_frame_at_origin() {
        let mut trajectory = Trajectory::default();
        trajectory.push(Transform::from_translation(&Vector3::new(5.0, 1.0, 2.0)), 0.0);
        trajectory.push(Transform::from_translation(&Vector3::new(6.0, 1.0, 2.0)), 1.0);

        let origin = trajectory.first_frame_at_origin();
        assert_eq!(origin[0].translation(), Vector3::zeros());
        assert_eq!(origin[1].translation(), Vector3::new(1.0, 0.0, 0.0));
    }
}
