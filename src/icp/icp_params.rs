/// Parameters of the coarse-to-fine tracker.
#[derive(Debug, Clone)]
pub struct IcpParams {
    /// Gauss-Newton iterations per pyramid level, finest level first.
    /// The length sets how many pyramid levels are tracked.
    pub iterations: Vec<usize>,
    /// Correspondences farther apart than this distance in meters are
    /// rejected.
    pub dist_threshold: f32,
    /// Minimum dot product between source and reference normals.
    pub normal_threshold: f32,
    /// Update norm under which a pyramid level counts as converged.
    pub icp_threshold: f32,
    /// Minimum matched fraction of the image for accepting a pose.
    pub track_threshold: f32,
    /// Row groups of the deterministic reduction.
    pub blocks: usize,
}

impl Default for IcpParams {
    fn default() -> Self {
        Self {
            iterations: vec![10, 5, 4],
            dist_threshold: 0.1,
            normal_threshold: 0.8,
            icp_threshold: 1e-5,
            track_threshold: 0.15,
            blocks: 8,
        }
    }
}
