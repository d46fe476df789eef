use nalgebra::Vector3;
use rayon::prelude::*;

/// One TSDF sample: truncated signed distance in [-1, 1] and its fusion
/// weight.
#[derive(Clone, Copy, Debug)]
pub struct TsdfVoxel {
    pub tsdf: f32,
    pub weight: f32,
}

impl Default for TsdfVoxel {
    /// Free space at zero weight, the state of an unobserved voxel.
    fn default() -> Self {
        Self {
            tsdf: 1.0,
            weight: 0.0,
        }
    }
}

/// Dense truncated signed distance volume.
///
/// Voxels are stored flat, x fastest, then y, then z. `size` counts voxels
/// per axis, `dim` is the physical extent in meters, and voxel `(x, y, z)`
/// is centered at `(x + 0.5) * dim / size` per axis. The distance value is
/// only meaningful where the weight is positive.
pub struct TsdfVolume {
    size: [usize; 3],
    dim: Vector3<f32>,
    voxels: Vec<TsdfVoxel>,
}

impl TsdfVolume {
    pub fn new(size: [usize; 3], dim: Vector3<f32>) -> Self {
        Self {
            size,
            dim,
            voxels: vec![TsdfVoxel::default(); size[0] * size[1] * size[2]],
        }
    }

    /// Resets every voxel to unobserved free space.
    pub fn clear(&mut self) {
        self.voxels
            .par_iter_mut()
            .for_each(|voxel| *voxel = TsdfVoxel::default());
    }

    pub fn size(&self) -> [usize; 3] {
        self.size
    }

    pub fn dim(&self) -> Vector3<f32> {
        self.dim
    }

    /// Metric edge lengths of one voxel.
    pub fn voxel_size(&self) -> Vector3<f32> {
        Vector3::new(
            self.dim[0] / self.size[0] as f32,
            self.dim[1] / self.size[1] as f32,
            self.dim[2] / self.size[2] as f32,
        )
    }

    pub fn len(&self) -> usize {
        self.voxels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }

    #[inline]
    fn index(&self, x: usize, y: usize, z: usize) -> usize {
        x + y * self.size[0] + z * self.size[0] * self.size[1]
    }

    pub fn get(&self, x: usize, y: usize, z: usize) -> TsdfVoxel {
        self.voxels[self.index(x, y, z)]
    }

    #[inline]
    fn value(&self, x: usize, y: usize, z: usize) -> f32 {
        self.voxels[self.index(x, y, z)].tsdf
    }

    /// World-space center of voxel `(x, y, z)`.
    pub fn voxel_center(&self, x: usize, y: usize, z: usize) -> Vector3<f32> {
        Vector3::new(
            (x as f32 + 0.5) * self.dim[0] / self.size[0] as f32,
            (y as f32 + 0.5) * self.dim[1] / self.size[1] as f32,
            (z as f32 + 0.5) * self.dim[2] / self.size[2] as f32,
        )
    }

    /// Flat voxel storage, x fastest. Used by the integrator's slab
    /// partition and the volume dump.
    pub fn voxels(&self) -> &[TsdfVoxel] {
        &self.voxels
    }

    pub fn voxels_mut(&mut self) -> &mut [TsdfVoxel] {
        &mut self.voxels
    }

    /// Voxel-grid coordinates of a world point: integer cell base, the
    /// in-cell fraction, and the clamped lower/upper corner indices.
    #[inline]
    fn cell(&self, pos: &Vector3<f32>) -> ([i32; 3], [f32; 3], [usize; 3], [usize; 3]) {
        let mut base = [0i32; 3];
        let mut factor = [0f32; 3];
        let mut lower = [0usize; 3];
        let mut upper = [0usize; 3];

        for axis in 0..3 {
            let scaled = pos[axis] * self.size[axis] as f32 / self.dim[axis] - 0.5;
            let floor = scaled.floor();
            base[axis] = floor as i32;
            factor[axis] = scaled - floor;
            lower[axis] = base[axis].max(0) as usize;
            upper[axis] = (base[axis] + 1).min(self.size[axis] as i32 - 1) as usize;
        }

        (base, factor, lower, upper)
    }

    /// Trilinearly interpolated distance at a world point. Sample
    /// coordinates are clamped to the grid, so querying at or slightly
    /// beyond the border replicates the border voxels.
    pub fn interp(&self, pos: &Vector3<f32>) -> f32 {
        let (_, factor, lower, upper) = self.cell(pos);

        ((self.value(lower[0], lower[1], lower[2]) * (1.0 - factor[0])
            + self.value(upper[0], lower[1], lower[2]) * factor[0])
            * (1.0 - factor[1])
            + (self.value(lower[0], upper[1], lower[2]) * (1.0 - factor[0])
                + self.value(upper[0], upper[1], lower[2]) * factor[0])
                * factor[1])
            * (1.0 - factor[2])
            + ((self.value(lower[0], lower[1], upper[2]) * (1.0 - factor[0])
                + self.value(upper[0], lower[1], upper[2]) * factor[0])
                * (1.0 - factor[1])
                + (self.value(lower[0], upper[1], upper[2]) * (1.0 - factor[0])
                    + self.value(upper[0], upper[1], upper[2]) * factor[0])
                    * factor[1])
                * factor[2]
    }

    /// Gradient of the interpolated distance field at a world point:
    /// per-corner central differences blended with the interpolation
    /// weights. The result is scaled, not a metric derivative; callers
    /// normalize it into a surface normal.
    pub fn grad(&self, pos: &Vector3<f32>) -> Vector3<f32> {
        let (base, factor, lower, upper) = self.cell(pos);

        // Difference endpoints derive from the unclamped base so border
        // queries degenerate the same way on every axis.
        let mut back_lower = [0usize; 3];
        let mut back_upper = [0usize; 3];
        let mut fwd_lower = [0usize; 3];
        let mut fwd_upper = [0usize; 3];
        for axis in 0..3 {
            let last = self.size[axis] as i32 - 1;
            back_lower[axis] = (base[axis] - 1).max(0) as usize;
            back_upper[axis] = base[axis].max(0) as usize;
            fwd_lower[axis] = (base[axis] + 1).min(last) as usize;
            fwd_upper[axis] = (base[axis] + 2).min(last) as usize;
        }

        let mut gradient = Vector3::zeros();
        for axis in 0..3 {
            let mut sum = 0.0f32;
            for corner in 0..8usize {
                let pick = [corner & 1, (corner >> 1) & 1, (corner >> 2) & 1];

                let mut fwd = [0usize; 3];
                let mut back = [0usize; 3];
                let mut weight = 1.0f32;
                for (a, &p) in pick.iter().enumerate() {
                    let at_upper = p == 1;
                    weight *= if at_upper { factor[a] } else { 1.0 - factor[a] };
                    if a == axis {
                        fwd[a] = if at_upper { fwd_upper[a] } else { fwd_lower[a] };
                        back[a] = if at_upper { back_upper[a] } else { back_lower[a] };
                    } else {
                        let index = if at_upper { upper[a] } else { lower[a] };
                        fwd[a] = index;
                        back[a] = index;
                    }
                }

                sum += weight
                    * (self.value(fwd[0], fwd[1], fwd[2])
                        - self.value(back[0], back[1], back[2]));
            }
            gradient[axis] = sum;
        }

        0.5 * gradient.component_mul(&self.voxel_size())
    }
}
