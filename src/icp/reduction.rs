use nalgebra::{Cholesky, Const, SMatrix, SVector, Vector6};
use ndarray::ArrayView2;
use rayon::prelude::*;

use super::correspondence::{Correspondence, MatchStatus};

/// Accumulated point-to-plane normal equations plus the correspondence
/// census of one data-association pass.
#[derive(Clone, Debug)]
pub struct NormalEquations {
    jt_j: SMatrix<f32, 6, 6>,
    jt_r: SVector<f32, 6>,
    squared_residual_sum: f32,
    pub matched: usize,
    pub too_far: usize,
    pub wrong_normal: usize,
    pub invalid: usize,
}

impl NormalEquations {
    pub fn new() -> Self {
        Self {
            jt_j: SMatrix::zeros(),
            jt_r: SVector::zeros(),
            squared_residual_sum: 0.0,
            matched: 0,
            too_far: 0,
            wrong_normal: 0,
            invalid: 0,
        }
    }

    /// Accumulates one correspondence, matched ones into the equation
    /// system, rejected ones into their census bucket.
    pub fn add(&mut self, correspondence: &Correspondence) {
        match correspondence.status {
            MatchStatus::Matched => {
                let jacobian = SVector::<f32, 6>::from_column_slice(&correspondence.jacobian);
                let residual = correspondence.error;

                self.jt_j += jacobian * jacobian.transpose();
                self.jt_r += jacobian * residual;
                self.squared_residual_sum += residual * residual;
                self.matched += 1;
            }
            MatchStatus::TooFar => self.too_far += 1,
            MatchStatus::WrongNormal => self.wrong_normal += 1,
            _ => self.invalid += 1,
        }
    }

    /// Folds another accumulator into this one.
    pub fn merge(&mut self, other: &NormalEquations) {
        self.jt_j += other.jt_j;
        self.jt_r += other.jt_r;
        self.squared_residual_sum += other.squared_residual_sum;
        self.matched += other.matched;
        self.too_far += other.too_far;
        self.wrong_normal += other.wrong_normal;
        self.invalid += other.invalid;
    }

    /// Root mean square of the matched residuals, zero when nothing matched.
    pub fn rms_residual(&self) -> f32 {
        if self.matched == 0 {
            0.0
        } else {
            (self.squared_residual_sum / self.matched as f32).sqrt()
        }
    }

    /// Solves for the se(3) update. `None` when nothing matched, the system
    /// is not positive definite, or the solution is not finite.
    pub fn solve(&self) -> Option<Vector6<f32>> {
        if self.matched == 0 {
            return None;
        }

        let hessian: SMatrix<f64, 6, 6> = nalgebra::convert(self.jt_j);
        let gradient: SVector<f64, 6> = nalgebra::convert(self.jt_r);
        let update: Vector6<f32> =
            nalgebra::convert(Cholesky::<f64, Const<6>>::new(hessian)?.solve(&gradient));

        if update.iter().all(|value| value.is_finite()) {
            Some(update)
        } else {
            None
        }
    }
}

impl Default for NormalEquations {
    fn default() -> Self {
        Self::new()
    }
}

/// Reduces a correspondence image into one normal-equation system.
///
/// Rows are partitioned round-robin into `blocks` accumulators filled in
/// parallel, then merged in ascending block order. The fixed topology keeps
/// the floating point result independent of the thread schedule.
pub fn reduce(correspondences: &ArrayView2<'_, Correspondence>, blocks: usize) -> NormalEquations {
    let blocks = blocks.max(1);
    let height = correspondences.nrows();

    let partials: Vec<NormalEquations> = (0..blocks)
        .into_par_iter()
        .map(|block| {
            let mut equations = NormalEquations::new();
            let mut row = block;
            while row < height {
                for correspondence in correspondences.row(row) {
                    equations.add(correspondence);
                }
                row += blocks;
            }
            equations
        })
        .collect();

    let mut total = NormalEquations::new();
    for partial in &partials {
        total.merge(partial);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::{reduce, NormalEquations};
    use crate::icp::correspondence::{Correspondence, MatchStatus};
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    fn synthetic_correspondences() -> Array2<Correspondence> {
        Array2::from_shape_fn((24, 16), |(row, col)| {
            let pixel = row * 16 + col;
            match pixel % 5 {
                0 => Correspondence {
                    status: MatchStatus::Matched,
                    error: 0.01 * (pixel as f32).sin(),
                    jacobian: [
                        (pixel as f32 * 0.1).cos(),
                        (pixel as f32 * 0.2).sin(),
                        -1.0,
                        0.05 * pixel as f32,
                        -0.03,
                        0.5 * (pixel as f32 * 0.3).cos(),
                    ],
                },
                1 => Correspondence::default(),
                2 => Correspondence {
                    status: MatchStatus::TooFar,
                    error: 0.0,
                    jacobian: [0.0; 6],
                },
                3 => Correspondence {
                    status: MatchStatus::WrongNormal,
                    error: 0.0,
                    jacobian: [0.0; 6],
                },
                _ => Correspondence {
                    status: MatchStatus::OutOfImage,
                    error: 0.0,
                    jacobian: [0.0; 6],
                },
            }
        })
    }

    #[test]
    fn test_reduce_is_deterministic() {
        let correspondences = synthetic_correspondences();

        let first = reduce(&correspondences.view(), 8);
        let second = reduce(&correspondences.view(), 8);

        assert_eq!(first.jt_j, second.jt_j);
        assert_eq!(first.jt_r, second.jt_r);
        assert_eq!(first.squared_residual_sum, second.squared_residual_sum);
    }

    #[test]
    fn test_block_partition_equivalence() {
        let correspondences = synthetic_correspondences();
        let reference = reduce(&correspondences.view(), 1);

        for blocks in [2, 3, 8, 24, 100] {
            let partitioned = reduce(&correspondences.view(), blocks);

            assert_eq!(partitioned.matched, reference.matched);
            assert_eq!(partitioned.too_far, reference.too_far);
            assert_eq!(partitioned.wrong_normal, reference.wrong_normal);
            assert_eq!(partitioned.invalid, reference.invalid);
            assert_abs_diff_eq!(
                partitioned.squared_residual_sum,
                reference.squared_residual_sum,
                epsilon = 1e-6
            );
            for (left, right) in partitioned.jt_r.iter().zip(reference.jt_r.iter()) {
                assert_abs_diff_eq!(left, right, epsilon = 1e-4);
            }
            for (left, right) in partitioned.jt_j.iter().zip(reference.jt_j.iter()) {
                assert_abs_diff_eq!(left, right, epsilon = 1e-3);
            }
        }
    }

    #[test]
    fn test_census_counts() {
        let correspondences = synthetic_correspondences();
        let equations = reduce(&correspondences.view(), 8);

        let total = 24 * 16;
        assert_eq!(
            equations.matched
                + equations.too_far
                + equations.wrong_normal
                + equations.invalid,
            total
        );
        // pixel % 5: one matched bucket, two lumped-invalid buckets.
        assert_eq!(equations.matched, 77);
        assert_eq!(equations.too_far, 77);
        assert_eq!(equations.wrong_normal, 77);
        assert_eq!(equations.invalid, 77 * 2 - 1);
    }

    #[test]
    fn test_rejected_pixels_do_not_contribute() {
        let mut equations = NormalEquations::new();
        equations.add(&Correspondence {
            status: MatchStatus::TooFar,
            error: 123.0,
            jacobian: [9.0; 6],
        });
        equations.add(&Correspondence::default());

        assert_eq!(equations.matched, 0);
        assert_eq!(equations.squared_residual_sum, 0.0);
        assert!(equations.jt_r.iter().all(|&v| v == 0.0));
        assert!(equations.solve().is_none());
    }

    #[test]
    fn test_solve_recovers_diagonal_system() {
        let mut equations = NormalEquations::new();
        let expected = [0.5, -0.25, 0.125, 0.0625, -0.03125, 0.015625];
        for (axis, value) in expected.iter().enumerate() {
            let mut jacobian = [0.0; 6];
            jacobian[axis] = 1.0;
            equations.add(&Correspondence {
                status: MatchStatus::Matched,
                error: *value,
                jacobian,
            });
        }

        let update = equations.solve().unwrap();
        for (axis, value) in expected.iter().enumerate() {
            assert_abs_diff_eq!(update[axis], *value, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_rank_deficient_system_is_rejected() {
        let mut equations = NormalEquations::new();
        for _ in 0..100 {
            equations.add(&Correspondence {
                status: MatchStatus::Matched,
                error: 0.01,
                jacobian: [0.0, 0.0, -1.0, 0.0, 0.0, 0.0],
            });
        }

        assert!(equations.solve().is_none());
    }
}
