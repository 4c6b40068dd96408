//! Rolling covariance estimate and Mahalanobis distance via Gaussian
//! elimination with partial pivoting (no `nalgebra` inverse — the matrices
//! here are small and we want the singular case handled explicitly rather
//! than propagating NaN).

const SINGULAR_PIVOT: f64 = 1e-10;

pub struct CovarianceEstimator {
    dim: usize,
    mean: Vec<f64>,
    inv_cov: Option<Vec<Vec<f64>>>,
}

impl CovarianceEstimator {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            mean: vec![0.0; dim],
            inv_cov: None,
        }
    }

    /// Recompute mean/covariance from the last W feature vectors and invert
    /// it. Leaves the previous inverse in place if the new covariance is
    /// near-singular — callers then see stale-but-valid state rather than
    /// a NaN distance.
    pub fn fit(&mut self, history: &[[f64; 6]]) {
        let n = history.len();
        if n < self.dim + 1 {
            return;
        }

        let mut mean = vec![0.0; self.dim];
        for row in history {
            for i in 0..self.dim {
                mean[i] += row[i];
            }
        }
        for m in mean.iter_mut() {
            *m /= n as f64;
        }

        let mut cov = vec![vec![0.0; self.dim]; self.dim];
        for row in history {
            for i in 0..self.dim {
                for j in 0..self.dim {
                    cov[i][j] += (row[i] - mean[i]) * (row[j] - mean[j]);
                }
            }
        }
        let denom = (n - 1) as f64;
        for row in cov.iter_mut() {
            for v in row.iter_mut() {
                *v /= denom;
            }
        }
        // Ridge term keeps small-sample covariance invertible without
        // materially changing a well-conditioned one.
        for i in 0..self.dim {
            cov[i][i] += 1e-6;
        }

        if let Some(inv) = invert(&cov) {
            self.mean = mean;
            self.inv_cov = Some(inv);
        }
    }

    pub fn distance(&self, features: &[f64; 6]) -> f64 {
        let Some(inv) = &self.inv_cov else {
            return 0.0;
        };
        let diff: Vec<f64> = features.iter().zip(self.mean.iter()).map(|(f, m)| f - m).collect();

        let mut tmp = vec![0.0; self.dim];
        for i in 0..self.dim {
            for j in 0..self.dim {
                tmp[i] += inv[i][j] * diff[j];
            }
        }
        let quad: f64 = tmp.iter().zip(diff.iter()).map(|(a, b)| a * b).sum();
        if quad < 0.0 {
            0.0
        } else {
            quad.sqrt()
        }
    }
}

/// Gauss-Jordan elimination with partial pivoting. Returns `None` if any
/// pivot magnitude falls below `SINGULAR_PIVOT`.
fn invert(matrix: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let n = matrix.len();
    let mut a: Vec<Vec<f64>> = matrix.to_vec();
    let mut inv: Vec<Vec<f64>> = (0..n)
        .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();

    for col in 0..n {
        let mut pivot_row = col;
        let mut pivot_val = a[col][col].abs();
        for row in (col + 1)..n {
            if a[row][col].abs() > pivot_val {
                pivot_row = row;
                pivot_val = a[row][col].abs();
            }
        }
        if pivot_val < SINGULAR_PIVOT {
            return None;
        }
        a.swap(col, pivot_row);
        inv.swap(col, pivot_row);

        let pivot = a[col][col];
        for j in 0..n {
            a[col][j] /= pivot;
            inv[col][j] /= pivot;
        }

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = a[row][col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..n {
                a[row][j] -= factor * a[col][j];
                inv[row][j] -= factor * inv[col][j];
            }
        }
    }

    Some(inv)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singular_covariance_yields_zero_distance() {
        let mut est = CovarianceEstimator::new(6);
        // Degenerate: every row identical, invert should still succeed via
        // the ridge term, but distance from the mean must be ~0.
        let history: Vec<[f64; 6]> = (0..20).map(|_| [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).collect();
        est.fit(&history);
        let d = est.distance(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert!(d < 1.0, "distance={d}");
    }

    #[test]
    fn outlier_vector_has_larger_distance_than_typical() {
        let mut est = CovarianceEstimator::new(6);
        let history: Vec<[f64; 6]> = (0..50)
            .map(|i| {
                let j = i as f64;
                [100.0 + j % 5.0, 50.0 + j % 3.0, 10.0, 0.0, 0.5, 0.1]
            })
            .collect();
        est.fit(&history);
        let typical = est.distance(&[101.0, 51.0, 10.0, 0.0, 0.5, 0.1]);
        let outlier = est.distance(&[10_000.0, 51.0, 10.0, 0.0, 0.5, 0.1]);
        assert!(outlier > typical);
    }
}
