//! Robust-covariance scorer: squared Mahalanobis distance against a
//! center and covariance fitted on the well-behaved bulk of the data.

use crate::detect::scorer::{Detection, OutlierScorer, ANOMALOUS, NORMAL};
use crate::error::{AnalysisError, Result};
use crate::ingest::record::FEATURE_COUNT;
use crate::stats;

/// Diagonal regularization so near-degenerate columns stay invertible.
const COV_REGULARIZATION: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct RobustCovariance {
    pub contamination: f64,
}

impl Default for RobustCovariance {
    fn default() -> Self {
        RobustCovariance { contamination: 0.1 }
    }
}

struct Fit {
    mean: [f64; FEATURE_COUNT],
    cov_inv: Vec<Vec<f64>>,
}

impl Fit {
    fn from_rows(data: &[[f64; FEATURE_COUNT]], indices: &[usize]) -> Result<Fit> {
        let n = indices.len() as f64;
        let mut mean = [0.0; FEATURE_COUNT];
        for &i in indices {
            for (m, v) in mean.iter_mut().zip(&data[i]) {
                *m += v;
            }
        }
        for m in &mut mean {
            *m /= n;
        }

        let mut cov = vec![vec![0.0; FEATURE_COUNT]; FEATURE_COUNT];
        for &idx in indices {
            for i in 0..FEATURE_COUNT {
                for j in 0..FEATURE_COUNT {
                    cov[i][j] += (data[idx][i] - mean[i]) * (data[idx][j] - mean[j]);
                }
            }
        }
        for row in &mut cov {
            for v in row.iter_mut() {
                *v /= n - 1.0;
            }
        }
        for i in 0..FEATURE_COUNT {
            cov[i][i] += COV_REGULARIZATION;
        }

        Ok(Fit {
            mean,
            cov_inv: invert(&cov)?,
        })
    }

    fn squared_distance(&self, sample: &[f64; FEATURE_COUNT]) -> f64 {
        let mut centered = [0.0; FEATURE_COUNT];
        for i in 0..FEATURE_COUNT {
            centered[i] = sample[i] - self.mean[i];
        }
        let mut d2 = 0.0;
        for i in 0..FEATURE_COUNT {
            for j in 0..FEATURE_COUNT {
                d2 += centered[i] * self.cov_inv[i][j] * centered[j];
            }
        }
        d2.max(0.0)
    }
}

/// Gauss-Jordan inversion with partial pivoting. Fine for the small
/// covariance matrices this crate deals in.
fn invert(matrix: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
    let n = matrix.len();
    let mut aug = vec![vec![0.0; 2 * n]; n];
    for i in 0..n {
        aug[i][..n].copy_from_slice(&matrix[i]);
        aug[i][n + i] = 1.0;
    }

    for col in 0..n {
        let mut pivot_row = col;
        for row in (col + 1)..n {
            if aug[row][col].abs() > aug[pivot_row][col].abs() {
                pivot_row = row;
            }
        }
        aug.swap(col, pivot_row);

        let pivot = aug[col][col];
        if pivot.abs() < 1e-12 {
            return Err(AnalysisError::Estimator(
                "Covariance matrix is singular; features are degenerate".to_string(),
            ));
        }
        for v in &mut aug[col] {
            *v /= pivot;
        }
        let pivot_line = aug[col].clone();
        for (row, line) in aug.iter_mut().enumerate() {
            if row != col {
                let factor = line[col];
                for (v, p) in line.iter_mut().zip(&pivot_line) {
                    *v -= factor * p;
                }
            }
        }
    }

    Ok(aug.into_iter().map(|row| row[n..].to_vec()).collect())
}

impl RobustCovariance {
    /// Initial fit on all rows, then one reweighting pass: refit on the
    /// `(1 - contamination)` fraction with the smallest distances so a
    /// bounded fraction of gross outliers cannot pull the estimate.
    fn robust_fit(&self, data: &[[f64; FEATURE_COUNT]]) -> Result<Fit> {
        let all: Vec<usize> = (0..data.len()).collect();
        let initial = Fit::from_rows(data, &all)?;

        let mut ranked: Vec<(usize, f64)> = data
            .iter()
            .enumerate()
            .map(|(i, sample)| (i, initial.squared_distance(sample)))
            .collect();
        ranked.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        let keep = ((data.len() as f64 * (1.0 - self.contamination)).ceil() as usize)
            .max(FEATURE_COUNT + 1)
            .min(data.len());
        let support: Vec<usize> = ranked[..keep].iter().map(|&(i, _)| i).collect();
        Fit::from_rows(data, &support)
    }
}

impl OutlierScorer for RobustCovariance {
    fn name(&self) -> &'static str {
        "robust-covariance"
    }

    fn score(&self, scaled: &[[f64; FEATURE_COUNT]]) -> Result<Detection> {
        if scaled.len() < FEATURE_COUNT + 1 {
            return Err(AnalysisError::Estimator(format!(
                "Covariance estimation needs at least {} rows, got {}",
                FEATURE_COUNT + 1,
                scaled.len()
            )));
        }

        let fit = self.robust_fit(scaled)?;
        let scores: Vec<f64> = scaled.iter().map(|s| fit.squared_distance(s)).collect();

        let threshold = stats::percentile(&scores, (1.0 - self.contamination) * 100.0);
        let flags: Vec<i8> = scores
            .iter()
            .map(|&d| if d > threshold { ANOMALOUS } else { NORMAL })
            .collect();

        log::debug!(
            "Robust covariance: threshold {threshold:.4}, {} rows flagged",
            flags.iter().filter(|&&f| f == ANOMALOUS).count()
        );
        Ok(Detection { flags, scores })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outlier_has_largest_distance() {
        let mut data: Vec<[f64; FEATURE_COUNT]> = (0..40)
            .map(|i| {
                let t = f64::from(i) * 0.1;
                [t.sin() * 0.2, t.cos() * 0.2, 0.1 * (f64::from(i % 4))]
            })
            .collect();
        data.push([8.0, -8.0, 5.0]);

        let detection = RobustCovariance::default().score(&data).expect("score");
        let top = detection
            .scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).expect("finite"))
            .expect("non-empty")
            .0;
        assert_eq!(top, data.len() - 1);
        assert!(detection.is_anomalous(top));
    }

    #[test]
    fn test_too_few_rows() {
        let data = vec![[0.0; FEATURE_COUNT]; FEATURE_COUNT];
        let err = RobustCovariance::default().score(&data).unwrap_err();
        assert!(err.to_string().contains("at least"));
    }

    #[test]
    fn test_invert_identity() {
        let eye = vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
        ];
        let inv = invert(&eye).expect("invertible");
        assert_eq!(inv, eye);
    }

    #[test]
    fn test_invert_round_trip() {
        let m = vec![
            vec![4.0, 1.0, 0.0],
            vec![1.0, 3.0, 0.5],
            vec![0.0, 0.5, 2.0],
        ];
        let inv = invert(&m).expect("invertible");
        for i in 0..3 {
            for j in 0..3 {
                let product: f64 = (0..3).map(|k| m[i][k] * inv[k][j]).sum();
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((product - expected).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_constant_data_is_degenerate_but_regularized() {
        // All-identical rows: regularization keeps the matrix invertible
        // and every distance lands on zero.
        let data = vec![[1.0, 2.0, 3.0]; 10];
        let detection = RobustCovariance::default().score(&data).expect("score");
        assert!(detection.scores.iter().all(|&d| d.abs() < 1e-6));
    }
}
