//! Reconstruction-error scorer: project onto the leading principal
//! components, reconstruct, and flag rows the low-rank model cannot
//! explain.

use crate::detect::scorer::{Detection, OutlierScorer, ANOMALOUS, NORMAL};
use crate::error::{AnalysisError, Result};
use crate::ingest::record::FEATURE_COUNT;
use crate::stats;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const POWER_ITERATIONS: usize = 200;
const CONVERGENCE_EPS: f64 = 1e-10;

#[derive(Debug, Clone)]
pub struct ReconstructionError {
    pub components: usize,
    pub seed: u64,
}

impl Default for ReconstructionError {
    fn default() -> Self {
        ReconstructionError {
            components: 2,
            seed: 42,
        }
    }
}

fn normalize(v: &mut [f64; FEATURE_COUNT]) -> f64 {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    norm
}

fn mat_vec(m: &[[f64; FEATURE_COUNT]; FEATURE_COUNT], v: &[f64; FEATURE_COUNT]) -> [f64; FEATURE_COUNT] {
    let mut out = [0.0; FEATURE_COUNT];
    for i in 0..FEATURE_COUNT {
        for j in 0..FEATURE_COUNT {
            out[i] += m[i][j] * v[j];
        }
    }
    out
}

/// Project `v` away from each of `axes` (Gram-Schmidt step) so deflated
/// iterations stay orthogonal to the components already found.
fn orthogonalize(v: &mut [f64; FEATURE_COUNT], axes: &[[f64; FEATURE_COUNT]]) {
    for axis in axes {
        let dot: f64 = v.iter().zip(axis).map(|(a, b)| a * b).sum();
        for i in 0..FEATURE_COUNT {
            v[i] -= dot * axis[i];
        }
    }
}

/// Leading eigenvector of a symmetric matrix by power iteration,
/// restricted to the subspace orthogonal to `previous`. Returns the
/// (eigenvector, eigenvalue) pair; a zero matrix yields a zero
/// eigenvalue and an arbitrary unit vector in that subspace.
fn leading_eigenpair(
    m: &[[f64; FEATURE_COUNT]; FEATURE_COUNT],
    previous: &[[f64; FEATURE_COUNT]],
    rng: &mut StdRng,
) -> ([f64; FEATURE_COUNT], f64) {
    let mut v = [0.0; FEATURE_COUNT];
    for x in &mut v {
        *x = rng.gen_range(-1.0..1.0);
    }
    orthogonalize(&mut v, previous);
    normalize(&mut v);

    for _ in 0..POWER_ITERATIONS {
        let mut next = mat_vec(m, &v);
        orthogonalize(&mut next, previous);
        let norm = normalize(&mut next);
        if norm < CONVERGENCE_EPS {
            return (v, 0.0);
        }
        let delta: f64 = next
            .iter()
            .zip(&v)
            .map(|(a, b)| (a - b).abs())
            .sum();
        v = next;
        if delta < CONVERGENCE_EPS {
            break;
        }
    }

    let mv = mat_vec(m, &v);
    let eigenvalue: f64 = mv.iter().zip(&v).map(|(a, b)| a * b).sum();
    (v, eigenvalue)
}

impl ReconstructionError {
    /// Principal axes of the (centered) scaled matrix, found by power
    /// iteration with deflation.
    fn principal_axes(
        &self,
        scaled: &[[f64; FEATURE_COUNT]],
    ) -> ([f64; FEATURE_COUNT], Vec<[f64; FEATURE_COUNT]>) {
        let n = scaled.len() as f64;
        let mut mean = [0.0; FEATURE_COUNT];
        for row in scaled {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v / n;
            }
        }

        let mut cov = [[0.0; FEATURE_COUNT]; FEATURE_COUNT];
        for row in scaled {
            for i in 0..FEATURE_COUNT {
                for j in 0..FEATURE_COUNT {
                    cov[i][j] += (row[i] - mean[i]) * (row[j] - mean[j]) / (n - 1.0);
                }
            }
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut axes: Vec<[f64; FEATURE_COUNT]> = Vec::with_capacity(self.components);
        for _ in 0..self.components {
            let (axis, eigenvalue) = leading_eigenpair(&cov, &axes, &mut rng);
            // Deflate: remove the captured variance before the next axis.
            for i in 0..FEATURE_COUNT {
                for j in 0..FEATURE_COUNT {
                    cov[i][j] -= eigenvalue * axis[i] * axis[j];
                }
            }
            axes.push(axis);
        }
        (mean, axes)
    }

    /// Detection plus per-feature loading magnitudes summed across the
    /// retained components, used downstream for attribution.
    pub fn detect_with_loadings(
        &self,
        scaled: &[[f64; FEATURE_COUNT]],
    ) -> Result<(Detection, [f64; FEATURE_COUNT])> {
        if self.components == 0 || self.components > FEATURE_COUNT {
            return Err(AnalysisError::Estimator(format!(
                "Component count must be in 1..={FEATURE_COUNT}, got {}",
                self.components
            )));
        }
        if scaled.len() < self.components || scaled.len() < 2 {
            return Err(AnalysisError::Estimator(format!(
                "{} components requested but only {} rows available",
                self.components,
                scaled.len()
            )));
        }

        let (mean, axes) = self.principal_axes(scaled);

        // Squared reconstruction error of each centered row from its
        // projection onto the retained axes.
        let scores: Vec<f64> = scaled
            .iter()
            .map(|row| {
                let mut centered = [0.0; FEATURE_COUNT];
                for i in 0..FEATURE_COUNT {
                    centered[i] = row[i] - mean[i];
                }
                let mut reconstructed = [0.0; FEATURE_COUNT];
                for axis in &axes {
                    let t: f64 = centered.iter().zip(axis).map(|(x, a)| x * a).sum();
                    for i in 0..FEATURE_COUNT {
                        reconstructed[i] += t * axis[i];
                    }
                }
                centered
                    .iter()
                    .zip(&reconstructed)
                    .map(|(x, r)| (x - r) * (x - r))
                    .sum()
            })
            .collect();

        let threshold = stats::percentile(&scores, 90.0);
        let flags: Vec<i8> = scores
            .iter()
            .map(|&e| if e > threshold { ANOMALOUS } else { NORMAL })
            .collect();

        let mut loadings = [0.0; FEATURE_COUNT];
        for axis in &axes {
            for i in 0..FEATURE_COUNT {
                loadings[i] += axis[i].abs();
            }
        }

        log::debug!(
            "Reconstruction error: {} components, threshold {threshold:.4}, {} rows flagged",
            axes.len(),
            flags.iter().filter(|&&f| f == ANOMALOUS).count()
        );
        Ok((Detection { flags, scores }, loadings))
    }
}

impl OutlierScorer for ReconstructionError {
    fn name(&self) -> &'static str {
        "reconstruction-error"
    }

    fn score(&self, scaled: &[[f64; FEATURE_COUNT]]) -> Result<Detection> {
        self.detect_with_loadings(scaled).map(|(detection, _)| detection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Points on a plane reconstruct exactly from two components; a
    /// point off the plane cannot.
    #[test]
    fn test_off_plane_point_flagged() {
        let mut data: Vec<[f64; FEATURE_COUNT]> = (0..40)
            .map(|i| {
                let a = f64::from(i) * 0.1;
                let b = (f64::from(i) * 0.3).sin();
                [a, b, a + b]
            })
            .collect();
        data.push([1.0, 1.0, 4.0]);

        let (detection, _) = ReconstructionError::default()
            .detect_with_loadings(&data)
            .expect("score");
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
    fn test_idempotent_under_fixed_seed() {
        let data: Vec<[f64; FEATURE_COUNT]> = (0..30)
            .map(|i| [f64::from(i) * 0.2, (f64::from(i) * 0.5).cos(), f64::from(i % 3)])
            .collect();
        let pca = ReconstructionError::default();
        let first = pca.score(&data).expect("score");
        let second = pca.score(&data).expect("score");
        assert_eq!(first.flags, second.flags);
        assert_eq!(first.scores, second.scores);
    }

    #[test]
    fn test_component_count_validation() {
        let data = vec![[0.0; FEATURE_COUNT]; 10];
        let err = ReconstructionError {
            components: FEATURE_COUNT + 1,
            seed: 42,
        }
        .score(&data)
        .unwrap_err();
        assert!(err.to_string().contains("Component count"));

        let err = ReconstructionError::default().score(&[[0.0; FEATURE_COUNT]]).unwrap_err();
        assert!(err.to_string().contains("only 1 rows"));
    }

    #[test]
    fn test_loadings_are_nonnegative() {
        let data: Vec<[f64; FEATURE_COUNT]> = (0..20)
            .map(|i| [f64::from(i), f64::from(i * 2), 1.0])
            .collect();
        let (_, loadings) = ReconstructionError::default()
            .detect_with_loadings(&data)
            .expect("score");
        assert!(loadings.iter().all(|&l| l >= 0.0));
    }
}
