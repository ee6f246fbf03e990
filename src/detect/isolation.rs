//! Isolation-ensemble scorer: anomalies isolate on short average paths
//! through randomly partitioned trees.
//!
//! Liu, Ting & Zhou (2008), "Isolation Forest".

use crate::detect::scorer::{Detection, OutlierScorer, ANOMALOUS, NORMAL};
use crate::error::{AnalysisError, Result};
use crate::ingest::record::FEATURE_COUNT;
use crate::stats;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Sub-sampling size from the original paper.
const DEFAULT_SUBSAMPLE: usize = 256;

const EULER_GAMMA: f64 = 0.577_215_664_9;

/// Expected path length of an unsuccessful BST search over n samples.
fn average_path_length(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    2.0 * ((n - 1) as f64).ln() + EULER_GAMMA - 2.0 * (n - 1) as f64 / n as f64
}

#[derive(Debug)]
enum Node {
    Internal {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
    Leaf {
        size: usize,
    },
}

impl Node {
    fn path_length(&self, sample: &[f64; FEATURE_COUNT], depth: usize) -> f64 {
        match self {
            Node::Internal {
                feature,
                threshold,
                left,
                right,
            } => {
                if sample[*feature] < *threshold {
                    left.path_length(sample, depth + 1)
                } else {
                    right.path_length(sample, depth + 1)
                }
            }
            // Unresolved instances get the average remaining depth.
            Node::Leaf { size } => depth as f64 + average_path_length(*size),
        }
    }

    /// Route `indices` through the tree and collect the groups that land
    /// in the same leaf.
    fn collect_leaf_groups(
        &self,
        data: &[[f64; FEATURE_COUNT]],
        indices: Vec<usize>,
        groups: &mut Vec<Vec<usize>>,
    ) {
        match self {
            Node::Internal {
                feature,
                threshold,
                left,
                right,
            } => {
                let (lo, hi): (Vec<usize>, Vec<usize>) = indices
                    .into_iter()
                    .partition(|&i| data[i][*feature] < *threshold);
                left.collect_leaf_groups(data, lo, groups);
                right.collect_leaf_groups(data, hi, groups);
            }
            Node::Leaf { .. } => {
                if !indices.is_empty() {
                    groups.push(indices);
                }
            }
        }
    }
}

fn build_node(
    data: &[[f64; FEATURE_COUNT]],
    indices: &[usize],
    depth: usize,
    max_depth: usize,
    rng: &mut StdRng,
) -> Node {
    if indices.len() <= 1 || depth >= max_depth {
        return Node::Leaf {
            size: indices.len(),
        };
    }

    // Only features with spread can split this partition.
    let mut splittable: Vec<(usize, f64, f64)> = Vec::with_capacity(FEATURE_COUNT);
    for feature in 0..FEATURE_COUNT {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &i in indices {
            min = min.min(data[i][feature]);
            max = max.max(data[i][feature]);
        }
        if max > min {
            splittable.push((feature, min, max));
        }
    }
    let Some(&(feature, min, max)) = splittable.choose(rng) else {
        // All remaining samples are identical.
        return Node::Leaf {
            size: indices.len(),
        };
    };

    let threshold = rng.gen_range(min..max);
    let (lo, hi): (Vec<usize>, Vec<usize>) = indices
        .iter()
        .copied()
        .partition(|&i| data[i][feature] < threshold);

    Node::Internal {
        feature,
        threshold,
        left: Box::new(build_node(data, &lo, depth + 1, max_depth, rng)),
        right: Box::new(build_node(data, &hi, depth + 1, max_depth, rng)),
    }
}

/// Bagging ensemble of random partition trees.
///
/// `contamination` is the expected anomaly fraction and calibrates the
/// decision threshold; the fixed `seed` makes repeated runs over the
/// same matrix produce identical flags and scores.
#[derive(Debug, Clone)]
pub struct IsolationForest {
    pub trees: usize,
    pub subsample: usize,
    pub contamination: f64,
    pub seed: u64,
}

impl Default for IsolationForest {
    fn default() -> Self {
        IsolationForest {
            trees: 200,
            subsample: DEFAULT_SUBSAMPLE,
            contamination: 0.1,
            seed: 42,
        }
    }
}

impl IsolationForest {
    fn fit(&self, data: &[[f64; FEATURE_COUNT]], rng: &mut StdRng) -> Vec<Node> {
        let psi = self.subsample.min(data.len());
        let max_depth = (psi as f64).log2().ceil().max(1.0) as usize;
        let mut all_indices: Vec<usize> = (0..data.len()).collect();

        (0..self.trees)
            .map(|_| {
                all_indices.shuffle(rng);
                build_node(data, &all_indices[..psi], 0, max_depth, rng)
            })
            .collect()
    }

    /// Score every row and derive per-feature importance weights from
    /// the variance of same-leaf samples across the ensemble's trees.
    /// Features that split outliers apart cleanly accumulate more
    /// within-leaf variance mass.
    pub fn detect_with_importance(
        &self,
        scaled: &[[f64; FEATURE_COUNT]],
    ) -> Result<(Detection, [f64; FEATURE_COUNT])> {
        if scaled.len() < 2 {
            return Err(AnalysisError::Estimator(format!(
                "Isolation forest needs at least 2 rows, got {}",
                scaled.len()
            )));
        }
        if self.contamination <= 0.0 || self.contamination > 0.5 {
            return Err(AnalysisError::Estimator(format!(
                "Contamination must be in (0, 0.5], got {}",
                self.contamination
            )));
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let forest = self.fit(scaled, &mut rng);
        let psi = self.subsample.min(scaled.len());
        let correction = average_path_length(psi).max(f64::EPSILON);

        let scores: Vec<f64> = scaled
            .iter()
            .map(|sample| {
                let avg_path: f64 = forest
                    .iter()
                    .map(|root| root.path_length(sample, 0))
                    .sum::<f64>()
                    / forest.len() as f64;
                2.0_f64.powf(-avg_path / correction)
            })
            .collect();

        let threshold = stats::percentile(&scores, (1.0 - self.contamination) * 100.0);
        let flags: Vec<i8> = scores
            .iter()
            .map(|&s| if s > threshold { ANOMALOUS } else { NORMAL })
            .collect();

        let importance = self.feature_importance(scaled, &forest);
        log::debug!(
            "Isolation forest: {} trees, threshold {threshold:.4}, {} rows flagged",
            forest.len(),
            flags.iter().filter(|&&f| f == ANOMALOUS).count()
        );

        Ok((Detection { flags, scores }, importance))
    }

    fn feature_importance(
        &self,
        scaled: &[[f64; FEATURE_COUNT]],
        forest: &[Node],
    ) -> [f64; FEATURE_COUNT] {
        let mut totals = [0.0; FEATURE_COUNT];
        for root in forest {
            let mut groups = Vec::new();
            root.collect_leaf_groups(scaled, (0..scaled.len()).collect(), &mut groups);
            for group in groups.iter().filter(|g| g.len() > 1) {
                for feature in 0..FEATURE_COUNT {
                    let column: Vec<f64> = group.iter().map(|&i| scaled[i][feature]).collect();
                    let mean = stats::mean(&column);
                    let var = column.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>()
                        / column.len() as f64;
                    totals[feature] += var;
                }
            }
        }
        for total in &mut totals {
            *total /= forest.len() as f64;
        }
        totals
    }
}

impl OutlierScorer for IsolationForest {
    fn name(&self) -> &'static str {
        "isolation-forest"
    }

    fn score(&self, scaled: &[[f64; FEATURE_COUNT]]) -> Result<Detection> {
        self.detect_with_importance(scaled).map(|(detection, _)| detection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster_with_outlier() -> Vec<[f64; FEATURE_COUNT]> {
        let mut data: Vec<[f64; FEATURE_COUNT]> = (0..60)
            .map(|i| {
                let jitter = f64::from(i % 5) * 0.01;
                [jitter, -jitter, 0.5 + jitter]
            })
            .collect();
        data.push([10.0, -10.0, 8.0]);
        data
    }

    #[test]
    fn test_outlier_gets_top_score() {
        let data = cluster_with_outlier();
        let forest = IsolationForest::default();
        let detection = forest.score(&data).expect("score");
        let top = detection
            .scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).expect("finite scores"))
            .expect("non-empty")
            .0;
        assert_eq!(top, data.len() - 1);
        assert!(detection.is_anomalous(top));
    }

    #[test]
    fn test_fixed_seed_is_idempotent() {
        let data = cluster_with_outlier();
        let forest = IsolationForest::default();
        let first = forest.score(&data).expect("score");
        let second = forest.score(&data).expect("score");
        assert_eq!(first.flags, second.flags);
        assert_eq!(first.scores, second.scores);
    }

    #[test]
    fn test_too_few_rows() {
        let forest = IsolationForest::default();
        let err = forest.score(&[[0.0; FEATURE_COUNT]]).unwrap_err();
        assert!(err.to_string().contains("at least 2 rows"));
    }

    #[test]
    fn test_importance_tracks_splitting_feature() {
        // Outlier separated along the first feature only; it should not
        // end up with the smallest weight.
        let mut data: Vec<[f64; FEATURE_COUNT]> = (0..60)
            .map(|i| [f64::from(i % 7) * 0.05, 0.0, 0.0])
            .collect();
        data.push([25.0, 0.0, 0.0]);
        let forest = IsolationForest::default();
        let (_, importance) = forest.detect_with_importance(&data).expect("score");
        assert!(importance[0] > importance[1]);
        assert!(importance[0] > importance[2]);
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        // c(2) = 2*(ln(1) + gamma) - 2*1/2
        assert!((average_path_length(2) - 0.154_431).abs() < 1e-4);
        assert!(average_path_length(256) > average_path_length(16));
    }
}
