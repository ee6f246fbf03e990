//! Neighbor-distance scorer: a row is suspicious when its mean distance
//! to its k nearest neighbors sits in the top decile of the run.

use crate::detect::scorer::{Detection, OutlierScorer, ANOMALOUS, NORMAL};
use crate::error::{AnalysisError, Result};
use crate::ingest::record::FEATURE_COUNT;
use crate::stats;

#[derive(Debug, Clone)]
pub struct NeighborDistance {
    pub neighbors: usize,
}

impl Default for NeighborDistance {
    fn default() -> Self {
        NeighborDistance { neighbors: 5 }
    }
}

fn euclidean(a: &[f64; FEATURE_COUNT], b: &[f64; FEATURE_COUNT]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

impl NeighborDistance {
    /// Mean distance to the k nearest neighbors, brute force. Quadratic,
    /// which is fine for batch tables of periodic meter readings.
    fn mean_distances(&self, scaled: &[[f64; FEATURE_COUNT]]) -> Vec<f64> {
        scaled
            .iter()
            .enumerate()
            .map(|(i, sample)| {
                let mut distances: Vec<f64> = scaled
                    .iter()
                    .enumerate()
                    .filter(|&(j, _)| j != i)
                    .map(|(_, other)| euclidean(sample, other))
                    .collect();
                distances.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                distances.truncate(self.neighbors);
                stats::mean(&distances)
            })
            .collect()
    }
}

impl OutlierScorer for NeighborDistance {
    fn name(&self) -> &'static str {
        "neighbor-distance"
    }

    fn score(&self, scaled: &[[f64; FEATURE_COUNT]]) -> Result<Detection> {
        if self.neighbors == 0 {
            return Err(AnalysisError::Estimator(
                "Neighbor count must be at least 1".to_string(),
            ));
        }
        if scaled.len() <= self.neighbors {
            return Err(AnalysisError::Estimator(format!(
                "{} neighbors requested but only {} rows available",
                self.neighbors,
                scaled.len()
            )));
        }

        let scores = self.mean_distances(scaled);
        let threshold = stats::percentile(&scores, 90.0);
        let flags: Vec<i8> = scores
            .iter()
            .map(|&d| if d > threshold { ANOMALOUS } else { NORMAL })
            .collect();

        log::debug!(
            "Neighbor distance: k={}, threshold {threshold:.4}, {} rows flagged",
            self.neighbors,
            flags.iter().filter(|&&f| f == ANOMALOUS).count()
        );
        Ok(Detection { flags, scores })
    }
}
