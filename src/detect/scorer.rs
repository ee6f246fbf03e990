use crate::error::Result;
use crate::ingest::record::FEATURE_COUNT;

/// Flag value for a normal row.
pub const NORMAL: i8 = 1;
/// Flag value for an anomalous row.
pub const ANOMALOUS: i8 = -1;

/// Per-row output of one outlier scorer: a binary flag in {-1, +1} and a
/// continuous score whose scale is specific to the strategy (higher =
/// more anomalous). Produced once per strategy per run, never mutated.
#[derive(Debug, Clone)]
pub struct Detection {
    pub flags: Vec<i8>,
    pub scores: Vec<f64>,
}

impl Detection {
    pub fn is_anomalous(&self, row: usize) -> bool {
        self.flags[row] == ANOMALOUS
    }

    pub fn anomaly_count(&self) -> usize {
        self.flags.iter().filter(|&&f| f == ANOMALOUS).count()
    }
}

/// Trait for outlier scoring strategies.
///
/// Implementations receive an already-scaled matrix (scaling happens
/// once, upstream, and is shared across strategies run in the same
/// pass) and score every row in one synchronous batch.
pub trait OutlierScorer {
    /// Strategy name for logs.
    fn name(&self) -> &'static str;

    /// Score all rows of the scaled matrix.
    fn score(&self, scaled: &[[f64; FEATURE_COUNT]]) -> Result<Detection>;
}

/// Combine per-strategy flags into one decision per row by majority
/// vote: a row is anomalous when the mean flag value is strictly
/// negative, so an exact tie favors the normal class. A single
/// detection passes through unchanged.
pub fn majority_vote(detections: &[Detection]) -> Vec<i8> {
    let n_rows = detections.first().map_or(0, |d| d.flags.len());
    (0..n_rows)
        .map(|row| {
            let mean: f64 = detections.iter().map(|d| f64::from(d.flags[row])).sum::<f64>()
                / detections.len() as f64;
            if mean < 0.0 {
                ANOMALOUS
            } else {
                NORMAL
            }
        })
        .collect()
}
