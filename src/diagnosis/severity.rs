//! Severity classification: fixed z-score thresholds for the
//! distribution-based strategies, empirical percentile cut-points for
//! the score-based ones.

use crate::stats;

/// A feature "deviates" once its z-score clears this threshold.
pub const MINOR_Z: f64 = 1.5;
/// Weighted-z magnitude above this is moderate.
pub const MODERATE_Z: f64 = 2.0;
/// Weighted-z magnitude above this is critical.
pub const CRITICAL_Z: f64 = 3.0;

/// Minor severity / alert level 1.
pub const MINOR: u8 = 1;
/// Moderate severity / alert level 2.
pub const MODERATE: u8 = 2;
/// Critical severity / alert level 3 (worst).
pub const CRITICAL: u8 = 3;

/// Z-score policy: classify the row's weighted deviation magnitude
/// (max over deviating features of importance-weight x z).
pub fn classify_magnitude(magnitude: f64) -> u8 {
    if magnitude > CRITICAL_Z {
        CRITICAL
    } else if magnitude > MODERATE_Z {
        MODERATE
    } else {
        MINOR
    }
}

/// Percentile policy: cut-points recomputed per run from the full score
/// distribution, never fixed constants.
#[derive(Debug, Clone, Copy)]
pub struct PercentileCuts {
    moderate: f64,
    critical: f64,
}

impl PercentileCuts {
    pub fn from_scores(scores: &[f64]) -> Self {
        PercentileCuts {
            moderate: stats::percentile(scores, 95.0),
            critical: stats::percentile(scores, 98.0),
        }
    }

    pub fn classify(&self, score: f64) -> u8 {
        if score > self.critical {
            CRITICAL
        } else if score > self.moderate {
            MODERATE
        } else {
            MINOR
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zscore_policy_boundaries() {
        assert_eq!(classify_magnitude(1.6), MINOR);
        assert_eq!(classify_magnitude(2.0), MINOR);
        assert_eq!(classify_magnitude(2.1), MODERATE);
        assert_eq!(classify_magnitude(3.0), MODERATE);
        assert_eq!(classify_magnitude(3.1), CRITICAL);
        assert_eq!(classify_magnitude(9.9), CRITICAL);
    }

    #[test]
    fn test_percentile_policy_monotonic() {
        let scores: Vec<f64> = (0..100).map(f64::from).collect();
        let cuts = PercentileCuts::from_scores(&scores);
        let mut last = 0;
        for &s in &scores {
            let level = cuts.classify(s);
            assert!(level >= last, "severity must not decrease as score grows");
            last = level;
        }
        assert_eq!(cuts.classify(99.0), CRITICAL);
        assert_eq!(cuts.classify(97.0), MODERATE);
        assert_eq!(cuts.classify(50.0), MINOR);
    }

    #[test]
    fn test_percentile_cuts_follow_distribution() {
        // Same ranks, different scale: cut-points move with the data.
        let small: Vec<f64> = (0..50).map(|i| f64::from(i) * 0.01).collect();
        let large: Vec<f64> = (0..50).map(|i| f64::from(i) * 100.0).collect();
        assert_eq!(
            PercentileCuts::from_scores(&small).classify(0.49),
            PercentileCuts::from_scores(&large).classify(4900.0)
        );
    }
}
