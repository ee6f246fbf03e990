//! Root-cause attribution: which measurement is responsible for a
//! flagged row, and the FMEA-style text explaining it.

use crate::diagnosis::severity::MINOR_Z;
use crate::ingest::record::{Feature, FEATURE_COUNT};
use crate::matrix::FeatureMatrix;

/// Power factor below this band indicates reactive power issues.
const POOR_POWER_FACTOR: f64 = 0.85;
/// Power factor above this band indicates over-compensation.
const OVER_COMPENSATED_POWER_FACTOR: f64 = 0.98;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    High,
    Low,
}

/// One feature whose z-score cleared the minor threshold on a flagged row.
#[derive(Debug, Clone)]
pub struct Deviation {
    pub feature: Feature,
    pub z: f64,
    /// Importance-weight x z, the row's deviation magnitude contribution.
    pub weighted: f64,
    pub direction: Direction,
    /// Percent deviation from the column mean; infinite when the mean is
    /// zero rather than a hard failure.
    pub deviation_percent: f64,
}

/// Collect the features deviating on `row`, in canonical feature order.
pub fn deviations(
    matrix: &FeatureMatrix,
    row: usize,
    weights: &[f64; FEATURE_COUNT],
) -> Vec<Deviation> {
    Feature::ALL
        .iter()
        .filter_map(|&feature| {
            let z = matrix.zscore(row, feature);
            if z > MINOR_Z {
                let direction = if matrix.value(row, feature) > matrix.mean(feature) {
                    Direction::High
                } else {
                    Direction::Low
                };
                Some(Deviation {
                    feature,
                    z,
                    weighted: weights[feature.index()] * z,
                    direction,
                    deviation_percent: matrix.deviation_percent(row, feature),
                })
            } else {
                None
            }
        })
        .collect()
}

/// Primary issue under the z-score policy: largest weighted z. Earlier
/// canonical order wins ties because only a strictly larger value
/// displaces the running best.
pub fn primary_by_weight(deviations: &[Deviation]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, dev) in deviations.iter().enumerate() {
        if best.is_none_or(|b| dev.weighted > deviations[b].weighted) {
            best = Some(i);
        }
    }
    best
}

/// Primary issue for the reconstruction strategy: among deviating
/// features, the one with the largest summed loading magnitude. A
/// non-deviating feature is never promoted.
pub fn primary_by_loading(
    deviations: &[Deviation],
    loadings: &[f64; FEATURE_COUNT],
) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, dev) in deviations.iter().enumerate() {
        if best.is_none_or(|b| loadings[dev.feature.index()] > loadings[deviations[b].feature.index()]) {
            best = Some(i);
        }
    }
    best
}

/// Categorical label plus diagnosis text for one flagged row.
#[derive(Debug, Clone)]
pub struct Diagnosis {
    pub label: String,
    pub text: String,
    /// Weighted deviation magnitude (0 when nothing deviates), consumed
    /// by the z-score severity policy.
    pub magnitude: f64,
}

/// Build the diagnosis for a flagged row.
///
/// `strategy_score` carries the strategy's own numeric score (neighbor
/// distance, reconstruction error) and is embedded in the text, rounded
/// to two decimals, when present.
pub fn diagnose(
    matrix: &FeatureMatrix,
    row: usize,
    deviations: &[Deviation],
    primary: Option<usize>,
    strategy_score: Option<f64>,
) -> Diagnosis {
    let magnitude = deviations.iter().map(|d| d.weighted).fold(0.0, f64::max);

    let Some(primary_idx) = primary else {
        // Flagged by the estimator, but no single measurement clears the
        // minor threshold: report the pattern without naming a culprit.
        let text = match strategy_score {
            Some(score) => format!("Abnormal operating pattern detected (score: {score:.2})"),
            None => "Abnormal operating pattern detected".to_string(),
        };
        return Diagnosis {
            label: "Anomaly".to_string(),
            text,
            magnitude,
        };
    };

    let primary = &deviations[primary_idx];
    let mut text = match primary.feature {
        Feature::Usage => match primary.direction {
            Direction::High => "High energy consumption detected".to_string(),
            Direction::Low => "Low energy consumption detected".to_string(),
        },
        Feature::Emissions => match primary.direction {
            Direction::High => "Elevated CO2 emissions detected".to_string(),
            Direction::Low => "Reduced CO2 emissions detected".to_string(),
        },
        Feature::PowerFactor => {
            let value = matrix.value(row, Feature::PowerFactor);
            if value < POOR_POWER_FACTOR {
                "Poor power factor indicating reactive power issues".to_string()
            } else if value > OVER_COMPENSATED_POWER_FACTOR {
                "Power factor over-compensation detected".to_string()
            } else {
                "Abnormal power factor fluctuation".to_string()
            }
        }
    };

    if let Some(score) = strategy_score {
        text.push_str(&format!(" (score: {score:.2})"));
    }

    let secondary: Vec<&str> = deviations
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != primary_idx)
        .map(|(_, d)| d.feature.column_name())
        .collect();
    if !secondary.is_empty() {
        text.push_str(&format!(". Also showing abnormal {}", secondary.join(", ")));
    }

    Diagnosis {
        label: primary.feature.anomaly_label().to_string(),
        text,
        magnitude,
    }
}
