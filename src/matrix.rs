//! The validated numeric table every strategy scores against, plus the
//! scalers that normalize it.

use crate::error::{AnalysisError, Result};
use crate::ingest::record::{Feature, Observation, FEATURE_COUNT};
use crate::stats;

/// Immutable rows-by-features table with cached column statistics.
///
/// Column order is the canonical [`Feature::ALL`] order and is identical
/// for every strategy in a run, so per-row score vectors stay aligned to
/// the same observation. The unscaled values are retained for reporting;
/// scaled copies are derived via [`Scaler`].
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    rows: Vec<[f64; FEATURE_COUNT]>,
    mean: [f64; FEATURE_COUNT],
    std: [f64; FEATURE_COUNT],
}

impl FeatureMatrix {
    /// Build the matrix and its column statistics from cleaned observations.
    pub fn from_observations(observations: &[Observation]) -> Result<Self> {
        if observations.is_empty() {
            return Err(AnalysisError::Data(
                "Cannot analyze an empty set of observations".to_string(),
            ));
        }

        let rows: Vec<[f64; FEATURE_COUNT]> = observations.iter().map(|o| o.values).collect();

        let mut mean = [0.0; FEATURE_COUNT];
        let mut std = [0.0; FEATURE_COUNT];
        for feature in Feature::ALL {
            let column = column_values(&rows, feature);
            mean[feature.index()] = stats::mean(&column);
            std[feature.index()] = stats::std_dev(&column);
        }

        Ok(FeatureMatrix { rows, mean, std })
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[[f64; FEATURE_COUNT]] {
        &self.rows
    }

    pub fn value(&self, row: usize, feature: Feature) -> f64 {
        self.rows[row][feature.index()]
    }

    pub fn mean(&self, feature: Feature) -> f64 {
        self.mean[feature.index()]
    }

    pub fn std(&self, feature: Feature) -> f64 {
        self.std[feature.index()]
    }

    /// Absolute z-score of one cell against its column statistics.
    ///
    /// A zero-variance column yields 0 (every value sits on the mean).
    pub fn zscore(&self, row: usize, feature: Feature) -> f64 {
        let std = self.std(feature);
        if std > 0.0 {
            (self.value(row, feature) - self.mean(feature)).abs() / std
        } else {
            0.0
        }
    }

    /// Signed deviation from the column mean as a percentage of the mean.
    /// A zero mean maps to infinity rather than failing the run.
    pub fn deviation_percent(&self, row: usize, feature: Feature) -> f64 {
        let mean = self.mean(feature);
        if mean == 0.0 {
            f64::INFINITY
        } else {
            (self.value(row, feature) - mean) / mean * 100.0
        }
    }
}

fn column_values(rows: &[[f64; FEATURE_COUNT]], feature: Feature) -> Vec<f64> {
    rows.iter().map(|r| r[feature.index()]).collect()
}

/// Feature normalization applied once per run, upstream of the scorers.
///
/// Which scaler a pipeline uses follows the strategy it runs: the
/// ensemble centers on median/IQR so gross outliers cannot drag the fit,
/// the single-estimator pipelines standardize on mean/std.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scaler {
    /// `(x - mean) / std`, zero std mapped to unit scale.
    Standard,
    /// `(x - median) / IQR`, zero IQR mapped to unit scale.
    Robust,
}

impl Scaler {
    /// Fit on the matrix and return the scaled copy of its rows.
    pub fn fit_transform(self, matrix: &FeatureMatrix) -> Vec<[f64; FEATURE_COUNT]> {
        let mut center = [0.0; FEATURE_COUNT];
        let mut scale = [1.0; FEATURE_COUNT];
        for feature in Feature::ALL {
            let column = column_values(matrix.rows(), feature);
            let (c, s) = match self {
                Scaler::Standard => (stats::mean(&column), stats::std_dev(&column)),
                Scaler::Robust => (stats::median(&column), stats::iqr(&column)),
            };
            center[feature.index()] = c;
            scale[feature.index()] = if s > 0.0 { s } else { 1.0 };
        }

        matrix
            .rows()
            .iter()
            .map(|row| {
                let mut scaled = [0.0; FEATURE_COUNT];
                for i in 0..FEATURE_COUNT {
                    scaled[i] = (row[i] - center[i]) / scale[i];
                }
                scaled
            })
            .collect()
    }
}
