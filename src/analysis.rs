// GridScope - GPL-3.0-or-later
// This file is part of GridScope.
//
// GridScope is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// GridScope is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with GridScope.  If not, see <https://www.gnu.org/licenses/>.

//! The analysis run: scale once, score with the selected strategy set,
//! vote, then classify and diagnose every flagged row in input order.

use crate::detect::{
    majority_vote, Detection, IsolationForest, NeighborDistance, OutlierScorer, ReconstructionError,
    RobustCovariance, ANOMALOUS,
};
use crate::diagnosis::{self, PercentileCuts};
use crate::error::Result;
use crate::ingest;
use crate::ingest::record::{Observation, FEATURE_COUNT};
use crate::matrix::{FeatureMatrix, Scaler};
use crate::report::AnomalyRecord;
use std::path::Path;

/// Which detection pipeline an analysis run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pipeline {
    /// Isolation forest + robust covariance combined by majority vote,
    /// z-score severity with leaf-variance importance weights.
    #[default]
    Ensemble,
    /// Isolation forest alone, z-score severity with uniform weights.
    Isolation,
    /// k-nearest-neighbor mean distance, percentile severity.
    Neighbors,
    /// PCA reconstruction error, percentile severity with
    /// loading-magnitude attribution.
    Reconstruction,
}

impl Pipeline {
    pub fn name(self) -> &'static str {
        match self {
            Pipeline::Ensemble => "ensemble",
            Pipeline::Isolation => "isolation",
            Pipeline::Neighbors => "neighbors",
            Pipeline::Reconstruction => "reconstruction",
        }
    }
}

/// Tunables for one analysis run. The defaults mirror the estimator
/// configurations the pipelines shipped with.
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    pub pipeline: Pipeline,
    /// Expected anomaly fraction, calibrating detector thresholds.
    pub contamination: f64,
    pub trees: usize,
    pub neighbors: usize,
    pub components: usize,
    pub seed: u64,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        AnalysisOptions {
            pipeline: Pipeline::default(),
            contamination: 0.1,
            trees: 200,
            neighbors: 5,
            components: 2,
            seed: 42,
        }
    }
}

impl AnalysisOptions {
    fn isolation_forest(&self) -> IsolationForest {
        IsolationForest {
            trees: self.trees,
            contamination: self.contamination,
            seed: self.seed,
            ..IsolationForest::default()
        }
    }
}

const UNIFORM_WEIGHTS: [f64; FEATURE_COUNT] = [1.0; FEATURE_COUNT];

/// Normalize raw importance mass to mean 1 so the fixed z-score
/// severity cut-points keep their meaning; degenerate mass falls back
/// to uniform weights.
fn normalize_weights(raw: [f64; FEATURE_COUNT]) -> [f64; FEATURE_COUNT] {
    let total: f64 = raw.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return UNIFORM_WEIGHTS;
    }
    let mean = total / FEATURE_COUNT as f64;
    let mut weights = raw;
    for w in &mut weights {
        *w /= mean;
    }
    weights
}

/// Analyze cleaned observations with the given options.
///
/// The returned records follow the original row order and contain one
/// entry per row whose aggregated decision is anomalous. Each call owns
/// its matrix and scores exclusively; nothing is cached across calls.
pub fn analyze_observations(
    observations: &[Observation],
    options: &AnalysisOptions,
) -> Result<Vec<AnomalyRecord>> {
    let matrix = FeatureMatrix::from_observations(observations)?;
    log::info!(
        "Analyzing {} rows with the {} pipeline",
        matrix.n_rows(),
        options.pipeline.name()
    );

    let run = match options.pipeline {
        Pipeline::Ensemble => run_ensemble(&matrix, options)?,
        Pipeline::Isolation => run_isolation(&matrix, options)?,
        Pipeline::Neighbors => run_neighbors(&matrix, options)?,
        Pipeline::Reconstruction => run_reconstruction(&matrix, options)?,
    };

    let records: Vec<AnomalyRecord> = run
        .flags
        .iter()
        .enumerate()
        .filter(|&(_, &flag)| flag == ANOMALOUS)
        .map(|(row, _)| annotate(&matrix, row, &observations[row], &run))
        .collect();

    log::info!("{} of {} rows flagged anomalous", records.len(), matrix.n_rows());
    Ok(records)
}

/// Per-row classification inputs shared by all pipelines.
struct RunOutput {
    flags: Vec<i8>,
    /// Importance weights for the z-score policy.
    weights: [f64; FEATURE_COUNT],
    /// Percentile cut-points when the severity policy is score-based.
    cuts: Option<PercentileCuts>,
    /// Strategy score per row, embedded in score-based diagnoses.
    scores: Option<Vec<f64>>,
    /// Component loadings when the strategy attributes by projection.
    loadings: Option<[f64; FEATURE_COUNT]>,
}

fn run_ensemble(matrix: &FeatureMatrix, options: &AnalysisOptions) -> Result<RunOutput> {
    let scaled = Scaler::Robust.fit_transform(matrix);

    let forest = options.isolation_forest();
    let (isolation, importance) = forest.detect_with_importance(&scaled)?;
    let covariance = RobustCovariance {
        contamination: options.contamination,
    };
    let mahalanobis = covariance.score(&scaled)?;
    log::debug!(
        "{} flagged {}, {} flagged {}",
        forest.name(),
        isolation.anomaly_count(),
        covariance.name(),
        mahalanobis.anomaly_count()
    );

    Ok(RunOutput {
        flags: majority_vote(&[isolation, mahalanobis]),
        weights: normalize_weights(importance),
        cuts: None,
        scores: None,
        loadings: None,
    })
}

fn run_isolation(matrix: &FeatureMatrix, options: &AnalysisOptions) -> Result<RunOutput> {
    let scaled = Scaler::Standard.fit_transform(matrix);
    let detection = options.isolation_forest().score(&scaled)?;
    Ok(RunOutput {
        flags: detection.flags,
        weights: UNIFORM_WEIGHTS,
        cuts: None,
        scores: None,
        loadings: None,
    })
}

fn run_neighbors(matrix: &FeatureMatrix, options: &AnalysisOptions) -> Result<RunOutput> {
    let scaled = Scaler::Standard.fit_transform(matrix);
    let detection = NeighborDistance {
        neighbors: options.neighbors,
    }
    .score(&scaled)?;
    Ok(score_based_run(detection, None))
}

fn run_reconstruction(matrix: &FeatureMatrix, options: &AnalysisOptions) -> Result<RunOutput> {
    let scaled = Scaler::Standard.fit_transform(matrix);
    let (detection, loadings) = ReconstructionError {
        components: options.components,
        seed: options.seed,
    }
    .detect_with_loadings(&scaled)?;
    Ok(score_based_run(detection, Some(loadings)))
}

fn score_based_run(detection: Detection, loadings: Option<[f64; FEATURE_COUNT]>) -> RunOutput {
    let cuts = PercentileCuts::from_scores(&detection.scores);
    RunOutput {
        flags: detection.flags,
        weights: UNIFORM_WEIGHTS,
        cuts: Some(cuts),
        scores: Some(detection.scores),
        loadings,
    }
}

fn annotate(
    matrix: &FeatureMatrix,
    row: usize,
    observation: &Observation,
    run: &RunOutput,
) -> AnomalyRecord {
    let deviations = diagnosis::deviations(matrix, row, &run.weights);
    let primary = match run.loadings {
        Some(ref loadings) => diagnosis::primary_by_loading(&deviations, loadings),
        None => diagnosis::primary_by_weight(&deviations),
    };
    let strategy_score = run.scores.as_ref().map(|s| s[row]);
    let diagnosed = diagnosis::diagnose(matrix, row, &deviations, primary, strategy_score);

    let alert_level = match run.cuts {
        Some(cuts) => cuts.classify(strategy_score.unwrap_or_default()),
        None => diagnosis::classify_magnitude(diagnosed.magnitude),
    };

    AnomalyRecord::assemble(observation, diagnosed.label, diagnosed.text, alert_level)
}

/// Load a CSV and analyze it in one call.
pub fn analyze_file(path: &Path, options: &AnalysisOptions) -> Result<Vec<AnomalyRecord>> {
    let observations = ingest::load_csv(path)?;
    analyze_observations(&observations, options)
}

/// JSON entry point honoring the output contract: an array of annotated
/// anomalies on success, a single `{"error": message}` object on any
/// failure. Errors never escape as panics or partial lists.
pub fn analyze_file_json(path: &Path, options: &AnalysisOptions) -> serde_json::Value {
    to_json(analyze_file(path, options))
}

/// Convert an analysis result into the wire-level JSON value.
pub fn to_json(result: Result<Vec<AnomalyRecord>>) -> serde_json::Value {
    match result {
        Ok(records) => serde_json::to_value(&records)
            .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() })),
        Err(e) => {
            log::error!("Analysis failed: {e}");
            serde_json::json!({ "error": e.to_string() })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn observations_with_outlier() -> Vec<Observation> {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let mut observations: Vec<Observation> = (0..99)
            .map(|i| {
                let j = f64::from(i % 7);
                Observation::new(ts, [49.0 + j * 0.3, 0.029 + j * 0.0005, 0.915 + j * 0.002])
            })
            .collect();
        observations.push(Observation::new(ts, [500.0, 0.031, 0.92]));
        observations
    }

    #[test]
    fn test_ensemble_flags_gross_outlier_as_critical() {
        let observations = observations_with_outlier();
        let records =
            analyze_observations(&observations, &AnalysisOptions::default()).expect("analyze");
        assert!(!records.is_empty());

        let spike = records
            .iter()
            .find(|r| (r.usage_kwh - 500.0).abs() < 1e-9)
            .expect("outlier row present in output");
        assert_eq!(spike.anomaly_label, "Energy Consumption Anomaly");
        assert_eq!(spike.alert_level, 3);
    }

    #[test]
    fn test_output_size_matches_flag_count() {
        let observations = observations_with_outlier();
        for pipeline in [Pipeline::Ensemble, Pipeline::Isolation, Pipeline::Neighbors] {
            let options = AnalysisOptions {
                pipeline,
                ..AnalysisOptions::default()
            };
            let records = analyze_observations(&observations, &options).expect("analyze");
            assert!(
                records.len() <= observations.len(),
                "{} produced extra rows",
                pipeline.name()
            );
            assert!(
                records.iter().any(|r| (r.usage_kwh - 500.0).abs() < 1e-9),
                "{} missed the outlier",
                pipeline.name()
            );
        }

        // Reconstruction flags at most the top decile of residuals; the
        // collinear bulk here may absorb the spike into the retained
        // subspace, so only the size bound is asserted.
        let options = AnalysisOptions {
            pipeline: Pipeline::Reconstruction,
            ..AnalysisOptions::default()
        };
        let records = analyze_observations(&observations, &options).expect("analyze");
        assert!(records.len() <= observations.len() / 10 + 1);
    }

    #[test]
    fn test_runs_are_idempotent() {
        let observations = observations_with_outlier();
        let options = AnalysisOptions::default();
        let first = analyze_observations(&observations, &options).expect("analyze");
        let second = analyze_observations(&observations, &options).expect("analyze");
        let first_json = serde_json::to_value(&first).expect("json");
        let second_json = serde_json::to_value(&second).expect("json");
        assert_eq!(first_json, second_json);
    }

    #[test]
    fn test_score_based_diagnosis_embeds_score() {
        let observations = observations_with_outlier();
        let options = AnalysisOptions {
            pipeline: Pipeline::Neighbors,
            ..AnalysisOptions::default()
        };
        let records = analyze_observations(&observations, &options).expect("analyze");
        let spike = records
            .iter()
            .find(|r| (r.usage_kwh - 500.0).abs() < 1e-9)
            .expect("outlier present");
        assert!(spike.fmea_diagnosis.contains("(score:"));
    }

    #[test]
    fn test_empty_input_is_error_json() {
        let value = to_json(analyze_observations(&[], &AnalysisOptions::default()));
        assert!(value.get("error").is_some());
    }

    #[test]
    fn test_neighbor_overrun_is_error_json() {
        let observations: Vec<Observation> = observations_with_outlier().into_iter().take(4).collect();
        let options = AnalysisOptions {
            pipeline: Pipeline::Neighbors,
            neighbors: 10,
            ..AnalysisOptions::default()
        };
        let value = to_json(analyze_observations(&observations, &options));
        let message = value["error"].as_str().expect("error message");
        assert!(message.contains("10 neighbors"));
    }

    #[test]
    fn test_normalize_weights_mean_one() {
        let weights = normalize_weights([2.0, 4.0, 6.0]);
        let mean: f64 = weights.iter().sum::<f64>() / 3.0;
        assert!((mean - 1.0).abs() < 1e-12);
        assert!(weights[2] > weights[0]);

        assert_eq!(normalize_weights([0.0, 0.0, 0.0]), UNIFORM_WEIGHTS);
    }
}
