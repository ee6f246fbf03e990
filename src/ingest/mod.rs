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

//! CSV ingestion: header validation, numeric coercion, mean imputation,
//! and the shared default timestamp for date-less tables.

pub mod record;

use crate::error::{AnalysisError, Result};
use chrono::{Local, NaiveDate, NaiveDateTime};
use record::{Feature, Observation, FEATURE_COUNT};
use serde::Deserialize;
use std::path::Path;

/// Raw CSV row as deserialized by the `csv` crate. All cells come in as
/// strings so that empty and non-numeric values can be imputed instead
/// of failing the whole load.
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    usage_kwh: Option<String>,
    #[serde(default)]
    co2_tco2: Option<String>,
    #[serde(default)]
    power_factor: Option<String>,
}

impl CsvRow {
    fn cell(&self, feature: Feature) -> Option<&String> {
        match feature {
            Feature::Usage => self.usage_kwh.as_ref(),
            Feature::Emissions => self.co2_tco2.as_ref(),
            Feature::PowerFactor => self.power_factor.as_ref(),
        }
    }
}

/// Accepted timestamp formats, tried in order.
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d"];

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    for format in DATE_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
            return Some(ts);
        }
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

fn parse_numeric(cell: Option<&String>) -> Option<f64> {
    cell.and_then(|text| text.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// Load a metering CSV into cleaned observations.
///
/// Required columns: `usage_kwh`, `co2_tco2`, `power_factor`. Extra
/// columns are ignored. Missing numeric cells are filled with the
/// column mean; rows without a parseable `date` all share one timestamp
/// captured at load time.
pub fn load_csv(path: &Path) -> Result<Vec<Observation>> {
    log::debug!("Loading metering CSV from {}", path.display());

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|e| AnalysisError::Data(format!("Cannot read {}: {e}", path.display())))?;

    let headers = reader
        .headers()
        .map_err(|e| AnalysisError::Data(format!("Cannot read CSV header: {e}")))?
        .clone();
    for feature in Feature::ALL {
        if !headers.iter().any(|h| h == feature.column_name()) {
            return Err(AnalysisError::Data(format!(
                "Missing required column '{}'",
                feature.column_name()
            )));
        }
    }

    let mut rows: Vec<CsvRow> = Vec::new();
    for row in reader.deserialize() {
        let row: CsvRow = row.map_err(|e| AnalysisError::Data(format!("Malformed CSV row: {e}")))?;
        rows.push(row);
    }

    clean(&rows)
}

/// Coerce raw rows to numeric observations, imputing missing values
/// with the column mean. Fails when there are no rows or a tracked
/// column carries no numeric value at all.
fn clean(rows: &[CsvRow]) -> Result<Vec<Observation>> {
    if rows.is_empty() {
        return Err(AnalysisError::Data("CSV contains no data rows".to_string()));
    }

    // One coercion pass, collecting per-column means for imputation.
    let mut parsed: Vec<[Option<f64>; FEATURE_COUNT]> = Vec::with_capacity(rows.len());
    for row in rows {
        let mut values = [None; FEATURE_COUNT];
        for feature in Feature::ALL {
            values[feature.index()] = parse_numeric(row.cell(feature));
        }
        parsed.push(values);
    }

    let mut column_means = [0.0_f64; FEATURE_COUNT];
    for feature in Feature::ALL {
        let numeric: Vec<f64> = parsed.iter().filter_map(|v| v[feature.index()]).collect();
        if numeric.is_empty() {
            return Err(AnalysisError::Data(format!(
                "Column '{}' has no numeric values",
                feature.column_name()
            )));
        }
        column_means[feature.index()] = crate::stats::mean(&numeric);
        if numeric.len() < parsed.len() {
            log::warn!(
                "Column '{}': {} of {} cells non-numeric, imputing column mean",
                feature.column_name(),
                parsed.len() - numeric.len(),
                parsed.len()
            );
        }
    }

    // One "now" applies uniformly to every row missing a date, matching
    // the coarse default the ingestion contract promises.
    let default_timestamp = Local::now().naive_local();

    let observations = rows
        .iter()
        .zip(&parsed)
        .map(|(row, values)| {
            let timestamp = row
                .date
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or(default_timestamp);
            let mut filled = [0.0; FEATURE_COUNT];
            for feature in Feature::ALL {
                filled[feature.index()] =
                    values[feature.index()].unwrap_or(column_means[feature.index()]);
            }
            Observation::new(timestamp, filled)
        })
        .collect();

    Ok(observations)
}
