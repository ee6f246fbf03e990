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

//! Batch anomaly detection and FMEA-style diagnosis for power-metering
//! records.
//!
//! A run loads a CSV (or takes cleaned observations directly), scores
//! every row with the selected outlier strategy set, combines flags by
//! majority vote, and annotates each flagged row with a severity level
//! and a root-cause diagnosis. See [`analysis::analyze_file_json`] for
//! the JSON-in/JSON-out surface the CLI uses.

pub mod analysis;
pub mod detect;
pub mod diagnosis;
pub mod error;
pub mod ingest;
pub mod matrix;
pub mod report;
pub mod stats;

pub use analysis::{analyze_file, analyze_file_json, analyze_observations, AnalysisOptions, Pipeline};
pub use error::{AnalysisError, Result};
pub use ingest::record::{Feature, Observation};
pub use report::AnomalyRecord;
