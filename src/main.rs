/// `GridScope` - anomaly detection and diagnosis for power-metering CSVs
///
/// This program is free software: you can redistribute it and/or modify
/// it under the terms of the GNU General Public License as published by
/// the Free Software Foundation, either version 3 of the License, or
/// (at your option) any later version.
///
/// This program is distributed in the hope that it will be useful,
/// but WITHOUT ANY WARRANTY; without even the implied warranty of
/// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
/// GNU General Public License for more details.
///
/// You should have received a copy of the GNU General Public License
/// along with this program.  If not, see <https://www.gnu.org/licenses/>.
use clap::{Parser, ValueEnum};
use gridscope::{analyze_file_json, AnalysisOptions, Pipeline};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PipelineArg {
    Ensemble,
    Isolation,
    Neighbors,
    Reconstruction,
}

impl From<PipelineArg> for Pipeline {
    fn from(arg: PipelineArg) -> Self {
        match arg {
            PipelineArg::Ensemble => Pipeline::Ensemble,
            PipelineArg::Isolation => Pipeline::Isolation,
            PipelineArg::Neighbors => Pipeline::Neighbors,
            PipelineArg::Reconstruction => Pipeline::Reconstruction,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "gridscope")]
#[command(version, long_version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")"))]
#[command(about = "Flag abnormal power-metering readings and explain them", long_about = None)]
struct Args {
    /// Path to the metering CSV to analyze
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// Detection pipeline to run
    #[arg(long, value_enum, default_value = "ensemble")]
    pipeline: PipelineArg,
}

fn main() {
    // Initialize logger with millisecond precision timestamps
    // Set RUST_LOG environment variable to override (e.g., RUST_LOG=debug)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    log::info!(
        "GridScope starting up (version {})",
        env!("CARGO_PKG_VERSION")
    );

    let args = Args::parse();

    // The output contract is a JSON value on stdout in every case,
    // including the no-argument case; logs go to stderr.
    let Some(file) = args.file else {
        println!("{}", serde_json::json!({ "error": "No CSV file provided" }));
        return;
    };

    log::info!("Analyzing file from command line: {}", file.display());
    let options = AnalysisOptions {
        pipeline: args.pipeline.into(),
        ..AnalysisOptions::default()
    };
    println!("{}", analyze_file_json(&file, &options));
}
