//! Downstream of the scorers: how severe a flagged row is and which
//! measurement gets the blame.

pub mod attribution;
pub mod severity;

pub use attribution::{
    deviations, diagnose, primary_by_loading, primary_by_weight, Deviation, Diagnosis, Direction,
};
pub use severity::{classify_magnitude, PercentileCuts, CRITICAL, MINOR, MINOR_Z, MODERATE};
