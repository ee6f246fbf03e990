//! The interchangeable outlier-scoring strategies and their shared
//! trait and vote aggregation.

pub mod covariance;
pub mod isolation;
pub mod neighbors;
pub mod reconstruction;
pub mod scorer;

pub use covariance::RobustCovariance;
pub use isolation::IsolationForest;
pub use neighbors::NeighborDistance;
pub use reconstruction::ReconstructionError;
pub use scorer::{majority_vote, Detection, OutlierScorer, ANOMALOUS, NORMAL};
