use thiserror::Error;

/// Failure kinds surfaced by the analysis pipeline.
///
/// Public entry points convert every variant into a `{"error": message}`
/// JSON object; nothing escapes to the caller unconverted.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Malformed, empty, or non-numeric input.
    #[error("{0}")]
    Data(String),

    /// An underlying statistical estimator cannot run on this input,
    /// e.g. fewer rows than the configured neighbor count.
    #[error("{0}")]
    Estimator(String),

    /// Catch-all for unexpected numerical failures.
    #[error("{0}")]
    Computation(String),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_plain() {
        let err = AnalysisError::Data("CSV has no data rows".to_string());
        assert_eq!(err.to_string(), "CSV has no data rows");

        let err = AnalysisError::Estimator("5 neighbors requested but only 3 rows".to_string());
        assert!(err.to_string().contains("neighbors"));
    }
}
