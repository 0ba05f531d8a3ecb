//! Error types for the placement pipeline

use thiserror::Error;

/// Errors raised by the dataset, training and prediction stages
#[derive(Debug, Error)]
pub enum PlacementError {
    /// Dataset file is missing columns, has unparsable values or no rows
    #[error("malformed dataset: {0}")]
    DataFormat(String),

    /// Categorical value was not seen when the encoder was fitted
    #[error("unknown {column} value '{value}'")]
    UnknownCategory { column: String, value: String },

    /// No trained model is available
    #[error("models not initialized, run a training pass first")]
    NotTrained,

    /// A single model (or hyperparameter combination) failed to fit
    #[error("{model} failed to fit: {reason}")]
    FitFailure { model: String, reason: String },

    /// Invalid weight, hyperparameter or pipeline setting
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("snapshot checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PlacementError {
    pub fn fit(model: impl Into<String>, reason: impl Into<String>) -> Self {
        PlacementError::FitFailure {
            model: model.into(),
            reason: reason.into(),
        }
    }

    /// Returns true for errors caused by the caller's input rather than the service
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PlacementError::NotTrained
                | PlacementError::Config(_)
                | PlacementError::UnknownCategory { .. }
                | PlacementError::DataFormat(_)
        )
    }
}

impl From<csv::Error> for PlacementError {
    fn from(err: csv::Error) -> Self {
        PlacementError::DataFormat(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PlacementError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        assert!(PlacementError::NotTrained.is_client_error());
        assert!(PlacementError::Config("bad".into()).is_client_error());
        assert!(!PlacementError::fit("Decision Tree", "empty").is_client_error());
    }

    #[test]
    fn test_fit_failure_message() {
        let err = PlacementError::fit("XGBoost", "no rows");
        assert_eq!(err.to_string(), "XGBoost failed to fit: no rows");
    }
}
