//! Error types for Retrigger
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in Retrigger
#[derive(Debug, Error)]
pub enum RetriggerError {
    /// Log gate pattern failed to compile
    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Schedule request or scanner configured with unusable values
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Build not present in history
    #[error("Build not found: {0}")]
    BuildNotFound(String),

    /// History append broke the append-only ordering
    #[error("Invalid history: {0}")]
    InvalidHistory(String),

    /// Build finished in a state that cannot be retried
    #[error("Not retryable: {0}")]
    NotRetryable(String),

    /// Host refused the new build invocation
    #[error("Submission rejected: {0}")]
    Submission(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for Retrigger operations
pub type Result<T> = std::result::Result<T, RetriggerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_pattern_conversion() {
        let regex_err = regex::Regex::new("(unclosed").unwrap_err();
        let err: RetriggerError = regex_err.into();
        assert!(matches!(err, RetriggerError::InvalidPattern(_)));
        assert!(err.to_string().starts_with("Invalid pattern:"));
    }

    #[test]
    fn test_invalid_config_error() {
        let err = RetriggerError::InvalidConfig("scan timeout must be > 0".to_string());
        assert_eq!(err.to_string(), "Invalid config: scan timeout must be > 0");
    }

    #[test]
    fn test_build_not_found_error() {
        let err = RetriggerError::BuildNotFound("nightly#12".to_string());
        assert_eq!(err.to_string(), "Build not found: nightly#12");
    }

    #[test]
    fn test_submission_error() {
        let err = RetriggerError::Submission("queue is full".to_string());
        assert_eq!(err.to_string(), "Submission rejected: queue is full");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "log missing");
        let err: RetriggerError = io_err.into();
        assert!(matches!(err, RetriggerError::Io(_)));
        assert!(err.to_string().contains("log missing"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: RetriggerError = json_err.into();
        assert!(matches!(err, RetriggerError::Json(_)));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<u32> {
            Ok(3)
        }

        fn returns_err() -> Result<u32> {
            Err(RetriggerError::InvalidHistory("out of order".to_string()))
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }
}
