//! Error types for the convoy job queue.

use thiserror::Error;

/// The main error type for convoy.
///
/// Executor failures are not represented here: they are recorded on the
/// item and reported through [`crate::Processed`], never raised as errors.
#[derive(Error, Debug)]
pub enum ConvoyError {
    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backing store rejected or failed an operation.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An item record was present but could not be decoded.
    #[error("Malformed item record: {0}")]
    MalformedItem(String),
}

/// Result type alias using ConvoyError.
pub type Result<T> = std::result::Result<T, ConvoyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_serialization() {
        let json_err: serde_json::Error = serde_json::from_str::<i32>("invalid").unwrap_err();
        let err = ConvoyError::Serialization(json_err);
        assert!(format!("{}", err).starts_with("Serialization error:"));
    }

    #[test]
    fn test_error_display_backend() {
        let err = ConvoyError::Backend("connection refused".to_string());
        assert_eq!(format!("{}", err), "Backend error: connection refused");
    }

    #[test]
    fn test_error_display_config() {
        let err = ConvoyError::Config("invalid url".to_string());
        assert_eq!(format!("{}", err), "Configuration error: invalid url");
    }

    #[test]
    fn test_error_display_malformed_item() {
        let err = ConvoyError::MalformedItem("missing field `created`".to_string());
        assert_eq!(
            format!("{}", err),
            "Malformed item record: missing field `created`"
        );
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err: serde_json::Error = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: ConvoyError = json_err.into();
        assert!(matches!(err, ConvoyError::Serialization(_)));
    }
}
