//! Error types for fundus normalization
//!
//! Localization failures are not errors: an image that decodes but holds no
//! recognizable fundus is reported as `Ok(None)` / `Ok(false)` by the
//! normalizer. The variants here cover bad input bytes, I/O and contract
//! violations.

use thiserror::Error;

/// Result type alias for fundus normalization operations
pub type Result<T> = std::result::Result<T, FundusError>;

/// Error types for fundus normalization operations
#[derive(Error, Debug)]
pub enum FundusError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Input bytes do not form a decodable raster image
    #[error("Decode error: {0}")]
    Decode(String),

    /// Output format cannot be encoded
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Classifier collaborator violated the batch contract
    #[error("Classifier error: {0}")]
    Classifier(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FundusError {
    /// Create a new decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a new unsupported format error
    pub fn unsupported_format<S: Into<String>>(format: S) -> Self {
        Self::UnsupportedFormat(format.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new classifier contract error
    pub fn classifier<S: Into<String>>(msg: S) -> Self {
        Self::Classifier(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create image decode error with path and extension context
    pub fn image_load_error<P: AsRef<std::path::Path>>(path: P, error: &image::ImageError) -> Self {
        let path_ref = path.as_ref();
        let extension = path_ref
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown");

        Self::Decode(format!(
            "Failed to decode image '{}' (extension: {}): {}. Supported formats: PNG, JPEG, TIFF, BMP, WebP",
            path_ref.display(),
            extension,
            error
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Whether the error stems from unreadable input content rather than the environment
    #[must_use]
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_creation() {
        let err = FundusError::invalid_config("test config error");
        assert!(matches!(err, FundusError::InvalidConfig(_)));

        let err = FundusError::unsupported_format("AVIF");
        assert!(matches!(err, FundusError::UnsupportedFormat(_)));

        let err = FundusError::decode("not an image");
        assert!(err.is_decode());
    }

    #[test]
    fn test_error_display() {
        let err = FundusError::invalid_config("diameter must be positive");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: diameter must be positive"
        );
    }

    #[test]
    fn test_contextual_errors() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = FundusError::file_io_error("write normalized image", Path::new("/out/a.png"), &io_error);
        let error_string = err.to_string();
        assert!(error_string.contains("write normalized image"));
        assert!(error_string.contains("/out/a.png"));
        assert!(!err.is_decode());

        let err = FundusError::config_value_error("diameter", 0, "1-16384", Some(299));
        let error_string = err.to_string();
        assert!(error_string.contains("diameter"));
        assert!(error_string.contains("1-16384"));
        assert!(error_string.contains("Recommended: 299"));
    }

    #[test]
    fn test_image_load_error_mentions_extension() {
        let image_error = image::ImageError::IoError(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "bad header",
        ));
        let err = FundusError::image_load_error(Path::new("scan.jpg"), &image_error);
        assert!(err.is_decode());
        let error_string = err.to_string();
        assert!(error_string.contains("scan.jpg"));
        assert!(error_string.contains("extension: jpg"));
    }
}
