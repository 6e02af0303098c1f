//! # Application Error Types
//!
//! This module defines the error types shared across the receipt pipeline.
//! `AppError` covers startup and configuration failures, while `ReceiptError`
//! is the taxonomy every pipeline stage reports through. Each `ReceiptError`
//! variant carries a stable kind label and an HTTP status.

use std::fmt;

use crate::db::StoreError;
use crate::expense::ItemViolation;
use crate::model_client::ModelError;
use crate::ocr_errors::OcrError;
use crate::path_validation::PathValidationError;
use crate::preprocessing::PreprocessingError;

/// General application error type for startup and configuration handling
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    /// Configuration validation errors
    Config(String),
    /// Database bootstrap errors
    Database(String),
    /// Internal application errors
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "[CONFIG] {}", msg),
            AppError::Database(msg) => write!(f, "[DATABASE] {}", msg),
            AppError::Internal(msg) => write!(f, "[INTERNAL] {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// Ways an upload or an item can fail input validation.
#[derive(Debug, Clone, PartialEq)]
pub enum InputViolation {
    /// Content type outside the upload policy
    UnsupportedMediaType(String),
    /// Zero-byte upload
    EmptyPayload,
    /// Upload larger than the configured limit
    PayloadTooLarge { limit: u64 },
    /// Bytes could not be decoded as an image
    UndecodableImage(String),
    /// A candidate item failed validation
    InvalidItem {
        index: usize,
        violation: ItemViolation,
    },
    /// Request body could not be parsed
    MalformedRequest(String),
}

impl fmt::Display for InputViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputViolation::UnsupportedMediaType(ct) => {
                write!(f, "Unsupported file type '{}'", ct)
            }
            InputViolation::EmptyPayload => write!(f, "Uploaded file is empty"),
            InputViolation::PayloadTooLarge { limit } => {
                write!(f, "File too large (max {} bytes)", limit)
            }
            InputViolation::UndecodableImage(reason) => {
                write!(f, "Could not decode image: {}", reason)
            }
            InputViolation::InvalidItem { index, violation } => {
                write!(f, "Expense item {} is invalid: {}", index, violation)
            }
            InputViolation::MalformedRequest(reason) => {
                write!(f, "Malformed request: {}", reason)
            }
        }
    }
}

/// Receipt path rejections from the confirm step.
#[derive(Debug, Clone, PartialEq)]
pub enum PathViolation {
    /// Path escapes or is not expressed relative to the uploads root
    OutsideRoot(String),
    /// Path is inside the root but belongs to another user
    ForeignNamespace,
}

impl fmt::Display for PathViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathViolation::OutsideRoot(reason) => write!(f, "Invalid receipt path: {}", reason),
            PathViolation::ForeignNamespace => {
                write!(f, "Receipt path does not belong to the current user")
            }
        }
    }
}

/// Error taxonomy for the receipt pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiptError {
    InputValidation(InputViolation),
    PathViolation(PathViolation),
    NotFound(String),
    /// A required external capability is missing or not configured
    ServiceUnavailable(String),
    RecognitionFailed(String),
    /// The language model could not be reached or answered nothing
    UpstreamFailure(String),
    /// The language model answered something that is not the agreed shape
    MalformedModelOutput(String),
    /// Persistence stayed contended after every retry
    StorageBusy,
    Persistence(String),
    Internal(String),
}

impl ReceiptError {
    /// Stable label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ReceiptError::InputValidation(_) => "input_validation",
            ReceiptError::PathViolation(_) => "path_violation",
            ReceiptError::NotFound(_) => "not_found",
            ReceiptError::ServiceUnavailable(_) => "service_unavailable",
            ReceiptError::RecognitionFailed(_) => "recognition_failed",
            ReceiptError::UpstreamFailure(_) => "upstream_failure",
            ReceiptError::MalformedModelOutput(_) => "malformed_model_output",
            ReceiptError::StorageBusy => "storage_busy",
            ReceiptError::Persistence(_) => "persistence",
            ReceiptError::Internal(_) => "internal",
        }
    }

    /// HTTP status code surfaced to callers
    pub fn status_code(&self) -> u16 {
        match self {
            ReceiptError::InputValidation(InputViolation::UnsupportedMediaType(_)) => 415,
            ReceiptError::InputValidation(InputViolation::PayloadTooLarge { .. }) => 413,
            ReceiptError::InputValidation(_) => 400,
            ReceiptError::PathViolation(PathViolation::OutsideRoot(_)) => 400,
            ReceiptError::PathViolation(PathViolation::ForeignNamespace) => 403,
            ReceiptError::NotFound(_) => 404,
            ReceiptError::ServiceUnavailable(_) => 503,
            ReceiptError::RecognitionFailed(_) => 500,
            ReceiptError::UpstreamFailure(_) => 502,
            ReceiptError::MalformedModelOutput(_) => 502,
            ReceiptError::StorageBusy => 503,
            ReceiptError::Persistence(_) => 500,
            ReceiptError::Internal(_) => 500,
        }
    }
}

impl fmt::Display for ReceiptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReceiptError::InputValidation(v) => write!(f, "{}", v),
            ReceiptError::PathViolation(v) => write!(f, "{}", v),
            ReceiptError::NotFound(what) => write!(f, "{} not found", what),
            ReceiptError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
            ReceiptError::RecognitionFailed(msg) => write!(f, "OCR failed: {}", msg),
            ReceiptError::UpstreamFailure(msg) => write!(f, "Language model failure: {}", msg),
            ReceiptError::MalformedModelOutput(msg) => {
                write!(f, "Language model returned malformed output: {}", msg)
            }
            ReceiptError::StorageBusy => write!(f, "Database is busy, please retry"),
            ReceiptError::Persistence(msg) => write!(f, "Failed to persist expenses: {}", msg),
            ReceiptError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ReceiptError {}

/// Result type alias for pipeline operations
pub type ReceiptResult<T> = Result<T, ReceiptError>;

impl From<InputViolation> for ReceiptError {
    fn from(v: InputViolation) -> Self {
        ReceiptError::InputValidation(v)
    }
}

impl From<OcrError> for ReceiptError {
    fn from(err: OcrError) -> Self {
        match err {
            OcrError::EngineUnavailable(msg) => ReceiptError::ServiceUnavailable(format!(
                "OCR engine is not available: {}",
                msg
            )),
            other => ReceiptError::RecognitionFailed(other.to_string()),
        }
    }
}

impl From<ModelError> for ReceiptError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::NotConfigured => ReceiptError::ServiceUnavailable(
                "language model is not configured (OPENAI_API_KEY missing)".to_string(),
            ),
            other => ReceiptError::UpstreamFailure(other.to_string()),
        }
    }
}

impl From<PathValidationError> for ReceiptError {
    fn from(err: PathValidationError) -> Self {
        match err {
            PathValidationError::NotFound => ReceiptError::NotFound("Receipt file".to_string()),
            PathValidationError::ForeignNamespace => {
                ReceiptError::PathViolation(PathViolation::ForeignNamespace)
            }
            other => ReceiptError::PathViolation(PathViolation::OutsideRoot(other.to_string())),
        }
    }
}

impl From<StoreError> for ReceiptError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Busy(_) => ReceiptError::StorageBusy,
            StoreError::Failed(msg) => ReceiptError::Persistence(msg),
        }
    }
}

impl From<PreprocessingError> for ReceiptError {
    fn from(err: PreprocessingError) -> Self {
        match err {
            PreprocessingError::ImageLoad { message } => {
                ReceiptError::InputValidation(InputViolation::UndecodableImage(message))
            }
            other => ReceiptError::Internal(other.to_string()),
        }
    }
}

impl From<std::io::Error> for ReceiptError {
    fn from(err: std::io::Error) -> Self {
        ReceiptError::Internal(format!("I/O error: {}", err))
    }
}

/// Standardized error logging utilities for consistent error reporting across the pipeline
pub mod error_logging {
    use tracing::error;
    use uuid::Uuid;

    /// Log a failed pipeline stage with its error kind
    pub fn log_pipeline_error(
        error: &super::ReceiptError,
        operation: &str,
        owner_id: Option<Uuid>,
        receipt_path: Option<&str>,
    ) {
        error!(
            error = %error,
            error_kind = error.kind(),
            operation = %operation,
            owner_id = ?owner_id,
            receipt_path = ?receipt_path,
            "Receipt pipeline stage failed"
        );
    }

    /// Log database operation errors with contextual information
    pub fn log_database_error(
        error: &impl std::fmt::Display,
        operation: &str,
        owner_id: Option<Uuid>,
        attempt: Option<u32>,
    ) {
        error!(
            error = %error,
            operation = %operation,
            owner_id = ?owner_id,
            attempt = ?attempt,
            "Database operation failed"
        );
    }

    /// Log OCR processing errors with image and processing context
    pub fn log_ocr_error(
        error: &impl std::fmt::Display,
        operation: &str,
        languages: &str,
        image_dimensions: Option<(u32, u32)>,
        processing_duration: Option<std::time::Duration>,
    ) {
        error!(
            error = %error,
            operation = %operation,
            languages = %languages,
            image_dimensions = ?image_dimensions,
            processing_duration_ms = ?processing_duration.map(|d| d.as_millis()),
            "OCR processing failed"
        );
    }

    /// Log language model call errors with endpoint context
    pub fn log_model_error(error: &impl std::fmt::Display, operation: &str, endpoint: Option<&str>) {
        error!(
            error = %error,
            operation = %operation,
            endpoint = ?endpoint,
            "Language model request failed"
        );
    }

    /// Log file system errors with path and operation context
    pub fn log_filesystem_error(
        error: &impl std::fmt::Display,
        operation: &str,
        path: Option<&str>,
        file_size: Option<u64>,
    ) {
        error!(
            error = %error,
            operation = %operation,
            path = ?path,
            file_size_bytes = ?file_size,
            "File system operation failed"
        );
    }

    /// Log configuration errors during startup/initialization
    pub fn log_config_error(error: &impl std::fmt::Display, config_key: &str, operation: &str) {
        error!(
            error = %error,
            config_key = %config_key,
            operation = %operation,
            "Configuration error"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_follow_error_kind() {
        assert_eq!(
            ReceiptError::InputValidation(InputViolation::PayloadTooLarge { limit: 10 })
                .status_code(),
            413
        );
        assert_eq!(
            ReceiptError::InputValidation(InputViolation::UnsupportedMediaType(
                "image/gif".to_string()
            ))
            .status_code(),
            415
        );
        assert_eq!(
            ReceiptError::PathViolation(PathViolation::OutsideRoot("..".to_string()))
                .status_code(),
            400
        );
        assert_eq!(
            ReceiptError::PathViolation(PathViolation::ForeignNamespace).status_code(),
            403
        );
        assert_eq!(ReceiptError::StorageBusy.status_code(), 503);
        assert_eq!(
            ReceiptError::MalformedModelOutput("x".to_string()).status_code(),
            502
        );
    }

    #[test]
    fn test_path_validation_errors_map_to_distinct_kinds() {
        assert_eq!(
            ReceiptError::from(PathValidationError::PathTraversal).status_code(),
            400
        );
        assert_eq!(
            ReceiptError::from(PathValidationError::ForeignNamespace).status_code(),
            403
        );
        assert_eq!(ReceiptError::from(PathValidationError::NotFound).kind(), "not_found");
    }

    #[test]
    fn test_engine_unavailable_is_service_unavailable() {
        let err = ReceiptError::from(OcrError::EngineUnavailable("no eng".to_string()));
        assert_eq!(err.kind(), "service_unavailable");

        let err = ReceiptError::from(OcrError::Extraction("bad".to_string()));
        assert_eq!(err.kind(), "recognition_failed");
    }

    #[test]
    fn test_store_errors_split_busy_from_permanent() {
        assert_eq!(
            ReceiptError::from(StoreError::Busy("40001".to_string())),
            ReceiptError::StorageBusy
        );
        assert_eq!(
            ReceiptError::from(StoreError::Failed("constraint".to_string())).kind(),
            "persistence"
        );
    }

    #[test]
    fn test_model_not_configured_is_service_unavailable() {
        assert_eq!(
            ReceiptError::from(ModelError::NotConfigured).status_code(),
            503
        );
        assert_eq!(
            ReceiptError::from(ModelError::EmptyResponse).kind(),
            "upstream_failure"
        );
    }
}
