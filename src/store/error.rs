//! Error types for object store operations

use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use std::io;
use thiserror::Error;

/// Result type alias for object store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while talking to the object store
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// AWS SDK error
    #[error("AWS SDK error: {0}")]
    Sdk(String),

    /// S3 service error with specific error code
    #[error("S3 service error ({code}): {message}")]
    Service { code: String, message: String },

    /// Object not found in bucket
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// Access denied error
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// Failure injected by an in-memory store
    #[error("Injected failure for key {0}")]
    Injected(String),
}

impl StoreError {
    /// Whether this error means the object is absent
    pub fn is_not_found(&self) -> bool {
        match self {
            StoreError::NotFound { .. } => true,
            StoreError::Service { code, .. } => code == "NoSuchKey" || code == "NotFound",
            _ => false,
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

/// Classify SDK failures by the service error code, not by message text
impl<E, R> From<SdkError<E, R>> for StoreError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    fn from(error: SdkError<E, R>) -> Self {
        match &error {
            SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => {
                StoreError::Network(DisplayErrorContext(&error).to_string())
            }
            SdkError::ServiceError(context) => {
                let err = context.err();
                let code = err.code().unwrap_or("Unknown").to_string();
                let message = err.message().unwrap_or_default().to_string();
                match code.as_str() {
                    "AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch" => {
                        StoreError::AccessDenied(format!("{}: {}", code, message))
                    }
                    _ => StoreError::Service { code, message },
                }
            }
            _ => StoreError::Sdk(DisplayErrorContext(&error).to_string()),
        }
    }
}
