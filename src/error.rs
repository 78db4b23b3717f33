/*!
 * Error types for cdm-ingest
 */

use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, CdmError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_PARTIAL: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

#[derive(Debug)]
pub enum CdmError {
    /// Required input file or directory is absent
    MissingInput(PathBuf),

    /// I/O error
    Io(io::Error),

    /// Configuration error
    Config(String),

    /// Object store error
    Store(StoreError),

    /// Spreadsheet could not be opened or read
    Spreadsheet(String),

    /// CSV read/write error
    Csv(csv::Error),

    /// Tabular input with an unexpected shape
    Malformed(String),

    /// Run metadata missing a required field or malformed
    Metadata(String),

    /// Symbolic link could not be created
    Link(String),

    /// Some work items failed; the run itself completed
    PartialFailure { failed: usize, total: usize },

    /// Generic error with message
    Other(String),
}

impl CdmError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CdmError::PartialFailure { .. } => EXIT_PARTIAL,
            _ => EXIT_FATAL,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            CdmError::MissingInput(_) => ErrorCategory::MissingInput,
            CdmError::Io(_) => ErrorCategory::IoError,
            CdmError::Config(_) => ErrorCategory::Configuration,
            CdmError::Store(_) => ErrorCategory::Network,
            CdmError::Spreadsheet(_)
            | CdmError::Csv(_)
            | CdmError::Malformed(_)
            | CdmError::Metadata(_) => {
                ErrorCategory::Format
            }
            CdmError::Link(_) => ErrorCategory::Filesystem,
            CdmError::PartialFailure { .. } => ErrorCategory::Transfer,
            CdmError::Other(_) => ErrorCategory::Unknown,
        }
    }
}

/// Error category for classification and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    MissingInput,
    IoError,
    Configuration,
    Network,
    Format,
    Filesystem,
    Transfer,
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::MissingInput => write!(f, "missing_input"),
            ErrorCategory::IoError => write!(f, "io"),
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Network => write!(f, "network"),
            ErrorCategory::Format => write!(f, "format"),
            ErrorCategory::Filesystem => write!(f, "filesystem"),
            ErrorCategory::Transfer => write!(f, "transfer"),
            ErrorCategory::Unknown => write!(f, "unknown"),
        }
    }
}

impl fmt::Display for CdmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CdmError::MissingInput(path) => {
                write!(f, "Input not found: {}", path.display())
            }
            CdmError::Io(err) => {
                write!(f, "I/O error: {}", err)
            }
            CdmError::Config(msg) => {
                write!(f, "Configuration error: {}", msg)
            }
            CdmError::Store(err) => {
                write!(f, "Object store error: {}", err)
            }
            CdmError::Spreadsheet(msg) => {
                write!(f, "Spreadsheet error: {}", msg)
            }
            CdmError::Csv(err) => {
                write!(f, "CSV error: {}", err)
            }
            CdmError::Malformed(msg) => {
                write!(f, "Malformed input: {}", msg)
            }
            CdmError::Metadata(msg) => {
                write!(f, "Metadata error: {}", msg)
            }
            CdmError::Link(msg) => {
                write!(f, "Symbolic link error: {}", msg)
            }
            CdmError::PartialFailure { failed, total } => {
                write!(f, "{} of {} items failed", failed, total)
            }
            CdmError::Other(msg) => {
                write!(f, "{}", msg)
            }
        }
    }
}

impl std::error::Error for CdmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CdmError::Io(err) => Some(err),
            CdmError::Store(err) => Some(err),
            CdmError::Csv(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for CdmError {
    fn from(err: io::Error) -> Self {
        CdmError::Io(err)
    }
}

impl From<StoreError> for CdmError {
    fn from(err: StoreError) -> Self {
        CdmError::Store(err)
    }
}

impl From<csv::Error> for CdmError {
    fn from(err: csv::Error) -> Self {
        CdmError::Csv(err)
    }
}

impl From<serde_json::Error> for CdmError {
    fn from(err: serde_json::Error) -> Self {
        CdmError::Metadata(err.to_string())
    }
}

impl From<toml::de::Error> for CdmError {
    fn from(err: toml::de::Error) -> Self {
        CdmError::Config(err.to_string())
    }
}

impl From<calamine::Error> for CdmError {
    fn from(err: calamine::Error) -> Self {
        CdmError::Spreadsheet(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            CdmError::PartialFailure { failed: 1, total: 4 }.exit_code(),
            EXIT_PARTIAL
        );
        assert_eq!(
            CdmError::Config("no bucket".to_string()).exit_code(),
            EXIT_FATAL
        );
        assert_eq!(
            CdmError::MissingInput(PathBuf::from("/nope.tsv")).exit_code(),
            EXIT_FATAL
        );
    }

    #[test]
    fn test_display() {
        let err = CdmError::MissingInput(PathBuf::from("/meta/bac120_taxonomy_r214.tsv"));
        assert_eq!(
            err.to_string(),
            "Input not found: /meta/bac120_taxonomy_r214.tsv"
        );

        let err = CdmError::PartialFailure { failed: 2, total: 10 };
        assert_eq!(err.to_string(), "2 of 10 items failed");
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            CdmError::Metadata("source_file".to_string()).category(),
            ErrorCategory::Format
        );
        assert_eq!(
            CdmError::Link("exists".to_string()).category(),
            ErrorCategory::Filesystem
        );
        assert_eq!(ErrorCategory::MissingInput.to_string(), "missing_input");
    }

    #[test]
    fn test_from_io_error_keeps_source() {
        use std::error::Error;
        let err: CdmError = io::Error::new(io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(err, CdmError::Io(_)));
        assert!(err.source().is_some());
    }
}
