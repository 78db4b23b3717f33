/*!
 * Configuration types for cdm-ingest
 */

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CdmError, Result};

/// Main configuration shared by every entry point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Maximum number of work items in flight at once
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Show progress bar while the dispatcher runs
    #[serde(default = "default_true")]
    pub show_progress: bool,

    /// How many identifiers to print per non-success category
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,

    /// Log level for diagnostic output
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log file path (None = stderr)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (shorthand for log_level = debug)
    #[serde(default)]
    pub verbose: bool,

    /// Emit the run summary as a single JSON object
    #[serde(default)]
    pub json_output: bool,

    /// Object store connection
    #[serde(default)]
    pub store: StoreConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            show_progress: true,
            sample_size: default_sample_size(),
            log_level: LogLevel::Info,
            log_file: None,
            verbose: false,
            json_output: false,
            store: StoreConfig::default(),
        }
    }
}

impl IngestConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CdmError::MissingInput(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)?;
        let config: IngestConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Validate settings that don't involve the object store
    ///
    /// `workers = 0` is accepted; the dispatcher runs it as 1.
    pub fn validate(&self) -> Result<()> {
        if let Some(parent) = self.log_file.as_deref().and_then(Path::parent) {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                return Err(CdmError::Config(format!(
                    "log directory does not exist: {}",
                    parent.display()
                )));
            }
        }
        Ok(())
    }
}

/// Connection settings for the S3-compatible store (MinIO behind an SSH tunnel in practice)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Endpoint URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Region; MinIO ignores it but the SDK requires one
    #[serde(default = "default_region")]
    pub region: String,

    /// Bucket name
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Access key ID
    #[serde(default = "default_access_key")]
    pub access_key: String,

    /// Secret access key. Never read from or written to config files.
    #[serde(skip)]
    pub secret_key: Option<SecretString>,

    /// Environment variable holding the secret key
    #[serde(default = "default_secret_key_env")]
    pub secret_key_env: String,

    /// Path-style addressing (required for MinIO)
    #[serde(default = "default_true")]
    pub force_path_style: bool,

    /// Per-request SDK timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            region: default_region(),
            bucket: default_bucket(),
            access_key: default_access_key(),
            secret_key: None,
            secret_key_env: default_secret_key_env(),
            force_path_style: true,
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl StoreConfig {
    /// Fill `secret_key` from the configured environment variable when it is unset
    pub fn resolve_secret(&mut self) -> Result<()> {
        if self.secret_key.is_some() {
            return Ok(());
        }
        match std::env::var(&self.secret_key_env) {
            Ok(value) if !value.is_empty() => {
                self.secret_key = Some(SecretString::new(value.into_boxed_str()));
                Ok(())
            }
            _ => Err(CdmError::Config(format!(
                "secret key not set; export {} before running",
                self.secret_key_env
            ))),
        }
    }

    /// Borrow the secret, if resolved
    pub fn secret(&self) -> Option<&str> {
        self.secret_key.as_ref().map(|s| s.expose_secret())
    }

    /// Validate the store settings
    pub fn validate(&self) -> Result<()> {
        if self.bucket.is_empty() {
            return Err(CdmError::Config("bucket name cannot be empty".to_string()));
        }
        if self.endpoint.is_empty() {
            return Err(CdmError::Config("endpoint cannot be empty".to_string()));
        }
        if self.access_key.is_empty() {
            return Err(CdmError::Config("access key cannot be empty".to_string()));
        }
        if self.secret_key.is_none() {
            return Err(CdmError::Config(format!(
                "secret key not resolved (expected in ${})",
                self.secret_key_env
            )));
        }
        Ok(())
    }
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// Everything
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_workers() -> usize {
    128
}

fn default_sample_size() -> usize {
    10
}

fn default_endpoint() -> String {
    "http://localhost:9002".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_bucket() -> String {
    "cdm".to_string()
}

fn default_access_key() -> String {
    "cdm-admin".to_string()
}

fn default_secret_key_env() -> String {
    "SECRET_KEY".to_string()
}

fn default_timeout_seconds() -> u64 {
    300
}
