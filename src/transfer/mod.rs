/*!
 * Work items, transfer outcomes, and the transfer capability
 *
 * A [`WorkItem`] pairs a source with a destination. Each locator is either a
 * local path or an object key, so the same type describes uploads, downloads,
 * and directory links. A [`FileTransferer`] turns one item into exactly one
 * [`TransferOutcome`].
 */

pub mod worker;

pub use worker::{Downloader, Linker, Uploader};

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::store::StoreError;

/// Where one end of a transfer lives
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    /// Local filesystem path
    Local(PathBuf),
    /// Object key in the configured bucket
    Remote(String),
}

impl Locator {
    pub fn as_local(&self) -> Option<&std::path::Path> {
        match self {
            Locator::Local(path) => Some(path),
            Locator::Remote(_) => None,
        }
    }

    pub fn as_remote(&self) -> Option<&str> {
        match self {
            Locator::Remote(key) => Some(key),
            Locator::Local(_) => None,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Local(path) => write!(f, "{}", path.display()),
            Locator::Remote(key) => write!(f, "s3://{}", key),
        }
    }
}

/// One unit of work, consumed exactly once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub source: Locator,
    pub destination: Locator,
    /// Identifier reported in summaries (genome id, file name, ...)
    pub label: String,
}

impl WorkItem {
    pub fn new(source: Locator, destination: Locator, label: impl Into<String>) -> Self {
        Self {
            source,
            destination,
            label: label.into(),
        }
    }

    /// Local file to object key
    pub fn upload(path: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        let path = path.into();
        let label = file_label(&path);
        Self::new(Locator::Local(path), Locator::Remote(key.into()), label)
    }

    /// Object key to local file
    pub fn download(key: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let key = key.into();
        let label = key.rsplit('/').next().unwrap_or(&key).to_string();
        Self::new(Locator::Remote(key), Locator::Local(path.into()), label)
    }

    /// Local directory to a symlink at `link`
    pub fn link(target: impl Into<PathBuf>, link: impl Into<PathBuf>) -> Self {
        let link = link.into();
        let label = file_label(&link);
        Self::new(Locator::Local(target.into()), Locator::Local(link), label)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.destination)
    }
}

fn file_label(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Why an item was not transferred
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// Destination object or file already exists
    AlreadyPresent,
    /// Destination is already a link to the source
    AlreadyLinked,
    /// Source directory lacks a file for these suffixes
    MissingRequiredFiles(Vec<String>),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyPresent => write!(f, "destination already present"),
            SkipReason::AlreadyLinked => write!(f, "already linked"),
            SkipReason::MissingRequiredFiles(suffixes) => {
                write!(f, "no file matching {}", suffixes.join(", "))
            }
        }
    }
}

/// Per-item failure. Never propagated past the dispatcher.
#[derive(Error, Debug, Clone)]
pub enum TransferError {
    #[error("source not found: {0}")]
    SourceMissing(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("{link} already exists and does not link to {target}")]
    LinkConflict { link: String, target: String },

    #[error("unsupported direction for this transferer: {0}")]
    UnsupportedDirection(String),

    #[error("unit of work panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for TransferError {
    fn from(err: std::io::Error) -> Self {
        TransferError::Io(err.to_string())
    }
}

/// Terminal state of one work item
#[derive(Debug, Clone)]
pub enum TransferOutcome {
    Success,
    Skipped(SkipReason),
    Failed(TransferError),
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TransferOutcome::Success)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, TransferOutcome::Skipped(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TransferOutcome::Failed(_))
    }
}

impl<E: Into<TransferError>> From<Result<(), E>> for TransferOutcome {
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => TransferOutcome::Success,
            Err(e) => TransferOutcome::Failed(e.into()),
        }
    }
}

/// Capability to carry out one work item
#[async_trait]
pub trait FileTransferer: Send + Sync {
    /// Short verb for logs and progress ("upload", "download", "link")
    fn name(&self) -> &'static str;

    /// Perform the item. Must not panic on I/O errors; report them as `Failed`.
    async fn transfer(&self, item: &WorkItem) -> TransferOutcome;
}
