//! Object store abstraction
//!
//! Every entry point talks to the bucket through the [`ObjectStore`] trait.
//! [`S3Store`] is the production implementation (MinIO or AWS via
//! `aws-sdk-s3`); [`MemoryStore`] keeps objects in a map and is used by the
//! test suite and for failure injection.

mod error;
mod memory;
mod s3;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use s3::S3Store;

use async_trait::async_trait;
use std::path::Path;

/// A listed object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub key: String,
    pub size: u64,
}

/// Minimal set of object operations the transfer workers need
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket this store is bound to
    fn bucket(&self) -> &str;

    /// Check whether `key` exists. Absence is `Ok(false)`, not an error.
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Upload the file at `local_path` to `key`
    async fn put_file(&self, local_path: &Path, key: &str) -> StoreResult<()>;

    /// Download `key` into `local_path`. The file only appears once complete.
    async fn get_file(&self, key: &str, local_path: &Path) -> StoreResult<()>;

    /// List every object under `prefix` (all pages)
    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectEntry>>;
}

/// Sibling path used while a download is in progress
pub(crate) fn partial_path(local_path: &Path) -> std::path::PathBuf {
    let mut name = local_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    local_path.with_file_name(name)
}
