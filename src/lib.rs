/*!
 * cdm-ingest - genome file staging for the CDM data lake
 *
 * - Lineage filtering over GTDB taxonomy tables
 * - Suffix-based genome file discovery
 * - Idempotent upload/download against an S3-compatible store (MinIO)
 * - Collection source directories built from symbolic links
 * - Bounded fan-out with per-item outcomes and run summaries
 * - eggNOG and FastANI result normalization to CSV
 */

pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod normalize;
pub mod output;
pub mod store;
pub mod transfer;

// Re-export commonly used types
pub use config::{IngestConfig, LogLevel, StoreConfig};
pub use dispatch::{FanOutDispatcher, RunReport, RunSummary};
pub use error::{CdmError, Result};
pub use store::{MemoryStore, ObjectStore, S3Store};
pub use transfer::{
    Downloader, FileTransferer, Linker, Locator, SkipReason, TransferError, TransferOutcome,
    Uploader, WorkItem,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
