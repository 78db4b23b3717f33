/*!
 * Transfer workers
 *
 * Each worker checks the destination first and reports `Skipped` when it is
 * already there. The check is by name only; a changed object with the same
 * key is never refreshed.
 */

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{FileTransferer, SkipReason, TransferError, TransferOutcome, WorkItem};
use crate::store::ObjectStore;

/// Local file -> object key
#[derive(Clone)]
pub struct Uploader {
    store: Arc<dyn ObjectStore>,
}

impl Uploader {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl FileTransferer for Uploader {
    fn name(&self) -> &'static str {
        "upload"
    }

    async fn transfer(&self, item: &WorkItem) -> TransferOutcome {
        let (Some(path), Some(key)) = (item.source.as_local(), item.destination.as_remote())
        else {
            return TransferOutcome::Failed(TransferError::UnsupportedDirection(item.to_string()));
        };

        match self.store.exists(key).await {
            Ok(true) => {
                debug!(key, "object already in bucket, skipping");
                return TransferOutcome::Skipped(SkipReason::AlreadyPresent);
            }
            Ok(false) => {}
            Err(e) => return TransferOutcome::Failed(e.into()),
        }

        match tokio::fs::try_exists(path).await {
            Ok(true) => {}
            Ok(false) => {
                return TransferOutcome::Failed(TransferError::SourceMissing(
                    path.display().to_string(),
                ))
            }
            Err(e) => return TransferOutcome::Failed(e.into()),
        }

        let outcome: TransferOutcome = self.store.put_file(path, key).await.into();
        if outcome.is_success() {
            debug!(key, bucket = self.store.bucket(), "uploaded");
        }
        outcome
    }
}

/// Object key -> local file
#[derive(Clone)]
pub struct Downloader {
    store: Arc<dyn ObjectStore>,
}

impl Downloader {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl FileTransferer for Downloader {
    fn name(&self) -> &'static str {
        "download"
    }

    async fn transfer(&self, item: &WorkItem) -> TransferOutcome {
        let (Some(key), Some(path)) = (item.source.as_remote(), item.destination.as_local())
        else {
            return TransferOutcome::Failed(TransferError::UnsupportedDirection(item.to_string()));
        };

        match tokio::fs::try_exists(path).await {
            Ok(true) => {
                debug!(path = %path.display(), "local file already present, skipping");
                return TransferOutcome::Skipped(SkipReason::AlreadyPresent);
            }
            Ok(false) => {}
            Err(e) => return TransferOutcome::Failed(e.into()),
        }

        let outcome: TransferOutcome = self.store.get_file(key, path).await.into();
        if outcome.is_success() {
            debug!(key, path = %path.display(), "downloaded");
        }
        outcome
    }
}

/// Source directory -> symbolic link
///
/// The link is only made when the source directory holds at least one file
/// for every required suffix.
#[derive(Debug, Clone)]
pub struct Linker {
    required_suffixes: Vec<String>,
}

impl Linker {
    pub fn new<S: Into<String>>(required_suffixes: impl IntoIterator<Item = S>) -> Self {
        Self {
            required_suffixes: required_suffixes.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl FileTransferer for Linker {
    fn name(&self) -> &'static str {
        "link"
    }

    async fn transfer(&self, item: &WorkItem) -> TransferOutcome {
        let (Some(target), Some(link)) = (item.source.as_local(), item.destination.as_local())
        else {
            return TransferOutcome::Failed(TransferError::UnsupportedDirection(item.to_string()));
        };

        let target = target.to_path_buf();
        let link = link.to_path_buf();
        let required = self.required_suffixes.clone();

        match tokio::task::spawn_blocking(move || link_directory(&target, &link, &required)).await
        {
            Ok(Ok(None)) => TransferOutcome::Success,
            Ok(Ok(Some(reason))) => TransferOutcome::Skipped(reason),
            Ok(Err(e)) => TransferOutcome::Failed(e),
            Err(join_err) => TransferOutcome::Failed(TransferError::Panicked(join_err.to_string())),
        }
    }
}

/// Blocking body of [`Linker`]. `Ok(None)` means the link was created.
fn link_directory(
    target: &Path,
    link: &Path,
    required_suffixes: &[String],
) -> Result<Option<SkipReason>, TransferError> {
    let names: Vec<String> = match std::fs::read_dir(target) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(TransferError::SourceMissing(target.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    let missing: Vec<String> = required_suffixes
        .iter()
        .filter(|suffix| !names.iter().any(|name| name.ends_with(suffix.as_str())))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Ok(Some(SkipReason::MissingRequiredFiles(missing)));
    }

    if let Ok(existing) = std::fs::read_link(link) {
        if existing == target {
            return Ok(Some(SkipReason::AlreadyLinked));
        }
        return Err(conflict(link, target));
    }
    if link.exists() {
        return Err(conflict(link, target));
    }

    match make_dir_symlink(target, link) {
        Ok(()) => Ok(None),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            warn!(link = %link.display(), "link appeared concurrently");
            Err(conflict(link, target))
        }
        Err(e) => Err(e.into()),
    }
}

fn conflict(link: &Path, target: &Path) -> TransferError {
    TransferError::LinkConflict {
        link: link.display().to_string(),
        target: target.display().to_string(),
    }
}

#[cfg(unix)]
fn make_dir_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn make_dir_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_upload_then_skip() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("GCF_000001.1_protein.faa.gz");
        std::fs::write(&file, b"data").unwrap();

        let store = MemoryStore::new("cdm");
        let uploader = Uploader::new(Arc::new(store.clone()));
        let item = WorkItem::upload(&file, "NCBI/GCF_000001.1_protein.faa.gz");

        assert!(uploader.transfer(&item).await.is_success());
        let second = uploader.transfer(&item).await;
        assert!(matches!(
            second,
            TransferOutcome::Skipped(SkipReason::AlreadyPresent)
        ));
        assert_eq!(store.put_count(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_upload_skips_preexisting_key() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("GCF_000001.1_protein.faa.gz");
        std::fs::write(&file, b"new content").unwrap();

        let store = MemoryStore::new("cdm");
        store.insert("NCBI/GCF_000001.1_protein.faa.gz", b"old content");

        let uploader = Uploader::new(Arc::new(store.clone()));
        let outcome = uploader
            .transfer(&WorkItem::upload(&file, "NCBI/GCF_000001.1_protein.faa.gz"))
            .await;

        assert!(outcome.is_skipped());
        assert_eq!(store.put_count(), 0);
        // same-named object is not refreshed
        assert_eq!(
            store.get("NCBI/GCF_000001.1_protein.faa.gz").unwrap(),
            b"old content"
        );
    }

    #[tokio::test]
    async fn test_upload_missing_source_fails() {
        let store = MemoryStore::new("cdm");
        let uploader = Uploader::new(Arc::new(store));
        let outcome = uploader
            .transfer(&WorkItem::upload("/no/such/file.faa.gz", "NCBI/file.faa.gz"))
            .await;
        assert!(matches!(
            outcome,
            TransferOutcome::Failed(TransferError::SourceMissing(_))
        ));
    }

    #[tokio::test]
    async fn test_upload_unreadable_source_is_io_error() {
        let store = Arc::new(MemoryStore::default());
        let uploader = Uploader::new(store.clone());
        let item = WorkItem::upload(PathBuf::from("bad\0name_protein.faa.gz"), "NCBI/bad");

        let outcome = uploader.transfer(&item).await;
        assert!(matches!(
            outcome,
            TransferOutcome::Failed(TransferError::Io(_))
        ));
        assert_eq!(store.put_count(), 0);
    }

    #[tokio::test]
    async fn test_upload_store_error_fails() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"a").unwrap();

        let store = MemoryStore::new("cdm");
        store.fail_on("FastANI/a.txt");
        let uploader = Uploader::new(Arc::new(store));
        let outcome = uploader.transfer(&WorkItem::upload(&file, "FastANI/a.txt")).await;
        assert!(matches!(
            outcome,
            TransferOutcome::Failed(TransferError::Store(_))
        ));
    }

    #[tokio::test]
    async fn test_wrong_direction() {
        let uploader = Uploader::new(Arc::new(MemoryStore::default()));
        let outcome = uploader
            .transfer(&WorkItem::download("k", "/tmp/never"))
            .await;
        assert!(matches!(
            outcome,
            TransferOutcome::Failed(TransferError::UnsupportedDirection(_))
        ));
    }

    #[tokio::test]
    async fn test_download_then_skip() {
        let dir = tempdir().unwrap();
        let store = MemoryStore::new("dts-staging");
        store.insert("u/img/submissions/2500001/2500001.faa", b">a\nM\n");

        let downloader = Downloader::new(Arc::new(store));
        let dest = dir.path().join("2500001").join("2500001.faa");
        let item = WorkItem::download("u/img/submissions/2500001/2500001.faa", &dest);

        assert!(downloader.transfer(&item).await.is_success());
        assert_eq!(std::fs::read(&dest).unwrap(), b">a\nM\n");
        assert!(downloader.transfer(&item).await.is_skipped());
    }

    #[tokio::test]
    async fn test_download_missing_key_fails() {
        let dir = tempdir().unwrap();
        let downloader = Downloader::new(Arc::new(MemoryStore::default()));
        let outcome = downloader
            .transfer(&WorkItem::download("nope.faa", dir.path().join("nope.faa")))
            .await;
        assert!(outcome.is_failed());
        assert!(!dir.path().join("nope.faa").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_link_created_then_skipped() {
        let root = tempdir().unwrap();
        let source = root.path().join("ncbi").join("GCF_000001.1");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(source.join("GCF_000001.1_protein.faa.gz"), b"x").unwrap();
        let collection = root.path().join("CDM").join("eggNOG");
        std::fs::create_dir_all(&collection).unwrap();

        let linker = Linker::new(["protein.faa.gz"]);
        let link = collection.join("GCF_000001.1");
        let item = WorkItem::link(&source, &link);

        assert!(linker.transfer(&item).await.is_success());
        assert_eq!(std::fs::read_link(&link).unwrap(), source);
        assert!(matches!(
            linker.transfer(&item).await,
            TransferOutcome::Skipped(SkipReason::AlreadyLinked)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_link_skipped_when_suffix_missing() {
        let root = tempdir().unwrap();
        let source = root.path().join("GCF_000002.1");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(source.join("GCF_000002.1_genomic.fna.gz"), b"x").unwrap();

        let linker = Linker::new(["protein.faa.gz", "genomic.fna.gz"]);
        let link = root.path().join("link");
        let outcome = linker.transfer(&WorkItem::link(&source, &link)).await;

        match outcome {
            TransferOutcome::Skipped(SkipReason::MissingRequiredFiles(missing)) => {
                assert_eq!(missing, vec!["protein.faa.gz".to_string()]);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(std::fs::symlink_metadata(&link).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_link_conflict_fails() {
        let root = tempdir().unwrap();
        let source = root.path().join("GCF_000003.1");
        let other = root.path().join("elsewhere");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::create_dir_all(&other).unwrap();
        std::fs::write(source.join("p_protein.faa.gz"), b"x").unwrap();

        let link = root.path().join("link");
        std::os::unix::fs::symlink(&other, &link).unwrap();

        let linker = Linker::new(["protein.faa.gz"]);
        let outcome = linker.transfer(&WorkItem::link(&source, &link)).await;
        assert!(matches!(
            outcome,
            TransferOutcome::Failed(TransferError::LinkConflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_link_missing_source_fails() {
        let root = tempdir().unwrap();
        let linker = Linker::new(["protein.faa.gz"]);
        let outcome = linker
            .transfer(&WorkItem::link(
                root.path().join("absent"),
                root.path().join("link"),
            ))
            .await;
        assert!(matches!(
            outcome,
            TransferOutcome::Failed(TransferError::SourceMissing(_))
        ));
    }
}
