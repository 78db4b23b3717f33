/*!
 * Bounded fan-out over a work list
 *
 * Every item runs as its own Tokio task. At most `workers` tasks are in
 * flight, gated by a semaphore acquired before each spawn. Outcomes come back
 * over a channel in completion order and are folded into one [`RunSummary`]
 * by the caller's task, so counters and the progress bar have a single owner.
 */

use futures::FutureExt;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Serialize, Serializer};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, warn};

use crate::discovery::Targets;
use crate::transfer::{FileTransferer, TransferError, TransferOutcome, WorkItem};

/// Default number of sample identifiers kept per category
pub const DEFAULT_SAMPLE_SIZE: usize = 10;

/// Counts for one run, plus a few identifiers per non-success category
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub skipped_samples: Vec<String>,
    pub failed_samples: Vec<String>,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    #[serde(skip)]
    sample_size: usize,
}

fn serialize_secs<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(elapsed.as_secs_f64())
}

impl RunSummary {
    pub fn new(total: usize, sample_size: usize) -> Self {
        Self {
            total,
            succeeded: 0,
            skipped: 0,
            failed: 0,
            skipped_samples: Vec::new(),
            failed_samples: Vec::new(),
            elapsed: Duration::ZERO,
            sample_size,
        }
    }

    /// Count one outcome
    pub fn record(&mut self, label: &str, outcome: &TransferOutcome) {
        match outcome {
            TransferOutcome::Success => self.succeeded += 1,
            TransferOutcome::Skipped(_) => {
                self.skipped += 1;
                if self.skipped_samples.len() < self.sample_size {
                    self.skipped_samples.push(label.to_string());
                }
            }
            TransferOutcome::Failed(_) => {
                self.failed += 1;
                if self.failed_samples.len() < self.sample_size {
                    self.failed_samples.push(label.to_string());
                }
            }
        }
    }

    /// Every item produced exactly one outcome
    pub fn is_complete(&self) -> bool {
        self.succeeded + self.skipped + self.failed == self.total
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Cap on identifiers kept per category
    pub fn sample_size(&self) -> usize {
        self.sample_size
    }
}

/// A run summary plus the identifiers discovery could not resolve
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub summary: RunSummary,
    pub no_match: Vec<String>,
    pub multi_match: Vec<String>,
}

impl RunReport {
    pub fn new(summary: RunSummary) -> Self {
        Self {
            summary,
            no_match: Vec::new(),
            multi_match: Vec::new(),
        }
    }

    /// Attach the unresolved identifiers from a target builder
    pub fn with_targets(mut self, targets: &Targets) -> Self {
        self.no_match = targets.no_match.clone();
        self.multi_match = targets.multi_match.clone();
        self
    }
}

/// Runs a unit of work over every item with bounded parallelism
#[derive(Debug, Clone)]
pub struct FanOutDispatcher {
    workers: usize,
    show_progress: bool,
    sample_size: usize,
}

impl FanOutDispatcher {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            show_progress: false,
            sample_size: DEFAULT_SAMPLE_SIZE,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Hand every work item to `transferer`
    pub async fn run(
        &self,
        items: Vec<WorkItem>,
        transferer: Arc<dyn FileTransferer>,
    ) -> RunSummary {
        info!(
            items = items.len(),
            workers = self.workers,
            transferer = transferer.name(),
            "starting run"
        );
        self.run_with(
            items,
            |item: &WorkItem| item.label.clone(),
            move |item: WorkItem| {
                let transferer = Arc::clone(&transferer);
                async move { transferer.transfer(&item).await }
            },
        )
        .await
    }

    /// Run `unit` once per item and collect the outcomes
    ///
    /// A panic inside `unit` becomes `Failed(Panicked)` for that item only.
    pub async fn run_with<T, L, F, Fut>(&self, items: Vec<T>, label_of: L, unit: F) -> RunSummary
    where
        T: Send + 'static,
        L: Fn(&T) -> String,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TransferOutcome> + Send + 'static,
    {
        let start = Instant::now();
        let mut summary = RunSummary::new(items.len(), self.sample_size);
        if items.is_empty() {
            return summary;
        }

        let labeled: Vec<(String, T)> = items
            .into_iter()
            .map(|item| (label_of(&item), item))
            .collect();
        let progress = self.progress_bar(labeled.len() as u64);

        let (tx, mut rx) = mpsc::unbounded_channel::<(String, TransferOutcome)>();
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let unit = Arc::new(unit);

        let producer = tokio::spawn(async move {
            for (label, item) in labeled {
                let permit = match Arc::clone(&semaphore).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        let outcome = TransferOutcome::Failed(TransferError::Other(e.to_string()));
                        let _ = tx.send((label, outcome));
                        continue;
                    }
                };

                let tx = tx.clone();
                let unit = Arc::clone(&unit);
                tokio::spawn(async move {
                    let outcome = AssertUnwindSafe(async move { (*unit)(item).await })
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|payload| {
                            TransferOutcome::Failed(TransferError::Panicked(panic_message(
                                payload.as_ref(),
                            )))
                        });
                    drop(permit);
                    let _ = tx.send((label, outcome));
                });
            }
        });

        while let Some((label, outcome)) = rx.recv().await {
            match &outcome {
                TransferOutcome::Success => debug!(item = %label, "done"),
                TransferOutcome::Skipped(reason) => info!(item = %label, %reason, "skipped"),
                TransferOutcome::Failed(err) => warn!(item = %label, error = %err, "failed"),
            }
            summary.record(&label, &outcome);
            progress.inc(1);
        }

        if let Err(e) = producer.await {
            error!("work producer stopped early: {}", e);
        }
        progress.finish_and_clear();

        summary.elapsed = start.elapsed();
        if !summary.is_complete() {
            error!(
                total = summary.total,
                reported = summary.succeeded + summary.skipped + summary.failed,
                "not every item reported an outcome"
            );
        }
        info!(
            succeeded = summary.succeeded,
            skipped = summary.skipped,
            failed = summary.failed,
            elapsed_secs = summary.elapsed.as_secs_f64(),
            "run finished"
        );
        summary
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
        ) {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::init_test_logging;
    use crate::store::{MemoryStore, ObjectStore};
    use crate::transfer::{SkipReason, Uploader};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_every_item_reports_once() {
        init_test_logging();
        let dispatcher = FanOutDispatcher::new(4);
        let summary = dispatcher
            .run_with(
                (0..100).collect::<Vec<u32>>(),
                |n| n.to_string(),
                |n| async move {
                    match n % 3 {
                        0 => TransferOutcome::Success,
                        1 => TransferOutcome::Skipped(SkipReason::AlreadyPresent),
                        _ => TransferOutcome::Failed(TransferError::Other("boom".into())),
                    }
                },
            )
            .await;

        assert_eq!(summary.total, 100);
        assert_eq!(summary.succeeded, 34);
        assert_eq!(summary.skipped, 33);
        assert_eq!(summary.failed, 33);
        assert!(summary.is_complete());
        assert!(summary.has_failures());
        assert_eq!(summary.failed_samples.len(), DEFAULT_SAMPLE_SIZE);
    }

    #[tokio::test]
    async fn test_concurrency_bounded_by_workers() {
        init_test_logging();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let (f, p) = (Arc::clone(&in_flight), Arc::clone(&peak));
        let summary = FanOutDispatcher::new(3)
            .run_with(
                (0..30).collect::<Vec<u32>>(),
                |n| n.to_string(),
                move |_| {
                    let (f, p) = (Arc::clone(&f), Arc::clone(&p));
                    async move {
                        let now = f.fetch_add(1, Ordering::SeqCst) + 1;
                        p.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        f.fetch_sub(1, Ordering::SeqCst);
                        TransferOutcome::Success
                    }
                },
            )
            .await;

        assert_eq!(summary.succeeded, 30);
        let peak = peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak in-flight was {}", peak);
        assert!(peak >= 1);
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        init_test_logging();
        let summary = FanOutDispatcher::new(2)
            .run_with(
                vec!["a", "b", "c"],
                |s| s.to_string(),
                |s| async move {
                    if s == "b" {
                        panic!("unit b exploded");
                    }
                    TransferOutcome::Success
                },
            )
            .await;

        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failed_samples, vec!["b"]);
        assert!(summary.is_complete());
    }

    #[tokio::test]
    async fn test_zero_workers_clamped() {
        let dispatcher = FanOutDispatcher::new(0);
        assert_eq!(dispatcher.workers(), 1);
        let summary = dispatcher
            .run_with(vec![1u8, 2], |n| n.to_string(), |_| async {
                TransferOutcome::Success
            })
            .await;
        assert_eq!(summary.succeeded, 2);
    }

    #[tokio::test]
    async fn test_empty_run() {
        let summary = FanOutDispatcher::new(8)
            .run(Vec::new(), Arc::new(Uploader::new(Arc::new(MemoryStore::default()))))
            .await;
        assert_eq!(summary.total, 0);
        assert!(summary.is_complete());
        assert!(!summary.has_failures());
    }

    #[tokio::test]
    async fn test_injected_failure_does_not_affect_others() {
        init_test_logging();
        let dir = tempdir().unwrap();
        let store = Arc::new(MemoryStore::default());
        let mut items = Vec::new();
        for i in 0..20 {
            let path = dir.path().join(format!("GCF_{:06}.1_protein.faa.gz", i));
            std::fs::write(&path, b"protein").unwrap();
            let key = format!("NCBI/GCF_{:06}.1_protein.faa.gz", i);
            items.push(WorkItem::upload(path, key));
        }
        store.fail_on("NCBI/GCF_000007.1_protein.faa.gz");

        let summary = FanOutDispatcher::new(5)
            .with_sample_size(3)
            .run(items, Arc::new(Uploader::new(store.clone())))
            .await;

        assert_eq!(summary.succeeded, 19);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failed_samples, vec!["GCF_000007.1_protein.faa.gz"]);
        assert_eq!(store.put_count(), 19);
        assert!(store
            .exists("NCBI/GCF_000008.1_protein.faa.gz")
            .await
            .unwrap());
    }

    #[test]
    fn test_summary_samples_capped() {
        let mut summary = RunSummary::new(5, 2);
        for label in ["a", "b", "c"] {
            summary.record(label, &TransferOutcome::Skipped(SkipReason::AlreadyPresent));
        }
        assert_eq!(summary.skipped, 3);
        assert_eq!(summary.skipped_samples, vec!["a", "b"]);
        assert!(!summary.is_complete());
    }

    #[test]
    fn test_summary_json_shape() {
        let mut summary = RunSummary::new(1, 10);
        summary.record("GCF_000001.1", &TransferOutcome::Success);
        let report = RunReport::new(summary);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["summary"]["succeeded"], 1);
        assert!(value["summary"]["elapsed_secs"].is_number());
        assert!(value["summary"].get("sample_size").is_none());
    }
}
