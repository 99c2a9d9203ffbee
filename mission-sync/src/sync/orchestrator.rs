use futures_util::StreamExt;
use futures_util::stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::reconcile::{Reconciler, SyncOutcome};
use super::retry::RetryPolicy;
use super::scanner::FileDescriptor;
use super::store::RemoteStore;

pub const DEFAULT_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub batch_size: usize,
    /// Items reconciled at once inside a batch. Paths are distinct, so items
    /// never race on the same key.
    pub item_concurrency: usize,
    pub retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            item_concurrency: 1,
            retry: RetryPolicy::default(),
        }
    }
}

/// Aggregate of one run. `deleted` stays zero here; deletions are counted by
/// the auditor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncResult {
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub errors: Vec<String>,
    pub cancelled: bool,
}

impl SyncResult {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && !self.cancelled
    }

    pub fn processed(&self) -> usize {
        self.created + self.updated + self.unchanged + self.errors.len()
    }

    fn record(&mut self, path: &str, outcome: SyncOutcome) {
        match outcome {
            SyncOutcome::Created(_) => self.created += 1,
            SyncOutcome::Updated(_) => self.updated += 1,
            SyncOutcome::Unchanged(_) => self.unchanged += 1,
            SyncOutcome::Failed(reason) => self.errors.push(format!("{path}: {reason}")),
        }
    }
}

pub struct Orchestrator<S> {
    reconciler: Reconciler<S>,
    config: OrchestratorConfig,
    cancel: CancellationToken,
}

impl<S: RemoteStore> Orchestrator<S> {
    pub fn new(store: S, config: OrchestratorConfig) -> Self {
        Self {
            reconciler: Reconciler::new(store),
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Drives every file through the reconciler batch by batch. A file that
    /// keeps failing is recorded in `errors` and the run moves on.
    pub async fn sync_all(&self, files: &[FileDescriptor]) -> SyncResult {
        let mut result = SyncResult {
            total: files.len(),
            ..SyncResult::default()
        };
        let batch_size = self.config.batch_size.max(1);
        let concurrency = self.config.item_concurrency.max(1);
        let total_batches = files.len().div_ceil(batch_size);

        for (index, batch) in files.chunks(batch_size).enumerate() {
            if self.cancel.is_cancelled() {
                result.cancelled = true;
                break;
            }
            info!(
                batch = index + 1,
                total_batches,
                files = batch.len(),
                "processing batch"
            );

            let outcomes: Vec<(&FileDescriptor, Option<SyncOutcome>)> = stream::iter(batch)
                .map(|file| async move {
                    if self.cancel.is_cancelled() {
                        return (file, None);
                    }
                    (file, Some(self.sync_one(file).await))
                })
                .buffered(concurrency)
                .collect()
                .await;

            let mut progress = String::with_capacity(outcomes.len());
            for (file, outcome) in outcomes {
                match outcome {
                    Some(outcome) => {
                        progress.push(outcome.glyph());
                        result.record(&file.relative_path, outcome);
                    }
                    None => result.cancelled = true,
                }
            }
            debug!(batch = index + 1, %progress, "batch outcomes");
            info!(
                batch = index + 1,
                created = result.created,
                updated = result.updated,
                unchanged = result.unchanged,
                errors = result.errors.len(),
                "batch done"
            );
        }

        if result.cancelled {
            info!(
                processed = result.processed(),
                total = result.total,
                "sync cancelled"
            );
        }
        result
    }

    /// One file under the retry policy.
    pub async fn sync_one(&self, file: &FileDescriptor) -> SyncOutcome {
        let attempt = self
            .config
            .retry
            .run(&file.relative_path, || self.reconciler.try_reconcile(file))
            .await;
        match attempt {
            Ok(outcome) => outcome,
            Err(err) => SyncOutcome::Failed(err.to_string()),
        }
    }
}
