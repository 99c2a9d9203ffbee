use std::collections::HashSet;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::retry::{RetryError, RetryPolicy};
use super::scanner::FileDescriptor;
use super::store::RemoteStore;

pub const PREVIEW_LIMIT: usize = 10;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("failed to list remote paths: {0}")]
    Listing(#[from] RetryError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionReport {
    pub dry_run: bool,
    /// Remote paths with no local file, in listing order.
    pub candidates: Vec<String>,
    pub deleted: usize,
    pub errors: Vec<String>,
}

impl DeletionReport {
    /// Candidates in a dry run, confirmed deletions otherwise.
    pub fn count(&self) -> usize {
        if self.dry_run {
            self.candidates.len()
        } else {
            self.deleted
        }
    }

    pub fn preview(&self) -> &[String] {
        &self.candidates[..self.candidates.len().min(PREVIEW_LIMIT)]
    }
}

/// Finds remote entries whose local file is gone, and removes them unless
/// running dry.
pub struct DeletionAuditor<S> {
    store: S,
    retry: RetryPolicy,
}

impl<S: RemoteStore> DeletionAuditor<S> {
    pub fn new(store: S, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub async fn audit(
        &self,
        files: &[FileDescriptor],
        dry_run: bool,
    ) -> Result<DeletionReport, AuditError> {
        let local: HashSet<&str> = files
            .iter()
            .map(|file| file.relative_path.as_str())
            .collect();
        let remote = self
            .retry
            .run("list synced paths", || self.store.list_all_paths())
            .await?;
        let candidates: Vec<String> = remote
            .into_iter()
            .filter(|entry| !local.contains(entry.path.as_str()))
            .map(|entry| entry.path)
            .collect();

        let mut report = DeletionReport {
            dry_run,
            candidates,
            ..DeletionReport::default()
        };
        if report.candidates.is_empty() {
            return Ok(report);
        }
        info!(
            count = report.candidates.len(),
            dry_run, "remote entries without a local file"
        );

        if dry_run {
            for path in report.preview() {
                info!(%path, "would delete");
            }
            if report.candidates.len() > PREVIEW_LIMIT {
                info!(
                    more = report.candidates.len() - PREVIEW_LIMIT,
                    "more entries not shown"
                );
            }
            return Ok(report);
        }

        let mut deleted = 0;
        let mut errors = Vec::new();
        for path in &report.candidates {
            match self
                .retry
                .run(path, || self.store.delete_by_path(path))
                .await
            {
                Ok(reply) if reply.deleted => {
                    debug!(%path, "deleted");
                    deleted += 1;
                }
                Ok(_) => debug!(%path, "store had nothing to delete"),
                Err(err) => {
                    warn!(%path, error = %err, "failed to delete");
                    errors.push(format!("{path}: {err}"));
                }
            }
        }
        report.deleted = deleted;
        report.errors = errors;
        Ok(report)
    }
}
