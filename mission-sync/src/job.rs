use std::fmt;
use std::time::{Duration, Instant};

use anyhow::Context;
use mission_core::{EventResult, LogEvent, Metadata, MetadataValue};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::sync::audit::{DeletionAuditor, DeletionReport};
use crate::sync::orchestrator::{Orchestrator, SyncResult};
use crate::sync::scanner::{ScanDiagnostic, Scanner};
use crate::sync::store::RemoteStore;

const EVENT_ACTION: &str = "workspace_sync";
const SAMPLE_LIMIT: usize = 5;
const ERROR_LIST_LIMIT: usize = 10;
const RULE: &str = "============================================================";

#[derive(Debug)]
pub struct RunReport {
    pub result: SyncResult,
    pub diagnostics: Vec<ScanDiagnostic>,
    pub deletions: Option<DeletionReport>,
    pub duration: Duration,
    pub finished_at: OffsetDateTime,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.result.is_success()
            && self
                .deletions
                .as_ref()
                .is_none_or(|deletions| deletions.errors.is_empty())
    }

    pub fn summary_line(&self) -> String {
        format!(
            "Synced {} files: {} created, {} updated, {} unchanged, {} errors",
            self.result.total,
            self.result.created,
            self.result.updated,
            self.result.unchanged,
            self.result.errors.len()
        )
    }

    fn metadata(&self) -> Metadata {
        let mut meta = Metadata::new();
        meta.insert("total".into(), self.result.total.into());
        meta.insert("created".into(), self.result.created.into());
        meta.insert("updated".into(), self.result.updated.into());
        meta.insert("unchanged".into(), self.result.unchanged.into());
        meta.insert("errors".into(), self.result.errors.len().into());
        meta.insert("skipped".into(), self.diagnostics.len().into());
        meta.insert("cancelled".into(), self.result.cancelled.into());
        meta.insert(
            "durationMs".into(),
            MetadataValue::Integer(self.duration.as_millis().min(i64::MAX as u128) as i64),
        );
        if let Some(deletions) = &self.deletions {
            let mut cleanup = Metadata::new();
            cleanup.insert("dryRun".into(), deletions.dry_run.into());
            cleanup.insert("candidates".into(), deletions.candidates.len().into());
            cleanup.insert("deleted".into(), deletions.deleted.into());
            cleanup.insert("errors".into(), deletions.errors.len().into());
            meta.insert("cleanup".into(), MetadataValue::Map(cleanup));
        }
        if let Ok(finished) = self.finished_at.format(&Rfc3339) {
            meta.insert("finishedAt".into(), finished.into());
        }
        meta
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = &self.result;
        let mut failures: Vec<&String> = result.errors.iter().collect();
        if let Some(deletions) = &self.deletions {
            failures.extend(deletions.errors.iter());
        }

        writeln!(f, "{RULE}")?;
        if result.cancelled {
            writeln!(f, "  Sync Cancelled")?;
        } else {
            writeln!(f, "  Sync Complete")?;
        }
        writeln!(f, "{RULE}")?;
        writeln!(f, "  Files:      {}", result.total)?;
        writeln!(f, "  Created:    {}", result.created)?;
        writeln!(f, "  Updated:    {}", result.updated)?;
        writeln!(f, "  Unchanged:  {}", result.unchanged)?;
        writeln!(f, "  Errors:     {}", failures.len())?;
        match &self.deletions {
            Some(deletions) if deletions.dry_run => {
                writeln!(f, "  Deletable:  {} (dry run)", deletions.count())?
            }
            Some(deletions) => writeln!(f, "  Deleted:    {}", deletions.count())?,
            None => writeln!(f, "  Deletable:  unknown (cleanup check skipped)")?,
        }
        writeln!(f, "  Skipped:    {}", self.diagnostics.len())?;
        writeln!(f, "  Duration:   {:.2}s", self.duration.as_secs_f64())?;
        write!(f, "{RULE}")?;

        if !failures.is_empty() {
            write!(f, "\n\nErrors:")?;
            for error in failures.iter().take(ERROR_LIST_LIMIT) {
                write!(f, "\n  - {error}")?;
            }
            if failures.len() > ERROR_LIST_LIMIT {
                write!(f, "\n  ... and {} more", failures.len() - ERROR_LIST_LIMIT)?;
            }
        }
        Ok(())
    }
}

/// One scan, sync and cleanup pass over the workspace.
pub struct SyncJob<S> {
    config: SyncConfig,
    store: S,
    cancel: CancellationToken,
}

impl<S: RemoteStore + Clone> SyncJob<S> {
    pub fn new(config: SyncConfig, store: S) -> Self {
        Self {
            config,
            store,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn run(&self) -> anyhow::Result<RunReport> {
        let started = Instant::now();
        let root = self.config.workspace_root.canonicalize().with_context(|| {
            format!(
                "cannot resolve workspace root {}",
                self.config.workspace_root.display()
            )
        })?;
        info!(root = %root.display(), "scanning workspace");
        let scanner = Scanner::new(root, self.config.scan.clone());
        let scan = tokio::task::spawn_blocking(move || scanner.scan())
            .await
            .context("workspace scan did not finish")??;

        if scan.files.is_empty() {
            anyhow::bail!("no files found to sync");
        }
        for file in scan.files.iter().take(SAMPLE_LIMIT) {
            info!(
                category = %file.category,
                path = %file.relative_path,
                size = file.size,
                "queued"
            );
        }
        if scan.files.len() > SAMPLE_LIMIT {
            info!(more = scan.files.len() - SAMPLE_LIMIT, "more files queued");
        }

        let orchestrator = Orchestrator::new(self.store.clone(), self.config.orchestrator.clone())
            .with_cancellation(self.cancel.clone());
        let mut result = orchestrator.sync_all(&scan.files).await;

        let deletions = if result.cancelled {
            None
        } else {
            let auditor =
                DeletionAuditor::new(self.store.clone(), self.config.orchestrator.retry);
            match auditor.audit(&scan.files, !self.config.prune).await {
                Ok(report) => Some(report),
                Err(err) => {
                    warn!(error = %err, "cleanup check skipped");
                    None
                }
            }
        };
        if let Some(deletions) = &deletions {
            result.deleted = deletions.deleted;
        }

        let report = RunReport {
            result,
            diagnostics: scan.diagnostics,
            deletions,
            duration: started.elapsed(),
            finished_at: OffsetDateTime::now_utc(),
        };
        let outcome = if report.is_success() {
            EventResult::Success
        } else {
            EventResult::Error
        };
        self.report_event(report.summary_line(), outcome, Some(report.metadata()))
            .await;
        Ok(report)
    }

    /// Best-effort record of a run that could not complete.
    pub async fn report_fatal(&self, err: &anyhow::Error) {
        self.report_event(format!("Fatal error: {err:#}"), EventResult::Error, None)
            .await;
    }

    async fn report_event(&self, details: String, result: EventResult, metadata: Option<Metadata>) {
        let event = LogEvent {
            action_type: EVENT_ACTION.to_string(),
            details,
            result,
            metadata,
        };
        if let Err(err) = self.store.log_event(&event).await {
            warn!(error = %err, "failed to report to the activity log");
        }
    }
}
