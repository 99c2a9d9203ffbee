use mission_core::{StoreError, UpsertAction, UpsertRequest};
use tracing::debug;

use super::scanner::FileDescriptor;
use super::store::RemoteStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Created(String),
    Updated(String),
    Unchanged(String),
    Failed(String),
}

impl SyncOutcome {
    /// Progress glyph printed per item.
    pub fn glyph(&self) -> char {
        match self {
            SyncOutcome::Created(_) => '+',
            SyncOutcome::Updated(_) => '~',
            SyncOutcome::Unchanged(_) => '.',
            SyncOutcome::Failed(_) => '!',
        }
    }
}

/// Brings one remote entry in line with one local file.
///
/// The fingerprint gates writes: a file whose content hash matches the stored
/// one costs a single lookup and never touches `updatedAt`. The reconciler
/// does not retry.
pub struct Reconciler<S> {
    store: S,
}

impl<S: RemoteStore> Reconciler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn reconcile(&self, file: &FileDescriptor) -> SyncOutcome {
        match self.try_reconcile(file).await {
            Ok(outcome) => outcome,
            Err(err) => SyncOutcome::Failed(err.to_string()),
        }
    }

    pub async fn try_reconcile(&self, file: &FileDescriptor) -> Result<SyncOutcome, StoreError> {
        let existing = self.store.get_by_path(&file.relative_path).await?;
        if let Some(existing) = &existing
            && file.fingerprint == *existing.fingerprint
        {
            debug!(path = %file.relative_path, "unchanged");
            return Ok(SyncOutcome::Unchanged(existing.id.clone()));
        }

        // The store reports what it actually did, which can differ from the
        // lookup when another run wrote the same path in between.
        let reply = self.store.upsert_by_path(&upsert_request(file)).await?;
        debug!(path = %file.relative_path, action = ?reply.action, "reconciled");
        Ok(match reply.action {
            UpsertAction::Created => SyncOutcome::Created(reply.id),
            UpsertAction::Updated => SyncOutcome::Updated(reply.id),
            UpsertAction::Unchanged => SyncOutcome::Unchanged(reply.id),
        })
    }
}

fn upsert_request(file: &FileDescriptor) -> UpsertRequest {
    UpsertRequest {
        path: file.relative_path.clone(),
        title: file.title(),
        content: file.content.clone(),
        fingerprint: file.fingerprint.to_string(),
        category: file.category,
        last_modified: file.last_modified,
        size: file.size,
    }
}

#[cfg(test)]
pub(crate) fn descriptor(relative_path: &str, content: &str) -> FileDescriptor {
    use super::classify::classify;
    use super::fingerprint::fingerprint;

    FileDescriptor {
        absolute_path: std::path::PathBuf::from("/work").join(relative_path),
        relative_path: relative_path.to_string(),
        content: content.to_string(),
        fingerprint: fingerprint(content.as_bytes()),
        category: classify(relative_path),
        size: content.len() as u64,
        last_modified: 1_700_000_000_000,
    }
}
