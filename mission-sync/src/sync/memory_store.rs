use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use mission_core::{
    Category, DeleteReply, LogEvent, RemoteFile, StoreError, SyncedPath, UpsertAction,
    UpsertReply, UpsertRequest,
};

use super::store::RemoteStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Get(String),
    Upsert(String),
    List,
    Delete(String),
    Log,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StoredEntry {
    pub id: String,
    pub title: String,
    pub content: String,
    pub fingerprint: String,
    pub category: Category,
    pub size: u64,
    pub last_modified: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Default)]
struct Inner {
    entries: BTreeMap<String, StoredEntry>,
    next_id: u64,
    clock: i64,
    calls: Vec<Call>,
    // Remaining failures per path; `u32::MAX` means always.
    failures: HashMap<String, u32>,
    fail_listing: bool,
    events: Vec<LogEvent>,
}

impl Inner {
    fn tick(&mut self) -> i64 {
        self.clock += 1;
        self.clock
    }

    fn check(&mut self, path: &str) -> Result<(), StoreError> {
        let Some(remaining) = self.failures.get_mut(path) else {
            return Ok(());
        };
        if *remaining == 0 {
            return Ok(());
        }
        if *remaining != u32::MAX {
            *remaining -= 1;
        }
        Err(StoreError::Function {
            function: "memory".into(),
            message: format!("injected failure for {path}"),
        })
    }
}

/// In-process store with the same upsert semantics as the hosted one.
#[derive(Clone, Default)]
pub(crate) struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn fail_always(&self, path: &str) {
        self.lock().failures.insert(path.to_string(), u32::MAX);
    }

    pub fn fail_times(&self, path: &str, times: u32) {
        self.lock().failures.insert(path.to_string(), times);
    }

    pub fn fail_listing(&self) {
        self.lock().fail_listing = true;
    }

    pub fn seed(&self, path: &str, fingerprint: &str) {
        let mut inner = self.lock();
        let now = inner.tick();
        inner.next_id += 1;
        let id = format!("doc{}", inner.next_id);
        inner.entries.insert(
            path.to_string(),
            StoredEntry {
                id,
                title: path.to_string(),
                content: String::new(),
                fingerprint: fingerprint.to_string(),
                category: Category::Document,
                size: 0,
                last_modified: 0,
                created_at: now,
                updated_at: now,
            },
        );
    }

    pub fn entry(&self, path: &str) -> Option<StoredEntry> {
        self.lock().entries.get(path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        self.lock().entries.keys().cloned().collect()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.lock().events.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }
}

impl RemoteStore for MemoryStore {
    async fn get_by_path(&self, path: &str) -> Result<Option<RemoteFile>, StoreError> {
        let mut inner = self.lock();
        inner.calls.push(Call::Get(path.to_string()));
        inner.check(path)?;
        Ok(inner.entries.get(path).map(|entry| RemoteFile {
            id: entry.id.clone(),
            path: path.to_string(),
            title: Some(entry.title.clone()),
            fingerprint: entry.fingerprint.clone(),
            category: Some(entry.category.to_string()),
            last_modified: Some(entry.last_modified),
            size: Some(entry.size),
            updated_at: Some(entry.updated_at),
        }))
    }

    async fn upsert_by_path(&self, request: &UpsertRequest) -> Result<UpsertReply, StoreError> {
        let mut inner = self.lock();
        inner.calls.push(Call::Upsert(request.path.clone()));
        inner.check(&request.path)?;
        let now = inner.tick();

        if let Some(entry) = inner.entries.get_mut(&request.path) {
            if entry.fingerprint == request.fingerprint {
                return Ok(UpsertReply {
                    action: UpsertAction::Unchanged,
                    id: entry.id.clone(),
                });
            }
            entry.title = request.title.clone();
            entry.content = request.content.clone();
            entry.fingerprint = request.fingerprint.clone();
            entry.category = request.category;
            entry.size = request.size;
            entry.last_modified = request.last_modified;
            entry.updated_at = now;
            return Ok(UpsertReply {
                action: UpsertAction::Updated,
                id: entry.id.clone(),
            });
        }

        inner.next_id += 1;
        let id = format!("doc{}", inner.next_id);
        inner.entries.insert(
            request.path.clone(),
            StoredEntry {
                id: id.clone(),
                title: request.title.clone(),
                content: request.content.clone(),
                fingerprint: request.fingerprint.clone(),
                category: request.category,
                size: request.size,
                last_modified: request.last_modified,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(UpsertReply {
            action: UpsertAction::Created,
            id,
        })
    }

    async fn list_all_paths(&self) -> Result<Vec<SyncedPath>, StoreError> {
        let mut inner = self.lock();
        inner.calls.push(Call::List);
        if inner.fail_listing {
            return Err(StoreError::Function {
                function: "memory".into(),
                message: "listing unavailable".into(),
            });
        }
        Ok(inner
            .entries
            .iter()
            .map(|(path, entry)| SyncedPath {
                path: path.clone(),
                fingerprint: entry.fingerprint.clone(),
                updated_at: Some(entry.updated_at),
            })
            .collect())
    }

    async fn delete_by_path(&self, path: &str) -> Result<DeleteReply, StoreError> {
        let mut inner = self.lock();
        inner.calls.push(Call::Delete(path.to_string()));
        inner.check(path)?;
        let deleted = inner.entries.remove(path).is_some();
        Ok(DeleteReply { deleted })
    }

    async fn log_event(&self, event: &LogEvent) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.calls.push(Call::Log);
        inner.events.push(event.clone());
        Ok(())
    }
}
