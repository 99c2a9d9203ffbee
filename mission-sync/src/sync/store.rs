use std::future::Future;

use mission_core::{
    DeleteReply, LogEvent, RemoteFile, StoreClient, StoreError, SyncedPath, UpsertReply,
    UpsertRequest,
};

/// Keyed document store the engine reconciles against.
///
/// The store must enforce at most one entry per path on insert; the engine
/// reads then writes without a client-side lock.
pub trait RemoteStore {
    fn get_by_path(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<Option<RemoteFile>, StoreError>> + Send;

    fn upsert_by_path(
        &self,
        request: &UpsertRequest,
    ) -> impl Future<Output = Result<UpsertReply, StoreError>> + Send;

    fn list_all_paths(&self) -> impl Future<Output = Result<Vec<SyncedPath>, StoreError>> + Send;

    fn delete_by_path(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<DeleteReply, StoreError>> + Send;

    /// Audit sink. Callers treat failures as non-fatal.
    fn log_event(&self, event: &LogEvent) -> impl Future<Output = Result<(), StoreError>> + Send;
}

impl RemoteStore for StoreClient {
    async fn get_by_path(&self, path: &str) -> Result<Option<RemoteFile>, StoreError> {
        StoreClient::get_by_path(self, path).await
    }

    async fn upsert_by_path(&self, request: &UpsertRequest) -> Result<UpsertReply, StoreError> {
        StoreClient::upsert_by_path(self, request).await
    }

    async fn list_all_paths(&self) -> Result<Vec<SyncedPath>, StoreError> {
        StoreClient::list_all_paths(self).await
    }

    async fn delete_by_path(&self, path: &str) -> Result<DeleteReply, StoreError> {
        StoreClient::delete_by_path(self, path).await
    }

    async fn log_event(&self, event: &LogEvent) -> Result<(), StoreError> {
        StoreClient::log_event(self, event).await
    }
}
