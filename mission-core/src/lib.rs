mod client;
mod metadata;

pub use client::{
    Category, DeleteReply, ErrorClass, EventResult, LogEvent, RemoteFile, StoreClient, StoreError,
    SyncedPath, UpsertAction, UpsertReply, UpsertRequest,
};
pub use metadata::{Metadata, MetadataValue};
