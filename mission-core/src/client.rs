use std::fmt;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::metadata::Metadata;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const FN_SYNC_FILE: &str = "sync/syncFile";
const FN_GET_BY_PATH: &str = "sync/getByPath";
const FN_LIST_PATHS: &str = "sync/getAllSyncedPaths";
const FN_DELETE_FILE: &str = "sync/deleteFile";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("{function} failed: {message}")]
    Function { function: String, message: String },
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Auth,
    RateLimit,
    Transient,
    Permanent,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorClass::Auth => "auth",
            ErrorClass::RateLimit => "rate-limit",
            ErrorClass::Transient => "transient",
            ErrorClass::Permanent => "permanent",
        })
    }
}

/// HTTP client for the store's function-call API.
///
/// Queries and mutations are posted as `{"path", "args", "format"}` to
/// `/api/query` and `/api/mutation` on the deployment URL; audit events go to
/// `/log` on the site URL.
#[derive(Clone)]
pub struct StoreClient {
    http: Client,
    base_url: Url,
    site_url: Url,
    deploy_key: Option<String>,
}

impl StoreClient {
    pub fn new(base_url: &str, site_url: &str) -> Result<Self, StoreError> {
        Self::with_timeout(base_url, site_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: &str,
        site_url: &str,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            http: Client::builder().timeout(timeout).build()?,
            base_url: Url::parse(base_url)?,
            site_url: Url::parse(site_url)?,
            deploy_key: None,
        })
    }

    pub fn with_deploy_key(mut self, key: impl Into<String>) -> Self {
        self.deploy_key = Some(key.into());
        self
    }

    pub async fn upsert_by_path(&self, request: &UpsertRequest) -> Result<UpsertReply, StoreError> {
        self.mutation(FN_SYNC_FILE, request).await
    }

    pub async fn get_by_path(&self, path: &str) -> Result<Option<RemoteFile>, StoreError> {
        self.query(FN_GET_BY_PATH, PathArgs { path }).await
    }

    pub async fn list_all_paths(&self) -> Result<Vec<SyncedPath>, StoreError> {
        let paths: Option<Vec<SyncedPath>> = self.query(FN_LIST_PATHS, EmptyArgs {}).await?;
        Ok(paths.unwrap_or_default())
    }

    pub async fn delete_by_path(&self, path: &str) -> Result<DeleteReply, StoreError> {
        self.mutation(FN_DELETE_FILE, PathArgs { path }).await
    }

    pub async fn log_event(&self, event: &LogEvent) -> Result<(), StoreError> {
        let url = self.site_url.join("/log")?;
        let response = self.http.post(url).json(event).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Api { status, body })
    }

    async fn query<A: Serialize, T: DeserializeOwned>(
        &self,
        function: &str,
        args: A,
    ) -> Result<T, StoreError> {
        self.call("/api/query", function, args).await
    }

    async fn mutation<A: Serialize, T: DeserializeOwned>(
        &self,
        function: &str,
        args: A,
    ) -> Result<T, StoreError> {
        self.call("/api/mutation", function, args).await
    }

    async fn call<A: Serialize, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        function: &str,
        args: A,
    ) -> Result<T, StoreError> {
        let url = self.base_url.join(endpoint)?;
        let mut request = self.http.post(url).json(&FunctionCall {
            path: function,
            args,
            format: "json",
        });
        if let Some(key) = &self.deploy_key {
            request = request.header("Authorization", format!("Convex {key}"));
        }
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(StoreError::Api { status, body });
        }
        decode_reply(function, &body)
    }
}

/// Unwraps the `{"status": "success", "value": ..}` envelope when present;
/// bare values are decoded as-is.
fn decode_reply<T: DeserializeOwned>(function: &str, body: &str) -> Result<T, StoreError> {
    let reply: Value = serde_json::from_str(body)?;
    let payload = match reply.get("status").and_then(Value::as_str) {
        Some("success") => reply.get("value").cloned().unwrap_or(Value::Null),
        Some("error") => {
            let message = reply
                .get("errorMessage")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(StoreError::Function {
                function: function.to_string(),
                message,
            });
        }
        _ => reply,
    };
    Ok(serde_json::from_value(payload)?)
}

impl StoreError {
    pub fn classification(&self) -> ErrorClass {
        match self {
            StoreError::Api { status, .. } => classify_api_status(*status),
            StoreError::Request(_) | StoreError::Decode(_) => ErrorClass::Transient,
            StoreError::Url(_) | StoreError::Function { .. } => ErrorClass::Permanent,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.classification(),
            ErrorClass::RateLimit | ErrorClass::Transient
        )
    }
}

fn classify_api_status(status: StatusCode) -> ErrorClass {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ErrorClass::Auth
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ErrorClass::RateLimit
    } else if status.is_server_error()
        || matches!(
            status,
            StatusCode::REQUEST_TIMEOUT | StatusCode::CONFLICT | StatusCode::TOO_EARLY
        )
    {
        ErrorClass::Transient
    } else {
        ErrorClass::Permanent
    }
}

#[derive(Serialize)]
struct FunctionCall<'a, A> {
    path: &'a str,
    args: A,
    format: &'static str,
}

#[derive(Serialize)]
struct PathArgs<'a> {
    path: &'a str,
}

#[derive(Serialize)]
struct EmptyArgs {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Memory,
    Document,
    Config,
    Project,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Memory => "memory",
            Category::Document => "document",
            Category::Config => "config",
            Category::Project => "project",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertRequest {
    pub path: String,
    pub title: String,
    pub content: String,
    #[serde(rename = "hash")]
    pub fingerprint: String,
    pub category: Category,
    pub last_modified: i64,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertAction {
    Created,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpsertReply {
    pub action: UpsertAction,
    pub id: String,
}

/// Store-side view of a synced file as returned by the path lookup.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub path: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(rename = "hash")]
    pub fingerprint: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "millis")]
    pub last_modified: Option<i64>,
    #[serde(default, deserialize_with = "byte_count")]
    pub size: Option<u64>,
    #[serde(default, deserialize_with = "millis")]
    pub updated_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncedPath {
    pub path: String,
    #[serde(rename = "hash")]
    pub fingerprint: String,
    #[serde(default, deserialize_with = "millis")]
    pub updated_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DeleteReply {
    pub deleted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventResult {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub action_type: String,
    pub details: String,
    pub result: EventResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

// The store keeps every number as a float64, so integral fields may come back
// as `12.0` or with a fractional millisecond part.
fn millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.map(|value| value as i64))
}

fn byte_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.map(|value| value.max(0.0) as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_unwraps_success_envelope() {
        let reply: UpsertReply = decode_reply(
            FN_SYNC_FILE,
            r#"{"status":"success","value":{"action":"created","id":"abc"}}"#,
        )
        .unwrap();
        assert_eq!(reply.action, UpsertAction::Created);
        assert_eq!(reply.id, "abc");
    }

    #[test]
    fn decode_accepts_bare_value() {
        let reply: DeleteReply = decode_reply(FN_DELETE_FILE, r#"{"deleted":true}"#).unwrap();
        assert!(reply.deleted);
    }

    #[test]
    fn decode_maps_error_envelope_to_function_error() {
        let err = decode_reply::<DeleteReply>(
            FN_DELETE_FILE,
            r#"{"status":"error","errorMessage":"boom"}"#,
        )
        .unwrap_err();
        match err {
            StoreError::Function { function, message } => {
                assert_eq!(function, FN_DELETE_FILE);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn decode_rejects_unknown_action() {
        let err =
            decode_reply::<UpsertReply>(FN_SYNC_FILE, r#"{"action":"exploded","id":"x"}"#)
                .unwrap_err();
        assert!(matches!(err, StoreError::Decode(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn remote_file_accepts_float_numbers() {
        let file: RemoteFile = serde_json::from_str(
            r#"{"_id":"1","path":"a.md","hash":"h","size":12.0,"lastModified":1700000000000.5}"#,
        )
        .unwrap();
        assert_eq!(file.size, Some(12));
        assert_eq!(file.last_modified, Some(1_700_000_000_000));
        assert_eq!(file.updated_at, None);
    }

    #[test]
    fn classifies_statuses() {
        assert_eq!(
            classify_api_status(StatusCode::UNAUTHORIZED),
            ErrorClass::Auth
        );
        assert_eq!(
            classify_api_status(StatusCode::TOO_MANY_REQUESTS),
            ErrorClass::RateLimit
        );
        assert_eq!(
            classify_api_status(StatusCode::BAD_GATEWAY),
            ErrorClass::Transient
        );
        assert_eq!(
            classify_api_status(StatusCode::BAD_REQUEST),
            ErrorClass::Permanent
        );
    }

    #[test]
    fn upsert_request_uses_wire_names() {
        let request = UpsertRequest {
            path: "memory/note.md".into(),
            title: "note".into(),
            content: "hi".into(),
            fingerprint: "49f68a5c8493ec2c0bf489821c21fc3b".into(),
            category: Category::Memory,
            last_modified: 5,
            size: 2,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["hash"], "49f68a5c8493ec2c0bf489821c21fc3b");
        assert_eq!(value["lastModified"], 5);
        assert_eq!(value["category"], "memory");
    }
}
