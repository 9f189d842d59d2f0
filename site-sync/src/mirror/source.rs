//! Remote file source: a cursor-paginated delta feed plus a content endpoint.
//!
//! The HTTP client speaks the Dropbox v2 `list_folder` dialect:
//! - `POST {api}/2/files/list_folder` starts a recursive listing
//! - `POST {api}/2/files/list_folder/continue` follows a cursor
//! - `POST {content}/2/files/download` fetches one file

use crate::utils::errors::{Result, SyncError};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Kind of change carried by a delta entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryTag {
    File,
    Folder,
    Deleted,
}

/// One change from the delta feed. `path` is the remote (absolute) path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncEntry {
    #[serde(rename = ".tag")]
    pub tag: EntryTag,

    #[serde(rename = "path_display", alias = "path")]
    pub path: String,
}

impl SyncEntry {
    pub fn new(tag: EntryTag, path: impl Into<String>) -> Self {
        Self {
            tag,
            path: path.into(),
        }
    }
}

/// One page of the delta feed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeltaPage {
    pub entries: Vec<SyncEntry>,
    pub cursor: String,
    pub has_more: bool,
}

#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Request a page of changes. `None` requests a full recursive listing.
    async fn list(&self, cursor: Option<&str>) -> Result<DeltaPage>;

    /// Fetch the bytes of the file at remote `path`.
    async fn fetch(&self, path: &str) -> Result<Bytes>;
}

#[derive(Serialize)]
struct ListFolderArgs<'a> {
    path: &'a str,
    recursive: bool,
}

#[derive(Serialize)]
struct ContinueArgs<'a> {
    cursor: &'a str,
}

#[derive(Serialize)]
struct DownloadArgs<'a> {
    path: &'a str,
}

/// HTTP client for the remote source, authenticated with a bearer token.
pub struct HttpSourceClient {
    client: Client,
    api_url: String,
    content_url: String,
    token: String,
    root: String,
}

impl HttpSourceClient {
    /// `root` is the remote folder whose subtree is listed.
    pub fn new(
        client: Client,
        api_url: impl Into<String>,
        content_url: impl Into<String>,
        token: impl Into<String>,
        root: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            content_url: content_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            root: root.into(),
        }
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

#[async_trait]
impl SourceClient for HttpSourceClient {
    async fn list(&self, cursor: Option<&str>) -> Result<DeltaPage> {
        let request = match cursor {
            Some(cursor) => self
                .client
                .post(format!("{}/2/files/list_folder/continue", self.api_url))
                .json(&ContinueArgs { cursor }),
            None => {
                // The API addresses the account root as "" rather than "/".
                let path = if self.root == "/" { "" } else { self.root.as_str() };
                self.client
                    .post(format!("{}/2/files/list_folder", self.api_url))
                    .json(&ListFolderArgs {
                        path,
                        recursive: true,
                    })
            }
        };

        let response = request.header(AUTHORIZATION, self.bearer()).send().await?;
        let page: DeltaPage = read_json(response, "list_folder").await?;
        debug!(
            "Listed {} entries (has_more: {})",
            page.entries.len(),
            page.has_more
        );
        Ok(page)
    }

    async fn fetch(&self, path: &str) -> Result<Bytes> {
        let arg = header_safe_json(&serde_json::to_string(&DownloadArgs { path })?);
        let response = self
            .client
            .post(format!("{}/2/files/download", self.content_url))
            .header(AUTHORIZATION, self.bearer())
            .header("Dropbox-API-Arg", arg)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(SyncError::Auth(format!("download {} rejected", path)));
        }

        let is_json = is_json(response.headers());
        let body = response.bytes().await?;

        // Errors may arrive as a JSON envelope even with a success status.
        if is_json || !status.is_success() {
            if let Some(message) = error_message(&body) {
                return Err(SyncError::RemoteApplication(format!("{} {}", message, path)));
            }
        }
        if !status.is_success() {
            return Err(SyncError::RemoteApplication(format!(
                "download {} failed with status {}",
                path, status
            )));
        }

        Ok(body)
    }
}

/// Decode a JSON API response, classifying failures.
async fn read_json<T: serde::de::DeserializeOwned>(response: Response, what: &str) -> Result<T> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(SyncError::Auth(format!("{} rejected the access token", what)));
    }

    let is_json = is_json(response.headers());
    let body = response.bytes().await?;

    if let Some(message) = error_message(&body) {
        // A `reset` error means the cursor is no longer valid.
        if message.starts_with("reset") {
            return Err(SyncError::StaleCursor(message));
        }
        return Err(SyncError::RemoteApplication(format!("{} {}", message, what)));
    }
    if !status.is_success() {
        return Err(SyncError::RemoteApplication(format!(
            "{} failed with status {}",
            what, status
        )));
    }
    if !is_json {
        return Err(SyncError::MalformedResponse(format!(
            "{} did not return JSON",
            what
        )));
    }

    serde_json::from_slice(&body)
        .map_err(|e| SyncError::MalformedResponse(format!("{}: {}", what, e)))
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/json"))
        .unwrap_or(false)
}

/// Extract the message of an `{"error": ...}` envelope, if the body is one.
fn error_message(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    let error = value.get("error")?;

    if let Some(summary) = value.get("error_summary").and_then(|v| v.as_str()) {
        return Some(summary.to_string());
    }
    match error {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Object(map) => Some(
            map.get(".tag")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string()),
        ),
        other => Some(other.to_string()),
    }
}

/// Escape non-ASCII characters so JSON can travel in an HTTP header.
fn header_safe_json(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    out
}
