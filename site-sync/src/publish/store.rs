//! Flat-key object store client.
//!
//! Wire format (path-style addressing):
//! - `GET    {endpoint}/{store}/{key}`      → bytes, or 404
//! - `PUT    {endpoint}/{store}/{key}`      with `Content-Type`
//! - `POST   {endpoint}/{store}?delete`     `{"keys": [..]}` → `{"deleted": [..], "errors": [..]}`
//! - `GET    {endpoint}/{store}?list`       → `{"keys": [..], "next_token": ..}`

use crate::utils::errors::{io_err, Result, SyncError};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

/// Most keys accepted by a single batch delete call.
pub const MAX_DELETE_KEYS: usize = 1000;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the store (bucket).
    fn name(&self) -> &str;

    /// Fetch an object. A missing key is `Ok(None)`.
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<()>;

    /// Upload a local file. The default reads the file into memory.
    async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> Result<()> {
        let body = tokio::fs::read(path).await.map_err(|e| io_err(path, e))?;
        self.put(key, Bytes::from(body), content_type).await
    }

    /// Delete up to [`MAX_DELETE_KEYS`] keys in one call.
    async fn delete_keys(&self, keys: &[String]) -> Result<()>;

    /// Every key in the store.
    async fn list(&self) -> Result<Vec<String>>;
}

/// Delete `keys` in as many calls as the per-call limit requires.
///
/// An empty list makes no call at all.
pub async fn delete_batch(store: &dyn ObjectStore, keys: &[String]) -> Result<()> {
    if keys.is_empty() {
        debug!("Nothing to delete in {}", store.name());
        return Ok(());
    }

    for chunk in keys.chunks(MAX_DELETE_KEYS) {
        store.delete_keys(chunk).await?;
    }

    info!("Deleted {} keys from {}", keys.len(), store.name());
    Ok(())
}

/// Content type for a key, guessed from its extension.
pub fn content_type_for(key: &str) -> String {
    mime_guess::from_path(key)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

#[derive(Serialize)]
struct DeleteRequest<'a> {
    keys: &'a [String],
}

#[derive(Debug, Deserialize)]
struct DeleteResponse {
    #[serde(default)]
    deleted: Vec<String>,
    #[serde(default)]
    errors: Vec<DeleteFailure>,
}

#[derive(Debug, Deserialize)]
struct DeleteFailure {
    key: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    keys: Vec<String>,
    #[serde(default)]
    next_token: Option<String>,
}

/// HTTP object store client for one named store.
pub struct HttpObjectStore {
    client: Client,
    endpoint: String,
    name: String,
}

impl HttpObjectStore {
    pub fn new(client: Client, endpoint: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            name: name.into(),
        }
    }

    fn url(&self, key: Option<&str>) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| SyncError::Config(format!("invalid store endpoint {}: {}", self.endpoint, e)))?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                SyncError::Config(format!("store endpoint {} cannot carry a path", self.endpoint))
            })?;
            segments.pop_if_empty().push(&self.name);
            if let Some(key) = key {
                segments.extend(key.split('/'));
            }
        }
        Ok(url)
    }

    fn store_url(&self) -> Result<Url> {
        self.url(None)
    }

    fn object_url(&self, key: &str) -> Result<Url> {
        self.url(Some(key))
    }

    fn store_url_with(&self, query: &str) -> Result<Url> {
        let mut url = self.store_url()?;
        url.set_query(Some(query));
        Ok(url)
    }
}

/// Fail on non-success statuses, classifying auth failures.
async fn check_status(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(SyncError::Auth(format!("{}: {} {}", what, status, text)))
        }
        _ => Err(SyncError::RemoteApplication(format!(
            "{} failed with status {}: {}",
            what, status, text
        ))),
    }
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response, what: &str) -> Result<T> {
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| SyncError::MalformedResponse(format!("{}: {}", what, e)))
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let response = self.client.get(self.object_url(key)?).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = check_status(response, &format!("get {}", key)).await?;
        Ok(Some(response.bytes().await?))
    }

    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<()> {
        let response = self
            .client
            .put(self.object_url(key)?)
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;

        check_status(response, &format!("put {}", key)).await?;
        debug!("Uploaded {} to {}", key, self.name);
        Ok(())
    }

    async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> Result<()> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| io_err(path, e))?;
        let length = file
            .metadata()
            .await
            .map_err(|e| io_err(path, e))?
            .len();
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));

        let response = self
            .client
            .put(self.object_url(key)?)
            .header(CONTENT_TYPE, content_type)
            .header(reqwest::header::CONTENT_LENGTH, length)
            .body(body)
            .send()
            .await?;

        check_status(response, &format!("put {}", key)).await?;
        debug!("Uploaded {} ({} bytes) to {}", key, length, self.name);
        Ok(())
    }

    async fn delete_keys(&self, keys: &[String]) -> Result<()> {
        let response = self
            .client
            .post(self.store_url_with("delete")?)
            .json(&DeleteRequest { keys })
            .send()
            .await?;

        let response = check_status(response, "batch delete").await?;
        let result: DeleteResponse = decode(response, "batch delete").await?;

        if let Some(first) = result.errors.first() {
            return Err(SyncError::RemoteApplication(format!(
                "batch delete failed for {} of {} keys (first: {} {})",
                result.errors.len(),
                keys.len(),
                first.key,
                first.message
            )));
        }

        debug!("Deleted {} keys from {}", result.deleted.len(), self.name);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let mut request = self.client.get(self.store_url_with("list")?);
            if let Some(token) = &token {
                request = request.query(&[("token", token)]);
            }

            let response = check_status(request.send().await?, "list").await?;
            let mut page: ListResponse = decode(response, "list").await?;
            keys.append(&mut page.keys);

            match page.next_token {
                Some(next) if !next.is_empty() => token = Some(next),
                _ => break,
            }
        }

        Ok(keys)
    }
}
