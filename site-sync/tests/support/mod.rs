//! In-memory stand-ins for the remote services, shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use site_sync::build::Builder;
use site_sync::deploy::Remotes;
use site_sync::mirror::source::{DeltaPage, EntryTag, SourceClient, SyncEntry};
use site_sync::publish::store::ObjectStore;
use site_sync::SyncError;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

type Result<T> = std::result::Result<T, SyncError>;

/// A call made against a [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Get(String),
    Put(String),
    Delete(Vec<String>),
    List,
}

/// Object store backed by a map, recording every call.
pub struct MemoryStore {
    name: String,
    objects: Mutex<BTreeMap<String, (Bytes, String)>>,
    calls: Mutex<Vec<StoreCall>>,
    failing_puts: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            objects: Mutex::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
            failing_puts: Mutex::new(HashSet::new()),
        })
    }

    pub fn insert(&self, key: &str, body: &[u8]) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            (Bytes::copy_from_slice(body), "application/octet-stream".to_string()),
        );
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().unwrap().get(key).map(|(b, _)| b.clone())
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects.lock().unwrap().get(key).map(|(_, ct)| ct.clone())
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn put_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                StoreCall::Put(key) => Some(key),
                _ => None,
            })
            .collect();
        keys.sort();
        keys
    }

    pub fn delete_calls(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                StoreCall::Delete(keys) => Some(keys),
                _ => None,
            })
            .collect()
    }

    /// Make every later upload of `key` fail.
    pub fn fail_puts_of(&self, key: &str) {
        self.failing_puts.lock().unwrap().insert(key.to_string());
    }

    pub fn heal(&self) {
        self.failing_puts.lock().unwrap().clear();
    }

    fn record(&self, call: StoreCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.record(StoreCall::Get(key.to_string()));
        Ok(self.object(key))
    }

    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<()> {
        self.record(StoreCall::Put(key.to_string()));
        if self.failing_puts.lock().unwrap().contains(key) {
            return Err(SyncError::RemoteApplication(format!("put {} refused", key)));
        }
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (body, content_type.to_string()));
        Ok(())
    }

    async fn delete_keys(&self, keys: &[String]) -> Result<()> {
        self.record(StoreCall::Delete(keys.to_vec()));
        let mut objects = self.objects.lock().unwrap();
        for key in keys {
            objects.remove(key);
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        self.record(StoreCall::List);
        Ok(self.keys())
    }
}

/// Delta feed answering from scripted pages keyed by the cursor asked for.
#[derive(Default)]
pub struct ScriptedSource {
    pages: Mutex<HashMap<Option<String>, DeltaPage>>,
    stale: Mutex<HashSet<String>>,
    files: Mutex<HashMap<String, Bytes>>,
    list_calls: Mutex<Vec<Option<String>>>,
    fetch_calls: Mutex<Vec<String>>,
}

impl ScriptedSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer `list(cursor)` with `entries`, then `next`.
    pub fn page(&self, cursor: Option<&str>, entries: Vec<SyncEntry>, next: &str, has_more: bool) {
        self.pages.lock().unwrap().insert(
            cursor.map(str::to_string),
            DeltaPage {
                entries,
                cursor: next.to_string(),
                has_more,
            },
        );
    }

    /// Reject `cursor` as expired.
    pub fn stale(&self, cursor: &str) {
        self.stale.lock().unwrap().insert(cursor.to_string());
    }

    pub fn file(&self, path: &str, contents: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), Bytes::copy_from_slice(contents.as_bytes()));
    }

    pub fn list_calls(&self) -> Vec<Option<String>> {
        self.list_calls.lock().unwrap().clone()
    }

    pub fn fetch_calls(&self) -> Vec<String> {
        self.fetch_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceClient for ScriptedSource {
    async fn list(&self, cursor: Option<&str>) -> Result<DeltaPage> {
        self.list_calls.lock().unwrap().push(cursor.map(str::to_string));

        if let Some(cursor) = cursor {
            if self.stale.lock().unwrap().contains(cursor) {
                return Err(SyncError::StaleCursor(format!("reset/ {}", cursor)));
            }
        }

        self.pages
            .lock()
            .unwrap()
            .get(&cursor.map(str::to_string))
            .cloned()
            .ok_or_else(|| SyncError::RemoteApplication(format!("no page for {:?}", cursor)))
    }

    async fn fetch(&self, path: &str) -> Result<Bytes> {
        self.fetch_calls.lock().unwrap().push(path.to_string());
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| SyncError::RemoteApplication(format!("path/not_found/ {}", path)))
    }
}

pub fn file(path: &str) -> SyncEntry {
    SyncEntry::new(EntryTag::File, path)
}

pub fn folder(path: &str) -> SyncEntry {
    SyncEntry::new(EntryTag::Folder, path)
}

pub fn deleted(path: &str) -> SyncEntry {
    SyncEntry::new(EntryTag::Deleted, path)
}

/// Hands out memory stores by name and scripted sources by root.
#[derive(Default)]
pub struct FakeRemotes {
    stores: Mutex<HashMap<String, Arc<MemoryStore>>>,
    sources: Mutex<HashMap<String, Arc<ScriptedSource>>>,
    tokens: Mutex<Vec<String>>,
}

impl FakeRemotes {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn store(&self, name: &str) -> Arc<MemoryStore> {
        self.stores
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_insert_with(|| MemoryStore::new(name))
            .clone()
    }

    pub fn source_for(&self, root: &str) -> Arc<ScriptedSource> {
        self.sources
            .lock()
            .unwrap()
            .entry(root.to_string())
            .or_insert_with(ScriptedSource::new)
            .clone()
    }

    pub fn store_names(&self) -> Vec<String> {
        self.stores.lock().unwrap().keys().cloned().collect()
    }

    /// Tokens the sources were opened with, in order.
    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }
}

impl Remotes for FakeRemotes {
    fn object_store(&self, name: &str) -> Arc<dyn ObjectStore> {
        self.store(name)
    }

    fn source(&self, token: &str, root: &str) -> Arc<dyn SourceClient> {
        self.tokens.lock().unwrap().push(token.to_string());
        self.source_for(root)
    }
}

/// Builder that always fails.
pub struct BrokenBuilder;

#[async_trait]
impl Builder for BrokenBuilder {
    async fn build(&self, _source: &Path, _destination: &Path) -> Result<()> {
        Err(SyncError::Build("generator crashed".to_string()))
    }
}
