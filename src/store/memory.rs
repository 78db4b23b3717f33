//! In-memory object store
//!
//! Objects live in a map keyed by object key. Individual keys can be marked
//! to fail so tests can check how one bad item affects a batch.

use super::{partial_path, ObjectEntry, ObjectStore, StoreError, StoreResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// In-memory implementation of [`ObjectStore`]
#[derive(Debug, Clone)]
pub struct MemoryStore {
    bucket: String,
    objects: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
    failing: Arc<RwLock<HashSet<String>>>,
    puts: Arc<AtomicUsize>,
}

impl MemoryStore {
    /// Create an empty store bound to `bucket`
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: Arc::new(RwLock::new(BTreeMap::new())),
            failing: Arc::new(RwLock::new(HashSet::new())),
            puts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Seed an object
    pub fn insert(&self, key: impl Into<String>, data: &[u8]) {
        if let Ok(mut objects) = self.objects.write() {
            objects.insert(key.into(), data.to_vec());
        }
    }

    /// Make every operation on `key` fail
    pub fn fail_on(&self, key: impl Into<String>) {
        if let Ok(mut failing) = self.failing.write() {
            failing.insert(key.into());
        }
    }

    /// Object contents, if present
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.read().ok()?.get(key).cloned()
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.read().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of successful `put_file` calls so far
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    fn check_failure(&self, key: &str) -> StoreResult<()> {
        let failing = self
            .failing
            .read()
            .map_err(|_| StoreError::Sdk("failure set lock poisoned".to_string()))?;
        if failing.contains(key) {
            return Err(StoreError::Injected(key.to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new("cdm")
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.check_failure(key)?;
        let objects = self
            .objects
            .read()
            .map_err(|_| StoreError::Sdk("object map lock poisoned".to_string()))?;
        Ok(objects.contains_key(key))
    }

    async fn put_file(&self, local_path: &Path, key: &str) -> StoreResult<()> {
        self.check_failure(key)?;
        let data = tokio::fs::read(local_path).await?;
        let mut objects = self
            .objects
            .write()
            .map_err(|_| StoreError::Sdk("object map lock poisoned".to_string()))?;
        objects.insert(key.to_string(), data);
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_file(&self, key: &str, local_path: &Path) -> StoreResult<()> {
        self.check_failure(key)?;
        let data = self.get(key).ok_or_else(|| StoreError::NotFound {
            bucket: self.bucket.clone(),
            key: key.to_string(),
        })?;

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let partial = partial_path(local_path);
        tokio::fs::write(&partial, &data).await?;
        tokio::fs::rename(&partial, local_path).await?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectEntry>> {
        let objects = self
            .objects
            .read()
            .map_err(|_| StoreError::Sdk("object map lock poisoned".to_string()))?;
        Ok(objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, data)| ObjectEntry {
                key: key.clone(),
                size: data.len() as u64,
            })
            .collect())
    }
}
