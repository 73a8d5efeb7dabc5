use super::{BlobStore, ContentHash, ensure_addressed};
use crate::error::VaultError;
use ahash::AHashMap;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Process-local blob store, used for tests and dry runs.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<AHashMap<ContentHash, Arc<[u8]>>>,
    writes: AtomicU64,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `put` calls that actually stored new content.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Sorted `(hash, bytes)` pairs, handy for before/after comparisons.
    pub fn snapshot(&self) -> Vec<(ContentHash, Vec<u8>)> {
        let guard = match self.blobs.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut all: Vec<_> = guard.iter().map(|(k, v)| (k.clone(), v.to_vec())).collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, hash: &ContentHash, bytes: &[u8]) -> Result<(), VaultError> {
        ensure_addressed(hash, bytes)?;
        let mut guard = self
            .blobs
            .write()
            .map_err(|_| VaultError::Integrity("memory blob store poisoned".to_string()))?;
        if !guard.contains_key(hash) {
            guard.insert(hash.clone(), Arc::from(bytes));
            self.writes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    async fn get(&self, hash: &ContentHash) -> Result<Vec<u8>, VaultError> {
        let guard = self
            .blobs
            .read()
            .map_err(|_| VaultError::Integrity("memory blob store poisoned".to_string()))?;
        guard
            .get(hash)
            .map(|b| b.to_vec())
            .ok_or_else(|| VaultError::NotFound(format!("blob {hash}")))
    }

    async fn exists(&self, hash: &ContentHash) -> Result<bool, VaultError> {
        let guard = self
            .blobs
            .read()
            .map_err(|_| VaultError::Integrity("memory blob store poisoned".to_string()))?;
        Ok(guard.contains_key(hash))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
