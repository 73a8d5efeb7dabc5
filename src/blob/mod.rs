//! Content-addressed Blob Store adapter.
//!
//! Blobs are keyed by the hex SHA-256 of their raw bytes. Backends expose only
//! `put`/`get`/`exists`; content addressing makes update and delete meaningless.

mod fs;
mod memory;
mod s3;
mod sigv4;

pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;
pub use s3::S3BlobStore;

use crate::config::BlobStoreConfig;
use crate::error::VaultError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Hex SHA-256 digest of a blob's raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Accepts a 64-character hex digest (any case) as read back from the catalog.
    pub fn parse(hex: &str) -> Result<Self, VaultError> {
        if hex.len() == 64 && hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Self(hex.to_ascii_lowercase()))
        } else {
            Err(VaultError::Integrity(format!(
                "malformed content hash '{hex}'"
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First two hex digits, used to spread objects across directories/prefixes.
    pub fn shard(&self) -> &str {
        &self.0[..2]
    }

    pub fn matches(&self, bytes: &[u8]) -> bool {
        Self::of(bytes) == *self
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `hash`. Idempotent; rewriting identical content is harmless.
    async fn put(&self, hash: &ContentHash, bytes: &[u8]) -> Result<(), VaultError>;

    /// Fetch the bytes stored under `hash`; `NotFound` if absent.
    async fn get(&self, hash: &ContentHash) -> Result<Vec<u8>, VaultError>;

    async fn exists(&self, hash: &ContentHash) -> Result<bool, VaultError>;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

/// Rejects payloads whose digest differs from the key they are stored under.
pub(crate) fn ensure_addressed(hash: &ContentHash, bytes: &[u8]) -> Result<(), VaultError> {
    if hash.matches(bytes) {
        Ok(())
    } else {
        Err(VaultError::Integrity(format!(
            "payload of {} bytes does not hash to {hash}",
            bytes.len()
        )))
    }
}

/// Build the configured backend.
pub async fn open(cfg: &BlobStoreConfig) -> Result<Arc<dyn BlobStore>, VaultError> {
    let store: Arc<dyn BlobStore> = match cfg {
        BlobStoreConfig::Fs { root } => Arc::new(FsBlobStore::open(root.clone()).await?),
        BlobStoreConfig::S3(s3) => Arc::new(S3BlobStore::new(s3.clone())?),
    };
    tracing::info!(blob_store = %store.describe(), "Blob store ready");
    Ok(store)
}
