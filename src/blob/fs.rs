use super::{BlobStore, ContentHash, ensure_addressed};
use crate::error::VaultError;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

/// Blob store on a local directory:
///
/// ```text
/// <root>/
///   2c/2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824
///   tmp/
/// ```
///
/// Writes land in `tmp/` first and are renamed into place, so readers never observe a
/// partially written blob and concurrent duplicate writes settle on identical content.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub async fn open(root: PathBuf) -> Result<Self, VaultError> {
        fs::create_dir_all(root.join("tmp")).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, hash: &ContentHash) -> PathBuf {
        self.root.join(hash.shard()).join(hash.as_str())
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, hash: &ContentHash, bytes: &[u8]) -> Result<(), VaultError> {
        ensure_addressed(hash, bytes)?;

        let target = self.object_path(hash);
        if fs::try_exists(&target).await? {
            return Ok(());
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        let tmp = self.root.join("tmp").join(Uuid::new_v4().to_string());
        fs::write(&tmp, bytes).await?;
        if let Err(e) = fs::rename(&tmp, &target).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!(hash = %hash, size = bytes.len(), "Blob written");
        Ok(())
    }

    async fn get(&self, hash: &ContentHash) -> Result<Vec<u8>, VaultError> {
        match fs::read(self.object_path(hash)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(VaultError::NotFound(format!("blob {hash}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, hash: &ContentHash) -> Result<bool, VaultError> {
        Ok(fs::try_exists(self.object_path(hash)).await?)
    }

    fn describe(&self) -> String {
        format!("fs:{}", self.root.display())
    }
}
