//! Snapshot Restorer: replays the recorded before/after contents of one commit.
//!
//! Read-only; never contacts the host. A commit present in the catalog is complete, so every
//! hash it references must resolve in the Blob Store: a missing or corrupt blob is an
//! `Integrity` error, never an absent file.

use crate::blob::{BlobStore, ContentHash};
use crate::db::{CatalogHandle, DbCommitFile, RepositoryId};
use crate::error::VaultError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info};

/// Which side of a commit to restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// The files as of the commit's (first) parent.
    Before,
    /// The files as of the commit itself.
    After,
}

impl Direction {
    /// Path and content hash this file contributes to the snapshot, if any.
    fn side<'a>(self, file: &'a DbCommitFile) -> Option<(&'a str, &'a str)> {
        match self {
            Direction::Before => file
                .before_hash
                .as_deref()
                .map(|hash| (file.before_path(), hash)),
            Direction::After => file
                .after_hash
                .as_deref()
                .map(|hash| (file.file_path.as_str(), hash)),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Before => "before",
            Direction::After => "after",
        })
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "before" => Ok(Direction::Before),
            "after" => Ok(Direction::After),
            other => Err(format!("unknown direction '{other}' (expected before|after)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredFile {
    pub path: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone)]
pub struct Restorer {
    catalog: CatalogHandle,
    blobs: Arc<dyn BlobStore>,
}

impl Restorer {
    pub fn new(catalog: CatalogHandle, blobs: Arc<dyn BlobStore>) -> Self {
        Self { catalog, blobs }
    }

    /// The snapshot of `sha` in `direction`, sorted by path.
    pub async fn restore(
        &self,
        repository_id: RepositoryId,
        sha: &str,
        direction: Direction,
    ) -> Result<Vec<RestoredFile>, VaultError> {
        if self
            .catalog
            .get_commit(repository_id, sha)
            .await?
            .is_none()
        {
            return Err(VaultError::NotFound(format!(
                "commit {sha} in repository {repository_id}"
            )));
        }

        let files = self.catalog.list_commit_files(repository_id, sha).await?;
        let mut restored = Vec::with_capacity(files.len());
        for file in &files {
            let Some((path, hash)) = direction.side(file) else {
                continue;
            };
            let bytes = self.load(repository_id, sha, path, hash).await?;
            restored.push(RestoredFile {
                path: path.to_string(),
                bytes,
            });
        }
        restored.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(restored)
    }

    /// Write the snapshot under `dest`, returning the number of files written.
    ///
    /// Every path is checked before anything is written; absolute paths and `..` are rejected.
    pub async fn restore_into(
        &self,
        repository_id: RepositoryId,
        sha: &str,
        direction: Direction,
        dest: &Path,
    ) -> Result<usize, VaultError> {
        let files = self.restore(repository_id, sha, direction).await?;
        let targets = files
            .iter()
            .map(|file| Ok((dest.join(relative_path(&file.path)?), file)))
            .collect::<Result<Vec<_>, VaultError>>()?;

        tokio::fs::create_dir_all(dest).await?;
        for (target, file) in &targets {
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(target, &file.bytes).await?;
        }

        info!(
            repository_id,
            sha,
            %direction,
            files = targets.len(),
            dest = %dest.display(),
            "Snapshot restored"
        );
        Ok(targets.len())
    }

    async fn load(
        &self,
        repository_id: RepositoryId,
        sha: &str,
        path: &str,
        hash: &str,
    ) -> Result<Vec<u8>, VaultError> {
        let integrity = |detail: String| {
            error!(repository_id, sha, path, hash, "Catalog and blob store disagree: {detail}");
            VaultError::Integrity(format!("{path} at {sha}: {detail}"))
        };

        let hash = ContentHash::parse(hash).map_err(|e| integrity(e.to_string()))?;
        let bytes = match self.blobs.get(&hash).await {
            Ok(bytes) => bytes,
            Err(VaultError::NotFound(_)) => {
                return Err(integrity(format!("blob {hash} is missing")));
            }
            Err(e) => return Err(e),
        };

        if !hash.matches(&bytes) {
            return Err(integrity(format!("blob {hash} content does not match its hash")));
        }
        Ok(bytes)
    }
}

/// Relative, traversal-free form of a recorded file path.
pub(crate) fn relative_path(path: &str) -> Result<PathBuf, VaultError> {
    let raw = Path::new(path);
    if raw.is_absolute() {
        return Err(VaultError::InvalidPath(format!("absolute path '{path}'")));
    }

    let mut clean = PathBuf::new();
    for component in raw.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(VaultError::InvalidPath(format!(
                    "path '{path}' escapes the destination"
                )));
            }
        }
    }

    if clean.as_os_str().is_empty() {
        return Err(VaultError::InvalidPath(format!("empty path '{path}'")));
    }
    Ok(clean)
}
