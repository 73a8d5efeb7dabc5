use super::models::{ChangeKind, RepositoryId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payload for registering a repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRepository {
    pub owner: String,
    pub name: String,
    pub topics: Vec<String>,
    pub default_branch: Option<String>,
    pub stars: Option<i64>,
}

/// Outcome of a registration; `created` is false when the repository was already known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub id: RepositoryId,
    pub created: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryFilter {
    /// Case-insensitive topic match.
    pub topic: Option<String>,
    pub owner: Option<String>,
}

impl RepositoryFilter {
    pub fn topic(topic: impl Into<String>) -> Self {
        Self {
            topic: Some(topic.into()),
            owner: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRecord {
    pub hash: String,
    pub size: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCommit {
    pub sha: String,
    pub parent_shas: Vec<String>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub committer_name: Option<String>,
    pub committer_email: Option<String>,
    pub message: String,
    pub authored_at: Option<DateTime<Utc>>,
    pub committed_at: Option<DateTime<Utc>>,
    pub files_changed: i64,
    pub lines_added: i64,
    pub lines_removed: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCommitFile {
    pub file_path: String,
    pub previous_path: Option<String>,
    pub change_kind: ChangeKind,
    pub lines_added: i64,
    pub lines_removed: i64,
    pub before_hash: Option<String>,
    pub after_hash: Option<String>,
}

impl NewCommitFile {
    pub fn file_extension(&self) -> String {
        file_extension(&self.file_path)
    }
}

/// Everything written for one commit in a single transaction, including the watermark move
/// from `expected_watermark` to `commit.sha`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRecord {
    pub repository_id: RepositoryId,
    pub expected_watermark: Option<String>,
    pub commit: NewCommit,
    pub files: Vec<NewCommitFile>,
    pub blobs: Vec<BlobRecord>,
}

/// Lower-cased extension without the dot; empty for dotfiles and extensionless names.
pub(crate) fn file_extension(path: &str) -> String {
    let base = path.rsplit('/').next().unwrap_or(path);
    match base.rfind('.') {
        Some(0) | None => String::new(),
        Some(idx) => base[idx + 1..].to_ascii_lowercase(),
    }
}
