use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct GitSignature {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct CommitMeta {
    #[serde(default)]
    pub author: Option<GitSignature>,
    #[serde(default)]
    pub committer: Option<GitSignature>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ParentRef {
    pub sha: String,
}

/// One element of `GET /repos/{owner}/{repo}/commits` (newest first).
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct CommitEntry {
    pub sha: String,
    pub commit: CommitMeta,
    #[serde(default)]
    pub parents: Vec<ParentRef>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct CommitStats {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
}

/// Per-file change status as reported by the host.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Added,
    Removed,
    Modified,
    Renamed,
    Copied,
    Changed,
    Unchanged,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct CommitFileEntry {
    pub filename: String,
    pub status: FileStatus,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
    #[serde(default)]
    pub changes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_filename: Option<String>,
}

/// `GET /repos/{owner}/{repo}/commits/{sha}`; `files` is paginated for large commits.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct CommitDetail {
    pub sha: String,
    pub commit: CommitMeta,
    #[serde(default)]
    pub parents: Vec<ParentRef>,
    #[serde(default)]
    pub stats: CommitStats,
    #[serde(default)]
    pub files: Vec<CommitFileEntry>,
}

impl CommitDetail {
    pub fn first_parent(&self) -> Option<&str> {
        self.parents.first().map(|p| p.sha.as_str())
    }
}
