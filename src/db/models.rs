use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

pub type RepositoryId = i64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbRepository {
    pub id: RepositoryId,
    pub owner: String,
    pub name: String,
    pub default_branch: Option<String>,
    /// Comma separated, sorted; use [`DbRepository::topic_list`].
    pub topics: String,
    pub stars: Option<i64>,
    pub discovered_at: DateTime<Utc>,
    pub last_commit_sha: Option<String>,
    pub last_commit_at: Option<DateTime<Utc>>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl DbRepository {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    pub fn topic_list(&self) -> Vec<String> {
        split_topics(&self.topics)
    }

    pub fn has_topic(&self, topic: &str) -> bool {
        self.topic_list().iter().any(|t| t.eq_ignore_ascii_case(topic))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbCommit {
    pub repository_id: RepositoryId,
    pub sha: String,
    pub parent_shas: String,
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
    pub collected_at: DateTime<Utc>,
}

impl DbCommit {
    pub fn parents(&self) -> Vec<&str> {
        self.parent_shas.split_whitespace().collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbCommitFile {
    pub repository_id: RepositoryId,
    pub sha: String,
    pub file_path: String,
    pub previous_path: Option<String>,
    pub file_extension: String,
    pub change_kind: ChangeKind,
    pub lines_added: i64,
    pub lines_removed: i64,
    pub before_hash: Option<String>,
    pub after_hash: Option<String>,
}

impl DbCommitFile {
    /// Path of this file in the parent tree (differs from `file_path` only for renames).
    pub fn before_path(&self) -> &str {
        self.previous_path.as_deref().unwrap_or(&self.file_path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbBlob {
    pub hash: String,
    pub size: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbLastCommit {
    pub repository_id: RepositoryId,
    pub owner: String,
    pub name: String,
    pub sha: String,
    pub committed_at: Option<DateTime<Utc>>,
    pub watermark_sha: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Change kind stored in `commit_files.change_kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
            ChangeKind::Renamed => "renamed",
        }
    }

    pub fn has_before(self) -> bool {
        !matches!(self, ChangeKind::Added)
    }

    pub fn has_after(self) -> bool {
        !matches!(self, ChangeKind::Deleted)
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "added" => Ok(ChangeKind::Added),
            "modified" => Ok(ChangeKind::Modified),
            "deleted" => Ok(ChangeKind::Deleted),
            "renamed" => Ok(ChangeKind::Renamed),
            other => Err(format!("unknown change kind '{other}'")),
        }
    }
}

pub(crate) fn split_topics(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Union of both topic sets, deduplicated and sorted, joined with commas.
pub(crate) fn merge_topics<I, S>(current: &str, extra: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut all: Vec<String> = split_topics(current);
    all.extend(
        extra
            .into_iter()
            .map(|t| t.as_ref().trim().to_string())
            .filter(|t| !t.is_empty()),
    );
    all.sort();
    all.dedup();
    all.join(",")
}
