use crate::db::RepositoryId;
use crate::error::VaultError;
use serde::Serialize;

/// Why a collection run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Caught up with the host.
    Completed,
    /// `max_commits_per_run` reached; newer commits wait for the next run.
    CommitCap,
    BudgetExhausted,
    RateLimited,
    Cancelled,
    /// A non-recoverable error aborted this repository's run.
    Failed,
}

impl StopReason {
    pub fn from_error(err: &VaultError) -> Self {
        match err {
            VaultError::BudgetExhausted => StopReason::BudgetExhausted,
            VaultError::RateLimitExceeded { .. } | VaultError::RateLimitWaitTooLong { .. } => {
                StopReason::RateLimited
            }
            VaultError::Cancelled => StopReason::Cancelled,
            _ => StopReason::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionError {
    /// Commit being ingested when the error happened; `None` during listing.
    pub sha: Option<String>,
    pub kind: &'static str,
    pub message: String,
}

/// Result of one `collect` run for one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionReport {
    pub repository_id: RepositoryId,
    pub repository: String,
    pub commits_added: usize,
    pub files_added: usize,
    pub blobs_written: usize,
    pub errors: Vec<CollectionError>,
    pub stop: StopReason,
    pub watermark_before: Option<String>,
    pub watermark_after: Option<String>,
    /// Listed commits left for a later run.
    pub pending: usize,
    pub requests_used: u64,
}

impl CollectionReport {
    pub(crate) fn new(
        repository_id: RepositoryId,
        repository: String,
        watermark: Option<String>,
    ) -> Self {
        Self {
            repository_id,
            repository,
            commits_added: 0,
            files_added: 0,
            blobs_written: 0,
            errors: Vec::new(),
            stop: StopReason::Completed,
            watermark_before: watermark.clone(),
            watermark_after: watermark,
            pending: 0,
            requests_used: 0,
        }
    }

    /// Record the error that ended the run. Budget and cancellation stops are not errors.
    pub(crate) fn stop_with(&mut self, sha: Option<String>, err: &VaultError) {
        self.stop = StopReason::from_error(err);
        if !matches!(
            self.stop,
            StopReason::BudgetExhausted | StopReason::Cancelled
        ) {
            self.errors.push(CollectionError {
                sha,
                kind: err.kind(),
                message: err.to_string(),
            });
        }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}
