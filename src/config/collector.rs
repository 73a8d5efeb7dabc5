use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CollectorConfig {
    /// Size of the worker pool; each worker owns one repository at a time.
    /// TOML: `collector.max_workers`. Default: `4`.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Host request budget for one repository's collection run.
    /// TOML: `collector.max_requests_per_repo`. Default: `5000`.
    #[serde(default = "default_max_requests_per_repo")]
    pub max_requests_per_repo: u64,

    /// Commits ingested per run; the rest are picked up next run.
    /// TOML: `collector.max_commits_per_run`. Default: `100`.
    #[serde(default = "default_max_commits_per_run")]
    pub max_commits_per_run: usize,

    /// Only list commits from the last N days when a repository has no watermark yet;
    /// `0` lists the full history. A full first listing must fit in `max_requests_per_repo`,
    /// otherwise every run stops during listing.
    /// TOML: `collector.history_days`. Default: `1`.
    #[serde(default = "default_history_days")]
    pub history_days: u32,

    /// Capacity of the in-process cache of hashes known to exist in the Blob Store.
    /// TOML: `collector.known_blob_cache_capacity`. Default: `100000`.
    #[serde(default = "default_known_blob_cache_capacity")]
    pub known_blob_cache_capacity: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            max_requests_per_repo: default_max_requests_per_repo(),
            max_commits_per_run: default_max_commits_per_run(),
            history_days: default_history_days(),
            known_blob_cache_capacity: default_known_blob_cache_capacity(),
        }
    }
}

fn default_max_workers() -> usize {
    4
}

fn default_max_requests_per_repo() -> u64 {
    5_000
}

fn default_max_commits_per_run() -> usize {
    100
}

fn default_history_days() -> u32 {
    1
}

fn default_known_blob_cache_capacity() -> u64 {
    100_000
}
