use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct RepositoryOwner {
    pub login: String,
}

/// Subset of `GET /repos/{owner}/{repo}` used by the engine.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct RepositoryInfo {
    pub name: String,
    pub full_name: String,
    pub owner: RepositoryOwner,
    pub default_branch: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub stargazers_count: u64,
}

/// `GET /search/repositories` response envelope.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RepositorySearchResults {
    pub total_count: u64,
    #[serde(default)]
    pub incomplete_results: bool,
    #[serde(default)]
    pub items: Vec<RepositoryInfo>,
}
