use serde::{Deserialize, Serialize};

/// Error payload returned by the host on non-2xx responses.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct GithubErrorBody {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation_url: Option<String>,
}

impl GithubErrorBody {
    /// Secondary and primary rate limits both come back as 403/429 with a message like
    /// "API rate limit exceeded for ..." or "You have exceeded a secondary rate limit".
    pub fn mentions_rate_limit(&self) -> bool {
        self.message.to_ascii_lowercase().contains("rate limit")
    }
}
