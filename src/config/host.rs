use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Remote host API settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostConfig {
    /// Base URL of the host REST API.
    /// TOML: `host.api_url`. Default: `https://api.github.com`.
    #[serde(default = "default_api_url")]
    pub api_url: Url,

    /// API token. Falls back to the `GITHUB_TOKEN` env var when unset.
    /// TOML: `host.token`.
    #[serde(default)]
    pub token: Option<String>,

    /// Optional HTTP proxy for the reqwest client.
    /// TOML: `host.proxy`. Example: `http://127.0.0.1:1080`.
    #[serde(default)]
    pub proxy: Option<Url>,

    /// TOML: `host.user_agent`. Default: `commitvault/<version>`.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Allow HTTP/2 multiplexing; disabled forces HTTP/1.
    /// TOML: `host.enable_multiplexing`. Default: `true`.
    #[serde(default = "default_enable_multiplexing")]
    pub enable_multiplexing: bool,

    /// Max retry attempts per request for transient failures.
    /// TOML: `host.retry_max_times`. Default: `3`.
    #[serde(default = "default_retry_max_times")]
    pub retry_max_times: usize,

    /// TOML: `host.retry_min_delay_ms`. Default: `500`.
    #[serde(default = "default_retry_min_delay_ms")]
    pub retry_min_delay_ms: u64,

    /// TOML: `host.retry_max_delay_ms`. Default: `8000`.
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// TOML: `host.request_timeout_secs`. Default: `30`.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Client-side pacing shared by every worker.
    /// TOML: `host.requests_per_second`. Default: `10`.
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Below this many remaining requests the limiter waits for the host's reset time.
    /// TOML: `host.rate_limit_threshold`. Default: `50`.
    #[serde(default = "default_rate_limit_threshold")]
    pub rate_limit_threshold: u64,

    /// Longest suspension accepted before giving up with `RateLimitWaitTooLong`.
    /// TOML: `host.max_rate_limit_wait_secs`. Default: `3600`.
    #[serde(default = "default_max_rate_limit_wait_secs")]
    pub max_rate_limit_wait_secs: u64,

    /// Page size for listing endpoints (host maximum is 100).
    /// TOML: `host.per_page`. Default: `100`.
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token: None,
            proxy: None,
            user_agent: default_user_agent(),
            enable_multiplexing: default_enable_multiplexing(),
            retry_max_times: default_retry_max_times(),
            retry_min_delay_ms: default_retry_min_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            requests_per_second: default_requests_per_second(),
            rate_limit_threshold: default_rate_limit_threshold(),
            max_rate_limit_wait_secs: default_max_rate_limit_wait_secs(),
            per_page: default_per_page(),
        }
    }
}

impl HostConfig {
    pub fn resolved_token(&self) -> Option<String> {
        self.token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
            .filter(|t| !t.trim().is_empty())
    }

    pub fn max_rate_limit_wait(&self) -> Duration {
        Duration::from_secs(self.max_rate_limit_wait_secs)
    }
}

fn default_api_url() -> Url {
    Url::parse("https://api.github.com").expect("valid default api url")
}

fn default_user_agent() -> String {
    format!("commitvault/{}", env!("CARGO_PKG_VERSION"))
}

fn default_enable_multiplexing() -> bool {
    true
}

fn default_retry_max_times() -> usize {
    3
}

fn default_retry_min_delay_ms() -> u64 {
    500
}

fn default_retry_max_delay_ms() -> u64 {
    8_000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_requests_per_second() -> u32 {
    10
}

fn default_rate_limit_threshold() -> u64 {
    50
}

fn default_max_rate_limit_wait_secs() -> u64 {
    3_600
}

fn default_per_page() -> u32 {
    100
}
