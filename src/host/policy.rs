use crate::error::VaultError;
use crate::utils::logging::with_pretty_json_debug;
use chrono::{DateTime, Utc};
use commitvault_schema::GithubErrorBody;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};

pub const HOST_BODY_PREVIEW_CHARS: usize = 300;

const REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RESET_HEADER: &str = "x-ratelimit-reset";
const RESOURCE_HEADER: &str = "x-ratelimit-resource";

/// Fallback cool-down when a throttling response carries no reset information.
const DEFAULT_THROTTLE_SECS: i64 = 60;

/// Rate-limit counters carried by a host response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitHeaders {
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitHeaders {
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let remaining = header_str(headers, REMAINING_HEADER)?.parse().ok()?;
        let reset_secs: i64 = header_str(headers, RESET_HEADER)?.parse().ok()?;
        let reset_at = DateTime::from_timestamp(reset_secs, 0)?;
        Some(Self {
            remaining,
            reset_at,
        })
    }

    /// Search and other secondary resources have their own, much smaller windows.
    pub fn is_core(headers: &HeaderMap) -> bool {
        header_str(headers, RESOURCE_HEADER).is_none_or(|resource| resource == "core")
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

/// What the limiter should learn from a failed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostAction {
    Throttle(DateTime<Utc>),
    None,
}

/// Map a non-success, non-5xx host response to an action and an error.
pub async fn classify_host_error(
    resp: reqwest::Response,
    context: &str,
    now: DateTime<Utc>,
) -> (HostAction, VaultError) {
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = resp.bytes().await.unwrap_or_default();
    let raw_body_owned = String::from_utf8_lossy(&bytes).into_owned();
    let structured = serde_json::from_slice::<GithubErrorBody>(&bytes).ok();

    if let Some(error) = &structured {
        with_pretty_json_debug(error, |pretty_error| {
            tracing::debug!(%status, context, body = %pretty_error, "Host structured error");
        });
    } else {
        tracing::debug!(
            %status,
            context,
            body = %format!("{:.len$}", raw_body_owned, len = HOST_BODY_PREVIEW_CHARS),
            "Host unstructured error"
        );
    }

    if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
        let limits = RateLimitHeaders::from_headers(&headers);
        let retry_after = headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
            .map(|secs| now + chrono::Duration::seconds(secs));
        let exhausted = limits.is_some_and(|l| l.remaining == 0);
        let says_so = structured
            .as_ref()
            .is_some_and(GithubErrorBody::mentions_rate_limit);

        if status == StatusCode::TOO_MANY_REQUESTS || exhausted || retry_after.is_some() || says_so
        {
            let reset_at = retry_after
                .or(limits.map(|l| l.reset_at))
                .unwrap_or_else(|| now + chrono::Duration::seconds(DEFAULT_THROTTLE_SECS));
            return (
                HostAction::Throttle(reset_at),
                VaultError::RateLimitExceeded { reset_at },
            );
        }
    }

    let error = match status {
        StatusCode::NOT_FOUND => VaultError::NotFound(context.to_string()),
        s if s.is_server_error() => VaultError::TransientHost(format!("{context}: {s}")),
        _ => VaultError::HostStatus {
            status,
            body: format!("{:.len$}", raw_body_owned, len = HOST_BODY_PREVIEW_CHARS),
        },
    };
    (HostAction::None, error)
}
