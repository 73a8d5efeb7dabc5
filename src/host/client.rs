use super::api::HostApi;
use super::budget::RequestBudget;
use super::policy::{HOST_BODY_PREVIEW_CHARS, HostAction, RateLimitHeaders, classify_host_error};
use super::rate_limit::RateLimiterHandle;
use crate::config::HostConfig;
use crate::error::{IsRetryable, VaultError};
use backon::{ExponentialBuilder, Retryable};
use chrono::{DateTime, Utc};
use commitvault_schema::{CommitDetail, CommitEntry, RepositoryInfo, RepositorySearchResults};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::StatusCode;
use reqwest::header::{CONNECTION, HeaderMap, HeaderValue};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Host page size ceiling for every listing endpoint.
const MAX_PER_PAGE: u32 = 100;

/// Commits newer than the watermark, newest first.
#[derive(Debug, Clone, Default)]
pub struct CommitListing {
    pub commits: Vec<CommitEntry>,
    /// False when the listing ran out before reaching the watermark commit.
    pub watermark_found: bool,
    pub pages: u32,
}

/// Client for the remote host.
///
/// Every request goes through the same gate: per-run budget, client-side pacing (governor),
/// then the shared rate-limit window. 5xx, timeouts and throttling are retried with
/// exponential backoff; a reset beyond the accepted wait is not. The limiter learns from every
/// response's rate-limit headers.
pub struct HostClient {
    http: reqwest::Client,
    api: HostApi,
    limiter: RateLimiterHandle,
    pacer: DefaultDirectRateLimiter,
    retry_policy: ExponentialBuilder,
    per_page: u32,
}

impl HostClient {
    pub fn new(cfg: &HostConfig, limiter: RateLimiterHandle) -> Result<Self, VaultError> {
        let mut headers = HeaderMap::new();
        let mut builder = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(cfg.request_timeout_secs));

        if let Some(proxy_url) = &cfg.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url.as_str())?);
        }

        if cfg.enable_multiplexing {
            builder = builder.http2_adaptive_window(true);
        } else {
            headers.insert(CONNECTION, HeaderValue::from_static("close"));
            builder = builder.http1_only().pool_max_idle_per_host(0);
        }

        let http = builder.default_headers(headers).build()?;

        let rps = NonZeroU32::new(cfg.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let pacer = RateLimiter::direct(Quota::per_second(rps));

        let retry_policy = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(cfg.retry_min_delay_ms))
            .with_max_delay(Duration::from_millis(cfg.retry_max_delay_ms))
            .with_max_times(cfg.retry_max_times)
            .with_jitter();

        let token = cfg.resolved_token();
        info!(
            api_url = %cfg.api_url,
            authenticated = token.is_some(),
            proxy = %cfg.proxy.as_ref().map_or("<none>", url::Url::as_str),
            requests_per_second = rps.get(),
            retry_max_times = cfg.retry_max_times,
            "Host client configured"
        );

        Ok(Self {
            http,
            api: HostApi::new(cfg.api_url.clone(), token),
            limiter,
            pacer,
            retry_policy,
            per_page: cfg.per_page.clamp(1, MAX_PER_PAGE),
        })
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    fn is_full_page(&self, len: usize) -> bool {
        u32::try_from(len).is_ok_and(|len| len >= self.per_page)
    }

    /// Page through the branch's history until the watermark commit, the end of history,
    /// or an error. The watermark commit itself is not included.
    pub async fn list_commits(
        &self,
        owner: &str,
        name: &str,
        branch: &str,
        watermark: Option<&str>,
        since: Option<DateTime<Utc>>,
        budget: &RequestBudget,
    ) -> Result<CommitListing, VaultError> {
        let context = format!("{owner}/{name}@{branch}");
        let mut listing = CommitListing::default();

        for page in 1.. {
            let sent = self
                .send("list_commits", &context, budget, |http| {
                    self.api
                        .list_commits(http, owner, name, branch, since, self.per_page, page)
                })
                .await;
            let resp = match sent {
                Ok(resp) => resp,
                // Empty repositories have no commits to list.
                Err(VaultError::HostStatus {
                    status: StatusCode::CONFLICT,
                    ..
                }) => {
                    debug!(repository = %context, "Repository is empty");
                    break;
                }
                Err(e) => return Err(e),
            };

            let entries: Vec<CommitEntry> = resp.json().await?;
            let full = self.is_full_page(entries.len());
            listing.pages = page;

            for entry in entries {
                if watermark == Some(entry.sha.as_str()) {
                    listing.watermark_found = true;
                    return Ok(listing);
                }
                listing.commits.push(entry);
            }

            if !full {
                break;
            }
        }

        Ok(listing)
    }

    /// Commit metadata plus its complete file list (files are paged for large commits).
    pub async fn get_commit(
        &self,
        owner: &str,
        name: &str,
        sha: &str,
        budget: &RequestBudget,
    ) -> Result<CommitDetail, VaultError> {
        let context = format!("{owner}/{name}@{sha}");
        let mut detail: Option<CommitDetail> = None;

        for page in 1.. {
            let resp = self
                .send("commit_detail", &context, budget, |http| {
                    self.api
                        .commit_detail(http, owner, name, sha, self.per_page, page)
                })
                .await?;
            let chunk: CommitDetail = resp.json().await?;
            let full = self.is_full_page(chunk.files.len());

            if let Some(detail) = detail.as_mut() {
                detail.files.extend(chunk.files);
            } else {
                detail = Some(chunk);
            }

            if !full {
                break;
            }
        }

        detail.ok_or(VaultError::NotFound(context))
    }

    /// Raw bytes of `path` as of `git_ref`.
    pub async fn get_content(
        &self,
        owner: &str,
        name: &str,
        path: &str,
        git_ref: &str,
        budget: &RequestBudget,
    ) -> Result<Vec<u8>, VaultError> {
        let context = format!("{owner}/{name}:{path}@{git_ref}");
        let resp = self
            .send("raw_content", &context, budget, |http| {
                self.api.raw_content(http, owner, name, path, git_ref)
            })
            .await?;
        Ok(resp.bytes().await?.to_vec())
    }

    pub async fn get_repository(
        &self,
        owner: &str,
        name: &str,
        budget: &RequestBudget,
    ) -> Result<RepositoryInfo, VaultError> {
        let context = format!("{owner}/{name}");
        let resp = self
            .send("repository", &context, budget, |http| {
                self.api.repository(http, owner, name)
            })
            .await?;
        Ok(resp.json().await?)
    }

    /// One page of the most-starred repositories matching `topic`.
    pub async fn search_repositories(
        &self,
        topic: &str,
        star_threshold: u64,
        page: u32,
        budget: &RequestBudget,
    ) -> Result<RepositorySearchResults, VaultError> {
        let context = format!("search:{topic}");
        let resp = self
            .send("search_repositories", &context, budget, |http| {
                self.api
                    .search_repositories(http, topic, star_threshold, self.per_page, page)
            })
            .await?;
        Ok(resp.json().await?)
    }

    async fn send<F>(
        &self,
        endpoint: &'static str,
        context: &str,
        budget: &RequestBudget,
        build: F,
    ) -> Result<reqwest::Response, VaultError>
    where
        F: Fn(&reqwest::Client) -> Result<reqwest::Request, VaultError>,
    {
        let build = &build;
        let op = || async move {
            budget.spend()?;
            self.pacer.until_ready().await;
            self.limiter.acquire().await?;

            let req = build(&self.http)?;
            let resp = self.http.execute(req).await?;

            let headers = resp.headers();
            if RateLimitHeaders::is_core(headers)
                && let Some(limits) = RateLimitHeaders::from_headers(headers)
            {
                self.limiter.report(limits.remaining, limits.reset_at);
            }

            let status = resp.status();
            if status.is_success() {
                return Ok(resp);
            }

            if status.is_server_error() {
                let body_preview = match resp.bytes().await {
                    Ok(bytes) => {
                        let raw_body = String::from_utf8_lossy(&bytes);
                        format!("{:.len$}", raw_body, len = HOST_BODY_PREVIEW_CHARS)
                    }
                    Err(e) => format!("<failed to read body: {e}>"),
                };
                debug!(
                    endpoint,
                    context,
                    %status,
                    body = %body_preview,
                    "Host server error (will retry)"
                );
                return Err(VaultError::TransientHost(format!(
                    "{endpoint} {context}: {status}"
                )));
            }

            let (action, error) = classify_host_error(resp, context, Utc::now()).await;
            if let HostAction::Throttle(reset_at) = action {
                self.limiter.throttled(reset_at);
            }
            Err(error)
        };

        op.retry(&self.retry_policy)
            .when(|err: &VaultError| err.is_retryable())
            .notify(|err, dur: Duration| {
                warn!(endpoint, context, "Host request retrying after error {} in {:?}", err, dur);
            })
            .await
    }
}
