use crate::error::VaultError;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use url::Url;

const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";
const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";
const API_VERSION: &str = "2022-11-28";

/// Request builders for the host's REST API. Pure: nothing here sends.
#[derive(Debug, Clone)]
pub struct HostApi {
    base: Url,
    token: Option<String>,
}

impl HostApi {
    pub fn new(base: Url, token: Option<String>) -> Self {
        Self { base, token }
    }

    /// `GET /repos/{owner}/{repo}/commits?sha=&per_page=&page=[&since=]`, newest first.
    #[allow(clippy::too_many_arguments)]
    pub fn list_commits(
        &self,
        client: &reqwest::Client,
        owner: &str,
        name: &str,
        branch: &str,
        since: Option<DateTime<Utc>>,
        per_page: u32,
        page: u32,
    ) -> Result<reqwest::Request, VaultError> {
        let mut url = self.endpoint(&["repos", owner, name, "commits"])?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("sha", branch)
                .append_pair("per_page", &per_page.to_string())
                .append_pair("page", &page.to_string());
            if let Some(since) = since {
                query.append_pair("since", &since.to_rfc3339_opts(SecondsFormat::Secs, true));
            }
        }
        self.get_json(client, url)
    }

    /// `GET /repos/{owner}/{repo}/commits/{sha}?per_page=&page=`; pages the `files` array.
    pub fn commit_detail(
        &self,
        client: &reqwest::Client,
        owner: &str,
        name: &str,
        sha: &str,
        per_page: u32,
        page: u32,
    ) -> Result<reqwest::Request, VaultError> {
        let mut url = self.endpoint(&["repos", owner, name, "commits", sha])?;
        url.query_pairs_mut()
            .append_pair("per_page", &per_page.to_string())
            .append_pair("page", &page.to_string());
        self.get_json(client, url)
    }

    /// `GET /repos/{owner}/{repo}/contents/{path}?ref=` with the raw media type.
    pub fn raw_content(
        &self,
        client: &reqwest::Client,
        owner: &str,
        name: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<reqwest::Request, VaultError> {
        let mut segments = vec!["repos", owner, name, "contents"];
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
        let mut url = self.endpoint(&segments)?;
        url.query_pairs_mut().append_pair("ref", git_ref);
        self.authorized(client.get(url), RAW_MEDIA_TYPE)
            .build()
            .map_err(VaultError::from)
    }

    /// `GET /repos/{owner}/{repo}`.
    pub fn repository(
        &self,
        client: &reqwest::Client,
        owner: &str,
        name: &str,
    ) -> Result<reqwest::Request, VaultError> {
        let url = self.endpoint(&["repos", owner, name])?;
        self.get_json(client, url)
    }

    /// `GET /search/repositories`, most-starred first.
    pub fn search_repositories(
        &self,
        client: &reqwest::Client,
        topic: &str,
        star_threshold: u64,
        per_page: u32,
        page: u32,
    ) -> Result<reqwest::Request, VaultError> {
        let mut url = self.endpoint(&["search", "repositories"])?;
        url.query_pairs_mut()
            .append_pair(
                "q",
                &format!("{topic} in:description,topics,readme stars:>={star_threshold}"),
            )
            .append_pair("sort", "stars")
            .append_pair("order", "desc")
            .append_pair("per_page", &per_page.to_string())
            .append_pair("page", &page.to_string());
        self.get_json(client, url)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, VaultError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| VaultError::Config(format!("host.api_url '{}' cannot be a base", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn get_json(&self, client: &reqwest::Client, url: Url) -> Result<reqwest::Request, VaultError> {
        self.authorized(client.get(url), JSON_MEDIA_TYPE)
            .build()
            .map_err(VaultError::from)
    }

    fn authorized(
        &self,
        builder: reqwest::RequestBuilder,
        accept: &'static str,
    ) -> reqwest::RequestBuilder {
        let builder = builder
            .header(ACCEPT, accept)
            .header(API_VERSION_HEADER, API_VERSION);
        match &self.token {
            Some(token) => builder.header(AUTHORIZATION, format!("Bearer {token}")),
            None => builder,
        }
    }
}
