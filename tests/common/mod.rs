#![allow(dead_code)]

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, Utc};
use commitvault::blob::{BlobStore, MemoryBlobStore};
use commitvault::collector::Collector;
use commitvault::config::{CollectorConfig, HostConfig};
use commitvault::db::CatalogHandle;
use commitvault::host::{self, HostClient, RateLimiterHandle};
use commitvault::registrar::Registrar;
use commitvault::restore::Restorer;
use serde::Deserialize;
use serde_json::{Value, json};
use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::net::TcpListener;
use url::Url;

#[derive(Debug, Clone)]
pub enum Change {
    Add(String, Vec<u8>),
    Modify(String, Vec<u8>),
    Remove(String),
    Rename { from: String, to: String, content: Vec<u8> },
}

impl Change {
    pub fn add(path: &str, content: &str) -> Self {
        Change::Add(path.to_string(), content.as_bytes().to_vec())
    }

    pub fn modify(path: &str, content: &str) -> Self {
        Change::Modify(path.to_string(), content.as_bytes().to_vec())
    }

    pub fn remove(path: &str) -> Self {
        Change::Remove(path.to_string())
    }

    pub fn rename(from: &str, to: &str, content: &str) -> Self {
        Change::Rename {
            from: from.to_string(),
            to: to.to_string(),
            content: content.as_bytes().to_vec(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MockCommit {
    pub sha: String,
    pub message: String,
    pub changes: Vec<Change>,
}

/// A repository whose default branch is a linear history, oldest commit first.
#[derive(Debug, Clone)]
pub struct MockRepo {
    pub owner: String,
    pub name: String,
    pub default_branch: String,
    pub stars: u64,
    pub topics: Vec<String>,
    pub commits: Vec<MockCommit>,
}

impl MockRepo {
    pub fn new(owner: &str, name: &str) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            default_branch: "main".to_string(),
            stars: 0,
            topics: Vec::new(),
            commits: Vec::new(),
        }
    }

    pub fn stars(mut self, stars: u64) -> Self {
        self.stars = stars;
        self
    }

    pub fn topics(mut self, topics: &[&str]) -> Self {
        self.topics = topics.iter().map(|t| (*t).to_string()).collect();
        self
    }

    pub fn commit(mut self, sha: &str, changes: Vec<Change>) -> Self {
        self.push_commit(sha, changes);
        self
    }

    pub fn push_commit(&mut self, sha: &str, changes: Vec<Change>) {
        self.commits.push(MockCommit {
            sha: sha.to_string(),
            message: format!("commit {sha}"),
            changes,
        });
    }

    fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    fn date(index: usize) -> DateTime<Utc> {
        let base = DateTime::from_timestamp(1_714_557_600, 0).unwrap();
        base + chrono::Duration::hours(i64::try_from(index).unwrap())
    }

    fn tree_at(&self, index: usize) -> BTreeMap<String, Vec<u8>> {
        let mut tree = BTreeMap::new();
        for commit in &self.commits[..=index] {
            for change in &commit.changes {
                match change {
                    Change::Add(path, content) | Change::Modify(path, content) => {
                        tree.insert(path.clone(), content.clone());
                    }
                    Change::Remove(path) => {
                        tree.remove(path);
                    }
                    Change::Rename { from, to, content } => {
                        tree.remove(from);
                        tree.insert(to.clone(), content.clone());
                    }
                }
            }
        }
        tree
    }

    fn commit_meta(&self, index: usize) -> Value {
        let commit = &self.commits[index];
        let date = Self::date(index).to_rfc3339();
        json!({
            "author": {"name": "Mona", "email": "mona@example.com", "date": date},
            "committer": {"name": "Hubot", "email": "hubot@example.com", "date": date},
            "message": commit.message,
        })
    }

    fn parents(&self, index: usize) -> Value {
        if index == 0 {
            json!([])
        } else {
            json!([{"sha": self.commits[index - 1].sha}])
        }
    }

    fn files(&self, index: usize) -> Vec<Value> {
        self.commits[index]
            .changes
            .iter()
            .map(|change| match change {
                Change::Add(path, _) => {
                    json!({"filename": path, "status": "added", "additions": 1, "deletions": 0, "changes": 1})
                }
                Change::Modify(path, _) => {
                    json!({"filename": path, "status": "modified", "additions": 1, "deletions": 1, "changes": 2})
                }
                Change::Remove(path) => {
                    json!({"filename": path, "status": "removed", "additions": 0, "deletions": 1, "changes": 1})
                }
                Change::Rename { from, to, .. } => json!({
                    "filename": to, "status": "renamed", "previous_filename": from,
                    "additions": 1, "deletions": 1, "changes": 2
                }),
            })
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct HostState {
    pub repos: BTreeMap<String, MockRepo>,
    /// Path and query of every request served, in order.
    pub requests: Vec<String>,
    /// `x-ratelimit-remaining` / `x-ratelimit-reset` sent with every response.
    pub rate_limit: Option<(u64, i64)>,
    /// Requests whose path contains any of these answer 500.
    pub fail_paths: Vec<String>,
    /// Requests whose path contains any of these answer 403 with the budget spent.
    pub throttle_paths: Vec<String>,
    /// Like `fail_paths`, but each entry answers 500 once and is then removed.
    pub fail_once_paths: Vec<String>,
}

#[derive(Clone, Default)]
pub struct MockHost {
    pub state: Arc<Mutex<HostState>>,
}

impl MockHost {
    pub fn with_repos(repos: Vec<MockRepo>) -> Self {
        let host = Self::default();
        {
            let mut state = host.state.lock().unwrap();
            for repo in repos {
                state.repos.insert(repo.full_name(), repo);
            }
        }
        host
    }

    pub fn update_repo(&self, full_name: &str, f: impl FnOnce(&mut MockRepo)) {
        let mut state = self.state.lock().unwrap();
        f(state.repos.get_mut(full_name).expect("unknown mock repo"));
    }

    pub fn requests(&self) -> Vec<String> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn request_count(&self, needle: &str) -> usize {
        self.requests().iter().filter(|r| r.contains(needle)).count()
    }

    pub fn set_rate_limit(&self, remaining: u64, reset_at: DateTime<Utc>) {
        self.state.lock().unwrap().rate_limit = Some((remaining, reset_at.timestamp()));
    }

    pub fn fail_path(&self, needle: &str) {
        self.state.lock().unwrap().fail_paths.push(needle.to_string());
    }

    pub fn fail_once(&self, needle: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_once_paths
            .push(needle.to_string());
    }

    pub fn throttle_path(&self, needle: &str) {
        self.state.lock().unwrap().throttle_paths.push(needle.to_string());
    }

    pub fn heal(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_paths.clear();
        state.throttle_paths.clear();
        state.fail_once_paths.clear();
    }
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    per_page: Option<usize>,
    page: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    sha: Option<String>,
    per_page: Option<usize>,
    page: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ContentQuery {
    #[serde(rename = "ref")]
    git_ref: String,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: String,
    per_page: Option<usize>,
    page: Option<usize>,
}

fn window<T: Clone>(items: &[T], per_page: Option<usize>, page: Option<usize>) -> Vec<T> {
    let per_page = per_page.unwrap_or(30).max(1);
    let page = page.unwrap_or(1).max(1);
    items
        .iter()
        .skip((page - 1) * per_page)
        .take(per_page)
        .cloned()
        .collect()
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"message": "Not Found", "documentation_url": "https://docs.example.test"})),
    )
        .into_response()
}

async fn repository(
    State(host): State<MockHost>,
    Path((owner, name)): Path<(String, String)>,
) -> Response {
    let state = host.state.lock().unwrap();
    let Some(repo) = state.repos.get(&format!("{owner}/{name}")) else {
        return not_found();
    };
    Json(repo_json(repo)).into_response()
}

fn repo_json(repo: &MockRepo) -> Value {
    json!({
        "name": repo.name,
        "full_name": repo.full_name(),
        "owner": {"login": repo.owner},
        "default_branch": repo.default_branch,
        "topics": repo.topics,
        "stargazers_count": repo.stars,
    })
}

async fn list_commits(
    State(host): State<MockHost>,
    Path((owner, name)): Path<(String, String)>,
    Query(query): Query<ListQuery>,
) -> Response {
    let state = host.state.lock().unwrap();
    let Some(repo) = state.repos.get(&format!("{owner}/{name}")) else {
        return not_found();
    };
    if query.sha.as_deref() != Some(repo.default_branch.as_str()) {
        return not_found();
    }
    if repo.commits.is_empty() {
        return (
            StatusCode::CONFLICT,
            Json(json!({"message": "Git Repository is empty."})),
        )
            .into_response();
    }

    let newest_first: Vec<Value> = (0..repo.commits.len())
        .rev()
        .map(|i| {
            json!({
                "sha": repo.commits[i].sha,
                "commit": repo.commit_meta(i),
                "parents": repo.parents(i),
            })
        })
        .collect();
    Json(Value::Array(window(&newest_first, query.per_page, query.page))).into_response()
}

async fn commit_detail(
    State(host): State<MockHost>,
    Path((owner, name, sha)): Path<(String, String, String)>,
    Query(query): Query<PageQuery>,
) -> Response {
    let state = host.state.lock().unwrap();
    let Some(repo) = state.repos.get(&format!("{owner}/{name}")) else {
        return not_found();
    };
    let Some(index) = repo.commits.iter().position(|c| c.sha == sha) else {
        return not_found();
    };

    let files = repo.files(index);
    let additions = files.iter().filter_map(|f| f["additions"].as_u64()).sum::<u64>();
    let deletions = files.iter().filter_map(|f| f["deletions"].as_u64()).sum::<u64>();
    Json(json!({
        "sha": sha,
        "commit": repo.commit_meta(index),
        "parents": repo.parents(index),
        "stats": {"total": additions + deletions, "additions": additions, "deletions": deletions},
        "files": window(&files, query.per_page, query.page),
    }))
    .into_response()
}

async fn raw_content(
    State(host): State<MockHost>,
    Path((owner, name, path)): Path<(String, String, String)>,
    Query(query): Query<ContentQuery>,
) -> Response {
    let state = host.state.lock().unwrap();
    let Some(repo) = state.repos.get(&format!("{owner}/{name}")) else {
        return not_found();
    };
    let Some(index) = repo.commits.iter().position(|c| c.sha == query.git_ref) else {
        return not_found();
    };
    match repo.tree_at(index).remove(&path) {
        Some(bytes) => (StatusCode::OK, Body::from(bytes)).into_response(),
        None => not_found(),
    }
}

async fn search(State(host): State<MockHost>, Query(query): Query<SearchQuery>) -> Response {
    let state = host.state.lock().unwrap();
    let topic = query.q.split_whitespace().next().unwrap_or_default().to_string();
    let min_stars: u64 = query
        .q
        .split("stars:>=")
        .nth(1)
        .and_then(|s| s.split_whitespace().next())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    let mut matches: Vec<&MockRepo> = state
        .repos
        .values()
        .filter(|r| r.stars >= min_stars && r.topics.iter().any(|t| t == &topic))
        .collect();
    matches.sort_by(|a, b| b.stars.cmp(&a.stars).then(a.name.cmp(&b.name)));

    let items: Vec<Value> = matches.into_iter().map(repo_json).collect();
    Json(json!({
        "total_count": items.len(),
        "incomplete_results": false,
        "items": window(&items, query.per_page, query.page),
    }))
    .into_response()
}

async fn gate(State(host): State<MockHost>, req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let (rate_limit, failing, throttled) = {
        let mut state = host.state.lock().unwrap();
        state.requests.push(req.uri().to_string());
        let mut failing = state.fail_paths.iter().any(|p| path.contains(p.as_str()));
        if let Some(pos) = state
            .fail_once_paths
            .iter()
            .position(|p| path.contains(p.as_str()))
        {
            state.fail_once_paths.remove(pos);
            failing = true;
        }
        let throttled = state.throttle_paths.iter().any(|p| path.contains(p.as_str()));
        (state.rate_limit, failing, throttled)
    };

    let mut resp = if throttled {
        (
            StatusCode::FORBIDDEN,
            Json(json!({"message": "API rate limit exceeded for 127.0.0.1."})),
        )
            .into_response()
    } else if failing {
        (StatusCode::BAD_GATEWAY, "upstream unavailable").into_response()
    } else {
        next.run(req).await
    };

    if let Some((remaining, reset)) = rate_limit {
        let remaining = if throttled { 0 } else { remaining };
        let headers = resp.headers_mut();
        headers.insert("x-ratelimit-remaining", HeaderValue::from(remaining));
        headers.insert("x-ratelimit-reset", HeaderValue::from(reset));
    }
    resp
}

pub async fn spawn_host(host: MockHost) -> Url {
    let app = Router::new()
        .route("/repos/{owner}/{name}", get(repository))
        .route("/repos/{owner}/{name}/commits", get(list_commits))
        .route("/repos/{owner}/{name}/commits/{sha}", get(commit_detail))
        .route("/repos/{owner}/{name}/contents/{*path}", get(raw_content))
        .route("/search/repositories", get(search))
        .layer(middleware::from_fn_with_state(host.clone(), gate))
        .with_state(host);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    let base = Url::parse(&format!("http://{}", addr)).expect("valid base url");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server run");
    });

    base
}

fn unique_name(tag: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before UNIX_EPOCH")
        .as_nanos();
    format!("commitvault-{tag}-{}-{}", std::process::id(), nanos)
}

/// A unique SQLite file under the temp dir.
pub fn temp_database(tag: &str) -> (String, PathBuf) {
    let path = std::env::temp_dir().join(format!("{}.sqlite", unique_name(tag)));
    (format!("sqlite:{}", path.display()), path)
}

/// A unique, not yet created directory under the temp dir.
pub fn temp_dir(tag: &str) -> PathBuf {
    std::env::temp_dir().join(unique_name(tag))
}

pub fn remove_database(path: &PathBuf) {
    let _ = std::fs::remove_file(path);
    let _ = std::fs::remove_file(format!("{}-wal", path.display()));
    let _ = std::fs::remove_file(format!("{}-shm", path.display()));
}

/// Fast retries, small pages, no client-side pacing to speak of.
pub fn host_config(api_url: Url) -> HostConfig {
    HostConfig {
        api_url,
        token: Some("test-token".to_string()),
        retry_max_times: 1,
        retry_min_delay_ms: 1,
        retry_max_delay_ms: 5,
        request_timeout_secs: 5,
        requests_per_second: 10_000,
        rate_limit_threshold: 5,
        max_rate_limit_wait_secs: 5,
        per_page: 2,
        ..HostConfig::default()
    }
}

pub fn collector_config() -> CollectorConfig {
    CollectorConfig {
        max_workers: 2,
        max_requests_per_repo: 1_000,
        max_commits_per_run: 100,
        history_days: 0,
        known_blob_cache_capacity: 1_000,
    }
}

pub struct Harness {
    pub mock: MockHost,
    pub catalog: CatalogHandle,
    pub blobs: Arc<MemoryBlobStore>,
    pub host: Arc<HostClient>,
    pub limiter: RateLimiterHandle,
    pub registrar: Registrar,
    pub collector: Collector,
    pub restorer: Restorer,
    pub db_path: PathBuf,
}

impl Harness {
    pub async fn start(tag: &str, mock: MockHost) -> Self {
        Self::start_with(tag, mock, host_config, collector_config()).await
    }

    pub async fn start_with(
        tag: &str,
        mock: MockHost,
        host_cfg: impl FnOnce(Url) -> HostConfig,
        collector_cfg: CollectorConfig,
    ) -> Self {
        let base = spawn_host(mock.clone()).await;
        let host_cfg = host_cfg(base);
        let (database_url, db_path) = temp_database(tag);

        let catalog = commitvault::db::spawn(&database_url).await;
        let blobs = Arc::new(MemoryBlobStore::new());
        let limiter = host::spawn_rate_limiter(
            host_cfg.rate_limit_threshold,
            Duration::from_secs(host_cfg.max_rate_limit_wait_secs),
        )
        .await;
        let host = Arc::new(HostClient::new(&host_cfg, limiter.clone()).expect("host client"));
        let store: Arc<dyn BlobStore> = blobs.clone();

        Self {
            mock,
            registrar: Registrar::new(catalog.clone()).with_host(host.clone()),
            collector: Collector::new(catalog.clone(), store.clone(), host.clone(), collector_cfg),
            restorer: Restorer::new(catalog.clone(), store),
            catalog,
            blobs,
            host,
            limiter,
            db_path,
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        remove_database(&self.db_path);
    }
}
