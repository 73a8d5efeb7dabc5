//! Commit Collector: incremental ingestion of one repository's history.
//!
//! Per run: list the commits newer than the watermark (newest first, stopping at the
//! watermark), then ingest them oldest first. Each commit's contents are fetched and written to
//! the Blob Store before its metadata; the metadata and the watermark move are one catalog
//! transaction. Whatever stops a run (budget, throttling, errors, cancellation) stops it between
//! two such transactions, so the next run resumes from the stored watermark.

mod plan;
mod report;
mod sweep;

pub use report::{CollectionError, CollectionReport, StopReason};
pub use sweep::SweepReport;

use crate::blob::{BlobStore, ContentHash};
use crate::config::CollectorConfig;
use crate::db::{
    BlobRecord, CatalogHandle, CommitRecord, DbRepository, NewCommit, NewCommitFile, RepositoryId,
};
use crate::error::VaultError;
use crate::host::{HostClient, RequestBudget};
use ahash::AHashSet;
use chrono::Utc;
use commitvault_schema::{CommitDetail, CommitEntry};
use moka::sync::Cache;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type KnownBlobs = Cache<ContentHash, ()>;

pub struct Collector {
    catalog: CatalogHandle,
    blobs: Arc<dyn BlobStore>,
    host: Arc<HostClient>,
    cfg: CollectorConfig,
    known_blobs: KnownBlobs,
    in_flight: Mutex<AHashSet<RepositoryId>>,
}

/// Marks a repository as being collected until dropped.
struct InFlight<'a> {
    set: &'a Mutex<AHashSet<RepositoryId>>,
    id: RepositoryId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

impl Collector {
    pub fn new(
        catalog: CatalogHandle,
        blobs: Arc<dyn BlobStore>,
        host: Arc<HostClient>,
        cfg: CollectorConfig,
    ) -> Self {
        let known_blobs = KnownBlobs::builder()
            .max_capacity(cfg.known_blob_cache_capacity.max(1))
            .build();

        Self {
            catalog,
            blobs,
            host,
            cfg,
            known_blobs,
            in_flight: Mutex::new(AHashSet::new()),
        }
    }

    /// Collect new commits of one repository using at most `max_request_budget` host requests.
    ///
    /// Fails only when the run cannot start (unknown repository, or one already running for
    /// the same repository); everything that happens during the run lands in the report.
    pub async fn collect(
        &self,
        repository_id: RepositoryId,
        max_request_budget: u64,
        cancel: &CancellationToken,
    ) -> Result<CollectionReport, VaultError> {
        let _in_flight = self.claim(repository_id)?;
        let repo = self.catalog.get_repository(repository_id).await?;
        let budget = RequestBudget::new(max_request_budget);
        let mut report =
            CollectionReport::new(repo.id, repo.full_name(), repo.last_commit_sha.clone());

        self.run(&repo, &budget, cancel, &mut report).await;
        report.requests_used = budget.used();

        info!(
            repository = %report.repository,
            stop = ?report.stop,
            commits_added = report.commits_added,
            files_added = report.files_added,
            blobs_written = report.blobs_written,
            pending = report.pending,
            requests = report.requests_used,
            watermark = %report.watermark_after.as_deref().unwrap_or("<none>"),
            "Collection run finished"
        );
        Ok(report)
    }

    fn claim(&self, id: RepositoryId) -> Result<InFlight<'_>, VaultError> {
        let mut set = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !set.insert(id) {
            return Err(VaultError::RepositoryBusy(id));
        }
        Ok(InFlight {
            set: &self.in_flight,
            id,
        })
    }

    async fn run(
        &self,
        repo: &DbRepository,
        budget: &RequestBudget,
        cancel: &CancellationToken,
        report: &mut CollectionReport,
    ) {
        let repository = repo.full_name();

        // Listing writes nothing, so it can be abandoned at any point.
        let listed = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(VaultError::Cancelled),
            res = self.list_new_commits(repo, budget) => res,
        };
        let mut commits = match listed {
            Ok(commits) => commits,
            Err(err) => {
                warn!(repository = %repository, error = %err, "Commit listing stopped; nothing ingested");
                report.stop_with(None, &err);
                return;
            }
        };

        commits.reverse();
        let cap = self.cfg.max_commits_per_run.max(1);
        if commits.len() > cap {
            report.pending = commits.len() - cap;
            commits.truncate(cap);
        }
        debug!(repository = %repository, new_commits = commits.len(), pending = report.pending, "Ingesting commits oldest first");

        for entry in commits {
            let sha = entry.sha;
            if cancel.is_cancelled() {
                info!(repository = %repository, next = %sha, "Collection cancelled at commit boundary");
                report.stop = StopReason::Cancelled;
                return;
            }

            let mut written = 0;
            let fetched = self
                .fetch_commit(repo, &sha, report.watermark_after.clone(), budget, &mut written)
                .await;
            report.blobs_written += written;

            let record = match fetched {
                Ok(record) => record,
                Err(err) => {
                    warn!(repository = %repository, sha = %sha, error = %err, "Commit fetch stopped; watermark unchanged");
                    report.stop_with(Some(sha), &err);
                    return;
                }
            };

            let files = record.files.len();
            if let Err(err) = self.catalog.record_commit(record).await {
                warn!(repository = %repository, sha = %sha, error = %err, "Recording commit failed");
                report.stop_with(Some(sha), &err);
                return;
            }

            debug!(repository = %repository, sha = %sha, files, "Commit recorded");
            report.commits_added += 1;
            report.files_added += files;
            report.watermark_after = Some(sha);
        }

        report.stop = if report.pending > 0 {
            StopReason::CommitCap
        } else {
            StopReason::Completed
        };
    }

    async fn list_new_commits(
        &self,
        repo: &DbRepository,
        budget: &RequestBudget,
    ) -> Result<Vec<CommitEntry>, VaultError> {
        let branch = match &repo.default_branch {
            Some(branch) => branch.clone(),
            None => {
                let info = self
                    .host
                    .get_repository(&repo.owner, &repo.name, budget)
                    .await?;
                self.catalog
                    .set_default_branch(repo.id, info.default_branch.clone())
                    .await?;
                info.default_branch
            }
        };

        let since = match (&repo.last_commit_sha, self.cfg.history_days) {
            (None, days) if days > 0 => {
                Some(Utc::now() - chrono::Duration::days(i64::from(days)))
            }
            _ => None,
        };

        let listing = self
            .host
            .list_commits(
                &repo.owner,
                &repo.name,
                &branch,
                repo.last_commit_sha.as_deref(),
                since,
                budget,
            )
            .await?;

        let mut commits = listing.commits;
        if let Some(watermark) = &repo.last_commit_sha
            && !listing.watermark_found
        {
            warn!(
                repository = %repo.full_name(),
                watermark = %watermark,
                listed = commits.len(),
                "Watermark commit not in branch history; ingesting listed commits not yet recorded"
            );
            // Recorded commits are never replayed: the watermark would move back onto them.
            let recorded: AHashSet<String> = self
                .catalog
                .recorded_shas(repo.id, commits.iter().map(|c| c.sha.clone()).collect())
                .await?
                .into_iter()
                .collect();
            commits.retain(|c| !recorded.contains(&c.sha));
        }

        Ok(commits)
    }

    /// Fetch one commit and all of its contents, writing missing blobs, and build its record.
    async fn fetch_commit(
        &self,
        repo: &DbRepository,
        sha: &str,
        expected_watermark: Option<String>,
        budget: &RequestBudget,
        written: &mut usize,
    ) -> Result<CommitRecord, VaultError> {
        let detail = self
            .host
            .get_commit(&repo.owner, &repo.name, sha, budget)
            .await?;
        let parent = detail.first_parent().map(str::to_string);

        let mut blobs = BTreeMap::new();
        let mut files = Vec::with_capacity(detail.files.len());

        for entry in &detail.files {
            let Some(plan) = plan::plan_file(entry, parent.is_some()) else {
                debug!(sha, path = %entry.filename, "Skipping removal reported by a root commit");
                continue;
            };

            let before_hash = match (plan.before_path(), parent.as_deref()) {
                (Some(path), Some(parent)) => Some(
                    self.store_content(repo, path, parent, budget, &mut blobs, written)
                        .await?,
                ),
                _ => None,
            };
            let after_hash = match plan.after_path() {
                Some(path) => Some(
                    self.store_content(repo, path, sha, budget, &mut blobs, written)
                        .await?,
                ),
                None => None,
            };

            files.push(NewCommitFile {
                file_path: plan.path,
                previous_path: plan.previous_path,
                change_kind: plan.kind,
                lines_added: to_i64(entry.additions),
                lines_removed: to_i64(entry.deletions),
                before_hash,
                after_hash,
            });
        }

        Ok(CommitRecord {
            repository_id: repo.id,
            expected_watermark,
            commit: new_commit(sha, &detail),
            files,
            blobs: blobs
                .into_iter()
                .map(|(hash, size)| BlobRecord { hash, size })
                .collect(),
        })
    }

    /// Fetch `path` at `git_ref`, make sure the Blob Store holds it, and return its hash.
    async fn store_content(
        &self,
        repo: &DbRepository,
        path: &str,
        git_ref: &str,
        budget: &RequestBudget,
        blobs: &mut BTreeMap<String, i64>,
        written: &mut usize,
    ) -> Result<String, VaultError> {
        let bytes = self
            .host
            .get_content(&repo.owner, &repo.name, path, git_ref, budget)
            .await?;
        let hash = ContentHash::of(&bytes);

        if !self.known_blobs.contains_key(&hash) {
            if !self.blobs.exists(&hash).await? {
                self.blobs.put(&hash, &bytes).await?;
                *written += 1;
            }
            self.known_blobs.insert(hash.clone(), ());
        }

        let hash = hash.to_string();
        blobs
            .entry(hash.clone())
            .or_insert_with(|| to_i64(bytes.len()));
        Ok(hash)
    }
}

fn new_commit(sha: &str, detail: &CommitDetail) -> NewCommit {
    let meta = &detail.commit;
    let author = meta.author.as_ref();
    let committer = meta.committer.as_ref();

    NewCommit {
        sha: sha.to_string(),
        parent_shas: detail.parents.iter().map(|p| p.sha.clone()).collect(),
        author_name: author.and_then(|a| a.name.clone()),
        author_email: author.and_then(|a| a.email.clone()),
        committer_name: committer.and_then(|c| c.name.clone()),
        committer_email: committer.and_then(|c| c.email.clone()),
        message: meta.message.clone(),
        authored_at: author.and_then(|a| a.date),
        committed_at: committer.and_then(|c| c.date),
        files_changed: to_i64(detail.files.len()),
        lines_added: to_i64(detail.stats.additions),
        lines_removed: to_i64(detail.stats.deletions),
    }
}

fn to_i64<T: TryInto<i64>>(n: T) -> i64 {
    n.try_into().unwrap_or(i64::MAX)
}
