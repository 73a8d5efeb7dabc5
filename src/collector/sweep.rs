use super::{CollectionReport, Collector};
use crate::db::RepositoryId;
use ahash::AHashSet;
use futures::{StreamExt, stream};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Outcome of collecting a set of repositories.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// One report per repository whose run started, ordered by repository id.
    pub reports: Vec<CollectionReport>,
    /// Repositories whose run could not start, with the reason.
    pub skipped: Vec<(RepositoryId, String)>,
}

impl SweepReport {
    pub fn commits_added(&self) -> usize {
        self.reports.iter().map(|r| r.commits_added).sum()
    }

    pub fn blobs_written(&self) -> usize {
        self.reports.iter().map(|r| r.blobs_written).sum()
    }

    pub fn failed(&self) -> impl Iterator<Item = &CollectionReport> {
        self.reports.iter().filter(|r| !r.is_ok())
    }
}

impl Collector {
    /// Collect every repository in `ids` on a pool of `collector.max_workers` workers.
    ///
    /// A repository is handled by one worker at a time; one repository's failure never stops
    /// the others.
    pub async fn sweep(&self, ids: &[RepositoryId], cancel: &CancellationToken) -> SweepReport {
        let mut seen = AHashSet::with_capacity(ids.len());
        let unique: Vec<RepositoryId> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();

        let workers = self.cfg.max_workers.max(1);
        let budget = self.cfg.max_requests_per_repo;
        info!(
            repositories = unique.len(),
            workers,
            budget_per_repository = budget,
            "Collection sweep started"
        );

        let outcomes: Vec<_> = stream::iter(unique)
            .map(|id| async move { (id, self.collect(id, budget, cancel).await) })
            .buffer_unordered(workers)
            .collect()
            .await;

        let mut sweep = SweepReport::default();
        for (id, outcome) in outcomes {
            match outcome {
                Ok(report) => sweep.reports.push(report),
                Err(err) => {
                    warn!(repository_id = id, error = %err, "Collection run did not start");
                    sweep.skipped.push((id, err.to_string()));
                }
            }
        }
        sweep.reports.sort_by_key(|r| r.repository_id);
        sweep.skipped.sort_by_key(|(id, _)| *id);

        info!(
            repositories = sweep.reports.len(),
            skipped = sweep.skipped.len(),
            failed = sweep.failed().count(),
            commits_added = sweep.commits_added(),
            blobs_written = sweep.blobs_written(),
            "Collection sweep finished"
        );
        sweep
    }
}
