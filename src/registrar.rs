//! Repository Registrar: the tracked-repository set and topic discovery.

use crate::config::TrackedRepository;
use crate::db::{CatalogHandle, DbRepository, NewRepository, RepositoryFilter, RepositoryId};
use crate::error::VaultError;
use crate::host::{HostClient, RequestBudget};
use std::sync::Arc;
use tracing::{debug, info};

/// The host serves at most 1000 search results per query.
const MAX_SEARCH_PAGES: u32 = 10;

/// Outcome of one topic search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub topic: String,
    /// Newly registered repositories, most-starred first.
    pub registered: Vec<RepositoryId>,
    /// Already-known repositories whose topics and star count were refreshed.
    pub refreshed: usize,
}

#[derive(Clone)]
pub struct Registrar {
    catalog: CatalogHandle,
    host: Option<Arc<HostClient>>,
}

impl Registrar {
    pub fn new(catalog: CatalogHandle) -> Self {
        Self {
            catalog,
            host: None,
        }
    }

    /// Enables [`Registrar::discover`].
    #[must_use]
    pub fn with_host(mut self, host: Arc<HostClient>) -> Self {
        self.host = Some(host);
        self
    }

    /// Register a repository, returning its id. Known repositories are left untouched.
    pub async fn register(
        &self,
        owner: &str,
        name: &str,
        topics: &[String],
    ) -> Result<RepositoryId, VaultError> {
        let registration = self
            .catalog
            .register(NewRepository {
                owner: owner.to_string(),
                name: name.to_string(),
                topics: topics.to_vec(),
                default_branch: None,
                stars: None,
            })
            .await?;

        if registration.created {
            info!(repository = %format!("{owner}/{name}"), id = registration.id, "Repository registered");
        } else {
            debug!(repository = %format!("{owner}/{name}"), id = registration.id, "Repository already tracked");
        }
        Ok(registration.id)
    }

    /// Register every configured repository, in order.
    pub async fn register_all(
        &self,
        tracked: &[TrackedRepository],
    ) -> Result<Vec<RepositoryId>, VaultError> {
        let mut ids = Vec::with_capacity(tracked.len());
        for repo in tracked {
            ids.push(self.register(&repo.owner, &repo.name, &repo.topics).await?);
        }
        Ok(ids)
    }

    pub async fn list(&self, filter: RepositoryFilter) -> Result<Vec<DbRepository>, VaultError> {
        self.catalog.list_repositories(filter).await
    }

    /// Register up to `limit` new repositories among the most-starred matches for `topic`.
    ///
    /// Known matches get `topic` merged into their tags and their star count refreshed.
    pub async fn discover(
        &self,
        topic: &str,
        star_threshold: u64,
        limit: usize,
        budget: &RequestBudget,
    ) -> Result<DiscoveryReport, VaultError> {
        let host = self
            .host
            .as_ref()
            .ok_or_else(|| VaultError::Config("discovery needs a host client".to_string()))?;

        let mut report = DiscoveryReport {
            topic: topic.to_string(),
            ..DiscoveryReport::default()
        };
        let topics = vec![topic.to_string()];

        'pages: for page in 1..=MAX_SEARCH_PAGES {
            if report.registered.len() >= limit {
                break;
            }

            let results = host
                .search_repositories(topic, star_threshold, page, budget)
                .await?;
            let full_page = u32::try_from(results.items.len()).is_ok_and(|n| n >= host.per_page());

            for item in results.items {
                let stars = Some(i64::try_from(item.stargazers_count).unwrap_or(i64::MAX));
                let owner = item.owner.login;

                if let Some(existing) = self.catalog.find_repository(&owner, &item.name).await? {
                    self.catalog
                        .merge_topics(existing.id, topics.clone(), stars)
                        .await?;
                    report.refreshed += 1;
                    continue;
                }

                if report.registered.len() >= limit {
                    break 'pages;
                }

                let registration = self
                    .catalog
                    .register(NewRepository {
                        owner: owner.clone(),
                        name: item.name.clone(),
                        topics: topics.clone(),
                        default_branch: Some(item.default_branch),
                        stars,
                    })
                    .await?;

                if registration.created {
                    info!(
                        repository = %format!("{owner}/{}", item.name),
                        topic,
                        stars = item.stargazers_count,
                        "Repository discovered"
                    );
                    report.registered.push(registration.id);
                } else {
                    self.catalog
                        .merge_topics(registration.id, topics.clone(), stars)
                        .await?;
                    report.refreshed += 1;
                }
            }

            if !full_page {
                break;
            }
        }

        info!(
            topic,
            registered = report.registered.len(),
            refreshed = report.refreshed,
            "Topic discovery finished"
        );
        Ok(report)
    }
}
