use commitvault::blob;
use commitvault::collector::Collector;
use commitvault::config::Config;
use commitvault::db::RepositoryFilter;
use commitvault::host::{self, HostClient, RequestBudget};
use commitvault::registrar::Registrar;
use commitvault::utils::logging::init_tracing;
use mimalloc::MiMalloc;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = Config::from_toml();
    init_tracing(&cfg.basic.loglevel);

    info!(
        database_url = %cfg.basic.database_url,
        loglevel = %cfg.basic.loglevel,
        api_url = %cfg.host.api_url,
        repositories = cfg.repositories.len(),
        discovery_topics = ?cfg.discovery.topics,
        max_workers = cfg.collector.max_workers,
        max_requests_per_repo = cfg.collector.max_requests_per_repo,
        "commitvault starting"
    );

    let catalog = commitvault::db::spawn(&cfg.basic.database_url).await;
    let blobs = blob::open(&cfg.blob_store).await?;
    let limiter =
        host::spawn_rate_limiter(cfg.host.rate_limit_threshold, cfg.host.max_rate_limit_wait())
            .await;
    let host = Arc::new(HostClient::new(&cfg.host, limiter)?);

    let registrar = Registrar::new(catalog.clone()).with_host(host.clone());
    registrar.register_all(&cfg.repositories).await?;

    for topic in &cfg.discovery.topics {
        let budget = RequestBudget::new(cfg.collector.max_requests_per_repo);
        if let Err(e) = registrar
            .discover(
                topic,
                cfg.discovery.star_threshold,
                cfg.discovery.new_limit_per_topic,
                &budget,
            )
            .await
        {
            warn!(topic = %topic, error = %e, "Topic discovery failed");
        }
    }

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Shutdown requested; stopping at the next commit boundary");
        shutdown.cancel();
    });

    let ids: Vec<_> = registrar
        .list(RepositoryFilter::default())
        .await?
        .into_iter()
        .map(|repo| repo.id)
        .collect();

    let collector = Collector::new(catalog, blobs, host, cfg.collector.clone());
    let sweep = collector.sweep(&ids, &cancel).await;

    for report in sweep.failed() {
        for error in &report.errors {
            warn!(
                repository = %report.repository,
                sha = %error.sha.as_deref().unwrap_or("<listing>"),
                kind = error.kind,
                "{}",
                error.message
            );
        }
    }

    info!(
        commits_added = sweep.commits_added(),
        blobs_written = sweep.blobs_written(),
        "commitvault finished"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
