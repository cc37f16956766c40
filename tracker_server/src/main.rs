//! Deploy Tracker server.
//!
//! Serves build classification, per-environment deployment overviews and
//! backend/frontend coordination state as JSON. Reads builds, pipeline runs
//! and artifact bundles from the CI gateway and commit metadata from GitHub.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use deploy_tracker::config::TrackerConfig;
use deploy_tracker::metrics;
use deploy_tracker::routes::{self, TrackerRouterState};
use deploy_tracker::services::gateway_client::RemoteCiClient;
use deploy_tracker::services::github_service::GitHubClient;
use deploy_tracker::{DeployTracker, Sources};

#[derive(Parser)]
#[command(name = "deploy-tracker", about = "Build and deployment tracker")]
struct Cli {
    /// Server port
    #[arg(short, long, env = "TRACKER_PORT", default_value = "9090")]
    port: u16,

    /// Application name used to derive project and pipeline names
    #[arg(long, env = "TRACKER_APP_NAME")]
    app: Option<String>,

    /// How often expired cache entries are dropped, in seconds
    #[arg(long, env = "TRACKER_CACHE_PURGE_SECS", default_value = "60")]
    cache_purge_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    }

    let cli = Cli::parse();

    tracing::info!("Starting Deploy Tracker...");

    let mut config = TrackerConfig::from_env();
    if let Some(app) = cli.app {
        config.app_name = app;
    }

    let ci = Arc::new(RemoteCiClient::from_config(&config)?);
    let github = Arc::new(
        GitHubClient::from_config(&config)
            .context("GITHUB_REPO is required for commit and pull request lookups")?,
    );
    let sources = Sources {
        builds: ci.clone(),
        pipelines: ci.clone(),
        objects: ci,
        vcs: github,
    };

    let request_timeout = config.request_timeout * 4;
    tracing::info!(
        app = %config.app_name,
        gateway = %config.gateway_url,
        max_concurrent = config.max_concurrent_requests,
        min_interval_ms = config.min_request_interval.as_millis() as u64,
        "Tracker configured"
    );
    let tracker = Arc::new(DeployTracker::new(config, sources));

    // Periodically drop expired cache entries
    let caches = tracker.caches().clone();
    let purge_every = Duration::from_secs(cli.cache_purge_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(purge_every);
        loop {
            ticker.tick().await;
            let purged = caches.purge_expired().await;
            if purged > 0 {
                tracing::debug!(purged, "Purged expired cache entries");
            }
        }
    });

    let app = routes::tracker_router(TrackerRouterState { tracker }, request_timeout);

    // Initialize metrics
    metrics::init_metrics();

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    tracing::info!("Deploy Tracker listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
