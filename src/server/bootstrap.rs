use crate::cache::CacheIndex;
use crate::config::AppConfig;
use crate::jobs::JobStore;
use crate::metrics::Metrics;
use crate::router_driver::HttpRouterDriver;
use crate::server::{self, AppState};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// CLI arguments forwarded from `main()`.
pub struct BootstrapArgs {
    pub config_path: std::path::PathBuf,
    pub listen: String,
    pub data_dir: std::path::PathBuf,
}

/// Process lifecycle: init → build state → spawn worker → serve → shutdown.
pub async fn run(args: BootstrapArgs) -> Result<()> {
    init_tracing();

    let config = Arc::new(AppConfig::load(&args.config_path)?);
    let cache = CacheIndex::new(&args.data_dir)?;
    let metrics = Metrics::install();
    let driver: Arc<dyn crate::router_driver::RouterDriver> =
        Arc::new(HttpRouterDriver::new(config.api_url.clone(), None));

    let job_handle = JobStore::new();
    let jobs = job_handle.store;

    let state = AppState {
        config: config.clone(),
        metrics,
        cache,
        jobs: jobs.clone(),
        driver: driver.clone(),
        data_dir: args.data_dir,
    };

    let worker_handle = tokio::spawn(crate::jobs::worker::run(
        jobs,
        job_handle.queue_rx,
        driver,
        config,
    ));

    let shutdown = Arc::new(Notify::new());
    tracing::info!("server: starting, listen={}", args.listen);

    let server_handle = tokio::spawn({
        let listen = args.listen.clone();
        let state = state.clone();
        let shutdown = shutdown.clone();
        async move { server::run(&listen, state, shutdown).await }
    });

    wait_for_shutdown(&shutdown).await;

    if let Err(e) = server_handle.await? {
        tracing::error!("server: http task error: {}", e);
    }
    worker_handle.abort();

    tracing::info!("server: shutdown complete");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .json(),
        )
        .init();
}

async fn wait_for_shutdown(shutdown: &Arc<Notify>) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("server: received SIGINT, shutting down"),
        _ = terminate => tracing::info!("server: received SIGTERM, shutting down"),
    }

    shutdown.notify_waiters();
}
