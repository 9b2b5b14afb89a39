//! viewsync Board - post service binary
//!
//! Loads the TOML config, opens the redb stores, starts the sync worker and
//! serves the HTTP API until Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use viewsync_board::{AppState, router};
use viewsync_common::Config;
use viewsync_counter::{MemoryCounterCache, SyncWorkerConfig, sync_loop};
use viewsync_store::{PostStore, RedbPendingIndex};

#[derive(Parser, Debug)]
#[command(name = "viewsync-board")]
#[command(about = "viewsync board service")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/viewsync/board.toml")]
    config: String,

    /// Listen address for the HTTP API
    #[arg(short, long)]
    listen: Option<String>,

    /// Directory holding posts.db and pending.db
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Seconds between sync cycles
    #[arg(long, env = "VIEWSYNC_SYNC_INTERVAL_SECS")]
    sync_interval_secs: Option<u64>,

    /// Log level
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load config file if it exists; CLI takes precedence
    let mut config = Config::load(&args.config)
        .with_context(|| format!("failed to load config file {}", args.config))?;
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }
    if let Some(data_dir) = args.data_dir {
        config.store.data_dir = data_dir;
    }
    if let Some(interval) = args.sync_interval_secs {
        config.sync.interval_secs = interval;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    config.validate().context("invalid configuration")?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting viewsync board service");
    info!("Config file: {}", args.config);
    info!("Data directory: {}", config.store.data_dir.display());

    let posts = PostStore::open(config.store.posts_path()).context("failed to open post store")?;
    let index = Arc::new(
        RedbPendingIndex::open(config.store.pending_path())
            .context("failed to open pending index")?,
    );
    let cache = Arc::new(MemoryCounterCache::with_idle_ttl(config.cache.idle_ttl()));

    let state = Arc::new(AppState::new(
        posts,
        cache,
        index.clone(),
        SyncWorkerConfig::from(&config.sync),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sync_handle = tokio::spawn(sync_loop(
        Arc::clone(&state.worker),
        config.sync.interval(),
        shutdown_rx,
    ));

    let addr: SocketAddr = config
        .server
        .listen
        .parse()
        .with_context(|| format!("invalid listen address {}", config.server.listen))?;

    info!("Starting HTTP server on {}", addr);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    axum::serve(listener, router(Arc::clone(&state)).into_make_service())
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down...");
        })
        .await?;

    // Stop the periodic loop, then flush whatever the last interval collected
    shutdown_tx.send(true).ok();
    if let Err(e) = sync_handle.await {
        warn!("Sync task ended abnormally: {}", e);
    }
    let outcome = state.worker.run_cycle().await;
    info!(?outcome, "Final sync cycle finished");
    if let Err(e) = index.flush() {
        warn!("Failed to flush pending index: {}", e);
    }

    info!("Board service shut down gracefully");
    Ok(())
}
