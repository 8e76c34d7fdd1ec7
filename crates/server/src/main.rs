use anyhow::Context as _;
use clap::Parser as _;
use mcp_workspace_http_tools::runtime::HttpExecutor;
use mcp_workspace_server::config::{Args, LogFormat};
use mcp_workspace_server::store::{DirStore, MemoryStore, WorkspaceStore};
use mcp_workspace_server::{AppState, router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args)?;

    let store: Arc<dyn WorkspaceStore> = match &args.data_dir {
        Some(dir) => {
            info!(data_dir = %dir.display(), "using directory store");
            Arc::new(DirStore::open(dir).await?)
        }
        None => {
            info!("using in-memory store; documents are lost on restart");
            Arc::new(MemoryStore::new())
        }
    };
    let executor =
        HttpExecutor::new(args.upstream_timeout()).context("build upstream HTTP client")?;
    let state = Arc::new(AppState::new(store, executor));
    let shutdown = state.shutdown.clone();

    let listener = TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("bind {}", args.bind))?;
    info!(
        address = %args.bind,
        upstream_timeout_secs = args.upstream_timeout_secs,
        "server listening"
    );

    tokio::spawn(shutdown_signal(shutdown.clone()));
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("serve")?;

    info!("server shutdown complete");
    Ok(())
}

fn init_tracing(args: &Args) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("invalid log level directive")?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match args.log_format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("init tracing: {e}"))
}

/// Cancel `token` on Ctrl+C or SIGTERM.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
    token.cancel();
}
