use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use vidvault::{
    api::{self, AppState},
    auth::AdminAuth,
    config::{RuntimeConfig, RuntimeOverrides, resolve_runtime_config},
    providers::{AbyssClient, CloudinaryClient, ImageCdn, VideoHost},
    security::ensure_not_root,
    store::CatalogStore,
    upload::UploadPipeline,
    views::{SWEEP_INTERVAL, ViewTracker},
};

/// Video catalog API server.
#[derive(Debug, Clone, Parser)]
#[command(name = "backend", version)]
struct BackendArgs {
    /// Directory holding the catalog database and upload staging area.
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Address to listen on.
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    /// Env file read before the process environment.
    #[arg(long = "env-file")]
    env_file: Option<PathBuf>,
    /// Take viewer addresses from X-Forwarded-For (only behind a reverse proxy).
    #[arg(long)]
    trust_proxy: bool,
}

impl BackendArgs {
    fn into_overrides(self) -> RuntimeOverrides {
        RuntimeOverrides {
            data_dir: self.data_dir,
            host: self.host,
            port: self.port,
            env_path: self.env_file,
            trust_proxy: self.trust_proxy.then_some(true),
        }
    }
}

fn listen_addr(host: &str, port: u16) -> Result<SocketAddr> {
    let ip = match host.trim() {
        "localhost" => IpAddr::V4(Ipv4Addr::LOCALHOST),
        other => other
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .map_err(|_| anyhow!("invalid listen host: {host}"))?,
    };
    Ok(SocketAddr::new(ip, port))
}

async fn build_state(config: &RuntimeConfig) -> Result<AppState> {
    let store = CatalogStore::open(&config.database_path())
        .await
        .context("opening catalog store")?;
    let auth = AdminAuth::new(
        &config.admin_password,
        &config.jwt_secret,
        config.token_ttl_hours,
    );
    let views = ViewTracker::new(store.clone(), config.view_window_secs);

    if config.abyss.api_key.trim().is_empty() {
        tracing::warn!("ABYSS_API_KEY is not set; host uploads will fail");
    }
    let host: Arc<dyn VideoHost> =
        Arc::new(AbyssClient::new(&config.abyss).context("building video host client")?);
    let cdn = match &config.cloudinary {
        Some(settings) => {
            let client = CloudinaryClient::new(settings.clone())
                .context("building image CDN client")?;
            Some(Arc::new(client) as Arc<dyn ImageCdn>)
        }
        None => {
            tracing::warn!("Cloudinary is not configured; thumbnails stay on the video host");
            None
        }
    };
    let uploads = UploadPipeline::new(store.clone(), host, cdn, config.staging_dir());

    if config.trust_proxy {
        tracing::info!("viewer addresses come from X-Forwarded-For");
    }
    Ok(AppState::new(store, auth, views, uploads).trusting_proxy(config.trust_proxy))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info")),
        )
        .init();

    let args = BackendArgs::parse();
    ensure_not_root("backend")?;

    let config = resolve_runtime_config(args.into_overrides())?;
    let addr = listen_addr(&config.host, config.port)?;
    let state = build_state(&config).await?;
    let sweeper = state.views.spawn_sweeper(SWEEP_INTERVAL);
    let app = api::router(state, &config.frontend_origins);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    tracing::info!(%addr, data_dir = %config.data_dir.display(), "API server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("running API server")?;

    sweeper.abort();
    tracing::info!("API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    // Only graceful shutdown depends on this; Ctrl+C still ends the process.
    if let Err(err) = signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to install Ctrl+C handler");
    }
}
