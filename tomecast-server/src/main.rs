//! # Tomecast Server
//!
//! Audiobook streaming server. Loads configuration, the library manifest and
//! the transcode cache, then serves the HTTP API until interrupted.

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tomecast_core::{AudioCatalog, JsonCatalog};
use tomecast_server::{
    AppState,
    auth::StaticTokenVerifier,
    infra::config::{Config, ConfigLoader, ConfigLoaderOptions},
    routes,
    transcoding::{EngineConfig, FfmpegTranscoder, TranscodeEngine},
};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "tomecast-server")]
#[command(about = "Audiobook server with adaptive transcoding and range streaming")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(ClapArgs, Debug, Clone)]
struct ServeArgs {
    /// Path to a TOML config file
    #[arg(short, long, env = "TOMECAST_CONFIG")]
    config: Option<PathBuf>,

    /// Path to a .env file
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Server port (overrides config)
    #[arg(short, long, env = "SERVER_PORT")]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long, env = "SERVER_HOST")]
    host: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Scan the transcode cache, report how many completed variants it holds and exit
    Reconcile,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config(&cli.serve)?;

    match cli.command {
        Some(Command::Reconcile) => run_reconcile(config).await,
        Some(Command::Serve) | None => run_server(config).await,
    }
}

fn load_config(args: &ServeArgs) -> anyhow::Result<Config> {
    let load = ConfigLoader::with_options(ConfigLoaderOptions {
        config_path: args.config.clone(),
        env_file: args.env_file.clone(),
    })
    .load()
    .context("failed to load configuration")?;

    for warning in &load.warnings {
        warn!("{warning}");
    }

    let mut config = load.config;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &config.metadata.config_path {
        info!(path = %path.display(), "loaded config file");
    }

    config
        .ensure_directories()
        .context("failed to create cache directories")?;
    config
        .normalize_paths()
        .context("failed to resolve cache directories")?;

    Ok(config)
}

fn build_engine(config: &Config) -> Arc<TranscodeEngine> {
    let transcoder = FfmpegTranscoder::new(
        config.ffmpeg.ffmpeg_path.clone(),
        config.ffmpeg.ffprobe_path.clone(),
        config.transcoding.segment_seconds,
    );
    Arc::new(TranscodeEngine::new(
        EngineConfig {
            cache_root: config.transcode_cache_dir().to_path_buf(),
            worker_count: config.transcoding.max_concurrent_transcodes,
            job_timeout: config.transcoding.job_timeout,
        },
        Arc::new(transcoder),
    ))
}

async fn run_reconcile(config: Config) -> anyhow::Result<()> {
    let engine = build_engine(&config);
    let adopted = engine
        .reconcile_cache()
        .await
        .context("failed to scan transcode cache")?;
    engine.shutdown().await;

    println!("{adopted} completed variants in {}", config.transcode_cache_dir().display());
    Ok(())
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    let catalog: Arc<dyn AudioCatalog> = match &config.library.manifest {
        Some(path) => Arc::new(
            JsonCatalog::load(path)
                .await
                .with_context(|| format!("failed to load library manifest {}", path.display()))?,
        ),
        None => Arc::new(JsonCatalog::default()),
    };

    let verifier = StaticTokenVerifier::new(&config.auth.tokens);
    info!(tokens = verifier.len(), "access tokens loaded");

    let engine = build_engine(&config);
    engine
        .reconcile_cache()
        .await
        .context("failed to reconcile transcode cache")?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server address")?;

    let state = AppState::new(Arc::new(config), catalog, engine.clone(), Arc::new(verifier));
    let router = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "tomecast server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("draining transcode workers");
    engine.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
