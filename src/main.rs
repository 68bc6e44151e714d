use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, ErrorKind};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use video_gallery::{
    commands,
    config::{AppConfig, Args, Command},
    routes,
    services::thumbnail_service::BulkGenerateOptions,
    state::AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("video_gallery=info,tower_http=info")),
        )
        .init();

    // --- Parse config + command ---
    let args = Args::parse();
    let command = args.command.clone().unwrap_or(Command::Serve);
    let cfg = AppConfig::from_env_and_args(&args, command.requires_secret())
        .context("loading configuration")?;

    tracing::info!("Starting video-gallery with config: {:?}", cfg);

    let state = AppState::from_config(cfg)?;
    let mut out = io::stdout();

    match command {
        Command::Serve => serve(state).await,
        Command::ListCategories => commands::list_categories(&state, &mut out).await,
        Command::ListGalleries => commands::list_galleries(&state, &mut out).await,
        Command::ShowGallery { stub } => commands::show_gallery(&state, &stub, &mut out).await,
        Command::Export { format } => commands::export(&state, &format, &mut out).await,
        Command::GenerateThumbnails {
            force,
            time,
            max_size,
            concurrency,
        } => {
            let options = BulkGenerateOptions {
                offset_ms: time,
                force,
                max_size_mb: Some(max_size),
                concurrency,
            };
            commands::generate_thumbnails(&state, options, &mut out).await
        }
        Command::ClearThumbnails => commands::clear_thumbnails(&state, &mut out).await,
    }
}

async fn serve(state: AppState) -> Result<()> {
    let cfg = state.config.clone();
    let app = routes::routes(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    let local = listener.local_addr()?;
    tracing::info!("Server listening on http://{}", local);
    tracing::info!("Index: http://{}/{}/index", local, cfg.secret_key);
    tracing::info!("Feed:  http://{}/{}/feed", local, cfg.secret_key);
    tracing::info!("Admin: http://{}/{}/admin", local, cfg.secret_key);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
