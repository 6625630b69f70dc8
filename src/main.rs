use crate::config::settings::{AppConfig, ProcessingMode};
use crate::infrastructure::encoder::ffmpeg::FfmpegEncoder;
use crate::infrastructure::mail::smtp::SmtpNotifier;
use crate::state::AppState;
use crate::workers::sweeper::ExpirySweeper;
use dotenvy::dotenv;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod app;
mod common;
mod config;
mod docs;
mod infrastructure;
mod modules;
mod routes;
mod state;
mod workers;

#[cfg(test)]
mod test_support;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    info!("Starting server...");

    let config = AppConfig::new()?;
    let port = config.server_port;
    let mode = config.processing_mode;
    let encoder = Arc::new(FfmpegEncoder::new(config.encoder_bin.clone()));
    let notifier = Arc::new(SmtpNotifier::new(&config.smtp)?);

    let (state, receiver) = AppState::new(config, encoder, notifier);
    state.storage.ensure_dirs().await?;

    let shutdown = CancellationToken::new();

    let workers = if mode == ProcessingMode::Async {
        workers::transcoder::start_transcoder_workers(state.clone(), receiver, shutdown.clone())
    } else {
        info!("Running in sync mode, transcoder workers disabled");
        Vec::new()
    };
    let sweeper = tokio::spawn(ExpirySweeper::from_state(&state).run(shutdown.clone()));

    let app = app::create_app(state.clone());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Server running on http://0.0.0.0:{}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    state.queue.close();
    for worker in workers {
        if let Err(e) = worker.await {
            warn!("Transcoder worker ended abnormally: {}", e);
        }
    }
    if let Err(e) = sweeper.await {
        warn!("Expiry sweeper ended abnormally: {}", e);
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = shutdown.cancelled() => {},
    }

    info!("Shutdown signal received");
    shutdown.cancel();
}
