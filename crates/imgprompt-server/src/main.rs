//! imgprompt server - HTTP API for image-to-prompt generation

use clap::Parser;
use std::path::PathBuf;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod error;
mod state;

use imgprompt_core::{EngineConfig, PromptEngine};
use state::AppState;

/// Image-to-prompt generation server
#[derive(Parser, Debug)]
#[command(name = "imgprompt-server", version, about)]
struct Args {
    /// Address to bind
    #[arg(long, env = "IMGPROMPT_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(long, env = "IMGPROMPT_PORT", default_value_t = 8080)]
    port: u16,

    /// Directory holding cached local models
    #[arg(long, env = "IMGPROMPT_MODELS_DIR", value_name = "PATH")]
    models_dir: Option<PathBuf>,

    /// Static UI directory served for non-API paths
    #[arg(long, env = "IMGPROMPT_UI_DIR", value_name = "PATH")]
    ui_dir: Option<PathBuf>,

    /// Disable in-process captioning and use the hosted API only
    #[arg(long)]
    no_local: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env.local takes precedence over .env; neither overrides the real environment
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "imgprompt_server=debug,imgprompt_core=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting imgprompt server");

    // Load configuration
    let mut config = EngineConfig::default();
    if let Some(models_dir) = args.models_dir {
        config.models_dir = models_dir;
    }
    if args.no_local {
        config.local_backend = false;
    }
    if config.hf_api_key.is_none() {
        warn!("HUGGING_FACE_API_KEY is not set; hosted captioning requests may be rejected");
    }
    info!("Models directory: {:?}", config.models_dir);

    let engine = PromptEngine::new(config)?;
    let state = AppState::new(engine);

    let app = api::create_router(state.clone(), args.ui_dir);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal(state));

    info!("Server ready. Press Ctrl+C to stop.");
    server.await?;

    Ok(())
}

/// Wait for a shutdown signal, then stop engine background work.
async fn shutdown_signal(state: AppState) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        },
    }

    state.engine.shutdown();
}
