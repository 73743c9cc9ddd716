//! runner-watchdog
//!
//! Starts and stops on-demand CI build agents on Compute Engine according to
//! the GitHub Actions jobs waiting for them.
//!
//! - `serve`: HTTP server; every request to `/` runs one reconciliation pass
//! - `run`: run one pass and print the outcome
//! - `plan`: print what a pass would do without touching any instance

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use watchdog_service::{api, build_reconciler, AppState, Config, Settings};

#[derive(Debug, Parser)]
#[command(name = "runner-watchdog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve reconciliation passes over HTTP.
    Serve {
        /// Address to listen on; defaults to 0.0.0.0:$PORT.
        #[arg(long, env = "WATCHDOG_LISTEN_ADDR")]
        listen_addr: Option<SocketAddr>,

        /// Port used when no listen address is given.
        #[arg(long, env = "PORT", default_value_t = 8080)]
        port: u16,
    },

    /// Run a single reconciliation pass.
    Run,

    /// Show the start/stop plan without applying it.
    Plan,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_settings(cli.settings)?;

    // Prefer RUST_LOG, fall back to the configured level
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(
        project = %config.target.project,
        zone = %config.target.zone,
        scope = %config.target.scope(),
        "Configuration loaded"
    );

    let reconciler = build_reconciler(&config)?;

    match cli.command {
        Commands::Serve { listen_addr, port } => {
            let addr = listen_addr.unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], port)));
            serve(AppState::new(reconciler, config.target), addr).await
        }
        Commands::Run => {
            let outcome = reconciler
                .reconcile(&config.target)
                .await
                .context("Error during processing")?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Commands::Plan => {
            let (required, plan) = reconciler
                .plan(&config.target)
                .await
                .context("Error during planning")?;
            let report = json!({
                "required_labels": required,
                "instances_to_start": plan.to_start,
                "instances_to_stop": plan.to_stop,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(addr = %addr, "Listening for connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Received shutdown signal");
        })
        .await
        .context("Server error")?;

    info!("Watchdog shutdown complete");
    Ok(())
}
