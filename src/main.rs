mod api;
mod config;
mod error;
mod models;
mod pipeline;
mod scraper;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::api::{AppState, build_app};
use crate::config::AppConfig;
use crate::models::ScrapeRequest;
use crate::scraper::{AgmarknetScraper, MarketDataSource};

#[derive(Parser)]
#[command(name = "agmarknet-scraper", about = "AGMARKNET market price scraper", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API (default)
    Serve,

    /// Scrape one state/commodity and print the records as JSON
    Scrape {
        #[arg(short, long)]
        state: String,

        #[arg(short, long)]
        commodity: String,

        /// Market name; the first one offered is used when omitted
        #[arg(short, long)]
        market: Option<String>,
    },

    /// List the markets offered for a state/commodity
    Markets {
        #[arg(short, long)]
        state: String,

        #[arg(short, long)]
        commodity: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;

    let filter = match (cli.verbose, config.server.is_debug()) {
        (0, false) => "agmarknet_scraper=info,tower_http=info,warn",
        (0, true) | (1, _) => "agmarknet_scraper=debug,tower_http=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await?,

        Command::Scrape {
            state,
            commodity,
            market,
        } => {
            let scraper = AgmarknetScraper::new(config);
            let request = ScrapeRequest::new(state, commodity, market);
            let records = scraper.fetch_prices(&request).await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }

        Command::Markets { state, commodity } => {
            let scraper = AgmarknetScraper::new(config);
            let markets = scraper.fetch_markets(&state, &commodity).await;
            if markets.is_empty() {
                println!("No markets found for {} in {}.", commodity, state);
            }
            for market in &markets {
                println!("{}", market);
            }
        }
    }

    Ok(())
}

async fn serve(config: AppConfig) -> Result<()> {
    let addr = config.server.bind_addr()?;
    let state = AppState {
        batch_delay: config.scraper.request_delay(),
        source: Arc::new(AgmarknetScraper::new(config.clone())),
    };
    let app = build_app(state);

    info!(
        "Starting AGMARKNET Scraping Service on {} (debug: {})",
        addr,
        config.server.is_debug()
    );
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {}", e);
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
                tracing::error!("failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("received shutdown signal, starting graceful shutdown");
}
