//! Strata server binary.
//!
//! Serves the memory tools over MCP, on stdio (default) or HTTP.

use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use strata::config::{Config, ServerMode};
use strata::{api, AppState};

#[derive(Debug, Parser)]
#[command(name = "strata", version, about = "Hierarchical semantic memory server")]
struct Args {
    /// Transport to serve MCP on
    #[arg(long, value_enum)]
    mode: Option<ServerMode>,

    /// Bind address in http mode
    #[arg(long)]
    host: Option<String>,

    /// Port in http mode
    #[arg(long)]
    port: Option<u16>,

    /// Do not pull missing Ollama models at startup
    #[arg(long)]
    no_pull: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(mode) = args.mode {
        config.server.mode = mode;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.no_pull {
        config.embedding.auto_pull = false;
    }

    init_tracing(config.logging.json);

    tracing::info!(
        mode = ?config.server.mode,
        backend = ?config.store.backend,
        prefix = %config.store.collection_prefix,
        auto_pull = config.embedding.auto_pull,
        "Starting Strata"
    );

    let mode = config.server.mode;
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(config)
        .await
        .context("Failed to initialize application state")?;

    match mode {
        ServerMode::Stdio => api::stdio::serve(state).await?,
        ServerMode::Http => {
            let addr: SocketAddr = addr
                .parse()
                .with_context(|| format!("Invalid listen address: {}", addr))?;
            let listener = TcpListener::bind(addr).await?;
            tracing::info!(%addr, "Listening");

            axum::serve(listener, api::router(state)).await?;
        }
    }

    Ok(())
}

/// Logs go to stderr so stdout stays free for the stdio transport.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "strata=info,tower_http=info".into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
