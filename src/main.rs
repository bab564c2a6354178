//! Local edge router.
//!
//! Serves a site the way the edge does: edge functions first, then
//! redirects and rewrites, then static files or the framework server.
//!
//! ```text
//!     Client Request
//!     ───────────────▶ http server ──▶ routing::Router
//!                                          │
//!                        ┌─────────────────┼──────────────────┐
//!                        ▼                 ▼                  ▼
//!                  edge functions      redirects           origin
//!                  (sandbox chain)   (_redirects, toml)  (static, framework)
//!
//!     registry watcher ──▶ RegistryHandle (ArcSwap snapshot)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use edge_router::config::{load_config, load_project};
use edge_router::edge::{HttpSandbox, NativeSandbox, Sandbox};
use edge_router::http::HttpServer;
use edge_router::lifecycle::signals::spawn_signal_handler;
use edge_router::lifecycle::{bootstrap, Shutdown};
use edge_router::observability::{logging, metrics};
use edge_router::registry::RegistryWatcher;

const AUTH_TOKEN_ENV: &str = "NETLIFY_AUTH_TOKEN";

#[derive(Parser)]
#[command(name = "edge-router")]
#[command(about = "Local edge router for edge functions, redirects and static assets", long_about = None)]
struct Cli {
    /// Project directory.
    #[arg(short, long, default_value = ".")]
    dir: PathBuf,

    /// Configuration file. Defaults to `netlify.toml` in the project directory.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on.
    #[arg(short, long)]
    port: Option<u16>,

    /// Port of the framework dev server.
    #[arg(long)]
    target_port: Option<u16>,

    /// Country code for geolocation.
    #[arg(long)]
    country: Option<String>,

    /// Do not fetch site metadata.
    #[arg(long)]
    offline: bool,

    /// Verbose logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => load_project(&cli.dir)?,
    };
    if let Some(port) = cli.port {
        let host = config
            .listener
            .bind_address
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "127.0.0.1".to_string());
        config.listener.bind_address = format!("{}:{}", host, port);
    }
    if cli.target_port.is_some() {
        config.dev.target_port = cli.target_port;
    }
    if cli.country.is_some() {
        config.dev.country = cli.country.clone();
    }
    config.dev.offline |= cli.offline;
    if config.site.auth_token.is_none() {
        config.site.auth_token = std::env::var(AUTH_TOKEN_ENV).ok();
    }

    logging::init(&config.observability.log_level, cli.debug);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "edge-router starting");
    tracing::info!(
        project_root = %config.project_root.display(),
        bind_address = %config.listener.bind_address,
        pipeline = ?config.routing.pipeline,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let sandbox: Arc<dyn Sandbox> = match &config.sandbox.url {
        Some(url) => {
            tracing::info!(url = %url, "Using HTTP sandbox");
            Arc::new(HttpSandbox::new(url))
        }
        None => {
            tracing::warn!("No sandbox configured; edge functions will fail according to their onError policy");
            Arc::new(NativeSandbox::new())
        }
    };

    let services = bootstrap(config, sandbox).await?;
    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    let watcher = if services.config.watch.enabled {
        Some(RegistryWatcher::new(services.config.clone(), services.registry.clone()).spawn(shutdown.subscribe())?)
    } else {
        None
    };

    let listener = TcpListener::bind(&services.config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(&services.config, services.router.clone());
    server.run(listener, shutdown.subscribe()).await?;

    if let Some(watcher) = watcher {
        let _ = watcher.await;
    }
    tracing::info!("Shutdown complete");
    Ok(())
}
