//! Switchboard binary: runs the router process.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use switchboard::backend::bucket::BucketTransport;
use switchboard::backend::http::{HttpGatewayConfig, HttpTransport};
use switchboard::backend::Transport;
use switchboard::config::{BackendConfig, BackendKind, SwitchboardConfig};
use switchboard::extensions::{DefaultLanguage, ExtensionRegistry};
use switchboard::router::Router;
use switchboard::store::IdentityStore;

/// Message routing between pluggable transports and unified contacts.
#[derive(Parser)]
#[command(name = "switchboard", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the router process: start every configured backend and route
    /// traffic until interrupted.
    Start,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Start => start().await,
    }
}

async fn start() -> Result<()> {
    let config = SwitchboardConfig::load().context("failed to load configuration")?;
    let _guard = switchboard::logging::init_router(
        Path::new(&config.paths.logs_dir),
        &config.log_level,
    )?;
    info!(version = env!("CARGO_PKG_VERSION"), "switchboard starting");

    let store = Arc::new(
        IdentityStore::open(Path::new(&config.paths.db))
            .await
            .context("failed to open identity store")?,
    );

    // Capabilities are composed here, once, from static configuration.
    let mut extensions = ExtensionRegistry::new();
    extensions.register(Box::new(DefaultLanguage::new(&config.language)));

    let mut router = Router::new(Arc::clone(&store), extensions);
    for backend in &config.backends {
        let transport = build_transport(backend)?;
        router.register(transport);
        info!(backend = %backend.name, kind = ?backend.kind, "backend registered");
    }
    if config.backends.is_empty() {
        warn!("no backends configured, router will only serve the store");
    }

    router.start().await.context("failed to start backends")?;

    tokio::select! {
        result = router.process_inbound() => {
            result.context("inbound processing failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down");
        }
    }

    router.stop().await;
    Ok(())
}

fn build_transport(backend: &BackendConfig) -> Result<Arc<dyn Transport>> {
    match backend.kind {
        BackendKind::Bucket => Ok(Arc::new(BucketTransport::new(&backend.name))),
        BackendKind::Http => {
            let outbound_url = backend
                .outbound_url
                .clone()
                .with_context(|| format!("backend {} needs outbound_url", backend.name))?;
            let poll_url = backend
                .poll_url
                .clone()
                .with_context(|| format!("backend {} needs poll_url", backend.name))?;
            let transport = HttpTransport::new(HttpGatewayConfig {
                name: backend.name.clone(),
                outbound_url,
                poll_url,
            })
            .with_context(|| format!("backend {} HTTP client", backend.name))?;
            Ok(Arc::new(transport))
        }
    }
}
