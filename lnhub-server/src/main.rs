//! lnhub server
//!
//! Management backend for a Lightning node: ingests the node's live event
//! streams, persists normalized records, and republishes events to
//! websocket clients in real time.

mod config;
mod server;
mod shutdown;
mod state;
mod ws;

use clap::Parser;
use config::{ConfigLoader, get_database_url};
use lnhub_core::cache::Caches;
use lnhub_core::db::{DatabaseProcessor, LedgerStore};
use lnhub_core::events::EventBus;
use lnhub_core::node::{LightningNode, RemoteNode, RemoteNodeConfig};
use lnhub_core::subscribe;
use server::{build_router, run_server};
use shutdown::shutdown_signal;
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// lnhub - Lightning node management backend
#[derive(Parser, Debug)]
#[command(name = "lnhub-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./lnhub-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();
    tracing::info!("Starting lnhub-server v{}", env!("CARGO_PKG_VERSION"));

    let config_loader = ConfigLoader::new(&args.config, args.listen);
    let config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!("Configuration loaded from {:?}", args.config);

    let database_url = get_database_url().map_err(|e| {
        tracing::error!("DATABASE_URL environment variable not set");
        e
    })?;

    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    if args.migrate {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&db_pool).await?;
        tracing::info!("Migrations completed successfully");
    }

    let bus = EventBus::default();
    let caches = Caches::new();
    let node: Arc<dyn LightningNode> = Arc::new(RemoteNode::new(RemoteNodeConfig {
        address: config.node.address.clone(),
        ws_address: config.node.ws_address.clone(),
        auth_token: config.node.auth_token.clone(),
    })?);
    let store: Arc<dyn LedgerStore> = Arc::new(DatabaseProcessor {
        pool: db_pool.clone(),
    });

    let state = AppState {
        db: db_pool.clone(),
        bus: bus.clone(),
        node: node.clone(),
        caches: caches.clone(),
        node_id: config.node.id,
    };

    // One root token coordinates everything: signals, the HTTP server, and
    // the ingestion supervisor.
    let root = CancellationToken::new();
    {
        let root = root.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            root.cancel();
        });
    }

    let router = build_router(state);
    let listen_addr = config.server.listen;
    tracing::info!("Starting HTTP server on {}", listen_addr);
    let mut server_task = tokio::spawn(run_server(router, listen_addr, root.clone()));
    let mut supervisor = tokio::spawn(subscribe::start(
        root.clone(),
        node,
        store,
        config.node.id,
        bus,
        caches,
    ));

    let supervisor_result = tokio::select! {
        joined = &mut supervisor => {
            tracing::info!("Ingestion supervisor terminated, stopping HTTP server");
            root.cancel();
            let _ = server_task.await;
            joined
        }
        joined = &mut server_task => {
            match joined {
                Ok(Ok(())) => tracing::info!("HTTP server stopped"),
                Ok(Err(e)) => tracing::error!(error = %e, "HTTP server failed"),
                Err(e) => tracing::error!(error = %e, "HTTP server task failed"),
            }
            root.cancel();
            supervisor.await
        }
    };

    tracing::info!("Closing database connections...");
    db_pool.close().await;

    match supervisor_result {
        Ok(Ok(())) => {
            tracing::info!("Server shutdown complete");
            Ok(())
        }
        Ok(Err(e)) => Err(e.into()),
        Err(e) => Err(anyhow::anyhow!("supervisor task failed: {e}")),
    }
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
