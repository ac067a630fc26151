//! remix-daemon: hosts the remix graph engine.
//!
//! Single OS process running a Tokio async runtime. Upload handlers and
//! the graph view talk to the daemon via JSON-RPC over a Unix socket.

mod commands;
mod config;
mod events;
mod rpc;

use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use remix_graph::{RemixManager, RemixService};

use crate::config::DaemonConfig;
use crate::events::EventBus;
use crate::rpc::RpcServer;

/// Daemon-wide shared state.
pub struct DaemonState {
    /// The remix engine and its database connection.
    pub service: Mutex<RemixService>,
    /// Configuration.
    pub config: DaemonConfig,
    /// Event bus for pushing events to subscribers.
    pub event_bus: EventBus,
    /// Shutdown signal sender.
    pub shutdown_tx: broadcast::Sender<()>,
}

impl DaemonState {
    fn new(conn: rusqlite::Connection, config: DaemonConfig) -> Self {
        let event_bus = EventBus::new(config.advanced.event_buffer);
        let manager = RemixManager::new(config.graph.clone(), Arc::new(event_bus.clone()));
        let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);
        Self {
            service: Mutex::new(RemixService::new(conn, manager)),
            config,
            event_bus,
            shutdown_tx,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let config = DaemonConfig::load()?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(config.log_directive().parse()?),
        )
        .init();

    info!("Remix daemon starting");

    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;

    // 2. Open database
    let db_path = config.db_path();
    let conn = remix_db::open(&db_path)?;
    info!(path = ?db_path, "database ready");

    // 3. Build daemon state (event bus is the remix notification sink)
    let state = Arc::new(DaemonState::new(conn, config));

    // Trace every emitted event
    let mut event_rx = state.event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(event) => debug!(event_type = %event.event_type, payload = %event.payload, "event"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event log lagging"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    // 4. Start IPC server
    let socket_path = data_dir.join("daemon.sock");
    let rpc_server = RpcServer::new(state.clone(), socket_path.clone());

    info!("Starting JSON-RPC server on {:?}", socket_path);

    state.event_bus.emit(events::Event {
        event_type: "DaemonStarted".to_string(),
        timestamp: remix_types::now_secs(),
        payload: serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "max_graph_iterations": state.config.graph.max_graph_iterations,
        }),
    });

    // 5. Run the RPC server until shutdown
    let mut shutdown_rx = state.shutdown_tx.subscribe();
    tokio::select! {
        result = rpc_server.run() => {
            if let Err(e) = result {
                error!("RPC server error: {}", e);
            }
        }
        _ = shutdown_rx.recv() => {
            info!("Shutdown signal received");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
        }
    }

    info!("Daemon shutting down gracefully");

    // Clean up socket file
    let _ = std::fs::remove_file(&socket_path);

    info!(events = state.event_bus.sequence(), "Daemon stopped");
    Ok(())
}

/// Daemon state over an in-memory database.
#[cfg(test)]
pub(crate) fn test_state() -> Arc<DaemonState> {
    let conn = remix_db::open_memory().expect("open test db");
    Arc::new(DaemonState::new(conn, DaemonConfig::default()))
}
