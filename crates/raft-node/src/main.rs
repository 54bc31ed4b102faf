//! # Raft Node
//!
//! The entry point for running a single node of the cluster: wires
//! together the consensus engine, the KV state machine, the pending table,
//! peer transport, the consensus loop, and the HTTP surface, then serves
//! until a shutdown signal arrives (SPEC_FULL.md §4.6).

use std::net::SocketAddr;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use raft_node::api::{create_router, AppState};
use raft_node::config::NodeConfig;
use raft_node::consensus::raft_engine::RaftEngine;
use raft_node::consensus_loop::{Consensus, ConsensusContext};
use raft_node::kv_store::KvStore;
use raft_node::observability::logging::{init_logging, LogFormat};
use raft_node::pending::PendingTable;
use raft_node::transport::PeerTransport;

/// raft-node — a single node of a replicated state-machine cluster.
#[derive(Parser, Debug)]
#[command(name = "raft-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// This node's id. Must be non-zero and unique within the cluster.
    #[arg(long)]
    id: u64,

    /// Address this node listens on (bare `host:port` or `http://host:port`).
    #[arg(long)]
    addr: String,

    /// Comma-separated cluster membership: `ID=ADDR,ID=ADDR,...`.
    #[arg(long, default_value = "")]
    peers: String,

    /// Default log level when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format: `pretty` or `json`.
    #[arg(long, default_value = "pretty")]
    log_format: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_format = LogFormat::parse(&args.log_format);
    init_logging(&args.log_level, matches!(log_format, LogFormat::Json));

    let config = match NodeConfig::build(args.id, &args.addr, &args.peers, args.log_level.clone(), log_format) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    tracing::info!(
        id = config.id,
        listen_addr = %config.listen_addr,
        advertise_addr = %config.advertise_addr,
        peers = ?config.initial_peer_ids,
        "node configuration loaded"
    );

    let engine = RaftEngine::new(&config).context("failed to construct consensus engine")?;

    let kv_store = Arc::new(KvStore::new());
    let pending = Arc::new(PendingTable::new());
    let peers = Arc::new(config.peers.clone());
    let transport = Arc::new(PeerTransport::new(config.id, peers.clone())?);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let ctx = ConsensusContext {
        kv_store: kv_store.clone(),
        pending: pending.clone(),
        transport,
        leader_hint: Arc::new(AtomicU64::new(0)),
    };
    let consensus = Arc::new(Consensus::spawn(Box::new(engine), ctx, shutdown_rx));

    let state = AppState {
        local_id: config.id,
        consensus,
        kv_store,
        pending,
        peers,
    };

    let router = create_router(state);
    let listen_addr: SocketAddr = config
        .listen_addr
        .parse()
        .context("listen address must be a valid socket address")?;

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;
    tracing::info!(addr = %listen_addr, "HTTP server listening");

    let mut http_shutdown_rx = shutdown_tx.subscribe();
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = http_shutdown_rx.changed().await;
            })
            .await
    });

    tracing::info!("raft-node running, press Ctrl+C to stop");
    wait_for_shutdown_signal().await;

    tracing::info!("shutting down");
    let _ = shutdown_tx.send(true);

    match tokio::time::timeout(Duration::from_secs(5), server).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => tracing::error!(error = %e, "HTTP server exited with an error"),
        Ok(Err(e)) => tracing::error!(error = %e, "HTTP server task panicked"),
        Err(_) => tracing::warn!("HTTP server did not shut down within the grace window"),
    }

    Ok(())
}

/// Resolves once SIGINT or SIGTERM is received (§4.6).
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
