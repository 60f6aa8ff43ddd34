// Copyright (c) 2026 The Agora Developers. MIT License.
// See LICENSE for details.

//! # Agora Node
//!
//! Entry point for the `agora-node` binary. Parses CLI arguments, initializes
//! logging and metrics, restores the snapshot, joins the gossip network, and
//! serves the management API.
//!
//! The binary supports four subcommands:
//!
//! - `run`     - start the node
//! - `init`    - initialize a data directory with an empty snapshot
//! - `status`  - query a running node's status endpoint
//! - `version` - print build version information

mod api;
mod cli;
mod logging;
mod metrics;
mod persistence;

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

use agora_protocol::config::NodeConfig;
use agora_protocol::AgoraNode;

use cli::{AgoraNodeCli, Commands};
use logging::LogFormat;
use metrics::NodeMetrics;
use persistence::{Persistence, Snapshot};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = AgoraNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args).await,
        Commands::Status(args) => query_status(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the full node: gossip server and timers, management API, metrics
/// endpoint and snapshot persistence.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(logging::DEFAULT_FILTER, args.log_format);

    tracing::info!(
        gossip_port = args.gossip_port,
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        data_dir = %args.data_dir.display(),
        "starting agora-node"
    );

    // --- Snapshot ---
    let snapshot_path = persistence::snapshot_path(&args.data_dir);
    let restored = Snapshot::load(&snapshot_path).restore();

    // --- Node ---
    let config = NodeConfig {
        listen_addr: SocketAddr::from(([0, 0, 0, 0], args.gossip_port)),
        advertised_addresses: args.advertise,
        bootstrap_peers: args.bootstrap,
        silence_networking_errors: args.silence_networking_errors,
        ..NodeConfig::default()
    };
    let node = Arc::new(
        AgoraNode::start_with(
            config,
            restored.objects,
            restored.peers,
            restored.identities,
        )
        .await
        .context("failed to start gossip node")?,
    );

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);
    node_metrics.observe(&node);

    // --- Persistence ---
    let persistence = Persistence::watch(&node, snapshot_path);

    // --- Management API ---
    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            agora_protocol::config::PROTOCOL_VERSION,
        ),
        node: Arc::clone(&node),
        metrics: Arc::clone(&node_metrics),
    };
    let api_router = api::create_router(app_state);
    let api_addr = SocketAddr::from(([127, 0, 0, 1], args.api_port));
    let api_listener = tokio::net::TcpListener::bind(api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("management API listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(metrics::MetricsState {
            metrics: Arc::clone(&node_metrics),
            node: Arc::clone(&node),
        });
    let metrics_addr = SocketAddr::from(([0, 0, 0, 0], args.metrics_port));
    let metrics_listener = tokio::net::TcpListener::bind(metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("metrics server listening on {}", metrics_addr);

    // --- Serve ---
    let outcome = tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            res.context("management API server failed")
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            res.context("metrics server failed")
        }
        res = persistence.run(Arc::clone(&node)) => res,
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
            Ok(())
        }
    };

    node.stop();
    if let Err(e) = &outcome {
        let message = format!("{:#}", e);
        tracing::error!(error = %message, "agora-node stopped on error");
    } else {
        tracing::info!("agora-node stopped");
    }
    outcome
}

/// Creates a data directory holding an empty snapshot.
async fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging(logging::DEFAULT_FILTER, LogFormat::Pretty);

    let data_dir = &args.data_dir;
    tracing::info!(data_dir = %data_dir.display(), "initializing node");

    let created = persistence::init(data_dir)
        .await
        .with_context(|| format!("failed to initialize {}", data_dir.display()))?;

    let path = persistence::snapshot_path(data_dir);
    if created {
        println!("Node initialized successfully.");
    } else {
        println!("Snapshot already present, left untouched.");
    }
    println!("  Data directory : {}", data_dir.display());
    println!("  Snapshot       : {}", path.display());

    Ok(())
}

/// Queries a running node's status endpoint and prints the result.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let url = format!("{}/status", args.api_url.trim_end_matches('/'));
    let status: api::StatusResponse = reqwest::get(&url)
        .await
        .with_context(|| format!("failed to reach {}", url))?
        .error_for_status()?
        .json()
        .await
        .context("malformed status response")?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("agora-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol   {}", agora_protocol::config::PROTOCOL_VERSION);
    println!(
        "messages   v{}",
        agora_protocol::config::MESSAGE_FORMAT_VERSION
    );
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
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
