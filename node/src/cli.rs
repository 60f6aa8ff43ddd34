//! # CLI Interface
//!
//! Defines the command-line argument structure for `agora-node` using
//! `clap` derive. Supports four subcommands: `run`, `init`, `status`,
//! and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use agora_protocol::config::{DEFAULT_API_PORT, DEFAULT_GOSSIP_PORT, DEFAULT_METRICS_PORT};

use crate::logging::LogFormat;

/// Agora gossip node.
///
/// Joins the gossip network, stores and relays proof-of-work-stamped
/// objects, keeps local identities and their inboxes, and serves a
/// management API on localhost.
#[derive(Parser, Debug)]
#[command(
    name = "agora-node",
    about = "Agora gossip node",
    version,
    propagate_version = true
)]
pub struct AgoraNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the Agora node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Initialize a data directory with an empty snapshot.
    Init(InitArgs),
    /// Query the status of a running node via its management API.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Directory holding the `agora.json` snapshot. Created if missing.
    #[arg(long, short = 'd', env = "AGORA_DATA_DIR", default_value = ".agora")]
    pub data_dir: PathBuf,

    /// Port of the public gossip server.
    #[arg(long, env = "AGORA_GOSSIP_PORT", default_value_t = DEFAULT_GOSSIP_PORT)]
    pub gossip_port: u16,

    /// Port of the local management API (bound to 127.0.0.1).
    #[arg(long, env = "AGORA_API_PORT", default_value_t = DEFAULT_API_PORT)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "AGORA_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// `host:port` under which this node is reachable. Repeatable; each
    /// address is self-advertised with proof of work.
    #[arg(long = "advertise", value_name = "HOST:PORT")]
    pub advertise: Vec<String>,

    /// Seed peer to dial on startup. Repeatable.
    #[arg(long = "bootstrap", value_name = "HOST:PORT")]
    pub bootstrap: Vec<String>,

    /// Log transport failures at trace level instead of warn.
    #[arg(long)]
    pub silence_networking_errors: bool,

    /// Log output format: `pretty` or `json`.
    #[arg(long, env = "AGORA_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Path to the data directory to initialize.
    #[arg(long, short = 'd', env = "AGORA_DATA_DIR", default_value = ".agora")]
    pub data_dir: PathBuf,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Management API endpoint of the running node.
    #[arg(long, default_value = "http://127.0.0.1:4011")]
    pub api_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        // Ensures the derive macros produce a valid CLI definition.
        AgoraNodeCli::command().debug_assert();
    }

    #[test]
    fn run_flags_are_repeatable() {
        let cli = AgoraNodeCli::parse_from([
            "agora-node",
            "run",
            "--advertise",
            "a.example:4010",
            "--advertise",
            "b.example:4010",
            "--bootstrap",
            "seed.example:4010",
            "--log-format",
            "json",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.advertise, vec!["a.example:4010", "b.example:4010"]);
        assert_eq!(args.bootstrap, vec!["seed.example:4010"]);
        assert_eq!(args.gossip_port, 4010);
        assert_eq!(args.log_format, LogFormat::Json);
        assert!(!args.silence_networking_errors);
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        let result = AgoraNodeCli::try_parse_from(["agora-node", "run", "--log-format", "xml"]);
        assert!(result.is_err());
    }
}
