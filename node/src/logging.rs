//! # Logging
//!
//! One `tracing` subscriber for the whole process. `RUST_LOG` wins over the
//! built-in filter when set. Output goes to stderr; stdout is reserved for
//! command results such as `agora-node status`.

use clap::ValueEnum;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "agora_node=info,agora_protocol=info,tower_http=info";

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Colored, multi-field lines for a terminal.
    Pretty,
    /// One JSON object per line, for log shippers.
    Json,
}

/// Installs the global subscriber. Panics if one is already installed.
///
/// ```text
/// RUST_LOG=agora_protocol::network=trace agora-node run
/// ```
pub fn init_logging(default_filter: &str, format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let output: Box<dyn Layer<Registry> + Send + Sync> = match format {
        LogFormat::Pretty => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(false)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry().with(output).with(filter).init();
    tracing::debug!(format = ?format, "logging initialized");
}
