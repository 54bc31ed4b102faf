//! Structured logging initialization (C9).
//!
//! Provides production-ready logging with:
//! - JSON or pretty format
//! - Request ID tracking (see [`super::middleware`])
//! - Configurable log levels
//! - A single pipeline for both this crate's `tracing` events and the
//!   consensus engine's own `slog` output (see [`engine_logger`]).

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable pretty format (for development).
    Pretty,
    /// JSON format (for production log aggregation).
    Json,
}

impl LogFormat {
    /// Parse log format from string, defaulting to pretty on anything else.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Initialize the logging system. Must be called once, before any other
/// subsystem starts.
///
/// `level` is the default level when `RUST_LOG` is unset; `json_format`
/// selects newline-delimited JSON records over pretty human-readable ones.
pub fn init_logging(level: &str, json_format: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("raft_node={level},raft_loadgen={level},tower_http=debug").into()
    });

    let registry = tracing_subscriber::registry().with(env_filter);

    if json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_thread_names(false),
            )
            .init();
    } else {
        registry.with(fmt::layer().pretty()).init();
    }

    // The consensus engine demands a `slog::Logger` at construction time.
    // Route its records through the standard `log` facade so they land in
    // the same subscriber, rather than standing up a second log sink.
    let _ = tracing_log::LogTracer::init();

    tracing::info!(
        level = %level,
        format = if json_format { "json" } else { "pretty" },
        "logging initialized"
    );
}

/// Builds the `slog::Logger` the consensus engine's `RawNode` constructor
/// requires, bridged into the `log` facade (and from there, via
/// [`init_logging`]'s `LogTracer`, into `tracing`).
pub fn engine_logger() -> slog::Logger {
    use slog::Drain;
    slog::Logger::root(slog_stdlog::StdLog.fuse(), slog::o!())
}
