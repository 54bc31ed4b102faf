//! # Raft Load Generator
//!
//! Drives concurrent write load against a `raft-node` cluster and reports
//! throughput and latency distribution statistics (SPEC_FULL.md §4.7, §4.8).

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;

use raft_loadgen::metrics::{self, Aggregate};
use raft_loadgen::observability::logging::{init_logging, LogFormat};
use raft_loadgen::worker::{self, WorkerConfig};

/// raft-loadgen — measures end-to-end commit throughput and latency
/// against a raft-node cluster.
#[derive(Parser, Debug)]
#[command(name = "raft-loadgen")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Comma-separated list of target node URLs, e.g. `http://127.0.0.1:9001`.
    #[arg(long)]
    targets: String,

    /// Number of concurrent worker clients.
    #[arg(long, default_value_t = 1)]
    clients: usize,

    /// Total run duration, e.g. `30s`, `2m`.
    #[arg(long, default_value = "10s")]
    duration: humantime::Duration,

    /// Size in bytes of each randomly generated payload.
    #[arg(long, default_value_t = 256)]
    payload_bytes: usize,

    /// Optional delay between a worker's requests, e.g. `10ms`.
    #[arg(long)]
    delay: Option<humantime::Duration>,

    /// Optional path to write aggregated metrics as indented JSON.
    #[arg(long)]
    out_json: Option<PathBuf>,

    /// Optional path to write the latency CDF as CSV.
    #[arg(long)]
    out_latencies: Option<PathBuf>,

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

    let targets: Vec<String> = args
        .targets
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.trim_end_matches('/').to_string())
        .collect();

    if targets.is_empty() {
        tracing::error!("no targets configured");
        std::process::exit(1);
    }

    let clients = args.clients.max(1);
    let duration: Duration = args.duration.into();
    let delay: Option<Duration> = args.delay.map(Into::into);

    tracing::info!(
        targets = ?targets,
        clients,
        duration = ?duration,
        payload_bytes = args.payload_bytes,
        "starting load generator"
    );

    let deadline = Instant::now() + duration;
    let mut handles = Vec::with_capacity(clients);
    for id in 0..clients {
        let config = WorkerConfig {
            id,
            targets: targets.clone(),
            payload_bytes: args.payload_bytes,
            delay,
            deadline,
        };
        handles.push(tokio::spawn(worker::run(config)));
    }

    let started = Instant::now();
    let mut results = Vec::with_capacity(clients);
    for handle in handles {
        match handle.await {
            Ok(result) => results.push(result),
            Err(e) => tracing::error!(error = %e, "worker task panicked"),
        }
    }
    let elapsed = started.elapsed();

    let aggregate = metrics::aggregate(&results, elapsed);
    report(&aggregate);

    if let Some(path) = &args.out_json {
        metrics::write_json(&aggregate, path)
            .with_context(|| format!("failed to write JSON metrics to {}", path.display()))?;
        tracing::info!(path = %path.display(), "wrote JSON metrics");
    }

    if let Some(path) = &args.out_latencies {
        metrics::write_cdf_csv(&aggregate, path)
            .with_context(|| format!("failed to write latency CDF to {}", path.display()))?;
        tracing::info!(path = %path.display(), "wrote latency CDF");
    }

    Ok(())
}

fn report(aggregate: &Aggregate) {
    tracing::info!(
        total_requests = aggregate.total_requests,
        error_count = aggregate.error_count,
        throughput_ops = aggregate.throughput_ops,
        avg_latency_ms = aggregate.avg_latency_ms,
        "run complete"
    );
    for (name, value) in &aggregate.percentiles_ms {
        tracing::info!(percentile = %name, latency_ms = value, "latency percentile");
    }
    for worker in &aggregate.workers {
        tracing::info!(
            worker = worker.id,
            requests = worker.requests,
            errors = worker.errors,
            throughput_ops = worker.throughput_ops,
            avg_latency_ms = worker.avg_latency_ms,
            "worker summary"
        );
    }
}
