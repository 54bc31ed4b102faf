//! Load generator worker loop (C7): a single concurrent client that POSTs
//! random payloads to a rotating set of targets until a shared deadline,
//! recording per-request latencies.

use std::time::{Duration, Instant};

use rand::RngCore;
use reqwest::{Client, StatusCode};

/// Configuration for one worker task.
pub struct WorkerConfig {
    /// Index of this worker, used for target assignment and result labeling.
    pub id: usize,
    /// Cluster targets (advertise URLs), shared read-only across workers.
    pub targets: Vec<String>,
    /// Size in bytes of each randomly generated payload.
    pub payload_bytes: usize,
    /// Optional sleep between requests.
    pub delay: Option<Duration>,
    /// Wall-clock instant at which the worker stops issuing new requests.
    pub deadline: Instant,
}

/// Per-worker results, fed into the aggregator (C8) after the join barrier.
pub struct WorkerResult {
    pub id: usize,
    pub requests: u64,
    pub errors: u64,
    /// Latency of each successful request, in microseconds.
    pub latencies_us: Vec<u64>,
}

/// Runs one worker until `config.deadline`, per SPEC_FULL.md §4.7.
pub async fn run(config: WorkerConfig) -> WorkerResult {
    let WorkerConfig {
        id,
        targets,
        payload_bytes,
        delay,
        deadline,
    } = config;

    let mut result = WorkerResult {
        id,
        requests: 0,
        errors: 0,
        latencies_us: Vec::new(),
    };

    if targets.is_empty() {
        tracing::error!(worker = id, "no targets configured");
        return result;
    }

    let client = match Client::builder()
        .timeout(Duration::from_secs(5))
        .user_agent(concat!("raft-loadgen/", env!("CARGO_PKG_VERSION")))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(worker = id, error = %e, "failed to build http client");
            return result;
        }
    };

    let mut target_idx = id % targets.len();
    let mut target = targets[target_idx].clone();
    let mut rng = rand::thread_rng();
    let mut payload = vec![0u8; payload_bytes];

    while Instant::now() < deadline {
        rng.fill_bytes(&mut payload);

        let url = format!("{target}/op");
        let started = Instant::now();
        match client.post(&url).body(payload.clone()).send().await {
            Ok(resp) if resp.status() == StatusCode::OK => {
                let elapsed = started.elapsed();
                result.latencies_us.push(elapsed.as_micros() as u64);
                result.requests += 1;
                tracing::debug!(worker = id, target = %target, latency_us = elapsed.as_micros(), "request committed");
            }
            Ok(resp) if resp.status() == StatusCode::CONFLICT => {
                result.errors += 1;
                if let Some(hint) = resp
                    .headers()
                    .get("X-Raft-Leader")
                    .and_then(|v| v.to_str().ok())
                {
                    tracing::debug!(worker = id, leader = hint, "redirected to leader");
                    target = hint.to_string();
                } else {
                    tracing::warn!(worker = id, "409 response missing X-Raft-Leader hint");
                }
            }
            Ok(resp) => {
                result.errors += 1;
                tracing::warn!(worker = id, target = %target, status = %resp.status(), "non-success response");
            }
            Err(e) => {
                result.errors += 1;
                tracing::warn!(worker = id, target = %target, error = %e, "transport error");
                target_idx = (target_idx + 1) % targets.len();
                target = targets[target_idx].clone();
            }
        }

        if let Some(delay) = delay {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            tokio::time::sleep(delay.min(remaining)).await;
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_with_no_targets_is_a_no_op() {
        let config = WorkerConfig {
            id: 0,
            targets: Vec::new(),
            payload_bytes: 16,
            delay: None,
            deadline: Instant::now(),
        };
        let result = tokio_test_block_on(run(config));
        assert_eq!(result.requests, 0);
        assert_eq!(result.errors, 0);
    }

    // Minimal single-threaded executor so this module's unit tests don't
    // need a `#[tokio::test]` runtime just to exercise the empty-targets
    // short-circuit path.
    fn tokio_test_block_on<F: std::future::Future>(fut: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(fut)
    }
}
