//! # Raft Load Generator
//!
//! A matched load-generation client for a `raft-node` cluster: a configurable
//! number of concurrent workers hammer `/op` with random payloads for a
//! bounded duration, rotating across targets on failure and following
//! leader redirects, while capturing per-request latencies for later
//! aggregation into throughput, percentile, and CDF statistics.
//!
//! ```text
//!   worker 0 ──┐
//!   worker 1 ──┼──► POST /op (rotating targets) ──► raft-node cluster
//!   worker N ──┘
//!        │
//!        ▼ (join barrier)
//!  metrics aggregator (C8) ──► stdout summary, JSON, CSV CDF
//! ```

pub mod metrics;
pub mod observability;
pub mod worker;
