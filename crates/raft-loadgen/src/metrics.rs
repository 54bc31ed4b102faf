//! Metrics aggregation (C8): turns raw per-worker latency samples into
//! totals, throughput, percentiles, and a CDF, and serializes them to JSON
//! and CSV.

use std::io::Write as _;
use std::path::Path;
use std::time::Duration;

use serde::Serialize;

use crate::worker::WorkerResult;

/// Number of equi-probable points in the emitted CDF (§4.8).
pub const CDF_POINTS: usize = 100;

const PERCENTILES: [(&str, f64); 5] = [
    ("p50", 50.0),
    ("p75", 75.0),
    ("p90", 90.0),
    ("p95", 95.0),
    ("p99", 99.0),
];

#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    #[error("failed to create output directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write output file {path}: {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize metrics as JSON: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerSummary {
    pub id: usize,
    pub requests: u64,
    pub errors: u64,
    pub throughput_ops: f64,
    pub avg_latency_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CdfPoint {
    pub latency_ms: f64,
    pub probability: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Aggregate {
    pub total_requests: u64,
    pub error_count: u64,
    pub throughput_ops: f64,
    pub avg_latency_ms: f64,
    pub percentiles_ms: std::collections::BTreeMap<String, f64>,
    pub cdf: Vec<CdfPoint>,
    pub workers: Vec<WorkerSummary>,
}

/// Builds the full aggregate from per-worker results and the measured
/// wall-clock run duration, per SPEC_FULL.md §4.8.
pub fn aggregate(results: &[WorkerResult], duration: Duration) -> Aggregate {
    let duration_sec = duration.as_secs_f64();

    let total_requests: u64 = results.iter().map(|r| r.requests).sum();
    let error_count: u64 = results.iter().map(|r| r.errors).sum();

    let mut all_samples_us: Vec<u64> = results
        .iter()
        .flat_map(|r| r.latencies_us.iter().copied())
        .collect();
    all_samples_us.sort_unstable();

    let avg_latency_ms = mean_ms(&all_samples_us);
    let throughput_ops = if duration_sec > 0.0 {
        total_requests as f64 / duration_sec
    } else {
        0.0
    };

    let percentiles_ms = if all_samples_us.is_empty() {
        std::collections::BTreeMap::new()
    } else {
        PERCENTILES
            .iter()
            .map(|(name, p)| ((*name).to_string(), percentile_ms(&all_samples_us, *p)))
            .collect()
    };

    let cdf = build_cdf(&all_samples_us, CDF_POINTS);

    let workers = results
        .iter()
        .map(|r| {
            let throughput = if duration_sec > 0.0 {
                r.requests as f64 / duration_sec
            } else {
                0.0
            };
            WorkerSummary {
                id: r.id,
                requests: r.requests,
                errors: r.errors,
                throughput_ops: throughput,
                avg_latency_ms: mean_ms(&r.latencies_us),
            }
        })
        .collect();

    Aggregate {
        total_requests,
        error_count,
        throughput_ops,
        avg_latency_ms,
        percentiles_ms,
        cdf,
        workers,
    }
}

fn mean_ms(samples_us: &[u64]) -> f64 {
    if samples_us.is_empty() {
        return 0.0;
    }
    let sum: u64 = samples_us.iter().sum();
    (sum as f64 / samples_us.len() as f64) / 1000.0
}

/// `sorted_us` must already be sorted ascending. Returns the p-th
/// percentile in milliseconds using the nearest-rank index
/// `floor(p/100 * (n-1))` (§9, "Percentile definition").
fn percentile_ms(sorted_us: &[u64], p: f64) -> f64 {
    let n = sorted_us.len();
    let idx = ((p / 100.0) * (n as f64 - 1.0)).floor() as usize;
    sorted_us[idx.min(n - 1)] as f64 / 1000.0
}

/// Builds an equi-probable CDF of exactly `points` entries from sorted
/// microsecond samples. Empty input yields an empty CDF.
fn build_cdf(sorted_us: &[u64], points: usize) -> Vec<CdfPoint> {
    let n = sorted_us.len();
    if n == 0 {
        return Vec::new();
    }
    (1..=points)
        .map(|i| {
            let idx = ((i as f64 / points as f64) * (n as f64 - 1.0)).floor() as usize;
            let idx = idx.min(n - 1);
            CdfPoint {
                latency_ms: sorted_us[idx] as f64 / 1000.0,
                probability: (idx + 1) as f64 / n as f64,
            }
        })
        .collect()
}

/// Writes the aggregate as indented JSON to `path`, creating the parent
/// directory if needed.
pub fn write_json(aggregate: &Aggregate, path: &Path) -> Result<(), AggregatorError> {
    ensure_parent_dir(path)?;
    let json = serde_json::to_string_pretty(aggregate)?;
    std::fs::write(path, json).map_err(|source| AggregatorError::WriteFile {
        path: path.display().to_string(),
        source,
    })
}

/// Writes the CDF as CSV (`latency_ms,cdf` header, four-decimal rows) to
/// `path`, creating the parent directory if needed.
pub fn write_cdf_csv(aggregate: &Aggregate, path: &Path) -> Result<(), AggregatorError> {
    ensure_parent_dir(path)?;
    let mut out = String::from("latency_ms,cdf\n");
    for point in &aggregate.cdf {
        out.push_str(&format!(
            "{:.4},{:.4}\n",
            point.latency_ms, point.probability
        ));
    }
    let mut file = std::fs::File::create(path).map_err(|source| AggregatorError::WriteFile {
        path: path.display().to_string(),
        source,
    })?;
    file.write_all(out.as_bytes())
        .map_err(|source| AggregatorError::WriteFile {
            path: path.display().to_string(),
            source,
        })
}

fn ensure_parent_dir(path: &Path) -> Result<(), AggregatorError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|source| AggregatorError::CreateDir {
                path: parent.display().to_string(),
                source,
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: usize, latencies_ms: &[u64], errors: u64) -> WorkerResult {
        WorkerResult {
            id,
            requests: latencies_ms.len() as u64,
            errors,
            latencies_us: latencies_ms.iter().map(|ms| ms * 1000).collect(),
        }
    }

    #[test]
    fn scenario_five_worked_example() {
        let results = vec![result(0, &[1, 2, 3, 4, 5], 0)];
        let agg = aggregate(&results, Duration::from_secs(1));

        assert_eq!(agg.total_requests, 5);
        assert_eq!(agg.error_count, 0);
        assert!((agg.throughput_ops - 5.0).abs() < 1e-9);
        assert!((agg.avg_latency_ms - 3.0).abs() < 1e-9);
        assert!((agg.percentiles_ms["p50"] - 3.0).abs() < 1e-9);
        // Nearest-rank index floor(0.99 * (5-1)) = 3 -> sorted[3] = 4.0ms.
        assert!((agg.percentiles_ms["p99"] - 4.0).abs() < 1e-9);
        assert_eq!(agg.cdf.len(), 100);
        assert!((agg.cdf.last().unwrap().probability - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_input_yields_empty_percentiles_and_cdf() {
        let results = vec![result(0, &[], 3)];
        let agg = aggregate(&results, Duration::from_secs(1));

        assert_eq!(agg.total_requests, 0);
        assert_eq!(agg.error_count, 3);
        assert!(agg.percentiles_ms.is_empty());
        assert!(agg.cdf.is_empty());
        assert_eq!(agg.avg_latency_ms, 0.0);
    }

    #[test]
    fn cdf_probabilities_are_non_decreasing() {
        let samples: Vec<u64> = (1..=37).collect();
        let results = vec![result(0, &samples, 0)];
        let agg = aggregate(&results, Duration::from_secs(1));

        let mut last = 0.0;
        for point in &agg.cdf {
            assert!(point.probability >= last);
            last = point.probability;
        }
        assert_eq!(agg.cdf.len(), CDF_POINTS);
    }

    #[test]
    fn csv_round_trips_to_four_decimal_precision() {
        let results = vec![result(0, &[1, 2, 3, 4, 5], 0)];
        let agg = aggregate(&results, Duration::from_secs(1));

        let dir = std::env::temp_dir().join(format!("raft-loadgen-test-{}", std::process::id()));
        let path = dir.join("cdf.csv");
        write_cdf_csv(&agg, &path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next().unwrap(), "latency_ms,cdf");
        let first_row = lines.next().unwrap();
        let (latency_str, cdf_str) = first_row.split_once(',').unwrap();
        let latency: f64 = latency_str.parse().unwrap();
        let cdf: f64 = cdf_str.parse().unwrap();
        assert!((latency - agg.cdf[0].latency_ms).abs() < 1e-4);
        assert!((cdf - agg.cdf[0].probability).abs() < 1e-4);

        std::fs::remove_dir_all(&dir).ok();
    }
}
