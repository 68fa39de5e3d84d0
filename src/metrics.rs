//! Request metrics for the query server
//!
//! Lightweight counters kept per server:
//! - requests per operation (`Insert`, `Select`, `Delete`, `Unsupported`, `Unparsed`)
//! - failures per error code
//! - rolling latency window with p50/p95/p99
//! - the most recent slow requests
//!
//! All counters are atomics; the latency window and slow-request buffer sit
//! behind mutexes and are bounded.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use acadb::metrics::Metrics;
//!
//! let metrics = Metrics::new();
//! metrics.record_request("Select", None, Duration::from_micros(250));
//! metrics.record_request("Unparsed", Some("PARSE_ERROR"), Duration::from_micros(10));
//!
//! let snap = metrics.snapshot();
//! assert_eq!(snap.request_count, 2);
//! assert_eq!(snap.error_count, 1);
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Number of recent request latencies kept for percentiles.
const LATENCY_WINDOW_SIZE: usize = 1000;

/// Number of slow requests retained for reporting.
const MAX_SLOW_REQUESTS: usize = 10;

/// Requests at or above this duration are tracked as slow.
pub const SLOW_REQUEST_THRESHOLD: Duration = Duration::from_millis(100);

const OPERATIONS: [&str; 5] = ["Insert", "Select", "Delete", "Unsupported", "Unparsed"];
const ERROR_CODES: [&str; 4] = ["PARSE_ERROR", "UNSUPPORTED_QUERY", "QUERY_ERROR", "IO_ERROR"];

pub struct Metrics {
    request_count: AtomicU64,
    error_count: AtomicU64,
    slow_request_count: AtomicU64,

    /// Indexed like `OPERATIONS`
    op_counts: [AtomicU64; 5],
    op_latency_sums_us: [AtomicU64; 5],

    /// Indexed like `ERROR_CODES`
    error_counts: [AtomicU64; 4],

    latencies_us: Mutex<VecDeque<u64>>,
    slow_requests: Mutex<VecDeque<SlowRequest>>,

    started_at: Instant,
}

/// A request that took at least `SLOW_REQUEST_THRESHOLD`
#[derive(Clone, Debug, PartialEq)]
pub struct SlowRequest {
    pub operation: String,
    pub duration_us: u64,
    /// Microseconds since the metrics started
    pub timestamp_us: u64,
}

/// Per-operation totals
#[derive(Clone, Debug, PartialEq)]
pub struct OperationStat {
    pub operation: String,
    pub count: u64,
    pub avg_us: u64,
}

/// Point-in-time copy of all metrics, plain values only
#[derive(Clone, Debug, Default)]
pub struct MetricsSnapshot {
    pub request_count: u64,
    pub error_count: u64,
    pub slow_request_count: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub avg_us: u64,
    pub errors_by_code: BTreeMap<String, u64>,
    pub op_stats: Vec<OperationStat>,
    pub recent_slow_requests: Vec<SlowRequest>,
    pub uptime_secs: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            request_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            slow_request_count: AtomicU64::new(0),
            op_counts: Default::default(),
            op_latency_sums_us: Default::default(),
            error_counts: Default::default(),
            latencies_us: Mutex::new(VecDeque::with_capacity(LATENCY_WINDOW_SIZE)),
            slow_requests: Mutex::new(VecDeque::with_capacity(MAX_SLOW_REQUESTS)),
            started_at: Instant::now(),
        }
    }

    /// Record one dispatched request.
    ///
    /// `error_code` is the failing `QueryError::code()`, `None` on success.
    /// Unrecognized operation names count as `Unsupported`.
    pub fn record_request(&self, operation: &str, error_code: Option<&str>, duration: Duration) {
        let duration_us = duration.as_micros().min(u64::MAX as u128) as u64;

        self.request_count.fetch_add(1, Ordering::Relaxed);

        let op = op_index(operation);
        self.op_counts[op].fetch_add(1, Ordering::Relaxed);
        self.op_latency_sums_us[op].fetch_add(duration_us, Ordering::Relaxed);

        if let Some(code) = error_code {
            self.error_count.fetch_add(1, Ordering::Relaxed);
            if let Some(i) = ERROR_CODES.iter().position(|c| *c == code) {
                self.error_counts[i].fetch_add(1, Ordering::Relaxed);
            }
        }

        {
            let mut latencies = lock(&self.latencies_us);
            if latencies.len() >= LATENCY_WINDOW_SIZE {
                latencies.pop_front();
            }
            latencies.push_back(duration_us);
        }

        if duration >= SLOW_REQUEST_THRESHOLD {
            self.slow_request_count.fetch_add(1, Ordering::Relaxed);

            let slow = SlowRequest {
                operation: OPERATIONS[op].to_string(),
                duration_us,
                timestamp_us: self.started_at.elapsed().as_micros() as u64,
            };

            let mut slow_requests = lock(&self.slow_requests);
            if slow_requests.len() >= MAX_SLOW_REQUESTS {
                slow_requests.pop_front();
            }
            slow_requests.push_back(slow);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let (p50, p95, p99, avg) = {
            let latencies = lock(&self.latencies_us);
            if latencies.is_empty() {
                (0, 0, 0, 0)
            } else {
                let mut sorted: Vec<u64> = latencies.iter().copied().collect();
                sorted.sort_unstable();

                let len = sorted.len();
                let p50 = sorted[len * 50 / 100];
                let p95 = sorted[len * 95 / 100];
                let p99 = sorted[len * 99 / 100];
                let avg = sorted.iter().sum::<u64>() / len as u64;

                (p50, p95, p99, avg)
            }
        };

        let errors_by_code = ERROR_CODES
            .iter()
            .zip(&self.error_counts)
            .map(|(code, count)| (code.to_string(), count.load(Ordering::Relaxed)))
            .filter(|(_, count)| *count > 0)
            .collect();

        let mut op_stats: Vec<OperationStat> = OPERATIONS
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let count = self.op_counts[i].load(Ordering::Relaxed);
                let sum = self.op_latency_sums_us[i].load(Ordering::Relaxed);
                OperationStat {
                    operation: name.to_string(),
                    count,
                    avg_us: if count > 0 { sum / count } else { 0 },
                }
            })
            .filter(|stat| stat.count > 0)
            .collect();
        op_stats.sort_by(|a, b| b.count.cmp(&a.count));

        MetricsSnapshot {
            request_count: self.request_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            slow_request_count: self.slow_request_count.load(Ordering::Relaxed),
            p50_us: p50,
            p95_us: p95,
            p99_us: p99,
            avg_us: avg,
            errors_by_code,
            op_stats,
            recent_slow_requests: lock(&self.slow_requests).iter().cloned().collect(),
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn op_index(operation: &str) -> usize {
    OPERATIONS
        .iter()
        .position(|op| *op == operation)
        .unwrap_or(3)
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn us(n: u64) -> Duration {
        Duration::from_micros(n)
    }

    #[test]
    fn test_metrics_new() {
        let snap = Metrics::new().snapshot();

        assert_eq!(snap.request_count, 0);
        assert_eq!(snap.error_count, 0);
        assert_eq!(snap.p50_us, 0);
        assert_eq!(snap.p99_us, 0);
        assert!(snap.errors_by_code.is_empty());
        assert!(snap.op_stats.is_empty());
        assert!(snap.recent_slow_requests.is_empty());
    }

    #[test]
    fn test_record_request_counts_by_operation() {
        let m = Metrics::new();

        m.record_request("Select", None, us(10));
        m.record_request("Select", None, us(30));
        m.record_request("Insert", None, us(5));

        let snap = m.snapshot();
        assert_eq!(snap.request_count, 3);
        assert_eq!(snap.op_stats[0].operation, "Select");
        assert_eq!(snap.op_stats[0].count, 2);
        assert_eq!(snap.op_stats[0].avg_us, 20);
        assert_eq!(snap.op_stats[1].operation, "Insert");
    }

    #[test]
    fn test_unknown_operation_counts_as_unsupported() {
        let m = Metrics::new();
        m.record_request("Truncate", Some("UNSUPPORTED_QUERY"), us(1));

        let snap = m.snapshot();
        assert_eq!(snap.op_stats.len(), 1);
        assert_eq!(snap.op_stats[0].operation, "Unsupported");
    }

    #[test]
    fn test_errors_by_code() {
        let m = Metrics::new();
        m.record_request("Unparsed", Some("PARSE_ERROR"), us(1));
        m.record_request("Insert", Some("QUERY_ERROR"), us(1));
        m.record_request("Insert", Some("QUERY_ERROR"), us(1));
        m.record_request("Select", None, us(1));

        let snap = m.snapshot();
        assert_eq!(snap.error_count, 3);
        assert_eq!(snap.errors_by_code.get("PARSE_ERROR"), Some(&1));
        assert_eq!(snap.errors_by_code.get("QUERY_ERROR"), Some(&2));
        assert_eq!(snap.errors_by_code.get("IO_ERROR"), None);
    }

    #[test]
    fn test_percentiles() {
        let m = Metrics::new();
        for i in 1..=100 {
            m.record_request("Select", None, us(i));
        }

        let snap = m.snapshot();
        assert_eq!(snap.p50_us, 51);
        assert_eq!(snap.p95_us, 96);
        assert_eq!(snap.p99_us, 100);
        assert_eq!(snap.avg_us, 50);
    }

    #[test]
    fn test_latency_window_is_bounded() {
        let m = Metrics::new();
        for _ in 0..LATENCY_WINDOW_SIZE {
            m.record_request("Select", None, us(1000));
        }
        for _ in 0..LATENCY_WINDOW_SIZE {
            m.record_request("Select", None, us(1));
        }

        let snap = m.snapshot();
        assert_eq!(snap.request_count, 2 * LATENCY_WINDOW_SIZE as u64);
        assert_eq!(snap.p99_us, 1);
    }

    #[test]
    fn test_slow_request_tracking() {
        let m = Metrics::new();

        m.record_request("Select", None, Duration::from_millis(99));
        assert_eq!(m.snapshot().slow_request_count, 0);

        m.record_request("Delete", None, SLOW_REQUEST_THRESHOLD);
        let snap = m.snapshot();
        assert_eq!(snap.slow_request_count, 1);
        assert_eq!(snap.recent_slow_requests[0].operation, "Delete");
        assert_eq!(snap.recent_slow_requests[0].duration_us, 100_000);
    }

    #[test]
    fn test_slow_requests_keep_most_recent() {
        let m = Metrics::new();
        for i in 0..(MAX_SLOW_REQUESTS as u64 + 5) {
            m.record_request("Select", None, Duration::from_millis(100 + i));
        }

        let snap = m.snapshot();
        assert_eq!(snap.recent_slow_requests.len(), MAX_SLOW_REQUESTS);
        assert_eq!(snap.recent_slow_requests[0].duration_us, 105_000);
    }

    #[test]
    fn test_concurrent_recording() {
        let m = Arc::new(Metrics::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = Arc::clone(&m);
                thread::spawn(move || {
                    for _ in 0..100 {
                        m.record_request("Insert", None, us(3));
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(m.snapshot().request_count, 800);
    }
}
