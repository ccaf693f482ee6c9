use hdrhistogram::Histogram;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use stampede_metrics::{MetricHandle, MetricKind, MetricSummary, Registry};

use crate::http::TransportErrorKind;

#[derive(Debug, Default)]
struct CheckCounters {
    passes: AtomicU64,
    fails: AtomicU64,
}

/// Writer for one named check; cheap to clone and hold per VU.
#[derive(Debug, Clone)]
pub struct CheckHandle {
    counters: Arc<CheckCounters>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckSummary {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

impl CheckSummary {
    pub fn pass_rate(&self) -> f64 {
        let total = self.passes + self.fails;
        if total == 0 {
            0.0
        } else {
            self.passes as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HttpRequestMeta<'a> {
    pub method: &'a str,
    pub name: &'a str,
    pub status: Option<u16>,
    /// Set when the request never produced a status.
    pub transport_error: Option<TransportErrorKind>,
    pub elapsed: Duration,
}

/// Immutable end-of-run snapshot: totals, check tallies, and the full
/// metric state. Produced exactly once when the scheduler drains.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_duration_ms: u64,
    pub requests_total: u64,
    pub failed_requests_total: u64,
    pub iterations_total: u64,
    pub rps: f64,
    pub req_per_sec_avg: f64,
    pub req_per_sec_stdev: f64,
    pub req_per_sec_max: f64,
    pub checks: Vec<CheckSummary>,
    pub metrics: Vec<MetricSummary>,
}

impl RunSummary {
    pub fn metric(&self, name: &str) -> Option<&MetricSummary> {
        self.metrics.iter().find(|m| m.name == name)
    }

    pub fn check(&self, name: &str) -> Option<&CheckSummary> {
        self.checks.iter().find(|c| c.name == name)
    }
}

/// Online mean/stdev/max over per-tick RPS samples (Welford).
#[derive(Debug, Default, Clone, Copy)]
struct RpsAgg {
    count: u64,
    mean: f64,
    m2: f64,
    max: f64,
}

impl RpsAgg {
    fn record(&mut self, sample: f64) {
        if !sample.is_finite() {
            return;
        }

        self.count = self.count.saturating_add(1);
        let delta = sample - self.mean;
        self.mean += delta / (self.count as f64);
        let delta2 = sample - self.mean;
        self.m2 += delta * delta2;
        self.max = self.max.max(sample);
    }

    fn summary(&self) -> (f64, f64, f64) {
        if self.count == 0 {
            return (0.0, 0.0, 0.0);
        }

        let stdev = if self.count >= 2 {
            (self.m2 / ((self.count - 1) as f64)).sqrt()
        } else {
            0.0
        };
        (self.mean, stdev, self.max)
    }
}

/// Shared run statistics: the only resource every VU mutates.
///
/// One instance is constructed per run and threaded through the scheduler,
/// the iteration runner, and the reporter; nothing here is global state.
#[derive(Debug)]
pub struct RunStats {
    requests_total: AtomicU64,
    transport_errors_total: AtomicU64,
    status_4xx: AtomicU64,
    status_5xx: AtomicU64,
    iterations_total: AtomicU64,
    checks_total: AtomicU64,
    checks_failed: AtomicU64,
    checks_by_name: Mutex<HashMap<Arc<str>, Arc<CheckCounters>>>,
    scenario_iterations: Mutex<HashMap<Arc<str>, Arc<AtomicU64>>>,

    // Reset every progress tick; feeds the live percentile readout only.
    latency_us_window: Mutex<Histogram<u64>>,

    rps_samples: Mutex<RpsAgg>,

    metrics: Arc<Registry>,
    metric_http_reqs: MetricHandle,
    metric_http_req_duration: MetricHandle,
    metric_http_req_failed: MetricHandle,
    metric_checks: MetricHandle,
    metric_iterations: MetricHandle,
    metric_iteration_duration: MetricHandle,
}

impl Default for RunStats {
    fn default() -> Self {
        fn new_hist() -> Histogram<u64> {
            // Track up to 60s in microseconds (with 3 sigfigs).
            Histogram::<u64>::new_with_bounds(1, 60_000_000, 3)
                .unwrap_or_else(|err| panic!("failed to init histogram: {err}"))
        }

        let metrics: Arc<Registry> = Arc::new(Registry::default());
        let metric_http_reqs = metrics.handle(MetricKind::Counter, "http_reqs");
        let metric_http_req_duration = metrics.handle(MetricKind::Trend, "http_req_duration");
        let metric_http_req_failed = metrics.handle(MetricKind::Rate, "http_req_failed");
        let metric_checks = metrics.handle(MetricKind::Rate, "checks");
        let metric_iterations = metrics.handle(MetricKind::Counter, "iterations");
        let metric_iteration_duration = metrics.handle(MetricKind::Trend, "iteration_duration");

        Self {
            requests_total: AtomicU64::new(0),
            transport_errors_total: AtomicU64::new(0),
            status_4xx: AtomicU64::new(0),
            status_5xx: AtomicU64::new(0),
            iterations_total: AtomicU64::new(0),
            checks_total: AtomicU64::new(0),
            checks_failed: AtomicU64::new(0),
            checks_by_name: Mutex::new(HashMap::new()),
            scenario_iterations: Mutex::new(HashMap::new()),
            latency_us_window: Mutex::new(new_hist()),
            rps_samples: Mutex::new(RpsAgg::default()),
            metrics,
            metric_http_reqs,
            metric_http_req_duration,
            metric_http_req_failed,
            metric_checks,
            metric_iterations,
            metric_iteration_duration,
        }
    }
}

impl RunStats {
    /// Lazily creates a custom metric; scenario flows use this for their
    /// named trends/counters/rates.
    pub fn metric_handle(&self, kind: MetricKind, name: &str) -> MetricHandle {
        self.metrics.handle(kind, name)
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn failed_requests_total(&self) -> u64 {
        self.transport_errors_total.load(Ordering::Relaxed)
            + self.status_4xx.load(Ordering::Relaxed)
            + self.status_5xx.load(Ordering::Relaxed)
    }

    pub fn iterations_total(&self) -> u64 {
        self.iterations_total.load(Ordering::Relaxed)
    }

    pub fn checks_failed_total(&self) -> u64 {
        self.checks_failed.load(Ordering::Relaxed)
    }

    pub fn check_handle(&self, name: &str) -> CheckHandle {
        let counters = {
            let mut map = self
                .checks_by_name
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(v) = map.get(name) {
                v.clone()
            } else {
                let key: Arc<str> = Arc::from(name);
                let v = Arc::new(CheckCounters::default());
                map.insert(key, v.clone());
                v
            }
        };

        CheckHandle { counters }
    }

    pub fn record_check(&self, handle: &CheckHandle, ok: bool) {
        self.checks_total.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.checks_failed.fetch_add(1, Ordering::Relaxed);
        }

        self.metric_checks.add_bool(ok);

        if ok {
            handle.counters.passes.fetch_add(1, Ordering::Relaxed);
        } else {
            handle.counters.fails.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_http_request(&self, req: HttpRequestMeta<'_>) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        let failed = match (req.transport_error, req.status) {
            (Some(_), _) => {
                self.transport_errors_total.fetch_add(1, Ordering::Relaxed);
                true
            }
            (None, Some(status)) => {
                match status {
                    400..=499 => {
                        self.status_4xx.fetch_add(1, Ordering::Relaxed);
                    }
                    500..=599 => {
                        self.status_5xx.fetch_add(1, Ordering::Relaxed);
                    }
                    _ => {}
                }
                status >= 400
            }
            (None, None) => false,
        };

        self.record_latency_window(req.elapsed);

        let duration_ms = req.elapsed.as_secs_f64() * 1000.0;
        self.metric_http_reqs.add(1.0);
        self.metric_http_req_duration.add(duration_ms);
        self.metric_http_req_failed.add_bool(failed);

        if failed {
            log::debug!(
                "request failed: {} {} status={:?} transport_error={:?}",
                req.method,
                req.name,
                req.status,
                req.transport_error,
            );
        }
    }

    fn scenario_counter(&self, scenario: &str) -> Arc<AtomicU64> {
        let mut map = self
            .scenario_iterations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(v) = map.get(scenario) {
            return v.clone();
        }
        let key: Arc<str> = Arc::from(scenario);
        let v = Arc::new(AtomicU64::new(0));
        map.insert(key, v.clone());
        v
    }

    pub fn ensure_scenario(&self, scenario: &str) {
        let _ = self.scenario_counter(scenario);
    }

    pub fn record_iteration(&self, scenario: &str, elapsed: Duration) {
        self.iterations_total.fetch_add(1, Ordering::Relaxed);
        self.scenario_counter(scenario)
            .fetch_add(1, Ordering::Relaxed);

        self.metric_iterations.add(1.0);
        self.metric_iteration_duration
            .add(elapsed.as_secs_f64() * 1000.0);
    }

    pub fn iterations_total_for_scenario(&self, scenario: &str) -> u64 {
        self.scenario_counter(scenario).load(Ordering::Relaxed)
    }

    pub fn record_rps_sample(&self, rps_now: f64) {
        let mut agg = self
            .rps_samples
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        agg.record(rps_now);
    }

    fn record_latency_window(&self, elapsed: Duration) {
        let us = elapsed.as_micros();
        if us == 0 {
            return;
        }

        let mut h = self
            .latency_us_window
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let _ = h.record(us as u64);
    }

    /// Drains the live latency window: (p50, p90, p95, p99) in ms.
    pub fn take_latency_window_ms(&self) -> [Option<f64>; 4] {
        let mut h = self
            .latency_us_window
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        #[allow(clippy::len_zero)]
        let out = if h.len() == 0 {
            [None, None, None, None]
        } else {
            [0.50, 0.90, 0.95, 0.99]
                .map(|q| Some(h.value_at_quantile(q) as f64 / 1000.0))
        };

        h.reset();
        out
    }

    pub fn summarize(&self, elapsed: Duration) -> RunSummary {
        let secs = elapsed.as_secs_f64().max(1e-9);
        let requests_total = self.requests_total();

        let checks = {
            let map = self
                .checks_by_name
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let mut out: Vec<CheckSummary> = map
                .iter()
                .map(|(name, counters)| CheckSummary {
                    name: name.to_string(),
                    passes: counters.passes.load(Ordering::Relaxed),
                    fails: counters.fails.load(Ordering::Relaxed),
                })
                .collect();
            out.sort_by(|a, b| a.name.cmp(&b.name));
            out
        };

        let (req_per_sec_avg, req_per_sec_stdev, req_per_sec_max) = {
            let agg = self
                .rps_samples
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            agg.summary()
        };

        RunSummary {
            run_duration_ms: elapsed.as_millis() as u64,
            requests_total,
            failed_requests_total: self.failed_requests_total(),
            iterations_total: self.iterations_total(),
            rps: (requests_total as f64) / secs,
            req_per_sec_avg,
            req_per_sec_stdev,
            req_per_sec_max,
            checks,
            metrics: self.metrics.snapshot(),
        }
    }
}
