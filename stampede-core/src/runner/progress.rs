use std::sync::Arc;
use std::time::Duration;

/// Live per-tick readout, sampled once per second per scenario.
#[derive(Debug, Clone)]
pub struct LiveMetrics {
    pub iterations_total: u64,
    pub iterations_per_sec: f64,
    pub requests_total: u64,
    pub rps_now: f64,
    pub failed_requests_total: u64,
    pub checks_failed_total: u64,
    /// Window percentiles since the previous tick: p50/p90/p95/p99 in ms.
    pub latency_window_ms: [Option<f64>; 4],
}

#[derive(Debug, Clone)]
pub struct StageProgress {
    /// 1-based stage number.
    pub stage: usize,
    pub stages: usize,
    pub current_target: u64,
    pub stage_remaining: Duration,
}

#[derive(Debug, Clone)]
pub enum ScenarioProgress {
    /// Waiting for the scenario's start offset.
    Pending { starts_in: Duration },
    Ramping {
        scenario_elapsed: Duration,
        total_duration: Duration,
        stage: Option<StageProgress>,
    },
    Shared {
        scenario_elapsed: Duration,
        vus: u64,
        iterations_done: u64,
        iterations: u64,
        max_duration: Duration,
    },
    Done,
}

#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub tick: u64,
    pub elapsed: Duration,
    pub interval: Duration,
    pub scenario: String,
    pub metrics: LiveMetrics,
    pub progress: ScenarioProgress,
}

pub type ProgressFn = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;
