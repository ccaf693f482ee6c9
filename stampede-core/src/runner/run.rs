use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Barrier;
use tokio::time::MissedTickBehavior;

use super::config::{ScenarioConfig, ScenarioExecutor};
use super::error::Result;
use super::gate::IterationGate;
use super::progress::{LiveMetrics, ProgressFn, ProgressUpdate, ScenarioProgress, StageProgress};
use super::schedule::RampingSchedule;
use super::signal::{StartSignal, StopSignal};
use super::stats::{RunStats, RunSummary};
use super::vu::{VuContext, VuWork};
use crate::flow::TargetOptions;
use crate::http::HttpClient;

#[derive(Clone)]
struct ScenarioTracker {
    name: Arc<str>,
    start_offset: Duration,
    total_duration: Duration,
    work: VuWork,
    vus: u64,
}

/// Realizes every scenario as a population of VU tasks and drives them to
/// completion.
///
/// All VUs are spawned up front and parked at a barrier, so task setup never
/// counts against measured time; the start signal releases them together and
/// each scenario's VUs then wait out their own start offset. The returned
/// summary is the single end-of-run snapshot.
pub async fn run_scenarios<F, Fut>(
    scenarios: Vec<ScenarioConfig>,
    target: Arc<TargetOptions>,
    stop: Arc<StopSignal>,
    progress: Option<ProgressFn>,
    vu: F,
) -> Result<RunSummary>
where
    F: Fn(VuContext) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    for scenario in &scenarios {
        scenario.validate()?;
    }

    let client = Arc::new(HttpClient::default());
    let stats = Arc::new(RunStats::default());

    let total_vus: usize = scenarios
        .iter()
        .map(|s| s.max_vus().min(usize::MAX as u64) as usize)
        .sum();
    let ready_barrier: Arc<Barrier> = Arc::new(Barrier::new(total_vus.saturating_add(1)));
    let start_signal: Arc<StartSignal> = Arc::new(StartSignal::new());

    let mut gates: Vec<(Arc<IterationGate>, Duration)> = Vec::new();
    let mut trackers: Vec<ScenarioTracker> = Vec::new();

    let mut next_vu_id: u64 = 1;
    let mut handles = Vec::with_capacity(total_vus);

    for scenario in scenarios {
        let scenario_vus = scenario.max_vus();
        let scenario_name: Arc<str> = Arc::from(scenario.name.as_str());
        stats.ensure_scenario(&scenario_name);

        let work = match &scenario.executor {
            ScenarioExecutor::RampingVus { start_vus, stages } => VuWork::Ramping {
                schedule: Arc::new(RampingSchedule::new(*start_vus, stages.clone())),
            },
            ScenarioExecutor::SharedIterations {
                iterations,
                max_duration,
                ..
            } => {
                let gate = Arc::new(IterationGate::new(*iterations, *max_duration));
                gates.push((gate.clone(), scenario.start_offset));
                VuWork::Shared { gate }
            }
        };

        trackers.push(ScenarioTracker {
            name: scenario_name.clone(),
            start_offset: scenario.start_offset,
            total_duration: scenario.total_duration(),
            work: work.clone(),
            vus: scenario_vus,
        });

        for scenario_vu in 1..=scenario_vus {
            let vu_id = next_vu_id;
            next_vu_id = next_vu_id.saturating_add(1);

            let ctx = VuContext {
                vu_id,
                scenario_vu,
                scenario: scenario_name.clone(),
                flow: scenario.flow,
                start_offset: scenario.start_offset,
                client: client.clone(),
                stats: stats.clone(),
                target: target.clone(),
                work: work.clone(),
                ready_barrier: ready_barrier.clone(),
                start_signal: start_signal.clone(),
                stop: stop.clone(),
            };

            let vu = vu.clone();
            handles.push(tokio::spawn(async move { vu(ctx).await }));
        }
    }

    // Everyone is parked; release the run.
    ready_barrier.wait().await;

    let started = Instant::now();
    for (gate, offset) in gates {
        gate.start_at(started + offset);
    }
    start_signal.start();

    let ticker = spawn_ticker(started, stats.clone(), trackers, progress);

    for h in handles {
        h.await?;
    }

    ticker.abort();
    let _ = ticker.await;

    Ok(stats.summarize(started.elapsed()))
}

/// Once-per-second sampler: records RPS for the end-of-run aggregate and
/// publishes per-scenario live progress when a listener is attached.
fn spawn_ticker(
    started: Instant,
    stats: Arc<RunStats>,
    trackers: Vec<ScenarioTracker>,
    progress: Option<ProgressFn>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let tick_every = Duration::from_secs(1);
        let mut interval = tokio::time::interval(tick_every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so deltas cover a full
        // interval.
        interval.tick().await;

        let mut tick: u64 = 0;
        let mut last_at = Instant::now();
        let mut last_requests = stats.requests_total();
        let mut last_iterations: HashMap<Arc<str>, u64> = trackers
            .iter()
            .map(|t| (t.name.clone(), 0u64))
            .collect();

        loop {
            interval.tick().await;

            tick = tick.saturating_add(1);
            let now = Instant::now();
            let dt = now.duration_since(last_at);
            last_at = now;
            let dt_secs = dt.as_secs_f64().max(1e-9);

            let elapsed = started.elapsed();

            let requests_total = stats.requests_total();
            let rps_now = (requests_total.saturating_sub(last_requests) as f64) / dt_secs;
            last_requests = requests_total;
            stats.record_rps_sample(rps_now);

            let Some(progress) = progress.as_ref() else {
                continue;
            };

            let latency_window_ms = stats.take_latency_window_ms();

            for tracker in &trackers {
                let iterations_total = stats.iterations_total_for_scenario(&tracker.name);
                let last = last_iterations
                    .get_mut(&tracker.name)
                    .map(|v| std::mem::replace(v, iterations_total))
                    .unwrap_or(0);
                let iterations_per_sec =
                    (iterations_total.saturating_sub(last) as f64) / dt_secs;

                let metrics = LiveMetrics {
                    iterations_total,
                    iterations_per_sec,
                    requests_total,
                    rps_now,
                    failed_requests_total: stats.failed_requests_total(),
                    checks_failed_total: stats.checks_failed_total(),
                    latency_window_ms,
                };

                (progress)(ProgressUpdate {
                    tick,
                    elapsed,
                    interval: dt,
                    scenario: tracker.name.to_string(),
                    metrics,
                    progress: scenario_progress(tracker, elapsed, iterations_total),
                });
            }
        }
    })
}

fn scenario_progress(
    tracker: &ScenarioTracker,
    elapsed: Duration,
    iterations_total: u64,
) -> ScenarioProgress {
    let Some(scenario_elapsed) = elapsed.checked_sub(tracker.start_offset) else {
        return ScenarioProgress::Pending {
            starts_in: tracker.start_offset.saturating_sub(elapsed),
        };
    };

    if scenario_elapsed >= tracker.total_duration {
        return ScenarioProgress::Done;
    }

    match &tracker.work {
        VuWork::Ramping { schedule } => {
            let stage = schedule
                .stage_snapshot_at(scenario_elapsed)
                .map(|st| StageProgress {
                    stage: st.index + 1,
                    stages: st.count,
                    current_target: st.current_target,
                    stage_remaining: st.stage_remaining,
                });
            ScenarioProgress::Ramping {
                scenario_elapsed,
                total_duration: schedule.total_duration(),
                stage,
            }
        }
        VuWork::Shared { gate } => ScenarioProgress::Shared {
            scenario_elapsed,
            vus: tracker.vus,
            iterations_done: iterations_total,
            iterations: gate.budget(),
            max_duration: tracker.total_duration,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::FlowKind;
    use crate::runner::config::Stage;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn quiet_target() -> Arc<TargetOptions> {
        Arc::new(TargetOptions {
            think_time: Duration::ZERO,
            spike_think_time: Duration::ZERO,
            ..TargetOptions::default()
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn shared_pool_executes_exactly_the_iteration_budget() {
        let executed = Arc::new(AtomicU64::new(0));
        let scenarios = vec![ScenarioConfig {
            name: "pool".to_string(),
            flow: FlowKind::TokenIssue,
            executor: ScenarioExecutor::SharedIterations {
                vus: 100,
                iterations: 200,
                max_duration: Duration::from_secs(120),
            },
            start_offset: Duration::ZERO,
        }];

        let counted = executed.clone();
        let summary = run_scenarios(
            scenarios,
            quiet_target(),
            Arc::new(StopSignal::new()),
            None,
            move |ctx| {
                let counted = counted.clone();
                async move {
                    crate::runner::vu::drive(&ctx, |_iteration| {
                        let counted = counted.clone();
                        async move {
                            counted.fetch_add(1, Ordering::Relaxed);
                        }
                    })
                    .await;
                }
            },
        )
        .await
        .unwrap_or_else(|e| panic!("{e}"));

        assert_eq!(executed.load(Ordering::Relaxed), 200);
        assert_eq!(summary.iterations_total, 200);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn invalid_config_fails_before_any_vu_runs() {
        let executed = Arc::new(AtomicU64::new(0));
        let scenarios = vec![ScenarioConfig {
            name: "bad".to_string(),
            flow: FlowKind::TokenIssue,
            executor: ScenarioExecutor::RampingVus {
                start_vus: 0,
                stages: vec![Stage {
                    duration: Duration::ZERO,
                    target: 10,
                }],
            },
            start_offset: Duration::ZERO,
        }];

        let counted = executed.clone();
        let result = run_scenarios(
            scenarios,
            quiet_target(),
            Arc::new(StopSignal::new()),
            None,
            move |_ctx| {
                let counted = counted.clone();
                async move {
                    counted.fetch_add(1, Ordering::Relaxed);
                }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(executed.load(Ordering::Relaxed), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn stop_signal_halts_new_claims_and_drains() {
        let stop = Arc::new(StopSignal::new());
        let scenarios = vec![ScenarioConfig {
            name: "long".to_string(),
            flow: FlowKind::TokenIssue,
            executor: ScenarioExecutor::SharedIterations {
                vus: 4,
                iterations: 1_000_000,
                max_duration: Duration::from_secs(300),
            },
            start_offset: Duration::ZERO,
        }];

        let trigger = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.trigger();
        });

        let summary = run_scenarios(
            scenarios,
            quiet_target(),
            stop,
            None,
            move |ctx| async move {
                crate::runner::vu::drive(&ctx, |_iteration| async {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                })
                .await;
            },
        )
        .await
        .unwrap_or_else(|e| panic!("{e}"));

        // Far fewer than the nominal budget; the run ended at the signal.
        assert!(summary.iterations_total < 1_000_000);
        assert!(summary.iterations_total > 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn start_offset_delays_a_scenario() {
        let scenarios = vec![
            ScenarioConfig {
                name: "now".to_string(),
                flow: FlowKind::TokenIssue,
                executor: ScenarioExecutor::SharedIterations {
                    vus: 1,
                    iterations: 1,
                    max_duration: Duration::from_secs(30),
                },
                start_offset: Duration::ZERO,
            },
            ScenarioConfig {
                name: "later".to_string(),
                flow: FlowKind::TokenIssue,
                executor: ScenarioExecutor::SharedIterations {
                    vus: 1,
                    iterations: 1,
                    max_duration: Duration::from_secs(30),
                },
                start_offset: Duration::from_millis(300),
            },
        ];

        let first_seen: Arc<Probe> = Arc::new(Probe::default());
        let probe = first_seen.clone();

        let started = Instant::now();
        run_scenarios(
            scenarios,
            quiet_target(),
            Arc::new(StopSignal::new()),
            None,
            move |ctx| {
                let probe = probe.clone();
                async move {
                    let scenario = ctx.scenario.clone();
                    crate::runner::vu::drive(&ctx, |_iteration| {
                        let probe = probe.clone();
                        let scenario = scenario.clone();
                        async move {
                            probe.push(scenario.to_string(), started.elapsed());
                        }
                    })
                    .await;
                }
            },
        )
        .await
        .unwrap_or_else(|e| panic!("{e}"));

        let seen = first_seen.take();
        let now_at = seen
            .iter()
            .find(|(name, _)| name == "now")
            .map(|(_, at)| *at)
            .unwrap_or_else(|| panic!("scenario `now` never ran"));
        let later_at = seen
            .iter()
            .find(|(name, _)| name == "later")
            .map(|(_, at)| *at)
            .unwrap_or_else(|| panic!("scenario `later` never ran"));

        assert!(later_at >= Duration::from_millis(280), "later_at={later_at:?}");
        assert!(now_at < later_at);
    }

    #[derive(Default)]
    struct Probe {
        inner: std::sync::Mutex<Vec<(String, Duration)>>,
    }

    impl Probe {
        fn push(&self, name: String, at: Duration) {
            self.inner
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push((name, at));
        }

        fn take(&self) -> Vec<(String, Duration)> {
            std::mem::take(
                &mut *self
                    .inner
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()),
            )
        }
    }
}
