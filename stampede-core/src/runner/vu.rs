use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Barrier;

use super::gate::IterationGate;
use super::schedule::RampingSchedule;
use super::signal::{StartSignal, StopSignal};
use super::stats::RunStats;
use crate::flow::{FlowKind, TargetOptions};
use crate::http::HttpClient;

/// Everything one VU worker needs; cloned per spawned task.
#[derive(Debug, Clone)]
pub struct VuContext {
    /// Run-wide VU id (unique across scenarios, 1-based).
    pub vu_id: u64,
    /// 1-based index of this VU within its scenario; the ramping executor
    /// activates VUs in index order.
    pub scenario_vu: u64,
    pub scenario: Arc<str>,
    pub flow: FlowKind,
    pub start_offset: Duration,
    pub client: Arc<HttpClient>,
    pub stats: Arc<RunStats>,
    pub target: Arc<TargetOptions>,
    pub work: VuWork,

    pub ready_barrier: Arc<Barrier>,
    pub start_signal: Arc<StartSignal>,
    pub stop: Arc<StopSignal>,
}

#[derive(Debug, Clone)]
pub enum VuWork {
    Ramping { schedule: Arc<RampingSchedule> },
    Shared { gate: Arc<IterationGate> },
}

/// The per-VU policy loop: waits for the run to start, honors the
/// scenario's start offset, then claims iterations according to the
/// executor until the scenario ends or the run is stopped.
///
/// `iterate` runs one scenario iteration and receives this VU's private
/// iteration counter. It must isolate its own failures; nothing it does can
/// abort the VU.
pub async fn drive<F, Fut>(ctx: &VuContext, iterate: F)
where
    F: Fn(u64) -> Fut,
    Fut: Future<Output = ()>,
{
    ctx.ready_barrier.wait().await;
    ctx.start_signal.wait().await;

    if !ctx.start_offset.is_zero() {
        tokio::select! {
            () = tokio::time::sleep(ctx.start_offset) => {}
            () = ctx.stop.wait() => return,
        }
    }

    let scenario_started = Instant::now();
    let mut iteration: u64 = 0;

    match &ctx.work {
        VuWork::Shared { gate } => {
            while !ctx.stop.is_stopped() && gate.next() {
                let started = Instant::now();
                iterate(iteration).await;
                ctx.stats
                    .record_iteration(ctx.scenario.as_ref(), started.elapsed());
                iteration += 1;
            }
        }
        VuWork::Ramping { schedule } => loop {
            if ctx.stop.is_stopped() {
                break;
            }

            let elapsed = scenario_started.elapsed();
            if schedule.is_done(elapsed) {
                break;
            }

            let target = schedule.target_at(elapsed);
            if ctx.scenario_vu > target {
                let wait = schedule
                    .next_recheck_in(elapsed, ctx.scenario_vu)
                    .max(Duration::from_millis(1));
                tokio::select! {
                    () = tokio::time::sleep(wait) => {}
                    () = ctx.stop.wait() => break,
                }
                continue;
            }

            let started = Instant::now();
            iterate(iteration).await;
            ctx.stats
                .record_iteration(ctx.scenario.as_ref(), started.elapsed());
            iteration += 1;
        },
    }
}
