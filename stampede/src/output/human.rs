use std::path::Path;
use std::sync::Arc;

mod format;
mod progress;
mod summary;

use format::{format_duration, format_rate};
use progress::HumanProgress;

use super::OutputFormatter;
use stampede_core::runner::{
    ProgressFn, ProgressUpdate, RunReport, ScenarioConfig, ScenarioExecutor, ScenarioProgress,
};

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            progress: Arc::new(HumanProgress::new()),
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, plan_path: Option<&Path>, scenarios: &[ScenarioConfig]) {
        match plan_path {
            Some(path) => println!("plan: {}", path.display()),
            None => println!("plan: built-in"),
        }

        for s in scenarios {
            let shape = match &s.executor {
                ScenarioExecutor::RampingVus { stages, .. } => format!(
                    "ramping-vus stages={} max_vus={} duration={}",
                    stages.len(),
                    s.max_vus(),
                    format_duration(s.total_duration())
                ),
                ScenarioExecutor::SharedIterations {
                    vus, iterations, ..
                } => format!(
                    "shared-iterations vus={vus} iterations={iterations} max_duration={}",
                    format_duration(s.total_duration())
                ),
            };

            if s.start_offset.is_zero() {
                println!("scenario: {} flow={} {}", s.name, s.flow, shape);
            } else {
                println!(
                    "scenario: {} flow={} {} start_time={}",
                    s.name,
                    s.flow,
                    shape,
                    format_duration(s.start_offset)
                );
            }
        }
        if !scenarios.is_empty() {
            println!();
        }
    }

    fn progress(&self) -> Option<ProgressFn> {
        let progress = self.progress.clone();

        Some(Arc::new(move |u: ProgressUpdate| {
            let errors = u
                .metrics
                .failed_requests_total
                .saturating_add(u.metrics.checks_failed_total);
            let rates = format!(
                " iters/s={} rps={} errors={errors}",
                format_rate(u.metrics.iterations_per_sec),
                format_rate(u.metrics.rps_now),
            );

            let (span, message) = match &u.progress {
                ScenarioProgress::Pending { starts_in } => (
                    None,
                    format!("starts_in={}{}", format_duration(*starts_in), rates),
                ),
                ScenarioProgress::Ramping {
                    scenario_elapsed,
                    total_duration,
                    stage,
                } => {
                    let msg = if let Some(stage) = stage {
                        format!(
                            "stage={}/{} target={} stage_remaining={}{}",
                            stage.stage,
                            stage.stages,
                            stage.current_target,
                            format_duration(stage.stage_remaining),
                            rates
                        )
                    } else {
                        format!("elapsed={}{}", format_duration(*scenario_elapsed), rates)
                    };
                    (Some((*total_duration, *scenario_elapsed)), msg)
                }
                ScenarioProgress::Shared {
                    scenario_elapsed,
                    vus,
                    iterations_done,
                    iterations,
                    max_duration,
                } => (
                    Some((*max_duration, *scenario_elapsed)),
                    format!("vus={vus} iters={iterations_done}/{iterations}{rates}"),
                ),
                ScenarioProgress::Done => (None, format!("draining{rates}")),
            };

            progress.update(&u.scenario, span, message);
        }))
    }

    fn print_report(&self, report: &RunReport) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", summary::render(report));
        Ok(())
    }
}
