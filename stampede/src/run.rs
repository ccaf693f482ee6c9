use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;

use crate::cli::RunArgs;
use crate::exit_codes::ExitCode;
use crate::output;
use crate::plan;
use crate::run_error::RunError;

use stampede_core::flow;
use stampede_core::runner::{self, RunReport, StopSignal, build_report, validate_thresholds};

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let out = output::formatter(args.output);

    let plan = plan::load_plan(args.plan.as_deref())
        .await
        .map_err(RunError::InvalidInput)?;

    let scenarios = plan::scenarios_from_plan(&plan, &args).map_err(RunError::InvalidInput)?;
    let thresholds = plan::thresholds_from_plan(&plan);
    validate_thresholds(&thresholds).map_err(|e| RunError::InvalidInput(e.into()))?;

    let target = Arc::new(plan::target_options(&plan, &args));

    out.print_header(args.plan.as_deref(), &scenarios);

    let stop = Arc::new(StopSignal::new());
    spawn_interrupt_handler(stop.clone());

    let progress = out.progress();
    let summary = runner::run_scenarios(scenarios, target, stop, progress, flow::run_vu)
        .await
        .map_err(map_run_error)?;

    let report = build_report(summary, &thresholds);
    out.print_report(&report).map_err(RunError::RuntimeError)?;

    if !args.no_summary_file {
        write_report_file(&args.summary_out, &report).map_err(RunError::RuntimeError)?;
    }

    print_threshold_failures(&report);

    Ok(ExitCode::from_verdict(report.passed))
}

fn map_run_error(err: runner::Error) -> RunError {
    match err {
        runner::Error::Join(_) => RunError::RuntimeError(err.into()),
        _ => RunError::InvalidInput(err.into()),
    }
}

/// First Ctrl-C trips the stop signal; the run drains and still reports.
fn spawn_interrupt_handler(stop: Arc<StopSignal>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupt received, draining in-flight iterations");
            stop.trigger();
        }
    });
}

fn write_report_file(path: &Path, report: &RunReport) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report).context("failed to serialize report")?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create report dir: {}", parent.display()))?;
    }
    std::fs::write(path, json)
        .with_context(|| format!("failed to write report: {}", path.display()))
}

fn print_threshold_failures(report: &RunReport) {
    let failed: Vec<_> = report.thresholds.iter().filter(|t| !t.passed).collect();
    if failed.is_empty() {
        return;
    }

    eprintln!("thresholds_failed: {}", failed.len());
    for t in failed {
        match t.observed {
            Some(o) => eprintln!(
                "threshold_failed: metric={} expr={} observed={o}",
                t.metric, t.expression
            ),
            None => eprintln!(
                "threshold_failed: metric={} expr={} observed=-",
                t.metric, t.expression
            ),
        }
    }
}
