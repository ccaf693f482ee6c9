use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use super::OutputFormatter;
use stampede_core::runner::{ProgressFn, ProgressUpdate, RunReport, ScenarioConfig};

const SCHEMA: &str = "stampede.ndjson.v1";

pub(crate) struct JsonOutput;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HeaderLine<'a> {
    schema: &'a str,
    kind: &'a str,
    plan: Option<String>,
    scenarios: Vec<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProgressLine<'a> {
    schema: &'a str,
    kind: &'a str,
    elapsed_seconds: f64,
    interval_seconds: f64,
    scenario: &'a str,
    iterations_total: u64,
    iterations_per_sec: f64,
    requests_total: u64,
    requests_per_sec: f64,
    failed_requests_total: u64,
    checks_failed_total: u64,
    latency_p95_ms: Option<f64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportLine<'a> {
    schema: &'a str,
    kind: &'a str,
    #[serde(flatten)]
    report: &'a RunReport,
}

impl OutputFormatter for JsonOutput {
    fn print_header(&self, plan_path: Option<&Path>, scenarios: &[ScenarioConfig]) {
        let line = HeaderLine {
            schema: SCHEMA,
            kind: "header",
            plan: plan_path.map(|p| p.display().to_string()),
            scenarios: scenarios.iter().map(|s| s.name.as_str()).collect(),
        };
        if let Ok(s) = serde_json::to_string(&line) {
            println!("{s}");
        }
    }

    fn progress(&self) -> Option<ProgressFn> {
        Some(Arc::new(|u: ProgressUpdate| {
            let line = ProgressLine {
                schema: SCHEMA,
                kind: "progress",
                elapsed_seconds: u.elapsed.as_secs_f64(),
                interval_seconds: u.interval.as_secs_f64(),
                scenario: &u.scenario,
                iterations_total: u.metrics.iterations_total,
                iterations_per_sec: u.metrics.iterations_per_sec,
                requests_total: u.metrics.requests_total,
                requests_per_sec: u.metrics.rps_now,
                failed_requests_total: u.metrics.failed_requests_total,
                checks_failed_total: u.metrics.checks_failed_total,
                latency_p95_ms: u.metrics.latency_window_ms[2],
            };
            if let Ok(s) = serde_json::to_string(&line) {
                println!("{s}");
            }
        }))
    }

    fn print_report(&self, report: &RunReport) -> anyhow::Result<()> {
        let line = ReportLine {
            schema: SCHEMA,
            kind: "report",
            report,
        };
        println!("{}", serde_json::to_string(&line)?);
        Ok(())
    }
}
