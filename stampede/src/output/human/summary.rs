use std::fmt::Write as _;
use std::time::Duration;

use stampede_core::runner::RunReport;
use stampede_metrics::{MetricKind, MetricValue};

use super::format::*;

/// Renders the final report as text. Pure: reads the snapshot, computes
/// nothing new.
pub(crate) fn render(report: &RunReport) -> String {
    let mut out = String::new();
    let summary = &report.summary;

    out.push_str("summary\n");
    writeln!(
        &mut out,
        "  duration: {}",
        format_duration(Duration::from_millis(summary.run_duration_ms))
    )
    .ok();
    writeln!(
        &mut out,
        "  requests: {} (failed {})",
        summary.requests_total, summary.failed_requests_total
    )
    .ok();
    writeln!(&mut out, "  iterations: {}", summary.iterations_total).ok();
    writeln!(
        &mut out,
        "  rates: rps={} avg={} max={}",
        format_rate(summary.rps),
        format_rate(summary.req_per_sec_avg),
        format_rate(summary.req_per_sec_max)
    )
    .ok();

    if !summary.checks.is_empty() {
        out.push_str("\nchecks\n");
        for check in &summary.checks {
            writeln!(
                &mut out,
                "  {}: {} ({}/{})",
                check.name,
                format_pct(check.pass_rate()),
                check.passes,
                check.passes + check.fails
            )
            .ok();
        }
    }

    render_metrics(report, &mut out);
    render_thresholds(report, &mut out);

    out
}

fn render_metrics(report: &RunReport, out: &mut String) {
    let metrics = &report.summary.metrics;

    let trends: Vec<_> = metrics
        .iter()
        .filter(|m| m.kind == MetricKind::Trend)
        .collect();
    if !trends.is_empty() {
        out.push_str("\ntrends\n");
        let width = trends.iter().map(|m| m.name.len()).max().unwrap_or(0);
        for m in trends {
            let MetricValue::Trend(t) = &m.value else {
                continue;
            };
            writeln!(
                out,
                "  {:width$}  avg={} p50={} p90={} p95={} p99={} max={} (n={})",
                m.name,
                format_ms_opt(t.avg()),
                format_ms_opt(t.percentile(50.0)),
                format_ms_opt(t.percentile(90.0)),
                format_ms_opt(t.percentile(95.0)),
                format_ms_opt(t.percentile(99.0)),
                format_ms_opt(t.max()),
                t.count(),
            )
            .ok();
        }
    }

    let scalars: Vec<_> = metrics
        .iter()
        .filter(|m| m.kind != MetricKind::Trend)
        .collect();
    if !scalars.is_empty() {
        out.push_str("\nmetrics\n");
        let width = scalars.iter().map(|m| m.name.len()).max().unwrap_or(0);
        for m in scalars {
            match &m.value {
                MetricValue::Counter { total } => {
                    writeln!(out, "  {:width$}  {}", m.name, total).ok();
                }
                MetricValue::Rate(rate) => {
                    writeln!(
                        out,
                        "  {:width$}  {} ({}/{})",
                        m.name,
                        format_pct(rate.rate()),
                        rate.trues,
                        rate.total
                    )
                    .ok();
                }
                MetricValue::Trend(_) => {}
            }
        }
    }
}

fn render_thresholds(report: &RunReport, out: &mut String) {
    if report.thresholds.is_empty() {
        return;
    }

    out.push_str("\nthresholds\n");
    for t in &report.thresholds {
        let marker = if t.passed { "pass" } else { "FAIL" };
        let observed = match t.observed {
            Some(v) => format!("{v:.4}"),
            None => "-".to_string(),
        };
        writeln!(
            out,
            "  {marker} {}: {} (observed {observed})",
            t.metric, t.expression
        )
        .ok();
    }

    writeln!(
        out,
        "\nverdict: {}",
        if report.passed { "PASS" } else { "FAIL" }
    )
    .ok();
}
