use serde::Serialize;
use stampede_metrics::{MetricSummary, MetricValue};

use super::error::{Error, Result};

/// All threshold expressions attached to one metric name.
#[derive(Debug, Clone)]
pub struct ThresholdSet {
    pub metric: String,
    pub expressions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdOp {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdAgg {
    /// The scalar of a counter (its sum) or a rate (its fraction).
    Value,
    Count,
    Rate,
    Avg,
    Min,
    Max,
    P(f64),
}

#[derive(Debug, Clone, Copy)]
pub struct ThresholdExpr {
    pub agg: ThresholdAgg,
    pub op: ThresholdOp,
    pub value: f64,
}

/// Verdict for one expression against the final metric state.
#[derive(Debug, Clone, Serialize)]
pub struct ThresholdResult {
    pub metric: String,
    pub expression: String,
    pub observed: Option<f64>,
    pub passed: bool,
}

pub fn parse_threshold_expr(raw: &str) -> std::result::Result<ThresholdExpr, String> {
    let s: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if s.is_empty() {
        return Err("empty threshold".to_string());
    }

    // Find operator
    let ops = [
        ("<=", ThresholdOp::Lte),
        (">=", ThresholdOp::Gte),
        ("==", ThresholdOp::Eq),
        ("<", ThresholdOp::Lt),
        (">", ThresholdOp::Gt),
    ];
    let (op_pos, op_len, op) = ops
        .iter()
        .find_map(|(tok, op)| s.find(tok).map(|pos| (pos, tok.len(), *op)))
        .ok_or_else(|| format!("invalid threshold (missing operator): {raw}"))?;

    let (left, right_with_op) = s.split_at(op_pos);
    let right = &right_with_op[op_len..];
    if left.is_empty() || right.is_empty() {
        return Err(format!("invalid threshold: {raw}"));
    }

    let agg = if left.eq_ignore_ascii_case("value") {
        ThresholdAgg::Value
    } else if left.eq_ignore_ascii_case("count") {
        ThresholdAgg::Count
    } else if left.eq_ignore_ascii_case("rate") {
        ThresholdAgg::Rate
    } else if left.eq_ignore_ascii_case("avg") {
        ThresholdAgg::Avg
    } else if left.eq_ignore_ascii_case("min") {
        ThresholdAgg::Min
    } else if left.eq_ignore_ascii_case("max") {
        ThresholdAgg::Max
    } else if let Some(inner) = left.strip_prefix("p(").and_then(|v| v.strip_suffix(')')) {
        let p: f64 = inner
            .parse()
            .map_err(|_| format!("invalid percentile in threshold: {raw}"))?;
        if !p.is_finite() || p <= 0.0 || p >= 100.0 {
            return Err(format!("percentile out of range in threshold: {raw}"));
        }
        ThresholdAgg::P(p)
    } else {
        return Err(format!("unknown aggregation `{left}` in threshold: {raw}"));
    };

    let value: f64 = right
        .parse()
        .map_err(|_| format!("invalid numeric value in threshold: {raw}"))?;

    Ok(ThresholdExpr { agg, op, value })
}

/// Rejects malformed expressions up front, before any VU is spawned.
pub fn validate_thresholds(sets: &[ThresholdSet]) -> Result<()> {
    for set in sets {
        for expr in &set.expressions {
            parse_threshold_expr(expr).map_err(|message| Error::InvalidThreshold {
                metric: set.metric.clone(),
                message,
            })?;
        }
    }
    Ok(())
}

/// Evaluates every expression against the final metric snapshot.
///
/// A metric that was never written, or an aggregate that doesn't apply to
/// the metric's kind, observes `None` and fails its expression. The run
/// verdict is the conjunction of all results.
pub fn evaluate_thresholds(
    sets: &[ThresholdSet],
    metrics: &[MetricSummary],
) -> Vec<ThresholdResult> {
    let mut out = Vec::new();

    for set in sets {
        let series = metrics.iter().find(|m| m.name == set.metric);

        for raw in &set.expressions {
            let result = match parse_threshold_expr(raw) {
                Ok(expr) => {
                    let observed = series.and_then(|s| observed_value(s, expr.agg));
                    let passed = observed.is_some_and(|v| compare(v, expr.op, expr.value));
                    ThresholdResult {
                        metric: set.metric.clone(),
                        expression: raw.clone(),
                        observed,
                        passed,
                    }
                }
                // validate_thresholds runs before the scheduler; a parse
                // failure here means the caller skipped it, so fail closed.
                Err(_) => ThresholdResult {
                    metric: set.metric.clone(),
                    expression: raw.clone(),
                    observed: None,
                    passed: false,
                },
            };
            out.push(result);
        }
    }

    out
}

fn observed_value(series: &MetricSummary, agg: ThresholdAgg) -> Option<f64> {
    match (&series.value, agg) {
        (MetricValue::Counter { total }, ThresholdAgg::Value | ThresholdAgg::Count) => Some(*total),

        (MetricValue::Rate(rate), ThresholdAgg::Value | ThresholdAgg::Rate) => Some(rate.rate()),
        (MetricValue::Rate(rate), ThresholdAgg::Count) => Some(rate.total as f64),

        (MetricValue::Trend(trend), ThresholdAgg::Avg) => trend.avg(),
        (MetricValue::Trend(trend), ThresholdAgg::Min) => trend.min(),
        (MetricValue::Trend(trend), ThresholdAgg::Max) => trend.max(),
        (MetricValue::Trend(trend), ThresholdAgg::Count) => Some(trend.count() as f64),
        (MetricValue::Trend(trend), ThresholdAgg::P(p)) => trend.percentile(p),

        // Non-sensical combinations.
        (_, _) => None,
    }
}

fn compare(observed: f64, op: ThresholdOp, expected: f64) -> bool {
    match op {
        ThresholdOp::Lt => observed < expected,
        ThresholdOp::Lte => observed <= expected,
        ThresholdOp::Gt => observed > expected,
        ThresholdOp::Gte => observed >= expected,
        ThresholdOp::Eq => observed == expected,
    }
}
