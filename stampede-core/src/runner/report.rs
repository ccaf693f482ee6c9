use serde::Serialize;

use super::stats::RunSummary;
use super::thresholds::{ThresholdResult, ThresholdSet, evaluate_thresholds};

/// The complete end-of-run artifact: the metric/check snapshot plus every
/// threshold verdict. Assembled exactly once; renderers are pure functions
/// of this value.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub summary: RunSummary,
    pub thresholds: Vec<ThresholdResult>,
    /// Conjunction of all threshold verdicts.
    pub passed: bool,
}

pub fn build_report(summary: RunSummary, thresholds: &[ThresholdSet]) -> RunReport {
    let thresholds = evaluate_thresholds(thresholds, &summary.metrics);
    let passed = thresholds.iter().all(|t| t.passed);
    RunReport {
        summary,
        thresholds,
        passed,
    }
}
