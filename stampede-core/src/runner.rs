mod config;
mod error;
mod gate;
mod progress;
mod report;
mod run;
mod schedule;
mod signal;
mod stats;
mod thresholds;
mod vu;

pub use config::{ScenarioConfig, ScenarioExecutor, ScenarioExecutorKind, Stage};
pub use error::{Error, Result};
pub use gate::IterationGate;
pub use progress::{LiveMetrics, ProgressFn, ProgressUpdate, ScenarioProgress, StageProgress};
pub use report::{RunReport, build_report};
pub use run::run_scenarios;
pub use schedule::{RampingSchedule, StageSnapshot};
pub use signal::{StartSignal, StopSignal};
pub use stats::{CheckHandle, CheckSummary, HttpRequestMeta, RunStats, RunSummary};
pub use thresholds::{
    ThresholdExpr, ThresholdResult, ThresholdSet, evaluate_thresholds, parse_threshold_expr,
    validate_thresholds,
};
pub use vu::{VuContext, VuWork, drive};
