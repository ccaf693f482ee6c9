use std::path::Path;

use crate::cli::OutputFormat;
use stampede_core::runner::{ProgressFn, RunReport, ScenarioConfig};

mod human;
mod json;

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_header(&self, plan_path: Option<&Path>, scenarios: &[ScenarioConfig]);
    fn progress(&self) -> Option<ProgressFn>;
    fn print_report(&self, report: &RunReport) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Box::new(human::HumanReadableOutput::new()),
        OutputFormat::Json => Box::new(json::JsonOutput),
    }
}
