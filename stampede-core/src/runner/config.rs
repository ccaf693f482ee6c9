use std::time::Duration;

use super::error::{Error, Result};
use crate::flow::FlowKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u64,
}

#[derive(Debug, Clone)]
pub enum ScenarioExecutor {
    /// Ramp the number of active VUs along a piecewise-linear target curve.
    RampingVus { start_vus: u64, stages: Vec<Stage> },

    /// A fixed pool of VUs draining one shared iteration budget, bounded by
    /// a hard wall clock.
    SharedIterations {
        vus: u64,
        iterations: u64,
        max_duration: Duration,
    },
}

/// Executor kind (the string form used by run plans).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumString, strum::Display)]
pub enum ScenarioExecutorKind {
    #[strum(serialize = "ramping-vus", serialize = "ramping")]
    RampingVus,

    #[strum(serialize = "shared-iterations", serialize = "shared-pool")]
    SharedIterations,
}

#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    pub name: String,
    pub flow: FlowKind,
    pub executor: ScenarioExecutor,

    /// Delay from run start until this scenario's VUs begin claiming work.
    pub start_offset: Duration,
}

impl ScenarioConfig {
    pub fn max_vus(&self) -> u64 {
        match &self.executor {
            ScenarioExecutor::RampingVus { start_vus, stages } => {
                let max_stage = stages.iter().map(|s| s.target).max().unwrap_or(0);
                max_stage.max(*start_vus)
            }
            ScenarioExecutor::SharedIterations { vus, .. } => *vus,
        }
    }

    /// Scenario duration measured from its own start offset.
    pub fn total_duration(&self) -> Duration {
        match &self.executor {
            ScenarioExecutor::RampingVus { stages, .. } => stages
                .iter()
                .fold(Duration::ZERO, |acc, s| acc.saturating_add(s.duration)),
            ScenarioExecutor::SharedIterations { max_duration, .. } => *max_duration,
        }
    }

    /// Rejects configurations that must never spawn a VU.
    pub fn validate(&self) -> Result<()> {
        match &self.executor {
            ScenarioExecutor::RampingVus { stages, .. } => {
                if stages.is_empty() {
                    return Err(Error::InvalidStages);
                }
                for (index, stage) in stages.iter().enumerate() {
                    if stage.duration.is_zero() {
                        return Err(Error::InvalidStageDuration { index });
                    }
                }
                if self.max_vus() == 0 {
                    return Err(Error::NoTargetVus);
                }
            }
            ScenarioExecutor::SharedIterations {
                vus,
                iterations,
                max_duration,
            } => {
                if *vus == 0 {
                    return Err(Error::InvalidVus);
                }
                if *iterations == 0 {
                    return Err(Error::InvalidIterations);
                }
                if max_duration.is_zero() {
                    return Err(Error::InvalidMaxDuration);
                }
            }
        }
        Ok(())
    }
}
