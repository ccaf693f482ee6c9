//! YAML run plans: scenario shapes, thresholds, and target knobs.
//!
//! Without a plan file, [`default_plan`] reproduces the standard drill: a
//! ramping reservation-flow load test plus a token-issue spike starting four
//! minutes in.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use stampede_core::runner::{ScenarioConfig, ScenarioExecutor, ScenarioExecutorKind, Stage, ThresholdSet};
use stampede_core::{FlowKind, TargetOptions};

use crate::cli::RunArgs;

/// Hard cap applied when a shared-pool scenario doesn't set one.
const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct RunPlan {
    #[serde(default)]
    pub target: TargetYaml,

    #[serde(default)]
    pub scenarios: Vec<ScenarioYaml>,

    /// Metric name → threshold expressions.
    #[serde(default)]
    pub thresholds: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct TargetYaml {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub concert_id: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_id: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub poll_interval: Option<YamlDuration>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_poll_attempts: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub think_time: Option<YamlDuration>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub spike_think_time: Option<YamlDuration>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub request_timeout: Option<YamlDuration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ScenarioYaml {
    pub name: String,

    /// Scenario flow: reservation | token-issue
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow: Option<String>,

    /// Executor kind: ramping-vus | shared-iterations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub vus: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub max_duration: Option<YamlDuration>,

    #[serde(rename = "startVUs")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_vus: Option<u64>,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub stages: Vec<StageYaml>,

    /// Delay from run start before this scenario begins.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub start_time: Option<YamlDuration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct StageYaml {
    pub target: u64,

    #[serde(default)]
    pub duration: YamlDuration,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct YamlDuration(Duration);

impl YamlDuration {
    pub(crate) fn into_inner(self) -> Duration {
        self.0
    }
}

impl From<Duration> for YamlDuration {
    fn from(value: Duration) -> Self {
        Self(value)
    }
}

impl Serialize for YamlDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(self.0).to_string())
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 10s), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if v <= 0 {
                    return Err(E::custom("duration must be positive"));
                }
                Ok(YamlDuration(Duration::from_secs(v as u64)))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if !v.is_finite() || v <= 0.0 {
                    return Err(E::custom("duration must be a positive, finite number"));
                }
                Ok(YamlDuration(Duration::from_secs_f64(v)))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let d = humantime::parse_duration(v).map_err(E::custom)?;
                Ok(YamlDuration(d))
            }

            fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                self.visit_str(&v)
            }
        }

        deserializer.deserialize_any(V)
    }
}

fn stage_yaml(secs: u64, target: u64) -> StageYaml {
    StageYaml {
        target,
        duration: Duration::from_secs(secs).into(),
    }
}

/// The built-in plan: the classic staircase load test plus a ticketing-open
/// spike on token issuing, with the standard latency/error objectives.
pub(crate) fn default_plan() -> RunPlan {
    let mut thresholds: BTreeMap<String, Vec<String>> = BTreeMap::new();
    thresholds.insert(
        "http_req_duration".to_string(),
        vec!["p(95)<500".to_string(), "p(99)<1000".to_string()],
    );
    thresholds.insert("http_req_failed".to_string(), vec!["rate<0.01".to_string()]);
    thresholds.insert("success_rate".to_string(), vec!["rate>0.99".to_string()]);
    thresholds.insert(
        "token_issue_duration".to_string(),
        vec!["p(95)<300".to_string()],
    );
    thresholds.insert(
        "token_status_duration".to_string(),
        vec!["p(95)<100".to_string()],
    );

    RunPlan {
        target: TargetYaml::default(),
        scenarios: vec![
            ScenarioYaml {
                name: "load_test".to_string(),
                flow: Some("reservation".to_string()),
                executor: Some("ramping-vus".to_string()),
                vus: None,
                iterations: None,
                max_duration: None,
                start_vus: Some(0),
                stages: vec![
                    stage_yaml(30, 50),
                    stage_yaml(60, 50),
                    stage_yaml(30, 100),
                    stage_yaml(60, 100),
                    stage_yaml(30, 0),
                ],
                start_time: None,
            },
            ScenarioYaml {
                name: "spike_test".to_string(),
                flow: Some("token-issue".to_string()),
                executor: Some("ramping-vus".to_string()),
                vus: None,
                iterations: None,
                max_duration: None,
                start_vus: Some(0),
                stages: vec![
                    stage_yaml(10, 10),
                    stage_yaml(1, 200),
                    stage_yaml(30, 200),
                    stage_yaml(10, 10),
                ],
                start_time: Some(Duration::from_secs(4 * 60).into()),
            },
        ],
        thresholds,
    }
}

pub(crate) async fn load_plan(path: Option<&Path>) -> anyhow::Result<RunPlan> {
    let Some(path) = path else {
        return Ok(default_plan());
    };

    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read plan: {}", path.display()))?;
    let plan: RunPlan = serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse plan: {}", path.display()))?;
    Ok(plan)
}

/// Resolves the plan into scheduler configs. CLI pool overrides have the
/// highest priority: any of --vus/--iterations/--duration collapses the
/// whole plan into a single shared-pool scenario.
pub(crate) fn scenarios_from_plan(
    plan: &RunPlan,
    args: &RunArgs,
) -> anyhow::Result<Vec<ScenarioConfig>> {
    if args.has_pool_overrides() {
        let vus = args.vus.unwrap_or(1);
        let iterations = args
            .iterations
            .unwrap_or(if args.duration.is_some() { u64::MAX } else { 1 });
        let max_duration = args.duration.unwrap_or(DEFAULT_MAX_DURATION);

        return Ok(vec![ScenarioConfig {
            name: "default".to_string(),
            flow: FlowKind::Reservation,
            executor: ScenarioExecutor::SharedIterations {
                vus,
                iterations,
                max_duration,
            },
            start_offset: Duration::ZERO,
        }]);
    }

    if plan.scenarios.is_empty() {
        anyhow::bail!("plan defines no scenarios");
    }

    let mut out = Vec::with_capacity(plan.scenarios.len());
    for s in &plan.scenarios {
        let flow: FlowKind = s
            .flow
            .as_deref()
            .unwrap_or("reservation")
            .parse()
            .map_err(|_| anyhow::anyhow!("scenario `{}`: invalid flow", s.name))?;

        let executor_name = s.executor.as_deref().unwrap_or(if s.stages.is_empty() {
            "shared-iterations"
        } else {
            "ramping-vus"
        });
        let kind: ScenarioExecutorKind = executor_name
            .parse()
            .map_err(|_| anyhow::anyhow!("scenario `{}`: invalid executor", s.name))?;

        let executor = match kind {
            ScenarioExecutorKind::RampingVus => {
                if s.iterations.is_some() {
                    anyhow::bail!(
                        "scenario `{}`: `iterations` doesn't apply to a ramping executor",
                        s.name
                    );
                }
                ScenarioExecutor::RampingVus {
                    start_vus: s.start_vus.unwrap_or(0),
                    stages: s
                        .stages
                        .iter()
                        .map(|st| Stage {
                            duration: st.duration.into_inner(),
                            target: st.target,
                        })
                        .collect(),
                }
            }
            ScenarioExecutorKind::SharedIterations => {
                if !s.stages.is_empty() {
                    anyhow::bail!(
                        "scenario `{}`: `stages` doesn't apply to a shared-pool executor",
                        s.name
                    );
                }
                ScenarioExecutor::SharedIterations {
                    vus: s.vus.unwrap_or(1),
                    iterations: s.iterations.unwrap_or(1),
                    max_duration: s
                        .max_duration
                        .map(YamlDuration::into_inner)
                        .unwrap_or(DEFAULT_MAX_DURATION),
                }
            }
        };

        out.push(ScenarioConfig {
            name: s.name.clone(),
            flow,
            executor,
            start_offset: s
                .start_time
                .map(YamlDuration::into_inner)
                .unwrap_or(Duration::ZERO),
        });
    }

    Ok(out)
}

pub(crate) fn thresholds_from_plan(plan: &RunPlan) -> Vec<ThresholdSet> {
    plan.thresholds
        .iter()
        .map(|(metric, expressions)| ThresholdSet {
            metric: metric.clone(),
            expressions: expressions.clone(),
        })
        .collect()
}

/// Plan target knobs with CLI flags layered on top.
pub(crate) fn target_options(plan: &RunPlan, args: &RunArgs) -> TargetOptions {
    let defaults = TargetOptions::default();
    let t = &plan.target;

    TargetOptions {
        base_url: args
            .base_url
            .clone()
            .or_else(|| t.base_url.clone())
            .unwrap_or(defaults.base_url),
        concert_id: args
            .concert_id
            .or(t.concert_id)
            .unwrap_or(defaults.concert_id),
        schedule_id: t.schedule_id.unwrap_or(defaults.schedule_id),
        poll_interval: t
            .poll_interval
            .map(YamlDuration::into_inner)
            .unwrap_or(defaults.poll_interval),
        max_poll_attempts: t.max_poll_attempts.unwrap_or(defaults.max_poll_attempts),
        think_time: t
            .think_time
            .map(YamlDuration::into_inner)
            .unwrap_or(defaults.think_time),
        spike_think_time: t
            .spike_think_time
            .map(YamlDuration::into_inner)
            .unwrap_or(defaults.spike_think_time),
        request_timeout: t
            .request_timeout
            .map(YamlDuration::into_inner)
            .map(Some)
            .unwrap_or(defaults.request_timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser as _;

    fn args(argv: &[&str]) -> RunArgs {
        let mut full = vec!["stampede", "run"];
        full.extend_from_slice(argv);
        let cli = crate::cli::Cli::try_parse_from(full)
            .unwrap_or_else(|err| panic!("failed to parse args: {err}"));
        let crate::cli::Command::Run(args) = cli.command;
        args
    }

    #[test]
    fn default_plan_resolves_to_two_scenarios() {
        let plan = default_plan();
        let scenarios =
            scenarios_from_plan(&plan, &args(&[])).unwrap_or_else(|e| panic!("{e}"));

        assert_eq!(scenarios.len(), 2);
        assert_eq!(scenarios[0].name, "load_test");
        assert_eq!(scenarios[0].flow, FlowKind::Reservation);
        assert_eq!(scenarios[0].max_vus(), 100);
        assert_eq!(scenarios[0].start_offset, Duration::ZERO);

        assert_eq!(scenarios[1].name, "spike_test");
        assert_eq!(scenarios[1].flow, FlowKind::TokenIssue);
        assert_eq!(scenarios[1].max_vus(), 200);
        assert_eq!(scenarios[1].start_offset, Duration::from_secs(240));

        for s in &scenarios {
            s.validate().unwrap_or_else(|e| panic!("{e}"));
        }
    }

    #[test]
    fn default_plan_carries_the_standard_thresholds() {
        let sets = thresholds_from_plan(&default_plan());
        assert_eq!(sets.len(), 5);
        let duration = sets
            .iter()
            .find(|s| s.metric == "http_req_duration")
            .unwrap_or_else(|| panic!("missing set"));
        assert_eq!(duration.expressions, vec!["p(95)<500", "p(99)<1000"]);
    }

    #[test]
    fn pool_overrides_collapse_the_plan() {
        let plan = default_plan();
        let scenarios = scenarios_from_plan(
            &plan,
            &args(&["--vus", "100", "--iterations", "200"]),
        )
        .unwrap_or_else(|e| panic!("{e}"));

        assert_eq!(scenarios.len(), 1);
        match &scenarios[0].executor {
            ScenarioExecutor::SharedIterations {
                vus, iterations, ..
            } => {
                assert_eq!(*vus, 100);
                assert_eq!(*iterations, 200);
            }
            other => panic!("unexpected executor: {other:?}"),
        }
    }

    #[test]
    fn plan_yaml_parses_durations_and_offsets() {
        let raw = r#"
target:
  baseUrl: http://staging:8080
  maxPollAttempts: 5
scenarios:
  - name: soak
    flow: reservation
    executor: ramping-vus
    stages:
      - { duration: 30s, target: 50 }
      - { duration: 1m, target: 50 }
  - name: burst
    flow: token-issue
    executor: shared-iterations
    vus: 100
    iterations: 200
    maxDuration: 2m
    startTime: 90s
thresholds:
  http_req_failed: ["rate<0.01"]
"#;
        let plan: RunPlan = serde_yaml::from_str(raw).unwrap_or_else(|e| panic!("{e}"));
        let scenarios =
            scenarios_from_plan(&plan, &args(&[])).unwrap_or_else(|e| panic!("{e}"));

        assert_eq!(scenarios.len(), 2);
        assert_eq!(
            scenarios[0].total_duration(),
            Duration::from_secs(90)
        );
        assert_eq!(scenarios[1].start_offset, Duration::from_secs(90));
        match &scenarios[1].executor {
            ScenarioExecutor::SharedIterations { max_duration, .. } => {
                assert_eq!(*max_duration, Duration::from_secs(120));
            }
            other => panic!("unexpected executor: {other:?}"),
        }

        let target = target_options(&plan, &args(&[]));
        assert_eq!(target.base_url, "http://staging:8080");
        assert_eq!(target.max_poll_attempts, 5);
        assert_eq!(target.concert_id, 1);
    }

    #[test]
    fn cli_base_url_beats_the_plan() {
        let plan: RunPlan = serde_yaml::from_str("target:\n  baseUrl: http://from-plan\n")
            .unwrap_or_else(|e| panic!("{e}"));
        let target = target_options(&plan, &args(&["--base-url", "http://from-cli"]));
        assert_eq!(target.base_url, "http://from-cli");
    }

    #[test]
    fn ramping_scenario_rejects_iterations() {
        let raw = r#"
scenarios:
  - name: bad
    executor: ramping-vus
    iterations: 10
    stages:
      - { duration: 10s, target: 5 }
"#;
        let plan: RunPlan = serde_yaml::from_str(raw).unwrap_or_else(|e| panic!("{e}"));
        assert!(scenarios_from_plan(&plan, &args(&[])).is_err());
    }

    #[test]
    fn unknown_plan_fields_are_rejected() {
        let res: Result<RunPlan, _> = serde_yaml::from_str("executorz: nope\n");
        assert!(res.is_err());
    }
}
