use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;

use stampede_core::runner::{
    RunSummary, ScenarioConfig, ScenarioExecutor, Stage, StopSignal, run_scenarios,
};
use stampede_core::{FlowKind, TargetOptions, flow};
use stampede_metrics::MetricValue;
use stampede_testserver::{ReservationMode, ServerBehavior, TestServer};

fn fast_target(base_url: &str) -> Arc<TargetOptions> {
    Arc::new(TargetOptions {
        base_url: base_url.to_string(),
        poll_interval: Duration::from_millis(5),
        think_time: Duration::ZERO,
        spike_think_time: Duration::ZERO,
        request_timeout: Some(Duration::from_secs(5)),
        ..TargetOptions::default()
    })
}

fn one_shot(flow: FlowKind) -> Vec<ScenarioConfig> {
    vec![ScenarioConfig {
        name: "e2e".to_string(),
        flow,
        executor: ScenarioExecutor::SharedIterations {
            vus: 1,
            iterations: 1,
            max_duration: Duration::from_secs(30),
        },
        start_offset: Duration::ZERO,
    }]
}

async fn run_once(
    behavior: ServerBehavior,
    target_tweak: impl FnOnce(&mut TargetOptions),
    flow_kind: FlowKind,
) -> anyhow::Result<(RunSummary, TestServer)> {
    let server = TestServer::start_with(behavior)
        .await
        .context("start test server")?;

    let mut target = (*fast_target(server.base_url())).clone();
    target_tweak(&mut target);

    let summary = run_scenarios(
        one_shot(flow_kind),
        Arc::new(target),
        Arc::new(StopSignal::new()),
        None,
        flow::run_vu,
    )
    .await
    .context("run scenarios")?;

    Ok((summary, server))
}

fn counter_total(summary: &RunSummary, name: &str) -> f64 {
    match summary.metric(name).map(|m| &m.value) {
        Some(MetricValue::Counter { total }) => *total,
        _ => panic!("missing counter `{name}`"),
    }
}

fn rate_counts(summary: &RunSummary, name: &str) -> (u64, u64) {
    let rate = summary
        .metric(name)
        .and_then(|m| m.as_rate())
        .unwrap_or_else(|| panic!("missing rate `{name}`"));
    (rate.total, rate.trues)
}

fn trend_count(summary: &RunSummary, name: &str) -> u64 {
    summary
        .metric(name)
        .and_then(|m| m.as_trend())
        .map(|t| t.count())
        .unwrap_or_else(|| panic!("missing trend `{name}`"))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reservation_flow_happy_path_with_wait_loop() -> anyhow::Result<()> {
    let behavior = ServerBehavior {
        issue_waiting: true,
        polls_until_active: 3,
        reservation: ReservationMode::Grant,
        payment_ok: true,
    };

    let (summary, server) = run_once(behavior, |_| {}, FlowKind::Reservation).await?;

    // Token issue and payment both passed their checks exactly once.
    let token = summary
        .check("token_issue")
        .context("missing token_issue check")?;
    assert_eq!((token.passes, token.fails), (1, 0));
    let payment = summary.check("payment").context("missing payment check")?;
    assert_eq!((payment.passes, payment.fails), (1, 0));

    // WAITING, WAITING, ACTIVE: three polls, then reserve and pay.
    assert_eq!(server.stats().status_polls(), 3);
    assert_eq!(server.stats().reservations(), 1);
    assert_eq!(server.stats().payments(), 1);
    assert_eq!(trend_count(&summary, "token_status_duration"), 3);
    assert_eq!(trend_count(&summary, "reservation_duration"), 1);
    assert_eq!(trend_count(&summary, "payment_duration"), 1);

    // Every success-rate sample is true; nothing was recorded as failed.
    let (total, trues) = rate_counts(&summary, "success_rate");
    assert_eq!(total, trues);
    assert!(total >= 3);
    assert_eq!(counter_total(&summary, "failed_requests"), 0.0);
    assert_eq!(summary.failed_requests_total, 0);
    assert_eq!(summary.iterations_total, 1);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reservation_conflict_is_not_a_failure_and_skips_payment() -> anyhow::Result<()> {
    let behavior = ServerBehavior {
        issue_waiting: false,
        polls_until_active: 0,
        reservation: ReservationMode::Conflict,
        payment_ok: true,
    };

    let (summary, server) = run_once(behavior, |_| {}, FlowKind::Reservation).await?;

    // The conflict increments neither the failure counter nor a false rate
    // sample, and payment is never attempted.
    assert_eq!(counter_total(&summary, "failed_requests"), 0.0);
    let (total, trues) = rate_counts(&summary, "success_rate");
    assert_eq!(total, trues);
    assert_eq!(server.stats().payments(), 0);
    assert_eq!(trend_count(&summary, "payment_duration"), 0);
    assert!(summary.check("payment").is_none_or(|c| c.passes + c.fails == 0));

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reservation_server_error_is_a_hard_failure() -> anyhow::Result<()> {
    let behavior = ServerBehavior {
        issue_waiting: false,
        polls_until_active: 0,
        reservation: ReservationMode::ServerError,
        payment_ok: true,
    };

    let (summary, server) = run_once(behavior, |_| {}, FlowKind::Reservation).await?;

    assert_eq!(counter_total(&summary, "failed_requests"), 1.0);
    let (total, trues) = rate_counts(&summary, "success_rate");
    assert_eq!(total - trues, 1);
    assert_eq!(server.stats().payments(), 0);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn exhausted_wait_loop_still_reserves() -> anyhow::Result<()> {
    let behavior = ServerBehavior {
        issue_waiting: true,
        // Never activates within the poll budget.
        polls_until_active: 1_000_000,
        reservation: ReservationMode::Grant,
        payment_ok: true,
    };

    let (summary, server) = run_once(
        behavior,
        |t| t.max_poll_attempts = 2,
        FlowKind::Reservation,
    )
    .await?;

    // Budget of 2 polls spent, then the flow carried on with the stale
    // token: reservation and payment still happened.
    assert_eq!(server.stats().status_polls(), 2);
    assert_eq!(server.stats().reservations(), 1);
    assert_eq!(server.stats().payments(), 1);
    assert_eq!(counter_total(&summary, "failed_requests"), 0.0);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_payment_records_the_full_failure_taxonomy() -> anyhow::Result<()> {
    let behavior = ServerBehavior {
        issue_waiting: false,
        polls_until_active: 0,
        reservation: ReservationMode::Grant,
        payment_ok: false,
    };

    let (summary, server) = run_once(behavior, |_| {}, FlowKind::Reservation).await?;

    let payment = summary.check("payment").context("missing payment check")?;
    assert_eq!((payment.passes, payment.fails), (0, 1));
    assert_eq!(counter_total(&summary, "failed_requests"), 1.0);
    let (total, trues) = rate_counts(&summary, "success_rate");
    assert_eq!(total - trues, 1);
    // Engine-level accounting saw the 500 too.
    assert_eq!(summary.failed_requests_total, 1);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shared_pool_against_live_server_claims_exactly_the_budget() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;

    let scenarios = vec![ScenarioConfig {
        name: "burst".to_string(),
        flow: FlowKind::TokenIssue,
        executor: ScenarioExecutor::SharedIterations {
            vus: 100,
            iterations: 200,
            max_duration: Duration::from_secs(120),
        },
        start_offset: Duration::ZERO,
    }];

    let summary = run_scenarios(
        scenarios,
        fast_target(server.base_url()),
        Arc::new(StopSignal::new()),
        None,
        flow::run_vu,
    )
    .await
    .context("run scenarios")?;

    assert_eq!(summary.iterations_total, 200);
    assert_eq!(server.stats().tokens_issued(), 200);
    let token = summary
        .check("token_issue")
        .context("missing token_issue check")?;
    assert_eq!((token.passes, token.fails), (200, 0));

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn short_ramp_executes_and_drains() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;

    let scenarios = vec![ScenarioConfig {
        name: "mini_ramp".to_string(),
        flow: FlowKind::TokenIssue,
        executor: ScenarioExecutor::RampingVus {
            start_vus: 0,
            stages: vec![
                Stage {
                    duration: Duration::from_millis(300),
                    target: 4,
                },
                Stage {
                    duration: Duration::from_millis(200),
                    target: 0,
                },
            ],
        },
        start_offset: Duration::ZERO,
    }];

    let summary = run_scenarios(
        scenarios,
        fast_target(server.base_url()),
        Arc::new(StopSignal::new()),
        None,
        flow::run_vu,
    )
    .await
    .context("run scenarios")?;

    assert!(summary.iterations_total > 0);
    assert_eq!(server.stats().tokens_issued(), summary.requests_total);

    server.shutdown().await;
    Ok(())
}
