//! Scenario flows: one complete pass of user logic per VU iteration.
//!
//! A flow only appends to the shared [`RunStats`]; it keeps no state across
//! iterations and never lets a failure escape the iteration that caused it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::Serialize;
use stampede_metrics::{MetricHandle, MetricKind};

use crate::api::{
    self, Envelope, IssueTokenRequest, PaymentRequest, QueueStatus, ReservationData,
    ReservationRequest, StatusData, TokenData,
};
use crate::http::{HttpClient, HttpRequest, HttpResponse, TransportErrorKind};
use crate::runner::{CheckHandle, HttpRequestMeta, RunStats, VuContext, drive};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
pub enum FlowKind {
    /// Full queue → reserve → pay pass.
    #[strum(serialize = "reservation")]
    Reservation,

    /// Token issue only; the spike shape from ticketing-open drills.
    #[strum(serialize = "token-issue")]
    TokenIssue,
}

/// Knobs for the system under test, shared read-only by every VU.
#[derive(Debug, Clone)]
pub struct TargetOptions {
    pub base_url: String,
    pub concert_id: u64,
    pub schedule_id: u64,
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    pub think_time: Duration,
    pub spike_think_time: Duration,
    pub request_timeout: Option<Duration>,
}

impl Default for TargetOptions {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            concert_id: 1,
            schedule_id: 1,
            poll_interval: Duration::from_secs(1),
            max_poll_attempts: 30,
            think_time: Duration::from_secs(1),
            spike_think_time: Duration::from_millis(100),
            request_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// Entry point handed to the scheduler: builds one flow runner per VU and
/// loops it under the VU's executor policy.
pub async fn run_vu(ctx: VuContext) {
    let runner = FlowRunner::new(
        ctx.client.clone(),
        ctx.stats.clone(),
        ctx.target.clone(),
        ctx.vu_id,
    );
    let flow = ctx.flow;

    drive(&ctx, |iteration| runner.run_iteration(flow, iteration)).await;
}

pub struct FlowRunner {
    client: Arc<HttpClient>,
    stats: Arc<RunStats>,
    target: Arc<TargetOptions>,
    vu_id: u64,

    token_issue_duration: MetricHandle,
    token_status_duration: MetricHandle,
    reservation_duration: MetricHandle,
    payment_duration: MetricHandle,
    failed_requests: MetricHandle,
    success_rate: MetricHandle,

    token_issue_check: CheckHandle,
    payment_check: CheckHandle,
}

impl FlowRunner {
    pub fn new(
        client: Arc<HttpClient>,
        stats: Arc<RunStats>,
        target: Arc<TargetOptions>,
        vu_id: u64,
    ) -> Self {
        let token_issue_duration = stats.metric_handle(MetricKind::Trend, "token_issue_duration");
        let token_status_duration = stats.metric_handle(MetricKind::Trend, "token_status_duration");
        let reservation_duration = stats.metric_handle(MetricKind::Trend, "reservation_duration");
        let payment_duration = stats.metric_handle(MetricKind::Trend, "payment_duration");
        let failed_requests = stats.metric_handle(MetricKind::Counter, "failed_requests");
        let success_rate = stats.metric_handle(MetricKind::Rate, "success_rate");
        let token_issue_check = stats.check_handle("token_issue");
        let payment_check = stats.check_handle("payment");

        Self {
            client,
            stats,
            target,
            vu_id,
            token_issue_duration,
            token_status_duration,
            reservation_duration,
            payment_duration,
            failed_requests,
            success_rate,
            token_issue_check,
            payment_check,
        }
    }

    pub async fn run_iteration(&self, flow: FlowKind, iteration: u64) {
        match flow {
            FlowKind::Reservation => self.reservation_flow(iteration).await,
            FlowKind::TokenIssue => self.token_issue_flow(iteration).await,
        }
    }

    /// ISSUE_TOKEN → (WAIT_FOR_ACTIVE)? → RESERVE → (PAY)?
    async fn reservation_flow(&self, iteration: u64) {
        let user_id = self.vu_id * 1000 + iteration;

        let req = HttpRequest::post(
            self.url(api::QUEUE_TOKENS_PATH),
            json_body(&IssueTokenRequest {
                user_id,
                concert_id: self.target.concert_id,
            }),
        )
        .json()
        .with_timeout(self.target.request_timeout);

        let res = self
            .timed("issue_token", req, &self.token_issue_duration)
            .await;

        let Some(token) = self.checked_token(res.as_ref()) else {
            self.think(self.target.think_time).await;
            return;
        };

        if token.status == QueueStatus::Waiting {
            self.wait_for_active(&token.token).await;
        }

        let seat_number = user_id % 50 + 1;
        let req = HttpRequest::post(
            self.url(api::RESERVATIONS_PATH),
            json_body(&ReservationRequest {
                user_id,
                schedule_id: self.target.schedule_id,
                seat_number,
            }),
        )
        .json()
        .header(api::QUEUE_TOKEN_HEADER, &token.token)
        .with_timeout(self.target.request_timeout);

        let res = self
            .timed("reserve_seat", req, &self.reservation_duration)
            .await;

        let Some(res) = res else {
            self.record_reserve_failure(None);
            self.think(self.target.think_time).await;
            return;
        };

        if res.status == api::STATUS_CONFLICT {
            // Seat already taken: an expected outcome, not a failure, and
            // payment is never attempted.
            self.success_rate.add_bool(true);
            self.think(self.target.think_time).await;
            return;
        }

        if res.status != api::STATUS_OK {
            self.record_reserve_failure(Some(&res));
            self.think(self.target.think_time).await;
            return;
        }

        let reservation = match api::parse_envelope::<ReservationData>(&res.body) {
            Ok(env) if env.is_ok() => env.data,
            _ => {
                self.record_reserve_failure(Some(&res));
                self.think(self.target.think_time).await;
                return;
            }
        };
        self.success_rate.add_bool(true);

        if let Some(reservation) = reservation {
            let req = HttpRequest::post(
                self.url(api::PAYMENTS_PATH),
                json_body(&PaymentRequest {
                    reservation_id: reservation.reservation_id,
                    user_id,
                }),
            )
            .json()
            .header(api::QUEUE_TOKEN_HEADER, &token.token)
            .with_timeout(self.target.request_timeout);

            let res = self.timed("payment", req, &self.payment_duration).await;
            self.checked_envelope(&self.payment_check, "payment", res.as_ref());
        }

        self.think(self.target.think_time).await;
    }

    async fn token_issue_flow(&self, iteration: u64) {
        let user_id = self.vu_id * 10_000 + iteration;

        let req = HttpRequest::post(
            self.url(api::QUEUE_TOKENS_PATH),
            json_body(&IssueTokenRequest {
                user_id,
                concert_id: self.target.concert_id,
            }),
        )
        .json()
        .with_timeout(self.target.request_timeout);

        let res = self
            .timed("issue_token", req, &self.token_issue_duration)
            .await;
        let _ = self.checked_token(res.as_ref());

        self.think(self.target.spike_think_time).await;
    }

    /// Polls the queue status until it reports ACTIVE, at a fixed interval,
    /// up to the attempt budget. Exhausting the budget is logged but the
    /// iteration still proceeds with the unconfirmed token.
    async fn wait_for_active(&self, token: &str) {
        let mut attempts = 0u32;
        while attempts < self.target.max_poll_attempts {
            tokio::time::sleep(self.target.poll_interval).await;

            let req = HttpRequest::get(self.url(api::QUEUE_STATUS_PATH))
                .header(api::QUEUE_TOKEN_HEADER, token)
                .with_timeout(self.target.request_timeout);
            let res = self
                .timed("poll_status", req, &self.token_status_duration)
                .await;

            if let Some(res) = res
                && res.status == api::STATUS_OK
                && let Ok(env) = api::parse_envelope::<StatusData>(&res.body)
                && env
                    .data
                    .as_ref()
                    .is_some_and(|d| d.status == QueueStatus::Active)
            {
                return;
            }

            attempts += 1;
        }

        log::warn!(
            "vu {}: token not ACTIVE after {} polls, proceeding anyway",
            self.vu_id,
            self.target.max_poll_attempts
        );
    }

    /// Issues one request, timing it into both the per-step trend and the
    /// engine-level request metrics. `None` means the request never produced
    /// a status (transport failure), already recorded.
    async fn timed(
        &self,
        name: &'static str,
        req: HttpRequest,
        trend: &MetricHandle,
    ) -> Option<HttpResponse> {
        let method = req.method.clone();
        let started = Instant::now();
        let result = self.client.request(req).await;
        let elapsed = started.elapsed();

        trend.add_duration(elapsed);

        match result {
            Ok(res) => {
                self.stats.record_http_request(HttpRequestMeta {
                    method: method.as_str(),
                    name,
                    status: Some(res.status),
                    transport_error: None,
                    elapsed,
                });
                Some(res)
            }
            Err(err) => {
                let kind = err
                    .transport_kind()
                    .unwrap_or(TransportErrorKind::Protocol);
                self.stats.record_http_request(HttpRequestMeta {
                    method: method.as_str(),
                    name,
                    status: None,
                    transport_error: Some(kind),
                    elapsed,
                });
                log::warn!("vu {}: {name} request error: {err}", self.vu_id);
                None
            }
        }
    }

    /// Standard success-check for the token issue step, returning the token
    /// payload when it passes.
    fn checked_token(&self, res: Option<&HttpResponse>) -> Option<TokenData> {
        let data = res
            .filter(|r| r.status == api::STATUS_OK)
            .and_then(|r| api::parse_envelope::<TokenData>(&r.body).ok())
            .and_then(|env| if env.success { env.data } else { None });

        let ok = data.is_some();
        self.stats.record_check(&self.token_issue_check, ok);
        if ok {
            self.success_rate.add_bool(true);
        } else {
            self.record_failure("token_issue", res);
        }

        data
    }

    /// Standard success-check against the bare envelope (payment step).
    fn checked_envelope(
        &self,
        check: &CheckHandle,
        name: &str,
        res: Option<&HttpResponse>,
    ) -> bool {
        let ok = res.is_some_and(|r| {
            r.status == api::STATUS_OK
                && api::parse_envelope::<serde_json::Value>(&r.body)
                    .map(|env: Envelope<serde_json::Value>| env.is_ok())
                    .unwrap_or(false)
        });

        self.stats.record_check(check, ok);
        if ok {
            self.success_rate.add_bool(true);
        } else {
            self.record_failure(name, res);
        }

        ok
    }

    fn record_reserve_failure(&self, res: Option<&HttpResponse>) {
        self.record_failure("reserve_seat", res);
    }

    fn record_failure(&self, name: &str, res: Option<&HttpResponse>) {
        self.failed_requests.add(1.0);
        self.success_rate.add_bool(false);
        log::warn!(
            "vu {}: {name} failed: status={} body={}",
            self.vu_id,
            res.map(|r| r.status.to_string())
                .unwrap_or_else(|| "-".to_string()),
            res.and_then(|r| r.body_utf8()).unwrap_or("-"),
        );
    }

    async fn think(&self, pause: Duration) {
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.target.base_url.trim_end_matches('/'), path)
    }
}

fn json_body<T: Serialize>(value: &T) -> Bytes {
    Bytes::from(serde_json::to_vec(value).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner(stats: &Arc<RunStats>) -> FlowRunner {
        FlowRunner::new(
            Arc::new(HttpClient::default()),
            stats.clone(),
            Arc::new(TargetOptions::default()),
            1,
        )
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            body: Bytes::from(body.to_string()),
        }
    }

    #[test]
    fn flow_kind_parses_from_plan_strings() {
        let parsed: FlowKind = "reservation"
            .parse()
            .unwrap_or_else(|_| panic!("parse failed"));
        assert_eq!(parsed, FlowKind::Reservation);

        let parsed: FlowKind = "token-issue"
            .parse()
            .unwrap_or_else(|_| panic!("parse failed"));
        assert_eq!(parsed, FlowKind::TokenIssue);

        assert!("browse".parse::<FlowKind>().is_err());
    }

    #[test]
    fn token_check_passes_on_the_standard_shape() {
        let stats = Arc::new(RunStats::default());
        let r = runner(&stats);

        let res = response(
            200,
            r#"{"success":true,"data":{"token":"t1","status":"ACTIVE"}}"#,
        );
        let token = r.checked_token(Some(&res));
        assert_eq!(
            token.map(|t| t.status),
            Some(QueueStatus::Active)
        );

        let summary = stats.summarize(Duration::from_secs(1));
        let check = summary
            .check("token_issue")
            .unwrap_or_else(|| panic!("missing check"));
        assert_eq!((check.passes, check.fails), (1, 0));

        let rate = summary
            .metric("success_rate")
            .and_then(|m| m.as_rate())
            .unwrap_or_else(|| panic!("missing rate"));
        assert_eq!((rate.total, rate.trues), (1, 1));
    }

    #[test]
    fn token_check_fails_on_success_false() {
        let stats = Arc::new(RunStats::default());
        let r = runner(&stats);

        let res = response(
            200,
            r#"{"success":false,"data":{"token":"t1","status":"ACTIVE"}}"#,
        );
        assert!(r.checked_token(Some(&res)).is_none());

        let summary = stats.summarize(Duration::from_secs(1));
        let check = summary
            .check("token_issue")
            .unwrap_or_else(|| panic!("missing check"));
        assert_eq!((check.passes, check.fails), (0, 1));

        let failed = summary
            .metric("failed_requests")
            .unwrap_or_else(|| panic!("missing counter"));
        match &failed.value {
            stampede_metrics::MetricValue::Counter { total } => assert_eq!(*total, 1.0),
            _ => panic!("expected counter"),
        }
    }

    #[test]
    fn token_check_fails_on_unparseable_body() {
        let stats = Arc::new(RunStats::default());
        let r = runner(&stats);

        let res = response(200, "<html>gateway timeout</html>");
        assert!(r.checked_token(Some(&res)).is_none());

        let summary = stats.summarize(Duration::from_secs(1));
        let rate = summary
            .metric("success_rate")
            .and_then(|m| m.as_rate())
            .unwrap_or_else(|| panic!("missing rate"));
        assert_eq!((rate.total, rate.trues), (1, 0));
    }

    #[test]
    fn token_check_fails_on_transport_error() {
        let stats = Arc::new(RunStats::default());
        let r = runner(&stats);

        assert!(r.checked_token(None).is_none());

        let summary = stats.summarize(Duration::from_secs(1));
        let check = summary
            .check("token_issue")
            .unwrap_or_else(|| panic!("missing check"));
        assert_eq!((check.passes, check.fails), (0, 1));
    }

    #[test]
    fn payment_check_requires_non_empty_payload() {
        let stats = Arc::new(RunStats::default());
        let r = runner(&stats);

        let ok = response(200, r#"{"success":true,"data":{"paymentId":9}}"#);
        assert!(r.checked_envelope(&r.payment_check, "payment", Some(&ok)));

        let empty = response(200, r#"{"success":true,"data":null}"#);
        assert!(!r.checked_envelope(&r.payment_check, "payment", Some(&empty)));

        let summary = stats.summarize(Duration::from_secs(1));
        let check = summary
            .check("payment")
            .unwrap_or_else(|| panic!("missing check"));
        assert_eq!((check.passes, check.fails), (1, 1));
    }
}
