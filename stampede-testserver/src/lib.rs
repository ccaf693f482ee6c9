//! Mock of the concert reservation service for integration tests.
//!
//! Serves the queue/reservation/payment surface on an ephemeral local port
//! with scripted behavior: how many status polls a token needs before it
//! turns ACTIVE, and whether reservations grant, conflict, or error.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

pub const PATH_QUEUE_TOKENS: &str = "/api/v1/queue/tokens";
pub const PATH_QUEUE_STATUS: &str = "/api/v1/queue/status";
pub const PATH_RESERVATIONS: &str = "/api/v1/reservations";
pub const PATH_PAYMENTS: &str = "/api/v1/payments";

pub const QUEUE_TOKEN_HEADER: &str = "Concert-Queue-Token";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationMode {
    /// Every reservation succeeds.
    Grant,
    /// Every reservation answers 409 (seat taken).
    Conflict,
    /// Every reservation answers 500.
    ServerError,
}

#[derive(Debug, Clone, Copy)]
pub struct ServerBehavior {
    /// Tokens are issued WAITING when true, ACTIVE otherwise.
    pub issue_waiting: bool,
    /// Number of status polls after which a WAITING token reports ACTIVE.
    pub polls_until_active: u64,
    pub reservation: ReservationMode,
    /// Payments answer 500 when false.
    pub payment_ok: bool,
}

impl Default for ServerBehavior {
    fn default() -> Self {
        Self {
            issue_waiting: false,
            polls_until_active: 0,
            reservation: ReservationMode::Grant,
            payment_ok: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    tokens_issued: Arc<AtomicU64>,
    status_polls: Arc<AtomicU64>,
    reservations: Arc<AtomicU64>,
    conflicts: Arc<AtomicU64>,
    payments: Arc<AtomicU64>,
}

impl ServerStats {
    pub fn tokens_issued(&self) -> u64 {
        self.tokens_issued.load(Ordering::Relaxed)
    }

    pub fn status_polls(&self) -> u64 {
        self.status_polls.load(Ordering::Relaxed)
    }

    pub fn reservations(&self) -> u64 {
        self.reservations.load(Ordering::Relaxed)
    }

    pub fn conflicts(&self) -> u64 {
        self.conflicts.load(Ordering::Relaxed)
    }

    pub fn payments(&self) -> u64 {
        self.payments.load(Ordering::Relaxed)
    }
}

#[derive(Clone)]
struct AppState {
    behavior: ServerBehavior,
    stats: ServerStats,
    next_token: Arc<AtomicU64>,
    next_reservation: Arc<AtomicU64>,
    polls_by_token: Arc<Mutex<HashMap<String, u64>>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueTokenRequest {
    user_id: u64,
    #[allow(dead_code)]
    concert_id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReservationRequest {
    user_id: u64,
    #[allow(dead_code)]
    schedule_id: u64,
    #[allow(dead_code)]
    seat_number: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentRequest {
    reservation_id: u64,
    user_id: u64,
}

fn envelope(data: serde_json::Value) -> Response {
    let body = json!({ "success": true, "data": data });
    (StatusCode::OK, axum::Json(body)).into_response()
}

fn error_response(status: StatusCode, message: &str) -> Response {
    let body = json!({ "success": false, "error": message });
    (status, axum::Json(body)).into_response()
}

async fn handle_issue_token(
    State(state): State<AppState>,
    body: axum::body::Bytes,
) -> Response {
    state.stats.tokens_issued.fetch_add(1, Ordering::Relaxed);

    let req: IssueTokenRequest = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "bad json"),
    };

    let n = state.next_token.fetch_add(1, Ordering::Relaxed);
    let token = format!("tok-{}-{n}", req.user_id);
    let status = if state.behavior.issue_waiting {
        "WAITING"
    } else {
        "ACTIVE"
    };

    envelope(json!({ "token": token, "status": status }))
}

async fn handle_queue_status(State(state): State<AppState>, headers: HeaderMap) -> Response {
    state.stats.status_polls.fetch_add(1, Ordering::Relaxed);

    let Some(token) = header_value(&headers, QUEUE_TOKEN_HEADER) else {
        return error_response(StatusCode::UNAUTHORIZED, "missing queue token");
    };

    let polls = {
        let mut map = state
            .polls_by_token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let entry = map.entry(token).or_insert(0);
        *entry += 1;
        *entry
    };

    let status = if polls >= state.behavior.polls_until_active {
        "ACTIVE"
    } else {
        "WAITING"
    };

    envelope(json!({ "status": status }))
}

async fn handle_reservation(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    state.stats.reservations.fetch_add(1, Ordering::Relaxed);

    if header_value(&headers, QUEUE_TOKEN_HEADER).is_none() {
        return error_response(StatusCode::UNAUTHORIZED, "missing queue token");
    }

    let req: ReservationRequest = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "bad json"),
    };

    match state.behavior.reservation {
        ReservationMode::Grant => {
            let n = state.next_reservation.fetch_add(1, Ordering::Relaxed);
            envelope(json!({ "reservationId": n, "userId": req.user_id }))
        }
        ReservationMode::Conflict => {
            state.stats.conflicts.fetch_add(1, Ordering::Relaxed);
            error_response(StatusCode::CONFLICT, "seat already taken")
        }
        ReservationMode::ServerError => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "reservation failed")
        }
    }
}

async fn handle_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    state.stats.payments.fetch_add(1, Ordering::Relaxed);

    if header_value(&headers, QUEUE_TOKEN_HEADER).is_none() {
        return error_response(StatusCode::UNAUTHORIZED, "missing queue token");
    }

    let req: PaymentRequest = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "bad json"),
    };

    if !state.behavior.payment_ok {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "payment failed");
    }

    envelope(json!({
        "paymentId": req.reservation_id,
        "reservationId": req.reservation_id,
        "userId": req.user_id,
        "status": "PAID",
    }))
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

pub fn router(behavior: ServerBehavior, stats: ServerStats) -> Router {
    let state = AppState {
        behavior,
        stats,
        next_token: Arc::new(AtomicU64::new(1)),
        next_reservation: Arc::new(AtomicU64::new(1)),
        polls_by_token: Arc::new(Mutex::new(HashMap::new())),
    };

    Router::new()
        .route(PATH_QUEUE_TOKENS, post(handle_issue_token))
        .route(PATH_QUEUE_STATUS, get(handle_queue_status))
        .route(PATH_RESERVATIONS, post(handle_reservation))
        .route(PATH_PAYMENTS, post(handle_payment))
        .with_state(state)
}

pub struct TestServer {
    addr: SocketAddr,
    base_url: String,
    stats: ServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        Self::start_with(ServerBehavior::default()).await
    }

    pub async fn start_with(behavior: ServerBehavior) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let stats = ServerStats::default();
        let app = router(behavior, stats.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        Ok(Self {
            addr,
            base_url: format!("http://{addr}"),
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}
