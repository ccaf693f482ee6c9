//! Typed surface of the system under test.
//!
//! The reservation service speaks a uniform envelope: `{ success, data }`.
//! Responses are parsed into explicit types; a body that doesn't parse is an
//! [`ParseError`], which scenario flows treat as a failed check rather than
//! guessing at dynamic fields.

use serde::{Deserialize, Serialize};

pub const QUEUE_TOKENS_PATH: &str = "/api/v1/queue/tokens";
pub const QUEUE_STATUS_PATH: &str = "/api/v1/queue/status";
pub const RESERVATIONS_PATH: &str = "/api/v1/reservations";
pub const PAYMENTS_PATH: &str = "/api/v1/payments";

/// Header carrying the queue token issued by the service.
pub const QUEUE_TOKEN_HEADER: &str = "Concert-Queue-Token";

pub const STATUS_CONFLICT: u16 = 409;
pub const STATUS_OK: u16 = 200;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("malformed response body: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    Waiting,
    Active,
    Expired,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// The standard success shape: an explicit success flag and a payload.
    pub fn is_ok(&self) -> bool {
        self.success && self.data.is_some()
    }
}

pub fn parse_envelope<T: serde::de::DeserializeOwned>(
    body: &[u8],
) -> Result<Envelope<T>, ParseError> {
    Ok(serde_json::from_slice(body)?)
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueTokenRequest {
    pub user_id: u64,
    pub concert_id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenData {
    pub token: String,
    pub status: QueueStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusData {
    pub status: QueueStatus,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationRequest {
    pub user_id: u64,
    pub schedule_id: u64,
    pub seat_number: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationData {
    pub reservation_id: u64,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub reservation_id: u64,
    pub user_id: u64,
}
