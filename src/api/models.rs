//! Request and response bodies for the settlement API.
//!
//! The wire format carries decimal currency; conversion to integer cents
//! happens here, at the boundary.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::games::round::RoundView;
use crate::games::types::{ResolveAction, RiskParams, WheelSegment};
use crate::ledger::{CasinoStats, EntryKind, LogEntry};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub service: String,
    pub version: String,
    pub tracked_rounds: usize,
    pub stats: StatsView,
}

#[derive(Debug, Serialize)]
pub struct StatsView {
    pub total_wagered: f64,
    pub total_paid_out: f64,
    pub round_count: u64,
}

impl From<CasinoStats> for StatsView {
    fn from(stats: CasinoStats) -> Self {
        Self {
            total_wagered: stats.total_wagered_cents as f64 / 100.0,
            total_paid_out: stats.total_paid_out_cents as f64 / 100.0,
            round_count: stats.round_count,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PlaceBetRequest {
    pub user_id: String,
    /// Stake in decimal currency.
    pub stake: f64,
    #[serde(flatten)]
    pub risk: RiskParams,
    /// Client-supplied token making the bet attempt safely retryable.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BetResponse {
    pub round_id: Uuid,
    pub replayed: bool,
    pub new_balance: f64,
    pub round: RoundView,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub user_id: String,
    #[serde(flatten)]
    pub action: ResolveAction,
}

#[derive(Debug, Serialize)]
pub struct ResolveResponse {
    pub round: RoundView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settlement: Option<SettlementView>,
}

#[derive(Debug, Serialize)]
pub struct SettlementView {
    /// Signed decimal amount applied at resolve time.
    pub settled_amount: f64,
    pub new_balance: f64,
}

#[derive(Debug, Deserialize)]
pub struct RoundQuery {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub user_id: String,
    pub balance: f64,
}

#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    #[serde(default)]
    pub kind: Option<EntryKind>,
    /// Maximum entries to return (default 50, capped at 200).
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TransactionsResponse {
    pub entries: Vec<LogEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WheelResponse {
    pub segments: Vec<WheelSegment>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAccountRequest {
    pub user_id: String,
    /// Opening balance in decimal currency.
    pub initial_balance: f64,
}

#[derive(Debug, Serialize)]
pub struct OpenAccountResponse {
    pub user_id: String,
    pub balance: f64,
}

#[derive(Debug, Deserialize)]
pub struct AdminCreditRequest {
    pub user_id: String,
    /// Signed decimal adjustment; negative values debit.
    pub amount: f64,
    pub admin_id: String,
}

#[derive(Debug, Serialize)]
pub struct AdminCreditResponse {
    pub user_id: String,
    pub new_balance: f64,
}
