//! Request handlers for the settlement API.

use super::{errors::ApiError, middleware::RequestId, models::*};
use crate::engine::SettlementEngine;
use crate::ledger::{cents_to_dollars, dollars_to_cents};
use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Extension, Json,
};
use std::sync::Arc;
use uuid::Uuid;

/// Shared application state.
pub struct AppState {
    pub engine: Arc<SettlementEngine>,
    pub service: String,
    pub version: String,
}

/// Admin endpoints are guarded by a shared key when one is configured.
fn validate_admin_key(headers: &HeaderMap, request_id: &str) -> Result<(), ApiError> {
    if let Ok(expected_key) = std::env::var("STAKEHOUSE_ADMIN_KEY") {
        if let Some(provided_key) = headers.get("X-Admin-Key") {
            if provided_key.to_str().unwrap_or("") == expected_key {
                return Ok(());
            }
        }
        Err(ApiError::forbidden(
            request_id.to_string(),
            "Invalid or missing admin API key".to_string(),
        ))
    } else {
        // No key configured - allow for development.
        Ok(())
    }
}

fn parse_stake(request_id: &str, stake: f64) -> Result<u64, ApiError> {
    if !stake.is_finite() || stake <= 0.0 {
        return Err(ApiError::bad_request(
            request_id.to_string(),
            format!("stake must be a positive amount, got {}", stake),
        ));
    }
    Ok(dollars_to_cents(stake))
}

/// GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Running".to_string(),
    })
}

/// GET /status
pub async fn status_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusResponse>, ApiError> {
    let stats = state
        .engine
        .ledger()
        .stats()
        .await
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;

    Ok(Json(StatusResponse {
        service: state.service.clone(),
        version: state.version.clone(),
        tracked_rounds: state.engine.tracked_rounds(),
        stats: stats.into(),
    }))
}

/// POST /api/rounds — place a bet and open a round.
pub async fn place_bet_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<PlaceBetRequest>,
) -> Result<Json<BetResponse>, ApiError> {
    let stake = parse_stake(&request_id.0, request.stake)?;

    let receipt = state
        .engine
        .place_bet(&request.user_id, stake, request.risk, request.idempotency_key)
        .await
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;

    Ok(Json(BetResponse {
        round_id: receipt.round_id,
        replayed: receipt.replayed,
        new_balance: cents_to_dollars(receipt.new_balance),
        round: receipt.view,
    }))
}

/// POST /api/rounds/:round_id/resolve — drive a round with a player action.
pub async fn resolve_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(round_id): Path<Uuid>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<ResolveResponse>, ApiError> {
    let receipt = state
        .engine
        .resolve(round_id, &request.user_id, request.action)
        .await
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;

    Ok(Json(ResolveResponse {
        round: receipt.view,
        settlement: receipt.settlement.map(|s| SettlementView {
            settled_amount: s.settled_amount as f64 / 100.0,
            new_balance: cents_to_dollars(s.new_balance),
        }),
    }))
}

/// GET /api/rounds/:round_id?user_id= — current round view.
pub async fn round_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(round_id): Path<Uuid>,
    Query(query): Query<RoundQuery>,
) -> Result<Json<crate::games::round::RoundView>, ApiError> {
    let view = state
        .engine
        .round_view(round_id, &query.user_id)
        .await
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;

    Ok(Json(view))
}

/// GET /api/verify/round/:round_id — fairness verification.
pub async fn verify_round_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(round_id): Path<Uuid>,
) -> Result<Json<crate::engine::VerifyReport>, ApiError> {
    let report = state
        .engine
        .verify_round(round_id)
        .await
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;

    Ok(Json(report))
}

/// GET /api/wheel — the fixed wheel layout.
pub async fn wheel_handler() -> Json<WheelResponse> {
    Json(WheelResponse {
        segments: crate::games::types::WHEEL_SEGMENTS.to_vec(),
    })
}

/// GET /api/accounts/:user_id/balance
pub async fn balance_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state
        .engine
        .balance(&user_id)
        .await
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;

    Ok(Json(BalanceResponse {
        user_id,
        balance: cents_to_dollars(balance),
    }))
}

/// GET /api/accounts/:user_id/transactions?kind=&limit=&cursor=
pub async fn transactions_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<TransactionsQuery>,
) -> Result<Json<TransactionsResponse>, ApiError> {
    let limit = query.limit.unwrap_or(50).min(200);

    let (entries, next_cursor) = state
        .engine
        .ledger()
        .entries(&user_id, query.kind, query.cursor.as_deref(), limit)
        .await
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;

    Ok(Json(TransactionsResponse {
        entries,
        next_cursor,
    }))
}

/// POST /api/admin/accounts — provision an account.
pub async fn open_account_handler(
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Json(request): Json<OpenAccountRequest>,
) -> Result<Json<OpenAccountResponse>, ApiError> {
    validate_admin_key(&headers, &request_id.0)?;

    if !request.initial_balance.is_finite() || request.initial_balance < 0.0 {
        return Err(ApiError::bad_request(
            request_id.0,
            format!(
                "initial_balance must be a non-negative amount, got {}",
                request.initial_balance
            ),
        ));
    }

    let balance = state
        .engine
        .open_account(&request.user_id, dollars_to_cents(request.initial_balance))
        .await
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;

    Ok(Json(OpenAccountResponse {
        user_id: request.user_id,
        balance: cents_to_dollars(balance),
    }))
}

/// POST /api/admin/credit — direct ledger adjustment, bypassing rounds.
pub async fn admin_credit_handler(
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Json(request): Json<AdminCreditRequest>,
) -> Result<Json<AdminCreditResponse>, ApiError> {
    validate_admin_key(&headers, &request_id.0)?;

    if !request.amount.is_finite() || request.amount == 0.0 {
        return Err(ApiError::bad_request(
            request_id.0,
            format!("amount must be a non-zero amount, got {}", request.amount),
        ));
    }

    let amount_cents = (request.amount * 100.0).round() as i64;
    let new_balance = state
        .engine
        .admin_credit(&request.user_id, amount_cents, &request.admin_id)
        .await
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;

    Ok(Json(AdminCreditResponse {
        user_id: request.user_id,
        new_balance: cents_to_dollars(new_balance),
    }))
}
