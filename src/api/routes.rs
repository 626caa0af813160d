//! Route definitions.

use super::handlers::*;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the API router with all endpoints.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        // Round lifecycle
        .route("/api/rounds", post(place_bet_handler))
        .route("/api/rounds/:round_id", get(round_handler))
        .route("/api/rounds/:round_id/resolve", post(resolve_handler))
        .route("/api/verify/round/:round_id", get(verify_round_handler))
        .route("/api/wheel", get(wheel_handler))
        // Accounts
        .route("/api/accounts/:user_id/balance", get(balance_handler))
        .route("/api/accounts/:user_id/transactions", get(transactions_handler))
        // Admin back office
        .route("/api/admin/accounts", post(open_account_handler))
        .route("/api/admin/credit", post(admin_credit_handler))
        .with_state(state)
}
