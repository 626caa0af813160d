//! Error taxonomy for the settlement engine.
//!
//! Validation failures are rejected synchronously, before any storage I/O.
//! Ledger failures during a bet abort the whole bet; ledger failures during a
//! resolve leave the round open so the credit can be retried safely.

use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the settlement engine and the ledger primitive.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Stake exceeds the current balance. The bet was not placed and no
    /// mutation has occurred.
    #[error("insufficient funds: balance {balance} cents, requested {requested} cents")]
    InsufficientFunds { balance: u64, requested: u64 },

    /// Out-of-range or malformed risk parameters.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The ledger has no record for this user.
    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("round not found: {0}")]
    RoundNotFound(Uuid),

    /// The round already reached a terminal state. A client retry after a
    /// successful resolve must not double-pay.
    #[error("round {0} is already settled")]
    RoundAlreadySettled(Uuid),

    /// The round exists but is not in a state that admits this transition.
    #[error("round {0} is not active")]
    RoundNotActive(Uuid),

    /// Resolve was attempted by a user who does not own the round.
    #[error("round {round_id} does not belong to user {user_id}")]
    WrongUser { round_id: Uuid, user_id: String },

    /// Fairness engine failure while committing or verifying randomness.
    #[error("fairness engine failure: {0}")]
    Vrf(String),

    /// Transient storage failure. The bet is safe; the operation can be
    /// retried.
    #[error("ledger storage failure: {0}")]
    LedgerIo(String),
}

impl From<rocksdb::Error> for EngineError {
    fn from(e: rocksdb::Error) -> Self {
        EngineError::LedgerIo(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::LedgerIo(format!("codec: {}", e))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::InsufficientFunds {
            balance: 500,
            requested: 1000,
        };
        assert!(err.to_string().contains("balance 500"));
        assert!(err.to_string().contains("requested 1000"));
    }

    #[test]
    fn test_settled_round_error_carries_id() {
        let id = Uuid::new_v4();
        let err = EngineError::RoundAlreadySettled(id);
        assert!(err.to_string().contains(&id.to_string()));
    }
}
