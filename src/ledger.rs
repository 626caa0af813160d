//! Ledger transaction primitive.
//!
//! One balance per user, mutated only through [`LedgerStore::apply_delta`]:
//! read, validate, write balance and append exactly one log entry as a
//! single atomic RocksDB batch, serialized per user. Every game's
//! debit-then-credit flow funnels through this one primitive so the balance
//! invariants hold in a single place.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::errors::{EngineError, EngineResult};
use crate::games::types::GameType;
use crate::storage::Storage;

/// All amounts are integer cents.
pub type Cents = u64;

pub fn dollars_to_cents(dollars: f64) -> Cents {
    (dollars * 100.0).round() as Cents
}

pub fn cents_to_dollars(cents: Cents) -> f64 {
    cents as f64 / 100.0
}

const BALANCE_PREFIX: &str = "ledger:balance:";
const SEQ_PREFIX: &str = "ledger:seq:";
const LOG_PREFIX: &str = "ledger:log:";
const STATS_KEY: &[u8] = b"casino:stats";

/// Append-only audit record. Never mutated or deleted; the balance is the
/// source of truth and the log explains it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub entry_id: Uuid,
    pub user_id: String,
    pub kind: EntryKind,
    /// Absolute amount moved, in cents.
    pub amount: Cents,
    /// Signed movement actually applied.
    pub delta: i64,
    pub balance_after: Cents,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game: Option<GameType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    AccountOpen,
    DebitBet,
    CreditWin,
    DebitLossPenalty,
    AdminCredit,
}

/// Caller-supplied slice of a log entry; the ledger fills in ids, applied
/// amounts and timestamps.
#[derive(Debug, Clone)]
pub struct EntryDraft {
    pub kind: EntryKind,
    pub game: Option<GameType>,
    pub round_id: Option<Uuid>,
    pub details: Option<serde_json::Value>,
}

impl EntryDraft {
    pub fn new(kind: EntryKind) -> Self {
        Self {
            kind,
            game: None,
            round_id: None,
            details: None,
        }
    }

    pub fn for_round(kind: EntryKind, game: GameType, round_id: Uuid) -> Self {
        Self {
            kind,
            game: Some(game),
            round_id: Some(round_id),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// What to do when a debit exceeds the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverdraftPolicy {
    /// Fail with `InsufficientFunds`; used for stake debits.
    Reject,
    /// Debit only what the balance covers; used for loss penalties so a
    /// balance can reach zero but never go negative.
    Saturate,
}

/// Result of a successful `apply_delta`.
#[derive(Debug, Clone, Copy)]
pub struct Applied {
    pub new_balance: Cents,
    /// Signed movement actually written (zero when nothing moved).
    pub applied_delta: i64,
}

/// Aggregate house counters, updated once per settled round.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CasinoStats {
    pub total_wagered_cents: u64,
    pub total_paid_out_cents: u64,
    pub round_count: u64,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Create an account with an opening balance. Fails if it exists.
    async fn open_account(&self, user_id: &str, initial: Cents) -> EngineResult<Cents>;

    async fn balance(&self, user_id: &str) -> EngineResult<Cents>;

    /// Atomically read-validate-write the balance and append one log entry.
    /// No side effect of any kind on failure.
    async fn apply_delta(
        &self,
        user_id: &str,
        delta: i64,
        policy: OverdraftPolicy,
        draft: EntryDraft,
    ) -> EngineResult<Applied>;

    /// Log entries for a user, newest first, optionally filtered by kind,
    /// with hex-cursor pagination.
    async fn entries(
        &self,
        user_id: &str,
        kind: Option<EntryKind>,
        cursor: Option<&str>,
        limit: usize,
    ) -> EngineResult<(Vec<LogEntry>, Option<String>)>;

    async fn stats(&self) -> EngineResult<CasinoStats>;

    async fn record_round_stats(&self, wagered: Cents, paid_out: Cents) -> EngineResult<()>;
}

/// RocksDB-backed ledger. Per-user async locks serialize the transactional
/// read-modify-write; the batch write makes balance + log atomic.
pub struct RocksLedger {
    storage: Storage,
    user_locks: DashMap<String, Arc<Mutex<()>>>,
    stats_lock: Mutex<()>,
}

impl RocksLedger {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            user_locks: DashMap::new(),
            stats_lock: Mutex::new(()),
        }
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn balance_key(user_id: &str) -> Vec<u8> {
        format!("{}{}", BALANCE_PREFIX, user_id).into_bytes()
    }

    fn seq_key(user_id: &str) -> Vec<u8> {
        format!("{}{}", SEQ_PREFIX, user_id).into_bytes()
    }

    fn log_prefix(user_id: &str) -> Vec<u8> {
        format!("{}{}:", LOG_PREFIX, user_id).into_bytes()
    }

    /// Newest-first ordering via an inverted sequence number.
    fn log_key(user_id: &str, seq: u64) -> Vec<u8> {
        let mut key = Self::log_prefix(user_id);
        key.extend_from_slice(&(u64::MAX - seq).to_be_bytes());
        key
    }

    fn read_u64(&self, key: &[u8]) -> Option<u64> {
        self.storage.get(key).and_then(|bytes| {
            let array: [u8; 8] = bytes.try_into().ok()?;
            Some(u64::from_be_bytes(array))
        })
    }

    fn write_entry(
        &self,
        user_id: &str,
        new_balance: Cents,
        applied_delta: i64,
        draft: EntryDraft,
    ) -> EngineResult<()> {
        let seq = self.read_u64(&Self::seq_key(user_id)).unwrap_or(0) + 1;

        let entry = LogEntry {
            entry_id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            kind: draft.kind,
            amount: applied_delta.unsigned_abs(),
            delta: applied_delta,
            balance_after: new_balance,
            game: draft.game,
            round_id: draft.round_id,
            timestamp: Utc::now(),
            details: draft.details,
        };
        let entry_bytes = serde_json::to_vec(&entry)?;

        self.storage.batch_write(&[
            (Self::balance_key(user_id), new_balance.to_be_bytes().to_vec()),
            (Self::seq_key(user_id), seq.to_be_bytes().to_vec()),
            (Self::log_key(user_id, seq), entry_bytes),
        ])?;

        Ok(())
    }
}

#[async_trait]
impl LedgerStore for RocksLedger {
    async fn open_account(&self, user_id: &str, initial: Cents) -> EngineResult<Cents> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        if self.read_u64(&Self::balance_key(user_id)).is_some() {
            return Err(EngineError::InvalidParameter(format!(
                "account already exists: {}",
                user_id
            )));
        }

        self.write_entry(
            user_id,
            initial,
            initial as i64,
            EntryDraft::new(EntryKind::AccountOpen),
        )?;

        tracing::info!(user_id, initial, "account opened");
        Ok(initial)
    }

    async fn balance(&self, user_id: &str) -> EngineResult<Cents> {
        self.read_u64(&Self::balance_key(user_id))
            .ok_or_else(|| EngineError::AccountNotFound(user_id.to_string()))
    }

    async fn apply_delta(
        &self,
        user_id: &str,
        delta: i64,
        policy: OverdraftPolicy,
        draft: EntryDraft,
    ) -> EngineResult<Applied> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let balance = self
            .read_u64(&Self::balance_key(user_id))
            .ok_or_else(|| EngineError::AccountNotFound(user_id.to_string()))?;

        let applied_delta = if delta >= 0 {
            delta
        } else {
            let requested = delta.unsigned_abs();
            if requested > balance {
                match policy {
                    OverdraftPolicy::Reject => {
                        return Err(EngineError::InsufficientFunds { balance, requested })
                    }
                    OverdraftPolicy::Saturate => -(balance as i64),
                }
            } else {
                delta
            }
        };

        // Zero movements write nothing: no balance change, no log entry.
        if applied_delta == 0 {
            return Ok(Applied {
                new_balance: balance,
                applied_delta: 0,
            });
        }

        let new_balance = if applied_delta >= 0 {
            balance
                .checked_add(applied_delta as u64)
                .ok_or_else(|| EngineError::LedgerIo("balance overflow".to_string()))?
        } else {
            balance - applied_delta.unsigned_abs()
        };

        self.write_entry(user_id, new_balance, applied_delta, draft)?;

        tracing::debug!(user_id, applied_delta, new_balance, "ledger delta applied");
        Ok(Applied {
            new_balance,
            applied_delta,
        })
    }

    async fn entries(
        &self,
        user_id: &str,
        kind: Option<EntryKind>,
        cursor: Option<&str>,
        limit: usize,
    ) -> EngineResult<(Vec<LogEntry>, Option<String>)> {
        // Accounts without a record have no log either.
        self.balance(user_id).await?;

        let prefix = Self::log_prefix(user_id);
        let mut cursor_bytes = match cursor {
            Some(c) => Some(hex::decode(c).map_err(|e| {
                EngineError::InvalidParameter(format!("invalid cursor: {}", e))
            })?),
            None => None,
        };

        let limit = limit.max(1);
        let mut entries = Vec::with_capacity(limit);
        let mut next_cursor = None;

        // Scan pages until the limit fills or the log is exhausted; kind
        // filtering can skip past arbitrarily many rows.
        loop {
            let rows = self
                .storage
                .scan_prefix(&prefix, cursor_bytes.as_deref(), 200);
            if rows.is_empty() {
                next_cursor = None;
                break;
            }

            let exhausted = rows.len() < 200;
            for (key, value) in &rows {
                let entry: LogEntry = serde_json::from_slice(value)?;
                cursor_bytes = Some(key.clone());
                if kind.map_or(true, |k| entry.kind == k) {
                    entries.push(entry);
                    if entries.len() >= limit {
                        next_cursor = Some(hex::encode(key));
                        break;
                    }
                }
            }

            if entries.len() >= limit {
                break;
            }
            if exhausted {
                next_cursor = None;
                break;
            }
        }

        Ok((entries, next_cursor))
    }

    async fn stats(&self) -> EngineResult<CasinoStats> {
        match self.storage.get(STATS_KEY) {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(CasinoStats::default()),
        }
    }

    async fn record_round_stats(&self, wagered: Cents, paid_out: Cents) -> EngineResult<()> {
        let _guard = self.stats_lock.lock().await;

        let mut stats = match self.storage.get(STATS_KEY) {
            Some(bytes) => serde_json::from_slice::<CasinoStats>(&bytes)?,
            None => CasinoStats::default(),
        };
        stats.total_wagered_cents += wagered;
        stats.total_paid_out_cents += paid_out;
        stats.round_count += 1;

        self.storage.put(STATS_KEY, &serde_json::to_vec(&stats)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_ledger() -> (TempDir, Arc<RocksLedger>) {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        (dir, Arc::new(RocksLedger::new(storage)))
    }

    #[tokio::test]
    async fn test_open_and_balance() {
        let (_dir, ledger) = open_ledger();
        ledger.open_account("alice", 1000).await.unwrap();
        assert_eq!(ledger.balance("alice").await.unwrap(), 1000);

        let err = ledger.open_account("alice", 500).await;
        assert!(matches!(err, Err(EngineError::InvalidParameter(_))));

        let err = ledger.balance("nobody").await;
        assert!(matches!(err, Err(EngineError::AccountNotFound(_))));
    }

    #[tokio::test]
    async fn test_rejected_debit_leaves_no_trace() {
        let (_dir, ledger) = open_ledger();
        ledger.open_account("alice", 500).await.unwrap();

        let err = ledger
            .apply_delta(
                "alice",
                -1000,
                OverdraftPolicy::Reject,
                EntryDraft::new(EntryKind::DebitBet),
            )
            .await;
        assert!(matches!(
            err,
            Err(EngineError::InsufficientFunds {
                balance: 500,
                requested: 1000
            })
        ));

        assert_eq!(ledger.balance("alice").await.unwrap(), 500);
        let (entries, _) = ledger.entries("alice", None, None, 50).await.unwrap();
        // Only the account_open entry.
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, EntryKind::AccountOpen);
    }

    #[tokio::test]
    async fn test_saturating_penalty_stops_at_zero() {
        let (_dir, ledger) = open_ledger();
        ledger.open_account("bob", 300).await.unwrap();

        let applied = ledger
            .apply_delta(
                "bob",
                -1000,
                OverdraftPolicy::Saturate,
                EntryDraft::new(EntryKind::DebitLossPenalty),
            )
            .await
            .unwrap();
        assert_eq!(applied.new_balance, 0);
        assert_eq!(applied.applied_delta, -300);

        // A second saturating penalty at zero moves (and logs) nothing.
        let applied = ledger
            .apply_delta(
                "bob",
                -1000,
                OverdraftPolicy::Saturate,
                EntryDraft::new(EntryKind::DebitLossPenalty),
            )
            .await
            .unwrap();
        assert_eq!(applied.applied_delta, 0);

        let (entries, _) = ledger.entries("bob", None, None, 50).await.unwrap();
        assert_eq!(entries.len(), 2); // open + one penalty
    }

    #[tokio::test]
    async fn test_entries_newest_first_with_filter_and_cursor() {
        let (_dir, ledger) = open_ledger();
        ledger.open_account("carol", 10_000).await.unwrap();

        for i in 0..5i64 {
            ledger
                .apply_delta(
                    "carol",
                    -100 - i,
                    OverdraftPolicy::Reject,
                    EntryDraft::new(EntryKind::DebitBet),
                )
                .await
                .unwrap();
            ledger
                .apply_delta(
                    "carol",
                    200 + i,
                    OverdraftPolicy::Reject,
                    EntryDraft::new(EntryKind::CreditWin),
                )
                .await
                .unwrap();
        }

        let (all, _) = ledger.entries("carol", None, None, 50).await.unwrap();
        assert_eq!(all.len(), 11);
        // Newest first: the last credit leads.
        assert_eq!(all[0].kind, EntryKind::CreditWin);
        assert_eq!(all[0].delta, 204);

        let (bets, _) = ledger
            .entries("carol", Some(EntryKind::DebitBet), None, 50)
            .await
            .unwrap();
        assert_eq!(bets.len(), 5);
        assert!(bets.iter().all(|e| e.kind == EntryKind::DebitBet));

        let (page1, cursor) = ledger.entries("carol", None, None, 4).await.unwrap();
        assert_eq!(page1.len(), 4);
        let cursor = cursor.expect("more pages expected");
        let (page2, _) = ledger
            .entries("carol", None, Some(&cursor), 50)
            .await
            .unwrap();
        assert_eq!(page2.len(), 7);
        assert_ne!(page1.last().unwrap().entry_id, page2[0].entry_id);
    }

    #[tokio::test]
    async fn test_concurrent_debits_serialize() {
        let (_dir, ledger) = open_ledger();
        ledger.open_account("dave", 50).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .apply_delta(
                        "dave",
                        -10,
                        OverdraftPolicy::Reject,
                        EntryDraft::new(EntryKind::DebitBet),
                    )
                    .await
            }));
        }

        let mut successes = 0;
        let mut rejections = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(EngineError::InsufficientFunds { .. }) => rejections += 1,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }

        // Exactly five debits fit into the balance; none are lost, none
        // overdraw.
        assert_eq!(successes, 5);
        assert_eq!(rejections, 5);
        assert_eq!(ledger.balance("dave").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_balance_after_matches_running_balance() {
        let (_dir, ledger) = open_ledger();
        ledger.open_account("erin", 1000).await.unwrap();
        ledger
            .apply_delta(
                "erin",
                -400,
                OverdraftPolicy::Reject,
                EntryDraft::new(EntryKind::DebitBet),
            )
            .await
            .unwrap();
        ledger
            .apply_delta(
                "erin",
                900,
                OverdraftPolicy::Reject,
                EntryDraft::new(EntryKind::CreditWin),
            )
            .await
            .unwrap();

        let (entries, _) = ledger.entries("erin", None, None, 10).await.unwrap();
        // Newest first: credit, debit, open.
        assert_eq!(entries[0].balance_after, 1500);
        assert_eq!(entries[1].balance_after, 600);
        assert_eq!(entries[2].balance_after, 1000);
    }

    #[tokio::test]
    async fn test_stats_accumulate() {
        let (_dir, ledger) = open_ledger();
        ledger.record_round_stats(100, 0).await.unwrap();
        ledger.record_round_stats(200, 600).await.unwrap();

        let stats = ledger.stats().await.unwrap();
        assert_eq!(stats.total_wagered_cents, 300);
        assert_eq!(stats.total_paid_out_cents, 600);
        assert_eq!(stats.round_count, 2);
    }
}
