//! Settlement orchestrator.
//!
//! Wires the outcome generator, payout calculator and ledger primitive
//! together: `place_bet` validates, commits randomness, debits the stake and
//! activates the round as one unit; `resolve` drives the single terminal
//! transition and applies at most one ledger movement, retrying transient
//! storage failures without ever double-paying.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::errors::{EngineError, EngineResult};
use crate::games::generator::{penalty_verdict, speedrun_multiplier_at, OutcomeGenerator};
use crate::games::payout::{compute_payout, mines_multiplier, PayoutEvent, Settlement};
use crate::games::round::{RoundView, TerminalNote, WagerRound};
use crate::games::types::{
    Outcome, ResolveAction, RiskParams, GRID_SIZE, WHEEL_SEGMENTS,
};
use crate::games::vrf::{VrfBundle, VrfEngine};
use crate::ledger::{
    Cents, EntryDraft, EntryKind, LedgerStore, OverdraftPolicy,
};

/// Outcome of a placed bet.
#[derive(Debug)]
pub struct BetReceipt {
    pub round_id: Uuid,
    pub new_balance: Cents,
    /// True when an idempotency key replayed an earlier bet instead of
    /// debiting again.
    pub replayed: bool,
    pub view: RoundView,
}

#[derive(Debug)]
pub struct ResolveReceipt {
    pub view: RoundView,
    /// Present once the round reached a terminal state.
    pub settlement: Option<SettlementSummary>,
}

#[derive(Debug, Clone, Copy)]
pub struct SettlementSummary {
    /// Signed cents applied at resolve time (zero for a plain forfeit).
    pub settled_amount: i64,
    pub new_balance: Cents,
}

/// Fairness verification report for a tracked round.
#[derive(Debug, Serialize)]
pub struct VerifyReport {
    pub round_id: Uuid,
    /// Proof checks out against the committed input message.
    pub proof_valid: bool,
    /// Re-deriving the outcome from the committed randomness reproduces the
    /// round's outcome.
    pub outcome_matches: bool,
    pub vrf: VrfBundle,
}

#[derive(Clone, Copy)]
enum BetKeyState {
    InFlight,
    Round(Uuid),
}

enum Step {
    /// The round stays active (e.g. a mines reveal that found a gem).
    Progress,
    /// The round ends now with this note and payout event.
    Terminal(TerminalNote, TerminalEvent),
}

/// Owned payout event; borrows into `WHEEL_SEGMENTS` are resolved here.
enum TerminalEvent {
    MinesCashout { mine_count: u8, gems_found: u8 },
    MinesStruckMine { mine_count: u8, gems_found: u8 },
    WheelLanded { segment_index: usize },
    PenaltyShot,
    SpeedrunCashout { multiplier: f64 },
    SpeedrunCrashed,
}

pub struct SettlementEngine {
    ledger: Arc<dyn LedgerStore>,
    generator: OutcomeGenerator,
    rounds: DashMap<Uuid, Arc<Mutex<WagerRound>>>,
    bet_keys: DashMap<(String, String), BetKeyState>,
    config: EngineConfig,
}

impl SettlementEngine {
    pub fn new(ledger: Arc<dyn LedgerStore>, vrf: Arc<VrfEngine>, config: EngineConfig) -> Self {
        Self {
            ledger,
            generator: OutcomeGenerator::new(vrf),
            rounds: DashMap::new(),
            bet_keys: DashMap::new(),
            config,
        }
    }

    pub fn tracked_rounds(&self) -> usize {
        self.rounds.len()
    }

    pub async fn open_account(&self, user_id: &str, initial: Cents) -> EngineResult<Cents> {
        validate_user_id(user_id)?;
        self.ledger.open_account(user_id, initial).await
    }

    pub async fn balance(&self, user_id: &str) -> EngineResult<Cents> {
        self.ledger.balance(user_id).await
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerStore> {
        &self.ledger
    }

    /// Validate, commit randomness, debit the stake and activate the round.
    /// A failure at any point leaves no round, no debit and no log entry.
    pub async fn place_bet(
        &self,
        user_id: &str,
        stake: Cents,
        params: RiskParams,
        idempotency_key: Option<String>,
    ) -> EngineResult<BetReceipt> {
        validate_user_id(user_id)?;

        if stake < self.config.min_stake_cents || stake > self.config.max_stake_cents {
            return Err(EngineError::InvalidParameter(format!(
                "stake must be between {} and {} cents, got {}",
                self.config.min_stake_cents, self.config.max_stake_cents, stake
            )));
        }
        OutcomeGenerator::validate(&params)?;

        // Claim the idempotency key before any I/O so a concurrent duplicate
        // cannot slip past the balance check.
        let claim = idempotency_key
            .as_ref()
            .map(|key| (user_id.to_string(), key.clone()));
        if let Some(map_key) = &claim {
            match self.bet_keys.entry(map_key.clone()) {
                Entry::Occupied(entry) => match *entry.get() {
                    BetKeyState::Round(round_id) => {
                        drop(entry);
                        return self.replay_bet(user_id, round_id).await;
                    }
                    BetKeyState::InFlight => {
                        return Err(EngineError::InvalidParameter(
                            "a bet with this idempotency key is already in flight".to_string(),
                        ));
                    }
                },
                Entry::Vacant(entry) => {
                    entry.insert(BetKeyState::InFlight);
                }
            }
        }

        let result = self
            .place_bet_inner(user_id, stake, &params, idempotency_key.as_deref())
            .await;

        match (&result, claim) {
            (Ok(receipt), Some(map_key)) => {
                self.bet_keys.insert(map_key, BetKeyState::Round(receipt.round_id));
            }
            (Err(_), Some(map_key)) => {
                self.bet_keys.remove(&map_key);
            }
            _ => {}
        }

        result
    }

    async fn place_bet_inner(
        &self,
        user_id: &str,
        stake: Cents,
        params: &RiskParams,
        idempotency_key: Option<&str>,
    ) -> EngineResult<BetReceipt> {
        let round_id = Uuid::new_v4();
        let game = params.game();

        // Outcome is committed before the debit; the two succeed or fail as
        // one unit because a debit failure discards the round wholesale.
        let (outcome, vrf) = self.generator.generate(round_id, user_id, params)?;

        let draft = EntryDraft::for_round(EntryKind::DebitBet, game, round_id).with_details(json!({
            "stake_cents": stake,
            "risk": params,
            "idempotency_key": idempotency_key,
        }));
        let applied = self
            .ledger
            .apply_delta(user_id, -(stake as i64), OverdraftPolicy::Reject, draft)
            .await?;

        let mut round = WagerRound::new(
            round_id,
            user_id.to_string(),
            stake,
            params.clone(),
            outcome,
            vrf,
            self.config.speedrun_tick_ms,
        );
        round.activate()?;
        let view = round.view();
        self.rounds.insert(round_id, Arc::new(Mutex::new(round)));

        tracing::info!(
            %round_id,
            user_id,
            %game,
            stake,
            new_balance = applied.new_balance,
            "bet placed"
        );

        Ok(BetReceipt {
            round_id,
            new_balance: applied.new_balance,
            replayed: false,
            view,
        })
    }

    async fn replay_bet(&self, user_id: &str, round_id: Uuid) -> EngineResult<BetReceipt> {
        let round = self
            .rounds
            .get(&round_id)
            .map(|r| Arc::clone(r.value()))
            .ok_or(EngineError::RoundNotFound(round_id))?;
        let round = round.lock().await;
        round.ensure_owner(user_id)?;

        let new_balance = self.ledger.balance(user_id).await?;
        tracing::debug!(%round_id, user_id, "idempotent bet replayed");

        Ok(BetReceipt {
            round_id,
            new_balance,
            replayed: true,
            view: round.view(),
        })
    }

    /// Drive an active round with a player action. At most one ledger
    /// movement happens, exactly once, even across retried calls.
    pub async fn resolve(
        &self,
        round_id: Uuid,
        user_id: &str,
        action: ResolveAction,
    ) -> EngineResult<ResolveReceipt> {
        let round = self
            .rounds
            .get(&round_id)
            .map(|r| Arc::clone(r.value()))
            .ok_or(EngineError::RoundNotFound(round_id))?;
        let mut round = round.lock().await;

        round.ensure_owner(user_id)?;
        round.ensure_active()?;

        match Self::step(&mut round, &action)? {
            Step::Progress => Ok(ResolveReceipt {
                view: round.view(),
                settlement: None,
            }),
            Step::Terminal(note, event) => self.settle_round(&mut round, note, event).await,
        }
    }

    /// Apply one action to an active round and decide whether it ends.
    fn step(round: &mut WagerRound, action: &ResolveAction) -> EngineResult<Step> {
        let risk = round.risk.clone();
        match (&risk, action) {
            (RiskParams::Mines { mine_count }, ResolveAction::Reveal { cell }) => {
                if *cell >= GRID_SIZE {
                    return Err(EngineError::InvalidParameter(format!(
                        "cell must be below {}, got {}",
                        GRID_SIZE, cell
                    )));
                }
                if round.revealed.contains(cell) {
                    return Err(EngineError::InvalidParameter(format!(
                        "cell {} is already revealed",
                        cell
                    )));
                }

                let Outcome::Mines { mines } = &round.outcome else {
                    unreachable!("mines round always carries a mines outcome");
                };
                if mines[*cell] {
                    let gems_found = round.gems_found();
                    return Ok(Step::Terminal(
                        TerminalNote::MinesStruck {
                            cell: *cell,
                            gems_found,
                            multiplier: mines_multiplier(*mine_count, gems_found),
                        },
                        TerminalEvent::MinesStruckMine {
                            mine_count: *mine_count,
                            gems_found,
                        },
                    ));
                }

                round.revealed.push(*cell);
                let gems_found = round.gems_found();
                if gems_found == round.total_gems() {
                    // Board cleared; lock in the cap automatically.
                    return Ok(Step::Terminal(
                        TerminalNote::MinesCashout {
                            gems_found,
                            multiplier: mines_multiplier(*mine_count, gems_found),
                        },
                        TerminalEvent::MinesCashout {
                            mine_count: *mine_count,
                            gems_found,
                        },
                    ));
                }
                Ok(Step::Progress)
            }
            (RiskParams::Mines { mine_count }, ResolveAction::Cashout) => {
                let gems_found = round.gems_found();
                Ok(Step::Terminal(
                    TerminalNote::MinesCashout {
                        gems_found,
                        multiplier: mines_multiplier(*mine_count, gems_found),
                    },
                    TerminalEvent::MinesCashout {
                        mine_count: *mine_count,
                        gems_found,
                    },
                ))
            }
            (RiskParams::Wheel { chosen_color }, ResolveAction::Spin) => {
                let Outcome::Wheel { segment_index } = &round.outcome else {
                    unreachable!("wheel round always carries a wheel outcome");
                };
                let matched = WHEEL_SEGMENTS[*segment_index].color == *chosen_color;
                Ok(Step::Terminal(
                    TerminalNote::WheelLanded {
                        segment_index: *segment_index,
                        matched,
                    },
                    TerminalEvent::WheelLanded {
                        segment_index: *segment_index,
                    },
                ))
            }
            (RiskParams::PenaltyShootout { tier, zone }, ResolveAction::Shoot { power }) => {
                if *power > 100 {
                    return Err(EngineError::InvalidParameter(format!(
                        "shot power must be 0..=100, got {}",
                        power
                    )));
                }
                let Outcome::PenaltyShootout {
                    goal_roll,
                    wide_roll,
                    keeper_pick,
                } = &round.outcome
                else {
                    unreachable!("penalty round always carries a penalty outcome");
                };
                let (verdict, keeper_zone) =
                    penalty_verdict(*goal_roll, *wide_roll, *keeper_pick, *tier, *zone, *power);
                Ok(Step::Terminal(
                    TerminalNote::PenaltyShot {
                        power: *power,
                        verdict,
                        keeper_zone,
                    },
                    TerminalEvent::PenaltyShot,
                ))
            }
            (RiskParams::Speedrun { auto_cashout }, ResolveAction::Cashout) => {
                let Outcome::Speedrun { crash_point } = &round.outcome else {
                    unreachable!("speedrun round always carries a speedrun outcome");
                };
                let raw = speedrun_multiplier_at(round.elapsed_ticks());

                // An auto-cashout target below the crash point locks in at
                // the target once the curve reaches it.
                let locked = match auto_cashout {
                    Some(target) if raw >= *target && *target < *crash_point => Some(*target),
                    _ if raw < *crash_point => Some(raw),
                    _ => None,
                };

                match locked {
                    Some(multiplier) => Ok(Step::Terminal(
                        TerminalNote::SpeedrunCashout { multiplier },
                        TerminalEvent::SpeedrunCashout { multiplier },
                    )),
                    None => Ok(Step::Terminal(
                        TerminalNote::SpeedrunCrashed {
                            crash_point: *crash_point,
                        },
                        TerminalEvent::SpeedrunCrashed,
                    )),
                }
            }
            (_, action) => Err(EngineError::InvalidParameter(format!(
                "action {:?} is not valid for {}",
                action, round.game
            ))),
        }
    }

    async fn settle_round(
        &self,
        round: &mut WagerRound,
        note: TerminalNote,
        event: TerminalEvent,
    ) -> EngineResult<ResolveReceipt> {
        let payout_event = match &event {
            TerminalEvent::MinesCashout {
                mine_count,
                gems_found,
            } => PayoutEvent::MinesCashout {
                mine_count: *mine_count,
                gems_found: *gems_found,
            },
            TerminalEvent::MinesStruckMine {
                mine_count,
                gems_found,
            } => PayoutEvent::MinesStruckMine {
                mine_count: *mine_count,
                gems_found: *gems_found,
            },
            TerminalEvent::WheelLanded { segment_index } => {
                let RiskParams::Wheel { chosen_color } = &round.risk else {
                    unreachable!("wheel event only arises from a wheel round");
                };
                PayoutEvent::WheelLanded {
                    chosen: *chosen_color,
                    segment: &WHEEL_SEGMENTS[*segment_index],
                }
            }
            TerminalEvent::PenaltyShot => {
                let RiskParams::PenaltyShootout { tier, .. } = &round.risk else {
                    unreachable!("penalty event only arises from a penalty round");
                };
                let TerminalNote::PenaltyShot { verdict, .. } = &note else {
                    unreachable!("penalty event always carries a penalty note");
                };
                PayoutEvent::PenaltyShot {
                    tier: *tier,
                    verdict: *verdict,
                }
            }
            TerminalEvent::SpeedrunCashout { multiplier } => PayoutEvent::SpeedrunCashout {
                multiplier: *multiplier,
            },
            TerminalEvent::SpeedrunCrashed => PayoutEvent::SpeedrunCrashed,
        };

        let settlement = compute_payout(round.stake, payout_event);

        let summary = match settlement {
            Settlement::Nothing => {
                // Nothing moves; read the balance before settling so a
                // storage hiccup leaves the round retryable.
                let new_balance = self.ledger.balance(&round.user_id).await?;
                round.settle(note.clone(), 0)?;
                SettlementSummary {
                    settled_amount: 0,
                    new_balance,
                }
            }
            Settlement::Credit(amount) => {
                self.apply_terminal_delta(
                    round,
                    amount as i64,
                    OverdraftPolicy::Reject,
                    EntryKind::CreditWin,
                    note.clone(),
                )
                .await?
            }
            Settlement::Penalty(amount) => {
                self.apply_terminal_delta(
                    round,
                    -(amount as i64),
                    OverdraftPolicy::Saturate,
                    EntryKind::DebitLossPenalty,
                    note.clone(),
                )
                .await?
            }
        };

        let paid_out = summary.settled_amount.max(0) as u64;
        if let Err(e) = self.ledger.record_round_stats(round.stake, paid_out).await {
            tracing::warn!(round_id = %round.round_id, error = %e, "failed to record round stats");
        }

        tracing::info!(
            round_id = %round.round_id,
            user_id = %round.user_id,
            game = %round.game,
            settled_amount = summary.settled_amount,
            new_balance = summary.new_balance,
            "round settled"
        );

        Ok(ResolveReceipt {
            view: round.view(),
            settlement: Some(summary),
        })
    }

    /// Apply the single terminal ledger movement. Transient storage failures
    /// are retried a bounded number of times; if all attempts fail the round
    /// drops back to `Active` and the caller can resolve again — the debit
    /// from bet time is never at risk of repeating.
    async fn apply_terminal_delta(
        &self,
        round: &mut WagerRound,
        delta: i64,
        policy: OverdraftPolicy,
        kind: EntryKind,
        note: TerminalNote,
    ) -> EngineResult<SettlementSummary> {
        round.begin_resolve()?;

        let draft = EntryDraft::for_round(kind, round.game, round.round_id)
            .with_details(json!({ "stake_cents": round.stake, "resolution": note }));

        let mut attempt = 0;
        let applied = loop {
            attempt += 1;
            match self
                .ledger
                .apply_delta(&round.user_id, delta, policy, draft.clone())
                .await
            {
                Ok(applied) => break applied,
                Err(EngineError::LedgerIo(reason))
                    if attempt < self.config.ledger_retry_attempts =>
                {
                    tracing::warn!(
                        round_id = %round.round_id,
                        attempt,
                        reason,
                        "ledger write failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(50 * attempt as u64)).await;
                }
                Err(e) => {
                    round.abort_resolve();
                    return Err(e);
                }
            }
        };

        round.settle(note, applied.applied_delta)?;
        Ok(SettlementSummary {
            settled_amount: applied.applied_delta,
            new_balance: applied.new_balance,
        })
    }

    pub async fn round_view(&self, round_id: Uuid, user_id: &str) -> EngineResult<RoundView> {
        let round = self
            .rounds
            .get(&round_id)
            .map(|r| Arc::clone(r.value()))
            .ok_or(EngineError::RoundNotFound(round_id))?;
        let round = round.lock().await;
        round.ensure_owner(user_id)?;
        Ok(round.view())
    }

    /// Re-verify a round's committed randomness and re-derive its outcome.
    pub async fn verify_round(&self, round_id: Uuid) -> EngineResult<VerifyReport> {
        let round = self
            .rounds
            .get(&round_id)
            .map(|r| Arc::clone(r.value()))
            .ok_or(EngineError::RoundNotFound(round_id))?;
        let round = round.lock().await;

        let fingerprint = serde_json::to_string(&round.risk)
            .map_err(|e| EngineError::Vrf(format!("params fingerprint: {}", e)))?;
        let expected_input = format!(
            "{}:{}:{}:{}",
            round.round_id, round.game, round.user_id, fingerprint
        );

        let proof_valid = VrfEngine::verify(&round.vrf, &expected_input)?;
        let outcome_matches = if proof_valid {
            let mut rng = VrfEngine::rng_for(&round.vrf)?;
            OutcomeGenerator::draw(&mut rng, &round.risk) == round.outcome
        } else {
            false
        };

        Ok(VerifyReport {
            round_id: round.round_id,
            proof_valid,
            outcome_matches,
            vrf: round.vrf.clone(),
        })
    }

    /// Direct ledger adjustment from the admin back office; bypasses the
    /// round lifecycle entirely.
    pub async fn admin_credit(
        &self,
        user_id: &str,
        amount: i64,
        admin_id: &str,
    ) -> EngineResult<Cents> {
        validate_user_id(user_id)?;
        if amount == 0 {
            return Err(EngineError::InvalidParameter(
                "adjustment amount must be non-zero".to_string(),
            ));
        }

        let draft = EntryDraft::new(EntryKind::AdminCredit)
            .with_details(json!({ "admin_id": admin_id }));
        let applied = self
            .ledger
            .apply_delta(user_id, amount, OverdraftPolicy::Reject, draft)
            .await?;

        tracing::info!(user_id, admin_id, amount, new_balance = applied.new_balance, "admin adjustment");
        Ok(applied.new_balance)
    }
}

fn validate_user_id(user_id: &str) -> EngineResult<()> {
    let valid = !user_id.is_empty()
        && user_id.len() <= 64
        && user_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(EngineError::InvalidParameter(format!(
            "user id must be 1..=64 characters of [a-zA-Z0-9_-], got '{}'",
            user_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_validation() {
        assert!(validate_user_id("player-1").is_ok());
        assert!(validate_user_id("a_b_C9").is_ok());
        assert!(validate_user_id("").is_err());
        assert!(validate_user_id("has space").is_err());
        assert!(validate_user_id("colon:bad").is_err());
        assert!(validate_user_id(&"x".repeat(65)).is_err());
    }
}
