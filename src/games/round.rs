//! Round lifecycle state machine.
//!
//! `Betting -> Active -> Resolving -> Settled`. Entering `Active` is paired
//! with the stake debit; exactly one transition leaves `Active` and applies
//! at most one ledger movement. A `Resolving` round whose ledger write fails
//! drops back to `Active` so the resolve can be retried without double-pay.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;
use uuid::Uuid;

use crate::errors::{EngineError, EngineResult};
use crate::games::generator::speedrun_multiplier_at;
use crate::games::payout::mines_multiplier;
use crate::games::types::{
    GameType, GoalZone, Outcome, PenaltyTier, PenaltyVerdict, RiskParams, WheelColor, GRID_SIZE,
    WHEEL_SEGMENTS,
};
use crate::games::vrf::VrfBundle;
use crate::ledger::{cents_to_dollars, Cents};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoundState {
    Betting,
    Active,
    Resolving,
    Settled,
}

/// How a round ended. Stored on the round and echoed into the transaction
/// log details.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TerminalNote {
    MinesCashout { gems_found: u8, multiplier: f64 },
    MinesStruck { cell: usize, gems_found: u8, multiplier: f64 },
    WheelLanded { segment_index: usize, matched: bool },
    PenaltyShot { power: u8, verdict: PenaltyVerdict, keeper_zone: GoalZone },
    SpeedrunCashout { multiplier: f64 },
    SpeedrunCrashed { crash_point: f64 },
}

/// One play of one game by one user. Owned by the engine's round registry;
/// the ledger only ever sees deltas derived from it.
#[derive(Debug)]
pub struct WagerRound {
    pub round_id: Uuid,
    pub user_id: String,
    pub game: GameType,
    pub stake: Cents,
    pub risk: RiskParams,
    pub outcome: Outcome,
    pub vrf: VrfBundle,
    pub state: RoundState,
    /// Mines: cells revealed so far, in reveal order.
    pub revealed: Vec<usize>,
    /// Speedrun clock reference.
    pub started_at: Instant,
    pub created_at: DateTime<Utc>,
    pub tick_ms: u64,
    pub settled_amount: Option<i64>,
    pub terminal: Option<TerminalNote>,
}

impl WagerRound {
    pub fn new(
        round_id: Uuid,
        user_id: String,
        stake: Cents,
        risk: RiskParams,
        outcome: Outcome,
        vrf: VrfBundle,
        tick_ms: u64,
    ) -> Self {
        Self {
            round_id,
            user_id,
            game: risk.game(),
            stake,
            risk,
            outcome,
            vrf,
            state: RoundState::Betting,
            revealed: Vec::new(),
            started_at: Instant::now(),
            created_at: Utc::now(),
            tick_ms,
            settled_amount: None,
            terminal: None,
        }
    }

    /// Funds are committed; the round goes live. Only legal from `Betting`.
    pub fn activate(&mut self) -> EngineResult<()> {
        match self.state {
            RoundState::Betting => {
                self.state = RoundState::Active;
                self.started_at = Instant::now();
                Ok(())
            }
            RoundState::Settled => Err(EngineError::RoundAlreadySettled(self.round_id)),
            _ => Err(EngineError::RoundNotActive(self.round_id)),
        }
    }

    pub fn ensure_owner(&self, user_id: &str) -> EngineResult<()> {
        if self.user_id != user_id {
            return Err(EngineError::WrongUser {
                round_id: self.round_id,
                user_id: user_id.to_string(),
            });
        }
        Ok(())
    }

    pub fn ensure_active(&self) -> EngineResult<()> {
        match self.state {
            RoundState::Active => Ok(()),
            RoundState::Settled => Err(EngineError::RoundAlreadySettled(self.round_id)),
            _ => Err(EngineError::RoundNotActive(self.round_id)),
        }
    }

    /// Mark the terminal ledger write as in flight.
    pub fn begin_resolve(&mut self) -> EngineResult<()> {
        self.ensure_active()?;
        self.state = RoundState::Resolving;
        Ok(())
    }

    /// The ledger write failed; the round stays resolvable.
    pub fn abort_resolve(&mut self) {
        if self.state == RoundState::Resolving {
            self.state = RoundState::Active;
        }
    }

    /// Terminal transition. Legal from `Active` (no ledger movement needed)
    /// or `Resolving` (movement confirmed). Never from `Betting`.
    pub fn settle(&mut self, note: TerminalNote, settled_amount: i64) -> EngineResult<()> {
        match self.state {
            RoundState::Active | RoundState::Resolving => {
                self.state = RoundState::Settled;
                self.terminal = Some(note);
                self.settled_amount = Some(settled_amount);
                Ok(())
            }
            RoundState::Settled => Err(EngineError::RoundAlreadySettled(self.round_id)),
            RoundState::Betting => Err(EngineError::RoundNotActive(self.round_id)),
        }
    }

    pub fn is_settled(&self) -> bool {
        self.state == RoundState::Settled
    }

    pub fn gems_found(&self) -> u8 {
        self.revealed.len() as u8
    }

    pub fn total_gems(&self) -> u8 {
        match self.risk {
            RiskParams::Mines { mine_count } => GRID_SIZE as u8 - mine_count,
            _ => 0,
        }
    }

    pub fn elapsed_ticks(&self) -> u64 {
        let elapsed_ms = self.started_at.elapsed().as_millis() as u64;
        elapsed_ms / self.tick_ms.max(1)
    }

    /// Client-facing snapshot. Unrevealed randomness stays hidden until the
    /// round is settled.
    pub fn view(&self) -> RoundView {
        RoundView {
            round_id: self.round_id,
            user_id: self.user_id.clone(),
            game: self.game,
            stake: cents_to_dollars(self.stake),
            state: self.state,
            created_at: self.created_at,
            settled_amount: self.settled_amount.map(|cents| cents as f64 / 100.0),
            game_view: self.game_view(),
        }
    }

    fn game_view(&self) -> GameView {
        match (&self.risk, &self.outcome) {
            (RiskParams::Mines { mine_count }, Outcome::Mines { mines }) => GameView::Mines {
                grid_size: GRID_SIZE,
                mine_count: *mine_count,
                revealed: self.revealed.clone(),
                gems_found: self.gems_found(),
                multiplier: mines_multiplier(*mine_count, self.gems_found()),
                mines: self.is_settled().then(|| mines.clone()),
            },
            (RiskParams::Wheel { chosen_color }, Outcome::Wheel { segment_index }) => {
                let landed = self.is_settled().then(|| {
                    let segment = &WHEEL_SEGMENTS[*segment_index];
                    LandedSegment {
                        segment_index: *segment_index,
                        color: segment.color,
                        value: segment.value,
                    }
                });
                GameView::Wheel {
                    chosen_color: *chosen_color,
                    landed,
                }
            }
            (RiskParams::PenaltyShootout { tier, zone }, _) => {
                let (verdict, keeper_zone) = match &self.terminal {
                    Some(TerminalNote::PenaltyShot {
                        verdict,
                        keeper_zone,
                        ..
                    }) => (Some(*verdict), Some(*keeper_zone)),
                    _ => (None, None),
                };
                GameView::PenaltyShootout {
                    tier: *tier,
                    zone: *zone,
                    verdict,
                    keeper_zone,
                }
            }
            (RiskParams::Speedrun { auto_cashout }, Outcome::Speedrun { crash_point }) => {
                let (current_multiplier, crashed, revealed_crash_point) = match &self.terminal {
                    Some(TerminalNote::SpeedrunCashout { multiplier }) => {
                        (*multiplier, false, Some(*crash_point))
                    }
                    Some(TerminalNote::SpeedrunCrashed { crash_point }) => {
                        (*crash_point, true, Some(*crash_point))
                    }
                    _ => {
                        let raw = speedrun_multiplier_at(self.elapsed_ticks());
                        if raw >= *crash_point {
                            // Crashed on the clock; the resolve just hasn't
                            // arrived yet.
                            (*crash_point, true, Some(*crash_point))
                        } else {
                            (raw, false, None)
                        }
                    }
                };
                GameView::Speedrun {
                    current_multiplier,
                    auto_cashout: *auto_cashout,
                    crashed,
                    crash_point: revealed_crash_point,
                }
            }
            // Risk parameters and outcome are generated together; a mismatch
            // cannot be built through the public API.
            _ => unreachable!("risk parameters and outcome always share a game"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RoundView {
    pub round_id: Uuid,
    pub user_id: String,
    pub game: GameType,
    pub stake: f64,
    pub state: RoundState,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled_amount: Option<f64>,
    #[serde(flatten)]
    pub game_view: GameView,
}

#[derive(Debug, Clone, Serialize)]
pub struct LandedSegment {
    pub segment_index: usize,
    pub color: WheelColor,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "game_view", rename_all = "snake_case")]
pub enum GameView {
    Mines {
        grid_size: usize,
        mine_count: u8,
        revealed: Vec<usize>,
        gems_found: u8,
        multiplier: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        mines: Option<Vec<bool>>,
    },
    Wheel {
        chosen_color: WheelColor,
        #[serde(skip_serializing_if = "Option::is_none")]
        landed: Option<LandedSegment>,
    },
    PenaltyShootout {
        tier: PenaltyTier,
        zone: GoalZone,
        #[serde(skip_serializing_if = "Option::is_none")]
        verdict: Option<PenaltyVerdict>,
        #[serde(skip_serializing_if = "Option::is_none")]
        keeper_zone: Option<GoalZone>,
    },
    Speedrun {
        current_multiplier: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        auto_cashout: Option<f64>,
        crashed: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        crash_point: Option<f64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_round() -> WagerRound {
        WagerRound::new(
            Uuid::new_v4(),
            "player-1".to_string(),
            500,
            RiskParams::Mines { mine_count: 5 },
            Outcome::Mines {
                mines: {
                    let mut mines = vec![false; GRID_SIZE];
                    for cell in mines.iter_mut().take(5) {
                        *cell = true;
                    }
                    mines
                },
            },
            VrfBundle {
                vrf_output: String::new(),
                vrf_proof: String::new(),
                public_key: String::new(),
                input_message: String::new(),
            },
            150,
        )
    }

    #[test]
    fn test_betting_cannot_settle_directly() {
        let mut round = test_round();
        let err = round.settle(
            TerminalNote::MinesCashout {
                gems_found: 0,
                multiplier: 1.0,
            },
            0,
        );
        assert!(matches!(err, Err(EngineError::RoundNotActive(_))));
        assert_eq!(round.state, RoundState::Betting);
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut round = test_round();
        round.activate().unwrap();
        assert_eq!(round.state, RoundState::Active);

        round.begin_resolve().unwrap();
        assert_eq!(round.state, RoundState::Resolving);

        round
            .settle(
                TerminalNote::MinesCashout {
                    gems_found: 2,
                    multiplier: 1.5,
                },
                250,
            )
            .unwrap();
        assert_eq!(round.state, RoundState::Settled);
        assert_eq!(round.settled_amount, Some(250));
    }

    #[test]
    fn test_settled_round_rejects_further_transitions() {
        let mut round = test_round();
        round.activate().unwrap();
        round
            .settle(
                TerminalNote::MinesCashout {
                    gems_found: 0,
                    multiplier: 1.0,
                },
                0,
            )
            .unwrap();

        assert!(matches!(
            round.begin_resolve(),
            Err(EngineError::RoundAlreadySettled(_))
        ));
        assert!(matches!(
            round.settle(
                TerminalNote::MinesCashout {
                    gems_found: 0,
                    multiplier: 1.0
                },
                0
            ),
            Err(EngineError::RoundAlreadySettled(_))
        ));
    }

    #[test]
    fn test_abort_resolve_returns_to_active() {
        let mut round = test_round();
        round.activate().unwrap();
        round.begin_resolve().unwrap();
        round.abort_resolve();
        assert_eq!(round.state, RoundState::Active);
        // A retried resolve can proceed.
        round.begin_resolve().unwrap();
    }

    #[test]
    fn test_owner_check() {
        let round = test_round();
        assert!(round.ensure_owner("player-1").is_ok());
        assert!(matches!(
            round.ensure_owner("someone-else"),
            Err(EngineError::WrongUser { .. })
        ));
    }

    #[test]
    fn test_view_hides_mines_until_settled() {
        let mut round = test_round();
        round.activate().unwrap();

        let view = round.view();
        match view.game_view {
            GameView::Mines { mines, .. } => assert!(mines.is_none()),
            _ => panic!("expected mines view"),
        }

        round
            .settle(
                TerminalNote::MinesStruck {
                    cell: 0,
                    gems_found: 0,
                    multiplier: 1.0,
                },
                -500,
            )
            .unwrap();

        let view = round.view();
        match view.game_view {
            GameView::Mines { mines, .. } => assert!(mines.is_some()),
            _ => panic!("expected mines view"),
        }
    }
}
