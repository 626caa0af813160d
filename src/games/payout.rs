//! Payout calculator.
//!
//! Pure mapping from a terminal game event plus the stake to the single
//! ledger movement that settles the round. Adding a game means adding a
//! [`PayoutEvent`] variant; the orchestrator never changes.

use crate::games::types::{
    PenaltyTier, PenaltyVerdict, WheelColor, WheelSegment, GRID_SIZE,
};
use crate::ledger::Cents;

/// Multiplier before the first gem is revealed.
const MINES_BASE: f64 = 1.00;
/// Multiplier at exactly one revealed gem.
const MINES_FIRST_GEM: f64 = 1.05;
/// Multiplier once every non-mine cell is revealed.
const MINES_CAP: f64 = 10.00;

/// The ledger movement a terminal event settles with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Stake already forfeited at bet time; nothing further moves.
    Nothing,
    /// Credit the user this many cents.
    Credit(Cents),
    /// Debit the user this many cents (capped at their balance when applied).
    Penalty(Cents),
}

impl Settlement {
    /// Zero-amount movements collapse to `Nothing` so no empty log entries
    /// are ever written.
    fn normalized(self) -> Self {
        match self {
            Settlement::Credit(0) | Settlement::Penalty(0) => Settlement::Nothing,
            other => other,
        }
    }

    pub fn signed_delta(&self) -> i64 {
        match self {
            Settlement::Nothing => 0,
            Settlement::Credit(amount) => *amount as i64,
            Settlement::Penalty(amount) => -(*amount as i64),
        }
    }
}

/// Terminal game events, tagged per game.
#[derive(Debug, Clone, Copy)]
pub enum PayoutEvent<'a> {
    MinesCashout { mine_count: u8, gems_found: u8 },
    MinesStruckMine { mine_count: u8, gems_found: u8 },
    WheelLanded { chosen: WheelColor, segment: &'a WheelSegment },
    PenaltyShot { tier: PenaltyTier, verdict: PenaltyVerdict },
    SpeedrunCashout { multiplier: f64 },
    SpeedrunCrashed,
}

/// Mines multiplier as a function of gems revealed so far.
///
/// 1.00 at zero gems, 1.05 at the first gem, then linear up to exactly 10.00
/// when every non-mine cell is revealed.
pub fn mines_multiplier(mine_count: u8, gems_found: u8) -> f64 {
    if gems_found == 0 {
        return MINES_BASE;
    }

    let total_gems = GRID_SIZE as u8 - mine_count;
    if total_gems <= 1 {
        return MINES_CAP;
    }

    let step = (MINES_CAP - MINES_FIRST_GEM) / (total_gems - 1) as f64;
    let multiplier = MINES_FIRST_GEM + (gems_found - 1) as f64 * step;
    multiplier.min(MINES_CAP)
}

fn gross(stake: Cents, multiplier: f64) -> Cents {
    (stake as f64 * multiplier).round() as Cents
}

/// Map a terminal event to its settlement.
pub fn compute_payout(stake: Cents, event: PayoutEvent<'_>) -> Settlement {
    let settlement = match event {
        PayoutEvent::MinesCashout {
            mine_count,
            gems_found,
        } => {
            let multiplier = mines_multiplier(mine_count, gems_found);
            Settlement::Credit(gross(stake, multiplier).saturating_sub(stake))
        }
        // Losing on a mine forfeits the payout the run had built up, not
        // merely the stake.
        PayoutEvent::MinesStruckMine {
            mine_count,
            gems_found,
        } => {
            let multiplier = mines_multiplier(mine_count, gems_found);
            Settlement::Penalty(gross(stake, multiplier))
        }
        PayoutEvent::WheelLanded { chosen, segment } => {
            if segment.color == chosen {
                Settlement::Credit(gross(stake, segment.value))
            } else {
                Settlement::Nothing
            }
        }
        PayoutEvent::PenaltyShot { tier, verdict } => match verdict {
            PenaltyVerdict::Goal => Settlement::Credit(gross(stake, tier.multiplier())),
            // Same potential-win rule as mines.
            PenaltyVerdict::Saved | PenaltyVerdict::Wide => {
                Settlement::Penalty(gross(stake, tier.multiplier()))
            }
        },
        PayoutEvent::SpeedrunCashout { multiplier } => {
            Settlement::Credit(gross(stake, multiplier).saturating_sub(stake))
        }
        PayoutEvent::SpeedrunCrashed => Settlement::Nothing,
    };

    settlement.normalized()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::types::WHEEL_SEGMENTS;

    #[test]
    fn test_mines_multiplier_boundaries() {
        // 10 mines leaves 15 gems.
        assert_eq!(mines_multiplier(10, 0), 1.00);
        assert_eq!(mines_multiplier(10, 1), 1.05);
        assert!((mines_multiplier(10, 15) - 10.00).abs() < 1e-9);
    }

    #[test]
    fn test_mines_multiplier_strictly_increasing() {
        for mine_count in [1u8, 5, 10, 20, 23] {
            let total_gems = GRID_SIZE as u8 - mine_count;
            let mut previous = mines_multiplier(mine_count, 0);
            for gems in 1..=total_gems {
                let current = mines_multiplier(mine_count, gems);
                assert!(
                    current > previous,
                    "multiplier must increase at {} mines, {} gems",
                    mine_count,
                    gems
                );
                previous = current;
            }
        }
    }

    #[test]
    fn test_mines_single_gem_board_hits_cap() {
        // 24 mines: the one gem jumps straight to the cap.
        assert!((mines_multiplier(24, 1) - 10.00).abs() < 1e-9);
    }

    #[test]
    fn test_mines_cashout_with_no_gems_is_a_noop() {
        let settlement = compute_payout(
            500,
            PayoutEvent::MinesCashout {
                mine_count: 5,
                gems_found: 0,
            },
        );
        assert_eq!(settlement, Settlement::Nothing);
    }

    #[test]
    fn test_mines_strike_charges_potential_payout() {
        // $5 stake, 3 gems in at 10 mines: penalty is stake times the
        // current multiplier, not the stake alone.
        let multiplier = mines_multiplier(10, 3);
        let settlement = compute_payout(
            500,
            PayoutEvent::MinesStruckMine {
                mine_count: 10,
                gems_found: 3,
            },
        );
        assert_eq!(settlement, Settlement::Penalty((500.0 * multiplier).round() as u64));
    }

    #[test]
    fn test_penalty_loss_charges_potential_win() {
        // $2 at 5x, shot saved: exactly $10 leaves the balance.
        let settlement = compute_payout(
            200,
            PayoutEvent::PenaltyShot {
                tier: PenaltyTier::X5,
                verdict: PenaltyVerdict::Saved,
            },
        );
        assert_eq!(settlement, Settlement::Penalty(1000));

        let wide = compute_payout(
            200,
            PayoutEvent::PenaltyShot {
                tier: PenaltyTier::X5,
                verdict: PenaltyVerdict::Wide,
            },
        );
        assert_eq!(wide, Settlement::Penalty(1000));
    }

    #[test]
    fn test_penalty_goal_credits_full_multiplier() {
        let settlement = compute_payout(
            200,
            PayoutEvent::PenaltyShot {
                tier: PenaltyTier::X3,
                verdict: PenaltyVerdict::Goal,
            },
        );
        assert_eq!(settlement, Settlement::Credit(600));
    }

    #[test]
    fn test_wheel_match_pays_segment_value() {
        let red = WHEEL_SEGMENTS.iter().find(|s| s.value == 3.0).unwrap();
        // $1 on red at 3x: $3 credited against the $1 already debited.
        let settlement = compute_payout(
            100,
            PayoutEvent::WheelLanded {
                chosen: red.color,
                segment: red,
            },
        );
        assert_eq!(settlement, Settlement::Credit(300));
    }

    #[test]
    fn test_wheel_miss_moves_nothing() {
        let black = WHEEL_SEGMENTS.iter().find(|s| s.value == 2.0).unwrap();
        let settlement = compute_payout(
            100,
            PayoutEvent::WheelLanded {
                chosen: crate::games::types::WheelColor::Gold,
                segment: black,
            },
        );
        assert_eq!(settlement, Settlement::Nothing);
    }

    #[test]
    fn test_speedrun_cashout_nets_stake_out() {
        let settlement = compute_payout(1000, PayoutEvent::SpeedrunCashout { multiplier: 2.5 });
        assert_eq!(settlement, Settlement::Credit(1500));

        let at_start = compute_payout(1000, PayoutEvent::SpeedrunCashout { multiplier: 1.0 });
        assert_eq!(at_start, Settlement::Nothing);
    }

    #[test]
    fn test_speedrun_crash_forfeits_quietly() {
        assert_eq!(compute_payout(1000, PayoutEvent::SpeedrunCrashed), Settlement::Nothing);
    }
}
