//! Outcome generation.
//!
//! Every draw runs server-side from an RNG seeded by the round's VRF
//! commitment. Parameters are validated before any randomness or ledger I/O
//! happens, so a bad request can never leave a trace.

use crate::errors::{EngineError, EngineResult};
use crate::games::types::{
    GoalZone, Outcome, PenaltyTier, PenaltyVerdict, RiskParams, GRID_SIZE, MAX_MINES, MIN_MINES,
    WHEEL_SEGMENTS,
};
use crate::games::vrf::{VrfBundle, VrfEngine};
use rand::Rng;
use std::sync::Arc;
use uuid::Uuid;

/// Displayed speedrun multiplier never exceeds this, regardless of how long
/// a round is left running (crash points top out at 200).
const SPEEDRUN_MULTIPLIER_CAP: f64 = 250.0;

pub struct OutcomeGenerator {
    vrf: Arc<VrfEngine>,
}

impl OutcomeGenerator {
    pub fn new(vrf: Arc<VrfEngine>) -> Self {
        Self { vrf }
    }

    /// Reject out-of-range risk parameters. Runs before any I/O.
    pub fn validate(params: &RiskParams) -> EngineResult<()> {
        match params {
            RiskParams::Mines { mine_count } => {
                if *mine_count < MIN_MINES || *mine_count > MAX_MINES {
                    return Err(EngineError::InvalidParameter(format!(
                        "mine_count must be between {} and {}, got {}",
                        MIN_MINES, MAX_MINES, mine_count
                    )));
                }
            }
            RiskParams::Wheel { .. } => {}
            RiskParams::PenaltyShootout { .. } => {}
            RiskParams::Speedrun { auto_cashout } => {
                if let Some(target) = auto_cashout {
                    if !target.is_finite() || *target <= 1.0 {
                        return Err(EngineError::InvalidParameter(format!(
                            "auto_cashout must be greater than 1.0, got {}",
                            target
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Commit randomness for a round and draw its outcome.
    pub fn generate(
        &self,
        round_id: Uuid,
        user_id: &str,
        params: &RiskParams,
    ) -> EngineResult<(Outcome, VrfBundle)> {
        Self::validate(params)?;

        let fingerprint = serde_json::to_string(params)
            .map_err(|e| EngineError::Vrf(format!("params fingerprint: {}", e)))?;
        let bundle = self.vrf.commit(
            &round_id.to_string(),
            &params.game().to_string(),
            user_id,
            &fingerprint,
        )?;

        let mut rng = VrfEngine::rng_for(&bundle)?;
        let outcome = Self::draw(&mut rng, params);
        Ok((outcome, bundle))
    }

    /// Draw an outcome for validated parameters. Deterministic given the RNG.
    pub fn draw<R: Rng>(rng: &mut R, params: &RiskParams) -> Outcome {
        match params {
            RiskParams::Mines { mine_count } => Outcome::Mines {
                mines: place_mines(rng, *mine_count),
            },
            RiskParams::Wheel { .. } => Outcome::Wheel {
                segment_index: rng.gen_range(0..WHEEL_SEGMENTS.len()),
            },
            RiskParams::PenaltyShootout { .. } => Outcome::PenaltyShootout {
                goal_roll: rng.gen::<f64>(),
                wide_roll: rng.gen::<f64>(),
                keeper_pick: rng.gen::<u8>(),
            },
            RiskParams::Speedrun { .. } => Outcome::Speedrun {
                crash_point: draw_crash_point(rng),
            },
        }
    }
}

/// Place exactly `mine_count` mines uniformly among `GRID_SIZE` cells by
/// rejection sampling: keep drawing uniform cell indices until enough
/// distinct cells are marked.
pub fn place_mines<R: Rng>(rng: &mut R, mine_count: u8) -> Vec<bool> {
    let mut mines = vec![false; GRID_SIZE];
    let mut placed = 0u8;
    while placed < mine_count {
        let cell = rng.gen_range(0..GRID_SIZE);
        if !mines[cell] {
            mines[cell] = true;
            placed += 1;
        }
    }
    mines
}

/// Crash point distribution: 70% in [1.01, 2.01), 25% in [2, 10),
/// 5% in [10, 200).
pub fn draw_crash_point<R: Rng>(rng: &mut R) -> f64 {
    let bucket = rng.gen::<f64>();
    if bucket < 0.70 {
        rng.gen_range(1.01..2.01)
    } else if bucket < 0.95 {
        rng.gen_range(2.0..10.0)
    } else {
        rng.gen_range(10.0..200.0)
    }
}

/// Displayed speedrun multiplier after `ticks` elapsed ticks: starts at 1.00
/// and climbs by a geometrically growing step each tick.
pub fn speedrun_multiplier_at(ticks: u64) -> f64 {
    let mut multiplier = 1.0;
    let mut step = 0.01;
    for _ in 0..ticks {
        step *= 1.06;
        multiplier += step;
        if multiplier >= SPEEDRUN_MULTIPLIER_CAP {
            return SPEEDRUN_MULTIPLIER_CAP;
        }
    }
    multiplier
}

/// Derive the shot verdict and keeper dive from the committed rolls.
///
/// The goal roll decides at the tier's probability; a shot charged past 50
/// additionally risks going wide (20%), which overrides the goal roll. The
/// keeper dives into the shooter's zone on any non-goal and into a different
/// zone on a goal.
pub fn penalty_verdict(
    goal_roll: f64,
    wide_roll: f64,
    keeper_pick: u8,
    tier: PenaltyTier,
    zone: GoalZone,
    power: u8,
) -> (PenaltyVerdict, GoalZone) {
    let went_wide = power > 50 && wide_roll < 0.20;
    if went_wide {
        return (PenaltyVerdict::Wide, zone);
    }

    if goal_roll < tier.goal_probability() {
        let others: Vec<GoalZone> = GoalZone::ALL.iter().copied().filter(|z| *z != zone).collect();
        let keeper = others[keeper_pick as usize % others.len()];
        (PenaltyVerdict::Goal, keeper)
    } else {
        (PenaltyVerdict::Saved, zone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_mine_count_bounds_rejected() {
        for bad in [0u8, 25, 200] {
            let err = OutcomeGenerator::validate(&RiskParams::Mines { mine_count: bad });
            assert!(matches!(err, Err(EngineError::InvalidParameter(_))), "mine_count {} should be rejected", bad);
        }
        assert!(OutcomeGenerator::validate(&RiskParams::Mines { mine_count: 24 }).is_ok());
    }

    #[test]
    fn test_auto_cashout_must_exceed_one() {
        let err = OutcomeGenerator::validate(&RiskParams::Speedrun {
            auto_cashout: Some(1.0),
        });
        assert!(matches!(err, Err(EngineError::InvalidParameter(_))));
        assert!(OutcomeGenerator::validate(&RiskParams::Speedrun {
            auto_cashout: Some(1.5),
        })
        .is_ok());
    }

    #[test]
    fn test_mines_boards_have_exact_count() {
        let mut rng = StdRng::seed_from_u64(7);
        for count in [1u8, 5, 12, 24] {
            let board = place_mines(&mut rng, count);
            assert_eq!(board.len(), GRID_SIZE);
            assert_eq!(board.iter().filter(|m| **m).count(), count as usize);
        }
    }

    #[test]
    fn test_mines_placement_is_empirically_uniform() {
        // 100k boards at mine_count=5: every cell should be a mine close to
        // 20% of the time.
        let mut rng = StdRng::seed_from_u64(42);
        let trials = 100_000usize;
        let mut hits = [0u32; GRID_SIZE];

        for _ in 0..trials {
            let board = place_mines(&mut rng, 5);
            for (cell, is_mine) in board.iter().enumerate() {
                if *is_mine {
                    hits[cell] += 1;
                }
            }
        }

        let expected = trials as f64 * 5.0 / GRID_SIZE as f64;
        for (cell, count) in hits.iter().enumerate() {
            let deviation = (*count as f64 - expected).abs() / expected;
            assert!(
                deviation < 0.05,
                "cell {} frequency off by {:.1}% (got {}, expected {:.0})",
                cell,
                deviation * 100.0,
                count,
                expected
            );
        }
    }

    #[test]
    fn test_crash_point_bounds_and_tiers() {
        let mut rng = StdRng::seed_from_u64(9);
        let trials = 50_000usize;
        let mut low = 0usize;
        let mut mid = 0usize;
        let mut high = 0usize;

        for _ in 0..trials {
            let point = draw_crash_point(&mut rng);
            assert!((1.01..200.0).contains(&point));
            if point < 2.01 {
                low += 1;
            } else if point < 10.0 {
                mid += 1;
            } else {
                high += 1;
            }
        }

        // Loose bands around 70/25/5.
        assert!((0.66..0.74).contains(&(low as f64 / trials as f64)));
        assert!((0.21..0.29).contains(&(mid as f64 / trials as f64)));
        assert!((0.03..0.07).contains(&(high as f64 / trials as f64)));
    }

    #[test]
    fn test_speedrun_curve_accelerates_from_one() {
        assert_eq!(speedrun_multiplier_at(0), 1.0);

        let mut previous_gain = 0.0;
        let mut previous = 1.0;
        for tick in 1..40 {
            let current = speedrun_multiplier_at(tick);
            let gain = current - previous;
            assert!(gain > previous_gain, "step should grow every tick");
            previous_gain = gain;
            previous = current;
        }
    }

    #[test]
    fn test_penalty_keeper_matches_zone_on_save() {
        let (verdict, keeper) = penalty_verdict(0.99, 0.99, 0, PenaltyTier::X2, GoalZone::Left, 30);
        assert_eq!(verdict, PenaltyVerdict::Saved);
        assert_eq!(keeper, GoalZone::Left);
    }

    #[test]
    fn test_penalty_keeper_differs_on_goal() {
        for pick in 0..6u8 {
            let (verdict, keeper) =
                penalty_verdict(0.0, 0.99, pick, PenaltyTier::X2, GoalZone::Center, 30);
            assert_eq!(verdict, PenaltyVerdict::Goal);
            assert_ne!(keeper, GoalZone::Center);
        }
    }

    #[test]
    fn test_high_power_can_go_wide_despite_goal_roll() {
        // Goal roll would score, but the wide check overrides at power > 50.
        let (verdict, keeper) = penalty_verdict(0.0, 0.1, 0, PenaltyTier::X3, GoalZone::Right, 80);
        assert_eq!(verdict, PenaltyVerdict::Wide);
        assert_eq!(keeper, GoalZone::Right);

        // Same rolls at low power: the wide check never runs.
        let (verdict, _) = penalty_verdict(0.0, 0.1, 0, PenaltyTier::X3, GoalZone::Right, 50);
        assert_eq!(verdict, PenaltyVerdict::Goal);
    }
}
