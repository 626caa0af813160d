//! Core game types: game ids, risk parameters, committed outcomes and
//! player-facing actions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of cells on a mines board.
pub const GRID_SIZE: usize = 25;

/// Allowed mine counts on a mines board.
pub const MIN_MINES: u8 = 1;
pub const MAX_MINES: u8 = 24;

/// Supported game types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GameType {
    Mines,
    Wheel,
    PenaltyShootout,
    Speedrun,
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameType::Mines => write!(f, "mines"),
            GameType::Wheel => write!(f, "wheel"),
            GameType::PenaltyShootout => write!(f, "penalty_shootout"),
            GameType::Speedrun => write!(f, "speedrun"),
        }
    }
}

/// Wheel segment colors. Players bet on a color; weighting comes from how
/// often a color appears in [`WHEEL_SEGMENTS`], not from biased sampling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WheelColor {
    Black,
    Red,
    Blue,
    Gold,
}

/// One slot on the wheel.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct WheelSegment {
    pub color: WheelColor,
    pub label: &'static str,
    pub value: f64,
}

/// The fixed wheel layout: 24 equal-weight slots.
/// 12x black 2.0, 8x red 3.0, 3x blue 5.0, 1x gold 50.0.
pub const WHEEL_SEGMENTS: [WheelSegment; 24] = [
    WheelSegment { color: WheelColor::Black, label: "2x", value: 2.0 },
    WheelSegment { color: WheelColor::Red, label: "3x", value: 3.0 },
    WheelSegment { color: WheelColor::Black, label: "2x", value: 2.0 },
    WheelSegment { color: WheelColor::Blue, label: "5x", value: 5.0 },
    WheelSegment { color: WheelColor::Black, label: "2x", value: 2.0 },
    WheelSegment { color: WheelColor::Red, label: "3x", value: 3.0 },
    WheelSegment { color: WheelColor::Black, label: "2x", value: 2.0 },
    WheelSegment { color: WheelColor::Red, label: "3x", value: 3.0 },
    WheelSegment { color: WheelColor::Black, label: "2x", value: 2.0 },
    WheelSegment { color: WheelColor::Blue, label: "5x", value: 5.0 },
    WheelSegment { color: WheelColor::Black, label: "2x", value: 2.0 },
    WheelSegment { color: WheelColor::Red, label: "3x", value: 3.0 },
    WheelSegment { color: WheelColor::Black, label: "2x", value: 2.0 },
    WheelSegment { color: WheelColor::Gold, label: "50x", value: 50.0 },
    WheelSegment { color: WheelColor::Black, label: "2x", value: 2.0 },
    WheelSegment { color: WheelColor::Red, label: "3x", value: 3.0 },
    WheelSegment { color: WheelColor::Black, label: "2x", value: 2.0 },
    WheelSegment { color: WheelColor::Blue, label: "5x", value: 5.0 },
    WheelSegment { color: WheelColor::Black, label: "2x", value: 2.0 },
    WheelSegment { color: WheelColor::Red, label: "3x", value: 3.0 },
    WheelSegment { color: WheelColor::Black, label: "2x", value: 2.0 },
    WheelSegment { color: WheelColor::Red, label: "3x", value: 3.0 },
    WheelSegment { color: WheelColor::Black, label: "2x", value: 2.0 },
    WheelSegment { color: WheelColor::Red, label: "3x", value: 3.0 },
];

/// Selectable multiplier tiers for the penalty shootout. Lower payouts are
/// more likely to score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PenaltyTier {
    #[serde(rename = "2x")]
    X2,
    #[serde(rename = "3x")]
    X3,
    #[serde(rename = "4x")]
    X4,
    #[serde(rename = "5x")]
    X5,
}

impl PenaltyTier {
    pub fn multiplier(&self) -> f64 {
        match self {
            PenaltyTier::X2 => 2.0,
            PenaltyTier::X3 => 3.0,
            PenaltyTier::X4 => 4.0,
            PenaltyTier::X5 => 5.0,
        }
    }

    pub fn goal_probability(&self) -> f64 {
        match self {
            PenaltyTier::X2 => 0.40,
            PenaltyTier::X3 => 0.35,
            PenaltyTier::X4 => 0.30,
            PenaltyTier::X5 => 0.20,
        }
    }
}

/// Where the shooter aims (and the keeper dives).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GoalZone {
    Left,
    Center,
    Right,
}

impl GoalZone {
    pub const ALL: [GoalZone; 3] = [GoalZone::Left, GoalZone::Center, GoalZone::Right];
}

/// Game-specific risk parameters chosen by the player before funds commit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "game", rename_all = "snake_case")]
pub enum RiskParams {
    Mines {
        mine_count: u8,
    },
    Wheel {
        chosen_color: WheelColor,
    },
    PenaltyShootout {
        tier: PenaltyTier,
        zone: GoalZone,
    },
    Speedrun {
        /// Optional multiplier at which the engine locks in a cash-out on the
        /// player's behalf.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        auto_cashout: Option<f64>,
    },
}

impl RiskParams {
    pub fn game(&self) -> GameType {
        match self {
            RiskParams::Mines { .. } => GameType::Mines,
            RiskParams::Wheel { .. } => GameType::Wheel,
            RiskParams::PenaltyShootout { .. } => GameType::PenaltyShootout,
            RiskParams::Speedrun { .. } => GameType::Speedrun,
        }
    }
}

/// The randomness committed at bet time. Never sent to the client while the
/// round is live; the presentation layer only ever sees a view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "game", rename_all = "snake_case")]
pub enum Outcome {
    Mines {
        /// `GRID_SIZE` cells; `true` marks a mine.
        mines: Vec<bool>,
    },
    Wheel {
        segment_index: usize,
    },
    PenaltyShootout {
        /// Uniform roll compared against the tier's goal probability.
        goal_roll: f64,
        /// Uniform roll for the 20% shot-goes-wide check.
        wide_roll: f64,
        /// Drives the keeper's dive pick when the shot scores.
        keeper_pick: u8,
    },
    Speedrun {
        crash_point: f64,
    },
}

/// How a penalty shot ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PenaltyVerdict {
    Goal,
    Saved,
    Wide,
}

/// Player actions that drive an active round forward.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ResolveAction {
    /// Mines: reveal one cell.
    Reveal { cell: usize },
    /// Mines / Speedrun: lock in the current multiplier.
    Cashout,
    /// Wheel: stop the wheel on the committed segment.
    Spin,
    /// Penalty shootout: take the shot with a charge level of 0..=100.
    Shoot { power: u8 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wheel_layout_weights() {
        let count = |c: WheelColor| WHEEL_SEGMENTS.iter().filter(|s| s.color == c).count();
        assert_eq!(count(WheelColor::Black), 12);
        assert_eq!(count(WheelColor::Red), 8);
        assert_eq!(count(WheelColor::Blue), 3);
        assert_eq!(count(WheelColor::Gold), 1);
        assert_eq!(WHEEL_SEGMENTS.len(), 24);
    }

    #[test]
    fn test_tier_probabilities_fall_as_multiplier_rises() {
        let tiers = [PenaltyTier::X2, PenaltyTier::X3, PenaltyTier::X4, PenaltyTier::X5];
        for pair in tiers.windows(2) {
            assert!(pair[0].multiplier() < pair[1].multiplier());
            assert!(pair[0].goal_probability() > pair[1].goal_probability());
        }
    }

    #[test]
    fn test_risk_params_wire_format() {
        let params = RiskParams::Mines { mine_count: 5 };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["game"], "mines");
        assert_eq!(json["mine_count"], 5);

        let back: RiskParams = serde_json::from_value(json).unwrap();
        assert_eq!(back, params);
    }

    #[test]
    fn test_resolve_action_wire_format() {
        let action: ResolveAction =
            serde_json::from_str(r#"{"action":"shoot","power":70}"#).unwrap();
        assert_eq!(action, ResolveAction::Shoot { power: 70 });
    }
}
