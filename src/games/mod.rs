//! Casino game engine: outcome generation, payout math and round lifecycle.

pub mod generator;
pub mod payout;
pub mod round;
pub mod types;
pub mod vrf;
