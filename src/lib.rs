//! Stakehouse — casino wagering settlement engine.
//!
//! Server-side outcome generation committed through a VRF, payout
//! calculation for four chance games (mines, wheel, penalty shootout,
//! speedrun) and atomic per-user settlement against a RocksDB-backed ledger
//! with an append-only audit log, exposed over a small HTTP boundary.

pub mod api;
pub mod config;
pub mod engine;
pub mod errors;
pub mod games;
pub mod ledger;
pub mod storage;
