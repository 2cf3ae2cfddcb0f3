//! Reference strategy implementations for the replay-trader system.
//!
//! Strategies interact with the backtest engine only through the
//! `Strategy` contract defined in `replay-core`.

pub mod sma;

pub use sma::SmaStrategy;
