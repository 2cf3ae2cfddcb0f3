//! Core types and configuration for the replay-trader system.
//!
//! This crate provides shared types used across all other crates:
//! - Market data values (trading pairs, timeframes, candles)
//! - Domain entities (orders, positions, trades, signals)
//! - The strategy callback contract
//! - Configuration structures
//! - Common error types

pub mod config;
pub mod error;
pub mod order;
pub mod position;
pub mod strategy;
pub mod trade;
pub mod types;

pub use config::BacktestConfig;
pub use error::{Error, Result};
pub use order::{Order, OrderSide, OrderStatus, OrderType};
pub use position::{Position, PositionSide, PositionStatus};
pub use strategy::{Strategy, StrategyStats};
pub use trade::Trade;
pub use types::*;
