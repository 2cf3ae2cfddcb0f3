//! Backtesting engine for the replay-trader system.
//!
//! This crate provides:
//! - Candle-replay order matching with slippage and fee accounting
//! - A portfolio ledger tracking cash, positions, and the equity curve
//! - Performance metrics over the finished equity curve and trade list
//! - The event-driven backtest orchestrator

pub mod engine;
pub mod exchange;
pub mod metrics;
pub mod portfolio;

pub use engine::{BacktestEngine, BacktestReport, EngineState};
pub use exchange::SimulatedExchange;
pub use metrics::PerformanceReport;
pub use portfolio::{EquityPoint, PortfolioManager, PortfolioStats};
