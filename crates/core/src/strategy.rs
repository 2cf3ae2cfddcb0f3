//! The strategy callback contract consumed by the backtest engine.

use serde::{Deserialize, Serialize};

use crate::types::{Candle, Signal, Timeframe, TradingPair};

/// Per-strategy tallies reported back into the backtest result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyStats {
    /// Strategy name.
    pub name: String,
    /// Instrument the strategy trades.
    pub symbol: String,
    /// Timeframe the strategy runs on.
    pub timeframe: Timeframe,
    /// Signals emitted over the run.
    pub total_signals: u32,
    /// Signals the strategy counts as winners.
    pub winning_signals: u32,
    /// Signals the strategy counts as losers.
    pub losing_signals: u32,
    /// Winning share of counted signals, as a percentage.
    pub win_rate_pct: f64,
}

/// Contract between the backtest engine and a trading strategy.
///
/// The engine never inspects strategy internals beyond these calls:
/// warm-up via [`initialize`](Strategy::initialize), one
/// [`on_candle`](Strategy::on_candle) per replayed bar (returning at most
/// one signal), [`reset`](Strategy::reset) before a run, and
/// [`performance_stats`](Strategy::performance_stats) at the end.
pub trait Strategy {
    /// Strategy name for logging and reporting.
    fn name(&self) -> &str;

    /// Instrument the strategy trades.
    fn symbol(&self) -> &TradingPair;

    /// Timeframe the strategy expects candles on.
    fn timeframe(&self) -> Timeframe;

    /// Seed the strategy with warm-up history before the replay starts.
    fn initialize(&mut self, warmup: &[Candle]);

    /// Observe one bar; may emit at most one signal.
    fn on_candle(&mut self, candle: &Candle) -> Option<Signal>;

    /// Drop all accumulated state.
    fn reset(&mut self);

    /// Tallies for the merged backtest report.
    fn performance_stats(&self) -> StrategyStats;
}
