//! Configuration structures for the replay-trader system.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Backtest configuration.
///
/// All knobs are plain numeric values; monetary quantities use the same
/// exact decimal type as the entities they feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// Starting capital in the quote asset.
    pub initial_capital: Decimal,
    /// Maker fee fraction charged on limit-order fills.
    pub maker_fee: Decimal,
    /// Taker fee fraction charged on market-order fills.
    pub taker_fee: Decimal,
    /// Adverse price movement applied to market-order fills.
    pub slippage_pct: Decimal,
    /// Leverage applied when sizing required capital.
    pub leverage: Decimal,
    /// Bars fed to the strategy before the replay starts.
    pub warmup_candles: usize,
    /// Annual risk-free rate used by the ratio calculations.
    pub risk_free_rate: f64,
    /// Annualization constant (trading-day convention).
    pub periods_per_year: u32,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: Decimal::new(10_000, 0),
            maker_fee: Decimal::new(1, 3),    // 0.1%
            taker_fee: Decimal::new(1, 3),    // 0.1%
            slippage_pct: Decimal::new(5, 4), // 0.05%
            leverage: Decimal::ONE,
            warmup_candles: 100,
            risk_free_rate: 0.02,
            periods_per_year: 252,
        }
    }
}
