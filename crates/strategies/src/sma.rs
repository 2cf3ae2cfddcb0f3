//! Simple moving average crossover strategy.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::info;

use replay_core::{
    Candle, Error, Result, Signal, SignalType, Strategy, StrategyStats, Timeframe, TradingPair,
};

/// Classic two-SMA trend-following strategy.
///
/// Emits a buy signal when the fast SMA crosses above the slow SMA and a
/// sell signal when it crosses below. Consecutive signals in the same
/// direction are suppressed.
pub struct SmaStrategy {
    symbol: TradingPair,
    timeframe: Timeframe,
    fast_period: usize,
    slow_period: usize,
    stop_loss_pct: Decimal,
    take_profit_pct: Decimal,
    max_candles: usize,
    candles: Vec<Candle>,
    last_signal: Option<SignalType>,
    initialized: bool,
    total_signals: u32,
}

impl SmaStrategy {
    /// Default fast SMA period.
    pub const DEFAULT_FAST_PERIOD: usize = 20;
    /// Default slow SMA period.
    pub const DEFAULT_SLOW_PERIOD: usize = 50;
    /// Candles retained in the rolling buffer.
    const MAX_CANDLES: usize = 1000;

    /// Create a strategy with the given SMA periods.
    ///
    /// The fast period must be shorter than the slow one.
    pub fn new(
        symbol: TradingPair,
        timeframe: Timeframe,
        fast_period: usize,
        slow_period: usize,
    ) -> Result<Self> {
        if fast_period == 0 || slow_period == 0 {
            return Err(Error::config("SMA periods must be positive"));
        }
        if fast_period >= slow_period {
            return Err(Error::config("fast period must be shorter than slow period"));
        }
        Ok(Self {
            symbol,
            timeframe,
            fast_period,
            slow_period,
            stop_loss_pct: Decimal::new(2, 2),   // 2%
            take_profit_pct: Decimal::new(4, 2), // 4%
            max_candles: Self::MAX_CANDLES,
            candles: Vec::new(),
            last_signal: None,
            initialized: false,
            total_signals: 0,
        })
    }

    /// Create a strategy with the default 20/50 periods.
    pub fn with_defaults(symbol: TradingPair, timeframe: Timeframe) -> Result<Self> {
        Self::new(
            symbol,
            timeframe,
            Self::DEFAULT_FAST_PERIOD,
            Self::DEFAULT_SLOW_PERIOD,
        )
    }

    /// Override the stop-loss and take-profit fractions attached to signals.
    pub fn with_risk_limits(mut self, stop_loss_pct: Decimal, take_profit_pct: Decimal) -> Self {
        self.stop_loss_pct = stop_loss_pct;
        self.take_profit_pct = take_profit_pct;
        self
    }

    /// Whether warm-up history has been supplied.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// SMA of the closes over `period` bars, ending `offset` bars back.
    fn sma(&self, period: usize, offset: usize) -> Option<Decimal> {
        let end = self.candles.len().checked_sub(offset)?;
        if end < period {
            return None;
        }
        let sum: Decimal = self.candles[end - period..end].iter().map(|c| c.close).sum();
        Some(sum / Decimal::from(period as u64))
    }

    /// Confidence from the relative SMA separation, capped at 1.
    fn confidence(fast: Decimal, slow: Decimal) -> f64 {
        if slow == Decimal::ZERO {
            return 0.0;
        }
        let spread = ((fast - slow) / slow).abs().to_f64().unwrap_or(0.0);
        (spread * 100.0).min(1.0)
    }

    fn make_signal(&self, signal_type: SignalType, candle: &Candle, fast: Decimal, slow: Decimal) -> Signal {
        let close = candle.close;
        let (stop_loss, target_price) = match signal_type {
            SignalType::Buy => (
                close * (Decimal::ONE - self.stop_loss_pct),
                close * (Decimal::ONE + self.take_profit_pct),
            ),
            _ => (
                close * (Decimal::ONE + self.stop_loss_pct),
                close * (Decimal::ONE - self.take_profit_pct),
            ),
        };

        Signal {
            symbol: self.symbol.clone(),
            signal_type,
            price: close,
            target_price: Some(target_price),
            stop_loss: Some(stop_loss),
            confidence: Self::confidence(fast, slow),
            strategy: self.name().to_string(),
            timeframe: self.timeframe,
            expires_at: Some(candle.time + self.timeframe.to_duration()),
        }
    }
}

impl Strategy for SmaStrategy {
    fn name(&self) -> &str {
        "SMA Crossover"
    }

    fn symbol(&self) -> &TradingPair {
        &self.symbol
    }

    fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    fn initialize(&mut self, warmup: &[Candle]) {
        self.candles = warmup.to_vec();
        self.initialized = true;
        info!(
            strategy = self.name(),
            candles = warmup.len(),
            "initialized with warm-up history"
        );
    }

    fn on_candle(&mut self, candle: &Candle) -> Option<Signal> {
        self.candles.push(candle.clone());
        if self.candles.len() > self.max_candles {
            let excess = self.candles.len() - self.max_candles;
            self.candles.drain(..excess);
        }

        // Crossover detection needs the previous pair of SMAs too.
        if self.candles.len() < self.slow_period + 1 {
            return None;
        }
        let fast = self.sma(self.fast_period, 0)?;
        let slow = self.sma(self.slow_period, 0)?;
        let prev_fast = self.sma(self.fast_period, 1)?;
        let prev_slow = self.sma(self.slow_period, 1)?;

        let signal = if prev_fast <= prev_slow
            && fast > slow
            && self.last_signal != Some(SignalType::Buy)
        {
            self.last_signal = Some(SignalType::Buy);
            Some(self.make_signal(SignalType::Buy, candle, fast, slow))
        } else if prev_fast >= prev_slow
            && fast < slow
            && self.last_signal != Some(SignalType::Sell)
        {
            self.last_signal = Some(SignalType::Sell);
            Some(self.make_signal(SignalType::Sell, candle, fast, slow))
        } else {
            None
        };

        if signal.is_some() {
            self.total_signals += 1;
        }
        signal
    }

    fn reset(&mut self) {
        self.candles.clear();
        self.last_signal = None;
        self.initialized = false;
        self.total_signals = 0;
    }

    fn performance_stats(&self) -> StrategyStats {
        StrategyStats {
            name: self.name().to_string(),
            symbol: self.symbol.to_string(),
            timeframe: self.timeframe,
            total_signals: self.total_signals,
            winning_signals: 0,
            losing_signals: 0,
            win_rate_pct: 0.0,
        }
    }
}
