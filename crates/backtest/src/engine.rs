//! Event-driven backtest orchestrator.
//!
//! Wires the strategy, the simulated exchange, and the portfolio ledger
//! together and drives the replay loop. The engine owns no canonical
//! state store itself, only the iteration cursor over the candle
//! sequence; all collaborators are injected rather than reached for as
//! globals, and the replay clock is always the candle timestamp.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use replay_core::{
    BacktestConfig, Candle, Order, OrderSide, PositionSide, Result, Signal, SignalType, Strategy,
    StrategyStats, Trade,
};

use crate::exchange::SimulatedExchange;
use crate::metrics::{self, PerformanceReport};
use crate::portfolio::{EquityPoint, PortfolioManager, PortfolioStats};

/// Fraction of available cash committed to a buy signal.
///
/// A deliberate simplification, not general position sizing.
const BUY_CASH_FRACTION: Decimal = Decimal::from_parts(95, 0, 0, false, 2);

/// Replay lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    Idle,
    WarmingUp,
    Running,
    ClosingPositions,
    Finalized,
}

/// The merged result of one backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    /// Portfolio statistics at the end of the replay.
    pub portfolio: PortfolioStats,
    /// The strategy's own tallies.
    pub strategy: StrategyStats,
    /// Metrics over the finished equity curve and trade list.
    pub performance: PerformanceReport,
    /// Bars processed after warm-up.
    pub candles_processed: usize,
    /// Full equity curve in replay order.
    pub equity_curve: Vec<EquityPoint>,
    /// Full trade history in execution order.
    pub trades: Vec<Trade>,
}

/// Event-driven backtest engine.
pub struct BacktestEngine<S: Strategy> {
    config: BacktestConfig,
    strategy: S,
    exchange: SimulatedExchange,
    portfolio: PortfolioManager,
    state: EngineState,
    current_time: Option<DateTime<Utc>>,
    candles_processed: usize,
}

impl<S: Strategy> BacktestEngine<S> {
    /// Create an engine around an injected strategy and configuration.
    pub fn new(strategy: S, config: BacktestConfig) -> Self {
        let exchange =
            SimulatedExchange::new(config.maker_fee, config.taker_fee, config.slippage_pct);
        let portfolio = PortfolioManager::with_leverage(config.initial_capital, config.leverage);

        Self {
            config,
            strategy,
            exchange,
            portfolio,
            state: EngineState::Idle,
            current_time: None,
            candles_processed: 0,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Replay cursor: timestamp of the bar being processed, if any.
    pub fn current_time(&self) -> Option<DateTime<Utc>> {
        self.current_time
    }

    /// The injected strategy.
    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Run the backtest over historical candles.
    ///
    /// Resets all collaborators, warms the strategy up on the first
    /// `warmup_candles` bars when enough data exists, replays the rest in
    /// order, force-closes open positions at the final close, and merges
    /// the result. Deterministic: identical inputs reproduce identical
    /// equity curves and trade lists.
    pub fn run(&mut self, candles: &[Candle]) -> Result<BacktestReport> {
        info!(
            strategy = self.strategy.name(),
            candles = candles.len(),
            "starting backtest"
        );

        self.reset();

        let warmup = self.config.warmup_candles;
        let start_idx = if candles.len() > warmup {
            self.state = EngineState::WarmingUp;
            self.strategy.initialize(&candles[..warmup]);
            warmup
        } else {
            0
        };

        self.state = EngineState::Running;
        for candle in &candles[start_idx..] {
            self.process_candle(candle)?;
        }

        self.state = EngineState::ClosingPositions;
        if let Some(last) = candles.last() {
            self.close_all_positions(last.close, last.time);
        }

        let report = self.build_report();
        self.state = EngineState::Finalized;

        info!(
            candles = self.candles_processed,
            total_return_pct = report.portfolio.total_return_pct,
            "backtest complete"
        );
        Ok(report)
    }

    /// Process a single candle through the full pipeline.
    fn process_candle(&mut self, candle: &Candle) -> Result<()> {
        self.current_time = Some(candle.time);
        self.candles_processed += 1;

        // 1. Match resting orders against this candle.
        let fills = self.exchange.match_orders(candle);

        // 2. Feed the fills into the ledger.
        for trade in fills {
            self.book_fill(&trade)?;
            self.portfolio.record_trade(trade);
        }

        // 3. Let the strategy observe the bar.
        if let Some(signal) = self.strategy.on_candle(candle) {
            self.process_signal(signal, candle)?;
        }

        // 4. Mark to market at the bar close.
        let mut prices = BTreeMap::new();
        prices.insert(candle.symbol.clone(), candle.close);
        self.portfolio.mark_to_market(candle.time, &prices);

        if self.candles_processed % 1000 == 0 {
            debug!(candles = self.candles_processed, "replay progress");
        }
        Ok(())
    }

    /// Open the ledger position backing a buy fill.
    ///
    /// Sell-side state changes go through the ledger directly, so only
    /// buy fills open positions here.
    fn book_fill(&mut self, trade: &Trade) -> Result<()> {
        if trade.side != OrderSide::Buy {
            return Ok(());
        }

        let (stop_loss, take_profit) = trade
            .order_id
            .and_then(|id| self.exchange.filled_order(&id))
            .map(|order| (order.stop_loss, order.take_profit))
            .unwrap_or((None, None));

        let opened = self.portfolio.open_position(
            trade.symbol.clone(),
            PositionSide::Long,
            trade.size,
            trade.price,
            stop_loss,
            take_profit,
            trade.executed_at,
        )?;
        if opened.is_none() {
            warn!(symbol = %trade.symbol, "buy fill could not be booked as a position");
        }
        Ok(())
    }

    /// Translate a strategy signal into an exchange or ledger action.
    fn process_signal(&mut self, signal: Signal, candle: &Candle) -> Result<()> {
        if signal.is_expired(candle.time) {
            debug!(symbol = %signal.symbol, "signal expired, dropping");
            return Ok(());
        }

        match signal.signal_type {
            SignalType::Buy => self.handle_buy_signal(&signal, candle)?,
            SignalType::Sell => self.handle_sell_signal(&signal, candle),
            SignalType::CloseLong => {
                self.handle_close_signal(&signal, PositionSide::Long, candle)
            }
            SignalType::CloseShort => {
                self.handle_close_signal(&signal, PositionSide::Short, candle)
            }
        }
        Ok(())
    }

    /// Route a buy signal into a market order sized from available cash.
    fn handle_buy_signal(&mut self, signal: &Signal, candle: &Candle) -> Result<()> {
        if self.portfolio.has_position(&signal.symbol) {
            debug!(symbol = %signal.symbol, "position already open, ignoring buy signal");
            return Ok(());
        }
        if signal.price <= Decimal::ZERO {
            warn!(symbol = %signal.symbol, "buy signal without a positive price, dropping");
            return Ok(());
        }

        let available = self.portfolio.cash() * BUY_CASH_FRACTION;
        let size = available / signal.price;
        if size <= Decimal::ZERO {
            warn!(symbol = %signal.symbol, "insufficient capital for buy signal");
            return Ok(());
        }

        let order = Order::market(
            signal.symbol.clone(),
            OrderSide::Buy,
            size,
            signal.stop_loss,
            signal.target_price,
            candle.time,
        )?;
        debug!(order_id = %order.id, %size, "placing buy order");
        self.exchange.place_order(order);
        Ok(())
    }

    /// A sell signal closes an existing long position at the signal price.
    ///
    /// Short entries are not modeled; sell means exit.
    fn handle_sell_signal(&mut self, signal: &Signal, candle: &Candle) {
        if signal.price <= Decimal::ZERO {
            warn!(symbol = %signal.symbol, "sell signal without a positive price, dropping");
            return;
        }
        let is_long = self
            .portfolio
            .position(&signal.symbol)
            .map_or(false, |p| p.side == PositionSide::Long);
        if is_long {
            self.portfolio
                .close_position(&signal.symbol, signal.price, candle.time);
        }
    }

    /// Close the matching open position at the bar close.
    fn handle_close_signal(&mut self, signal: &Signal, side: PositionSide, candle: &Candle) {
        let matches = self
            .portfolio
            .position(&signal.symbol)
            .map_or(false, |p| p.side == side);
        if matches {
            self.portfolio
                .close_position(&signal.symbol, candle.close, candle.time);
        } else {
            debug!(symbol = %signal.symbol, ?side, "no matching position for close signal");
        }
    }

    /// Force-close every open position at the end of the replay.
    fn close_all_positions(&mut self, final_price: Decimal, at: DateTime<Utc>) {
        for symbol in self.portfolio.open_symbols() {
            debug!(%symbol, "force-closing position at end of replay");
            self.portfolio.close_position(&symbol, final_price, at);
        }
    }

    fn build_report(&self) -> BacktestReport {
        // All positions are closed by now, so cash is the final equity.
        let performance = metrics::calculate_all(
            self.config.initial_capital,
            self.portfolio.cash(),
            self.portfolio.equity_curve(),
            self.portfolio.trades(),
            self.config.risk_free_rate,
            self.config.periods_per_year,
        );

        BacktestReport {
            portfolio: self.portfolio.stats(),
            strategy: self.strategy.performance_stats(),
            performance,
            candles_processed: self.candles_processed,
            equity_curve: self.portfolio.equity_curve().to_vec(),
            trades: self.portfolio.trades().to_vec(),
        }
    }

    /// Reset every collaborator and the replay cursor.
    fn reset(&mut self) {
        self.exchange.reset();
        self.portfolio.reset();
        self.strategy.reset();
        self.state = EngineState::Idle;
        self.current_time = None;
        self.candles_processed = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use replay_core::{Timeframe, TradingPair};
    use rust_decimal_macros::dec;

    fn btc_usdt() -> TradingPair {
        TradingPair::spot("BTC", "USDT").unwrap()
    }

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
    }

    /// Flat-price candle series, one per hour.
    fn make_candles(count: usize, close: Decimal) -> Vec<Candle> {
        (0..count)
            .map(|i| {
                Candle::new(
                    ts(i as u32),
                    btc_usdt(),
                    Timeframe::OneHour,
                    close,
                    close + dec!(100),
                    close - dec!(100),
                    close,
                    dec!(10),
                )
                .unwrap()
            })
            .collect()
    }

    /// Emits a scripted signal type at fixed bar indices.
    struct ScriptedStrategy {
        symbol: TradingPair,
        script: BTreeMap<usize, SignalType>,
        expire_immediately: bool,
        bars_seen: usize,
        warmup_seen: usize,
        signals_emitted: u32,
    }

    impl ScriptedStrategy {
        fn new(script: BTreeMap<usize, SignalType>) -> Self {
            Self {
                symbol: btc_usdt(),
                script,
                expire_immediately: false,
                bars_seen: 0,
                warmup_seen: 0,
                signals_emitted: 0,
            }
        }
    }

    impl Strategy for ScriptedStrategy {
        fn name(&self) -> &str {
            "scripted"
        }

        fn symbol(&self) -> &TradingPair {
            &self.symbol
        }

        fn timeframe(&self) -> Timeframe {
            Timeframe::OneHour
        }

        fn initialize(&mut self, warmup: &[Candle]) {
            self.warmup_seen = warmup.len();
        }

        fn on_candle(&mut self, candle: &Candle) -> Option<Signal> {
            let idx = self.bars_seen;
            self.bars_seen += 1;

            let signal_type = *self.script.get(&idx)?;
            self.signals_emitted += 1;
            Some(Signal {
                symbol: self.symbol.clone(),
                signal_type,
                price: candle.close,
                target_price: None,
                stop_loss: None,
                confidence: 1.0,
                strategy: "scripted".to_string(),
                timeframe: Timeframe::OneHour,
                expires_at: if self.expire_immediately {
                    Some(candle.time - chrono::Duration::hours(1))
                } else {
                    None
                },
            })
        }

        fn reset(&mut self) {
            self.bars_seen = 0;
            self.warmup_seen = 0;
            self.signals_emitted = 0;
        }

        fn performance_stats(&self) -> StrategyStats {
            StrategyStats {
                name: "scripted".to_string(),
                symbol: self.symbol.to_string(),
                timeframe: Timeframe::OneHour,
                total_signals: self.signals_emitted,
                winning_signals: 0,
                losing_signals: 0,
                win_rate_pct: 0.0,
            }
        }
    }

    fn no_warmup_config() -> BacktestConfig {
        BacktestConfig {
            warmup_candles: 0,
            slippage_pct: Decimal::ZERO,
            ..BacktestConfig::default()
        }
    }

    #[test]
    fn test_buy_fill_opens_position_next_bar() {
        let script = BTreeMap::from([(0, SignalType::Buy)]);
        let mut engine = BacktestEngine::new(ScriptedStrategy::new(script), no_warmup_config());

        let candles = make_candles(4, dec!(50000));
        let report = engine.run(&candles).unwrap();

        // Order placed on bar 0 fills on bar 1; force-close at the end.
        assert_eq!(report.candles_processed, 4);
        assert_eq!(report.trades.len(), 2);
        assert_eq!(report.trades[0].side, OrderSide::Buy);
        assert_eq!(report.trades[0].executed_at, ts(1));
        assert_eq!(report.trades[1].side, OrderSide::Sell);
        assert!(report.trades[1].realized_pnl.is_some());
        assert_eq!(report.portfolio.open_positions, 0);
        assert_eq!(report.portfolio.closed_positions, 1);
        assert_eq!(engine.state(), EngineState::Finalized);
        assert_eq!(engine.current_time(), Some(ts(3)));
    }

    #[test]
    fn test_sell_signal_closes_long_at_signal_price() {
        let script = BTreeMap::from([(0, SignalType::Buy), (3, SignalType::Sell)]);
        let mut engine = BacktestEngine::new(ScriptedStrategy::new(script), no_warmup_config());

        let candles = make_candles(6, dec!(50000));
        let report = engine.run(&candles).unwrap();

        // Buy fill plus the sell-signal close; nothing left to force-close.
        assert_eq!(report.trades.len(), 2);
        assert_eq!(report.trades[1].executed_at, ts(3));
        assert_eq!(report.portfolio.closed_positions, 1);
    }

    #[test]
    fn test_close_long_signal_uses_bar_close() {
        let script = BTreeMap::from([(0, SignalType::Buy), (2, SignalType::CloseLong)]);
        let mut engine = BacktestEngine::new(ScriptedStrategy::new(script), no_warmup_config());

        let report = engine.run(&make_candles(5, dec!(50000))).unwrap();
        assert_eq!(report.portfolio.closed_positions, 1);
        assert_eq!(report.trades[1].price, dec!(50000));
        assert_eq!(report.trades[1].executed_at, ts(2));
    }

    #[test]
    fn test_close_short_signal_without_short_is_ignored() {
        let script = BTreeMap::from([(0, SignalType::Buy), (2, SignalType::CloseShort)]);
        let mut engine = BacktestEngine::new(ScriptedStrategy::new(script), no_warmup_config());

        let report = engine.run(&make_candles(5, dec!(50000))).unwrap();
        // The long survives until the end-of-replay force-close.
        assert_eq!(report.trades[1].executed_at, ts(4));
    }

    #[test]
    fn test_repeated_buy_signals_are_ignored_while_position_open() {
        let script = BTreeMap::from([
            (0, SignalType::Buy),
            (2, SignalType::Buy),
            (3, SignalType::Buy),
        ]);
        let mut engine = BacktestEngine::new(ScriptedStrategy::new(script), no_warmup_config());

        let report = engine.run(&make_candles(6, dec!(50000))).unwrap();
        // One entry fill and one force-close, despite three buy signals.
        assert_eq!(report.trades.len(), 2);
        assert_eq!(report.strategy.total_signals, 3);
    }

    #[test]
    fn test_expired_signal_is_dropped() {
        let script = BTreeMap::from([(0, SignalType::Buy)]);
        let mut strategy = ScriptedStrategy::new(script);
        strategy.expire_immediately = true;
        let mut engine = BacktestEngine::new(strategy, no_warmup_config());

        let report = engine.run(&make_candles(4, dec!(50000))).unwrap();
        assert!(report.trades.is_empty());
        assert_eq!(report.portfolio.closed_positions, 0);
    }

    #[test]
    fn test_warmup_skips_leading_candles() {
        let script = BTreeMap::from([(0, SignalType::Buy)]);
        let config = BacktestConfig {
            warmup_candles: 3,
            ..no_warmup_config()
        };
        let mut engine = BacktestEngine::new(ScriptedStrategy::new(script), config);

        let report = engine.run(&make_candles(10, dec!(50000))).unwrap();
        assert_eq!(report.candles_processed, 7);
        assert_eq!(report.equity_curve.len(), 7);
        assert_eq!(engine.strategy().warmup_seen, 3);
        // The strategy's first bar is the one after warm-up.
        assert_eq!(report.trades[0].executed_at, ts(4));
    }

    #[test]
    fn test_short_input_runs_without_warmup() {
        let script = BTreeMap::from([(0, SignalType::Buy)]);
        let config = BacktestConfig {
            warmup_candles: 100,
            ..no_warmup_config()
        };
        let mut engine = BacktestEngine::new(ScriptedStrategy::new(script), config);

        let report = engine.run(&make_candles(5, dec!(50000))).unwrap();
        assert_eq!(report.candles_processed, 5);
    }

    #[test]
    fn test_empty_input() {
        let mut engine =
            BacktestEngine::new(ScriptedStrategy::new(BTreeMap::new()), no_warmup_config());
        let report = engine.run(&[]).unwrap();

        assert_eq!(report.candles_processed, 0);
        assert!(report.equity_curve.is_empty());
        assert!(report.trades.is_empty());
        assert_eq!(report.performance, PerformanceReport::default());
    }

    #[test]
    fn test_equity_conservation_through_round_trip() {
        let script = BTreeMap::from([(0, SignalType::Buy), (2, SignalType::Sell)]);
        let mut engine = BacktestEngine::new(ScriptedStrategy::new(script), no_warmup_config());

        // Flat prices and zero slippage: the round trip must conserve cash.
        let report = engine.run(&make_candles(4, dec!(50000))).unwrap();
        assert_eq!(report.portfolio.current_cash, dec!(10000));
        assert_eq!(report.portfolio.total_pnl, Decimal::ZERO);
    }

    #[test]
    fn test_determinism_across_runs() {
        let script = BTreeMap::from([
            (0, SignalType::Buy),
            (3, SignalType::Sell),
            (5, SignalType::Buy),
        ]);
        let mut engine = BacktestEngine::new(ScriptedStrategy::new(script), no_warmup_config());

        let mut candles = make_candles(8, dec!(50000));
        // Give the series some shape.
        for (i, candle) in candles.iter_mut().enumerate() {
            let drift = Decimal::from(i as u64 * 37);
            candle.close += drift;
            candle.high += drift;
            candle.low -= drift;
        }

        let first = engine.run(&candles).unwrap();
        let second = engine.run(&candles).unwrap();

        assert_eq!(first.equity_curve, second.equity_curve);
        let key = |trades: &[Trade]| {
            trades
                .iter()
                .map(|t| (t.symbol.clone(), t.side, t.price, t.size, t.commission, t.realized_pnl, t.executed_at))
                .collect::<Vec<_>>()
        };
        assert_eq!(key(&first.trades), key(&second.trades));
        assert_eq!(first.portfolio, second.portfolio);
        assert_eq!(first.performance, second.performance);
    }
}
