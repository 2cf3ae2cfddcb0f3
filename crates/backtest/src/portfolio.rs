//! Portfolio ledger: cash, positions, trades, and the equity curve.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use replay_core::{
    Error, OrderSide, Position, PositionSide, Result, Trade, TradingPair,
};

/// One sample of the equity curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    /// Sample timestamp.
    pub time: DateTime<Utc>,
    /// Total equity: cash plus unrealized P&L of open positions.
    pub equity: Decimal,
}

/// Portfolio statistics for the merged backtest report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioStats {
    /// Starting capital.
    pub initial_capital: Decimal,
    /// Cash at the time of the snapshot.
    pub current_cash: Decimal,
    /// Sum of realized P&L over all closed positions.
    pub total_pnl: Decimal,
    /// Total P&L over starting capital, as a percentage.
    pub total_return_pct: f64,
    /// Open positions at the time of the snapshot.
    pub open_positions: usize,
    /// Positions closed over the run.
    pub closed_positions: usize,
    /// Trades recorded over the run.
    pub total_trades: usize,
    /// Worst peak-to-trough equity decline, as a percentage.
    pub max_drawdown_pct: f64,
}

/// Manages portfolio state during a backtest.
///
/// Exclusively owns the canonical position and trade collections and the
/// running cash balance. Positions are keyed by instrument; at most one
/// open position per instrument is permitted.
pub struct PortfolioManager {
    initial_capital: Decimal,
    leverage: Decimal,
    cash: Decimal,
    positions: BTreeMap<TradingPair, Position>,
    closed_positions: Vec<Position>,
    trades: Vec<Trade>,
    equity_curve: Vec<EquityPoint>,
    peak_equity: Decimal,
    max_drawdown: Decimal,
}

impl PortfolioManager {
    /// Create a portfolio with 1x leverage.
    pub fn new(initial_capital: Decimal) -> Self {
        Self::with_leverage(initial_capital, Decimal::ONE)
    }

    /// Create a portfolio with the given leverage.
    pub fn with_leverage(initial_capital: Decimal, leverage: Decimal) -> Self {
        Self {
            initial_capital,
            leverage,
            cash: initial_capital,
            positions: BTreeMap::new(),
            closed_positions: Vec::new(),
            trades: Vec::new(),
            equity_curve: Vec::new(),
            peak_equity: initial_capital,
            max_drawdown: Decimal::ZERO,
        }
    }

    /// Open a new position, debiting `notional / leverage` from cash.
    ///
    /// Returns `Ok(None)` without touching any state when funds are
    /// insufficient or a position is already open for the instrument;
    /// both are expected outcomes, not errors. `Err` is reserved for
    /// invalid entity parameters.
    #[allow(clippy::too_many_arguments)]
    pub fn open_position(
        &mut self,
        symbol: TradingPair,
        side: PositionSide,
        size: Decimal,
        entry_price: Decimal,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
        at: DateTime<Utc>,
    ) -> Result<Option<Position>> {
        if self.positions.contains_key(&symbol) {
            warn!(%symbol, "position already open, not opening another");
            return Ok(None);
        }
        if self.leverage <= Decimal::ZERO {
            return Err(Error::config("leverage must be positive"));
        }

        let position = Position::new(symbol.clone(), side, size, entry_price, stop_loss, take_profit, at)?;
        let required_capital = position.entry_notional() / self.leverage;

        if required_capital > self.cash {
            warn!(
                %symbol,
                required = %required_capital,
                available = %self.cash,
                "insufficient funds to open position"
            );
            return Ok(None);
        }

        self.cash -= required_capital;
        info!(%symbol, ?side, %size, %entry_price, "opened position");
        self.positions.insert(symbol, position.clone());
        Ok(Some(position))
    }

    /// Close the open position for an instrument at the given price.
    ///
    /// Credits `notional / leverage` plus realized P&L back to cash,
    /// archives the position, and records a closing trade carrying the
    /// realized P&L. Returns `None` when no open position exists.
    pub fn close_position(
        &mut self,
        symbol: &TradingPair,
        close_price: Decimal,
        at: DateTime<Utc>,
    ) -> Option<Position> {
        let mut position = match self.positions.remove(symbol) {
            Some(p) => p,
            None => {
                warn!(%symbol, "no open position to close");
                return None;
            }
        };

        let realized_pnl = position.pnl_at(close_price);
        position.close(close_price, realized_pnl, at);

        let returned_capital = position.entry_notional() / self.leverage;
        self.cash += returned_capital + realized_pnl;

        let closing_side = match position.side {
            PositionSide::Long => OrderSide::Sell,
            PositionSide::Short => OrderSide::Buy,
        };
        self.trades.push(Trade {
            id: Uuid::new_v4(),
            order_id: None,
            symbol: symbol.clone(),
            side: closing_side,
            price: close_price,
            size: position.size,
            commission: Decimal::ZERO,
            commission_asset: Trade::DEFAULT_COMMISSION_ASSET.to_string(),
            realized_pnl: Some(realized_pnl),
            executed_at: at,
        });

        info!(%symbol, %close_price, pnl = %realized_pnl, cash = %self.cash, "closed position");
        self.closed_positions.push(position.clone());
        Some(position)
    }

    /// Record a trade produced by the matching engine.
    pub fn record_trade(&mut self, trade: Trade) {
        self.trades.push(trade);
    }

    /// Re-mark open positions, append an equity sample, and update the
    /// running peak and maximum drawdown.
    pub fn mark_to_market(
        &mut self,
        time: DateTime<Utc>,
        prices: &BTreeMap<TradingPair, Decimal>,
    ) -> EquityPoint {
        let mut equity = self.cash;
        for position in self.positions.values_mut() {
            if let Some(&price) = prices.get(&position.symbol) {
                position.update_price(price, time);
            }
            equity += position.unrealized_pnl;
        }

        let point = EquityPoint { time, equity };
        self.equity_curve.push(point);

        if equity > self.peak_equity {
            self.peak_equity = equity;
        }
        if self.peak_equity > Decimal::ZERO {
            let drawdown = (self.peak_equity - equity) / self.peak_equity;
            if drawdown > self.max_drawdown {
                self.max_drawdown = drawdown;
            }
        }
        point
    }

    /// Open position for an instrument, if any.
    pub fn position(&self, symbol: &TradingPair) -> Option<&Position> {
        self.positions.get(symbol)
    }

    /// Whether an open position exists for the instrument.
    pub fn has_position(&self, symbol: &TradingPair) -> bool {
        self.positions.contains_key(symbol)
    }

    /// Instruments with an open position, in deterministic order.
    pub fn open_symbols(&self) -> Vec<TradingPair> {
        self.positions.keys().cloned().collect()
    }

    /// Current cash balance.
    pub fn cash(&self) -> Decimal {
        self.cash
    }

    /// Sum of realized P&L over all closed positions.
    pub fn total_pnl(&self) -> Decimal {
        self.closed_positions.iter().map(|p| p.realized_pnl).sum()
    }

    /// The equity curve recorded so far.
    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }

    /// All recorded trades.
    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    /// Worst peak-to-trough drawdown seen so far, as a fraction.
    pub fn max_drawdown(&self) -> Decimal {
        self.max_drawdown
    }

    /// Portfolio statistics snapshot.
    pub fn stats(&self) -> PortfolioStats {
        let total_pnl = self.total_pnl();
        let total_return_pct = if self.initial_capital > Decimal::ZERO {
            (total_pnl / self.initial_capital * Decimal::ONE_HUNDRED)
                .to_f64()
                .unwrap_or(0.0)
        } else {
            0.0
        };

        PortfolioStats {
            initial_capital: self.initial_capital,
            current_cash: self.cash,
            total_pnl,
            total_return_pct,
            open_positions: self.positions.len(),
            closed_positions: self.closed_positions.len(),
            total_trades: self.trades.len(),
            max_drawdown_pct: (self.max_drawdown * Decimal::ONE_HUNDRED)
                .to_f64()
                .unwrap_or(0.0),
        }
    }

    /// Reset the portfolio to its initial state.
    pub fn reset(&mut self) {
        self.cash = self.initial_capital;
        self.positions.clear();
        self.closed_positions.clear();
        self.trades.clear();
        self.equity_curve.clear();
        self.peak_equity = self.initial_capital;
        self.max_drawdown = Decimal::ZERO;
    }
}
