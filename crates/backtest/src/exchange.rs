//! Simulated exchange: fills resting orders against historical candles.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;
use uuid::Uuid;

use replay_core::{Candle, Order, OrderSide, OrderStatus, OrderType, Trade, TradingPair};

/// Simulates exchange behavior for backtesting.
///
/// Owns only the set of not-yet-filled orders. Resting orders are kept in
/// insertion order, so matching a fixed candle against a fixed resting set
/// always produces the same trades in the same order.
pub struct SimulatedExchange {
    maker_fee: Decimal,
    taker_fee: Decimal,
    slippage_pct: Decimal,
    pending: Vec<Order>,
    filled: Vec<Order>,
    trades: Vec<Trade>,
}

impl SimulatedExchange {
    /// Create a simulated exchange with the given fee and slippage knobs.
    pub fn new(maker_fee: Decimal, taker_fee: Decimal, slippage_pct: Decimal) -> Self {
        Self {
            maker_fee,
            taker_fee,
            slippage_pct,
            pending: Vec::new(),
            filled: Vec::new(),
            trades: Vec::new(),
        }
    }

    /// Accept an order into the resting set.
    pub fn place_order(&mut self, mut order: Order) -> bool {
        let at = order.created_at;
        order.update_status(OrderStatus::Open, at);
        debug!(order_id = %order.id, symbol = %order.symbol, "placed order");
        self.pending.push(order);
        true
    }

    /// Cancel a resting order. Returns false when the id is unknown.
    pub fn cancel_order(&mut self, order_id: &Uuid, at: DateTime<Utc>) -> bool {
        match self.pending.iter().position(|o| o.id == *order_id) {
            Some(idx) => {
                let mut order = self.pending.remove(idx);
                order.update_status(OrderStatus::Cancelled, at);
                debug!(order_id = %order.id, "cancelled order");
                true
            }
            None => false,
        }
    }

    /// Match resting orders against one candle, returning the fills.
    ///
    /// Each order is evaluated independently; an order either fully fills
    /// on this candle or rests unchanged. Filled orders move to the filled
    /// history.
    pub fn match_orders(&mut self, candle: &Candle) -> Vec<Trade> {
        let mut fills = Vec::new();
        let mut still_pending = Vec::with_capacity(self.pending.len());

        for mut order in std::mem::take(&mut self.pending) {
            if order.symbol != candle.symbol {
                still_pending.push(order);
                continue;
            }
            match self.fill_price(&order, candle) {
                Some(price) => {
                    let trade = self.create_trade(&order, price, candle.time);
                    let size = order.size;
                    order.record_fill(size, price, candle.time);
                    debug!(order_id = %order.id, %price, "filled order");
                    self.trades.push(trade.clone());
                    fills.push(trade);
                    self.filled.push(order);
                }
                None => still_pending.push(order),
            }
        }

        self.pending = still_pending;
        fills
    }

    /// Determine whether an order fills on this candle, and at what price.
    fn fill_price(&self, order: &Order, candle: &Candle) -> Option<Decimal> {
        match order.order_type {
            OrderType::Market => {
                // Market orders fill at the close, moved adversely by slippage.
                let slippage = candle.close * self.slippage_pct;
                match order.side {
                    OrderSide::Buy => Some(candle.close + slippage),
                    OrderSide::Sell => Some(candle.close - slippage),
                }
            }
            OrderType::Limit => {
                let limit = order.price?;
                match order.side {
                    // Buy limit: fills at the limit when the bar trades down to it.
                    OrderSide::Buy if candle.low <= limit => Some(limit),
                    // Sell limit: fills at the limit when the bar trades up to it.
                    OrderSide::Sell if candle.high >= limit => Some(limit),
                    _ => None,
                }
            }
            // Stop, take-profit, and OCO orders are never filled here.
            _ => None,
        }
    }

    fn create_trade(&self, order: &Order, fill_price: Decimal, executed_at: DateTime<Utc>) -> Trade {
        let notional = order.size * fill_price;
        // Taker fee for market orders, maker fee for limit orders.
        let fee_rate = if order.order_type == OrderType::Market {
            self.taker_fee
        } else {
            self.maker_fee
        };

        Trade {
            id: Uuid::new_v4(),
            order_id: Some(order.id),
            symbol: order.symbol.clone(),
            side: order.side,
            price: fill_price,
            size: order.size,
            commission: notional * fee_rate,
            commission_asset: Trade::DEFAULT_COMMISSION_ASSET.to_string(),
            realized_pnl: None,
            executed_at,
        }
    }

    /// Resting orders, optionally filtered by symbol.
    pub fn pending_orders(&self, symbol: Option<&TradingPair>) -> Vec<&Order> {
        self.pending
            .iter()
            .filter(|o| symbol.map_or(true, |s| o.symbol == *s))
            .collect()
    }

    /// Look up an order in the filled history.
    pub fn filled_order(&self, order_id: &Uuid) -> Option<&Order> {
        self.filled.iter().find(|o| o.id == *order_id)
    }

    /// All trades executed so far.
    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    /// Drop all exchange state.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.filled.clear();
        self.trades.clear();
    }
}
