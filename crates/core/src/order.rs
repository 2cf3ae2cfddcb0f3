//! Order entity and fill lifecycle.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::TradingPair;

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Order type.
///
/// Only market and limit orders are filled by the simulated exchange;
/// the remaining variants are declared for venue-side order types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    StopLoss,
    TakeProfit,
    /// One-cancels-other bracket.
    Oco,
}

/// Order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Expired,
}

/// Order entity.
///
/// Identity lives in `id`; order parameters are fixed at construction
/// while status and fill tracking mutate over the lifecycle
/// `Pending -> Open -> {PartiallyFilled -> Filled | Filled}` or a
/// terminal `Cancelled`/`Rejected`/`Expired`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Opaque identity.
    pub id: Uuid,
    /// Instrument the order trades.
    pub symbol: TradingPair,
    /// Buy or sell.
    pub side: OrderSide,
    /// Market, limit, or a declared-but-unsimulated type.
    pub order_type: OrderType,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// Limit price; `None` for market orders.
    pub price: Option<Decimal>,
    /// Trigger price for stop-style orders.
    pub stop_price: Option<Decimal>,
    /// Order size in base asset, always positive.
    pub size: Decimal,
    /// Protective stop attached to the resulting position.
    pub stop_loss: Option<Decimal>,
    /// Profit target attached to the resulting position.
    pub take_profit: Option<Decimal>,
    /// Cumulative filled size.
    pub filled_size: Decimal,
    /// Size-weighted average fill price.
    pub average_fill_price: Option<Decimal>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
    /// Set when the order reaches `Filled`.
    pub filled_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Create a market order.
    pub fn market(
        symbol: TradingPair,
        side: OrderSide,
        size: Decimal,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
        at: DateTime<Utc>,
    ) -> Result<Self> {
        Self::build(symbol, side, OrderType::Market, None, size, stop_loss, take_profit, at)
    }

    /// Create a limit order.
    pub fn limit(
        symbol: TradingPair,
        side: OrderSide,
        price: Decimal,
        size: Decimal,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
        at: DateTime<Utc>,
    ) -> Result<Self> {
        if price <= Decimal::ZERO {
            return Err(Error::validation("limit price must be positive"));
        }
        Self::build(
            symbol,
            side,
            OrderType::Limit,
            Some(price),
            size,
            stop_loss,
            take_profit,
            at,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        symbol: TradingPair,
        side: OrderSide,
        order_type: OrderType,
        price: Option<Decimal>,
        size: Decimal,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
        at: DateTime<Utc>,
    ) -> Result<Self> {
        if size <= Decimal::ZERO {
            return Err(Error::validation("order size must be positive"));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            symbol,
            side,
            order_type,
            status: OrderStatus::Pending,
            price,
            stop_price: None,
            size,
            stop_loss,
            take_profit,
            filled_size: Decimal::ZERO,
            average_fill_price: None,
            created_at: at,
            updated_at: at,
            filled_at: None,
        })
    }

    /// Move the order to a new status.
    pub fn update_status(&mut self, status: OrderStatus, at: DateTime<Utc>) {
        self.status = status;
        self.updated_at = at;
        if status == OrderStatus::Filled {
            self.filled_at = Some(at);
        }
    }

    /// Record a fill, accumulating the size-weighted average price.
    ///
    /// The order becomes `Filled` exactly when the cumulative filled size
    /// reaches the order size, `PartiallyFilled` otherwise.
    pub fn record_fill(&mut self, size: Decimal, price: Decimal, at: DateTime<Utc>) {
        match self.average_fill_price {
            None => {
                self.average_fill_price = Some(price);
                self.filled_size = size;
            }
            Some(avg) => {
                let total_value = self.filled_size * avg + size * price;
                self.filled_size += size;
                self.average_fill_price = Some(total_value / self.filled_size);
            }
        }
        self.updated_at = at;

        if self.filled_size >= self.size {
            self.update_status(OrderStatus::Filled, at);
        } else if self.filled_size > Decimal::ZERO {
            self.update_status(OrderStatus::PartiallyFilled, at);
        }
    }

    /// Whether the order is completely filled.
    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Filled
    }

    /// Whether the order can still fill.
    pub fn is_open(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::Pending | OrderStatus::Open | OrderStatus::PartiallyFilled
        )
    }

    /// Whether the order is in a terminal state.
    pub fn is_closed(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::Filled
                | OrderStatus::Cancelled
                | OrderStatus::Rejected
                | OrderStatus::Expired
        )
    }

    /// Unfilled remainder.
    pub fn remaining_size(&self) -> Decimal {
        self.size - self.filled_size
    }

    /// Gross value at the fill price, falling back to the limit price.
    ///
    /// `None` for an unfilled market order, which has no price yet.
    pub fn notional_value(&self) -> Option<Decimal> {
        self.average_fill_price.or(self.price).map(|p| self.size * p)
    }
}
