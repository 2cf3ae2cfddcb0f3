//! Position entity and P&L tracking.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::TradingPair;

/// Position side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
}

/// Position status. Closing is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closed,
}

/// An open or archived trading position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Opaque identity.
    pub id: Uuid,
    /// Instrument held.
    pub symbol: TradingPair,
    /// Long or short.
    pub side: PositionSide,
    /// Position size in base asset, always positive.
    pub size: Decimal,
    /// Entry price.
    pub entry_price: Decimal,
    /// Latest mark price.
    pub current_price: Decimal,
    /// Protective stop, if set.
    pub stop_loss: Option<Decimal>,
    /// Profit target, if set.
    pub take_profit: Option<Decimal>,
    /// P&L at the current mark price; zeroed on close.
    pub unrealized_pnl: Decimal,
    /// P&L frozen on close.
    pub realized_pnl: Decimal,
    /// Open or closed.
    pub status: PositionStatus,
    /// When the position was opened.
    pub opened_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
    /// Set on close.
    pub closed_at: Option<DateTime<Utc>>,
}

impl Position {
    /// Open a new position.
    pub fn new(
        symbol: TradingPair,
        side: PositionSide,
        size: Decimal,
        entry_price: Decimal,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
        at: DateTime<Utc>,
    ) -> Result<Self> {
        if size <= Decimal::ZERO {
            return Err(Error::validation("position size must be positive"));
        }
        if entry_price <= Decimal::ZERO {
            return Err(Error::validation("entry price must be positive"));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            symbol,
            side,
            size,
            entry_price,
            current_price: entry_price,
            stop_loss,
            take_profit,
            unrealized_pnl: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            status: PositionStatus::Open,
            opened_at: at,
            updated_at: at,
            closed_at: None,
        })
    }

    /// P&L at the given price.
    ///
    /// Long: `(price - entry) * size`. Short: `(entry - price) * size`.
    pub fn pnl_at(&self, price: Decimal) -> Decimal {
        match self.side {
            PositionSide::Long => (price - self.entry_price) * self.size,
            PositionSide::Short => (self.entry_price - price) * self.size,
        }
    }

    /// P&L at the given price as a fraction of the invested notional.
    pub fn pnl_fraction(&self, price: Decimal) -> Decimal {
        self.pnl_at(price) / (self.entry_price * self.size)
    }

    /// Re-mark the position and refresh unrealized P&L.
    pub fn update_price(&mut self, price: Decimal, at: DateTime<Utc>) {
        self.current_price = price;
        self.unrealized_pnl = self.pnl_at(price);
        self.updated_at = at;
    }

    /// Whether the protective stop is hit at the given price.
    pub fn is_stop_loss_hit(&self, price: Decimal) -> bool {
        match (self.side, self.stop_loss) {
            (PositionSide::Long, Some(stop)) => price <= stop,
            (PositionSide::Short, Some(stop)) => price >= stop,
            _ => false,
        }
    }

    /// Whether the profit target is hit at the given price.
    pub fn is_take_profit_hit(&self, price: Decimal) -> bool {
        match (self.side, self.take_profit) {
            (PositionSide::Long, Some(target)) => price >= target,
            (PositionSide::Short, Some(target)) => price <= target,
            _ => false,
        }
    }

    /// Close the position: freeze realized P&L, zero unrealized P&L.
    ///
    /// Terminal; a closed position is archived, never reopened.
    pub fn close(&mut self, close_price: Decimal, realized_pnl: Decimal, at: DateTime<Utc>) {
        self.status = PositionStatus::Closed;
        self.current_price = close_price;
        self.realized_pnl = realized_pnl;
        self.unrealized_pnl = Decimal::ZERO;
        self.closed_at = Some(at);
        self.updated_at = at;
    }

    /// Whether the position is open.
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Whether the position has been closed.
    pub fn is_closed(&self) -> bool {
        self.status == PositionStatus::Closed
    }

    /// Gross value at the current mark price.
    pub fn notional_value(&self) -> Decimal {
        self.size * self.current_price
    }

    /// Gross value at the entry price.
    pub fn entry_notional(&self) -> Decimal {
        self.size * self.entry_price
    }

    /// Holding time; runs until `now` while the position is open.
    pub fn holding_time(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.closed_at.unwrap_or(now) - self.opened_at
    }
}
