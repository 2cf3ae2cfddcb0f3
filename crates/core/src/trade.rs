//! Trade entity: the immutable record of a fill.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::order::OrderSide;
use crate::types::TradingPair;

/// An executed trade. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Opaque identity.
    pub id: Uuid,
    /// Order that produced the fill, when one exists.
    pub order_id: Option<Uuid>,
    /// Instrument traded.
    pub symbol: TradingPair,
    /// Buy or sell.
    pub side: OrderSide,
    /// Execution price, always positive.
    pub price: Decimal,
    /// Executed size, always positive.
    pub size: Decimal,
    /// Commission charged in the commission asset.
    pub commission: Decimal,
    /// Asset the commission is denominated in.
    pub commission_asset: String,
    /// Realized P&L; set only when the trade closes a position.
    pub realized_pnl: Option<Decimal>,
    /// Execution timestamp.
    pub executed_at: DateTime<Utc>,
}

impl Trade {
    /// Default commission asset.
    pub const DEFAULT_COMMISSION_ASSET: &'static str = "USDT";

    /// Create a trade, rejecting non-positive price or size.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        order_id: Option<Uuid>,
        symbol: TradingPair,
        side: OrderSide,
        price: Decimal,
        size: Decimal,
        commission: Decimal,
        executed_at: DateTime<Utc>,
    ) -> Result<Self> {
        if price <= Decimal::ZERO {
            return Err(Error::validation("trade price must be positive"));
        }
        if size <= Decimal::ZERO {
            return Err(Error::validation("trade size must be positive"));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            order_id,
            symbol,
            side,
            price,
            size,
            commission,
            commission_asset: Self::DEFAULT_COMMISSION_ASSET.to_string(),
            realized_pnl: None,
            executed_at,
        })
    }

    /// Attach the realized P&L of a position-closing trade.
    pub fn with_realized_pnl(mut self, pnl: Decimal) -> Self {
        self.realized_pnl = Some(pnl);
        self
    }

    /// Gross value, `size * price`.
    pub fn notional_value(&self) -> Decimal {
        self.size * self.price
    }

    /// Notional minus commission.
    pub fn net_value(&self) -> Decimal {
        self.notional_value() - self.commission
    }

    /// Whether the trade is a buy.
    pub fn is_buy(&self) -> bool {
        self.side == OrderSide::Buy
    }

    /// Whether the trade is a sell.
    pub fn is_sell(&self) -> bool {
        self.side == OrderSide::Sell
    }
}
