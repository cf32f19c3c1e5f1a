//! Trade and balance records as returned by the exchange.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a trade or order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
        }
    }

    /// Parse the exchange's side notation, case-insensitively.
    pub fn parse(side: &str) -> Option<Self> {
        match side.to_lowercase().as_str() {
            "buy" => Some(TradeSide::Buy),
            "sell" => Some(TradeSide::Sell),
            _ => None,
        }
    }
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of our own fills on a market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    /// Exchange trade identifier
    pub id: String,

    /// Market name, e.g. `BTC-EUR`
    pub market: String,

    pub side: TradeSide,

    /// Amount in base currency
    pub amount: Decimal,

    /// Price in quote currency per unit of base
    pub price: Decimal,

    pub timestamp: DateTime<Utc>,
}

impl Trade {
    /// Value of the trade in quote currency.
    pub fn quote_amount(&self) -> Decimal {
        self.amount * self.price
    }
}

/// Holdings of a single asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub symbol: String,
    pub available: Decimal,
    pub in_order: Decimal,
}

impl Balance {
    pub fn total(&self) -> Decimal {
        self.available + self.in_order
    }
}
