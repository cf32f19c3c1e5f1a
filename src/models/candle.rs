//! OHLCV candles used to seed the trend estimators.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    /// Mean of open, high, low and close.
    pub fn average(&self) -> Decimal {
        (self.open + self.high + self.low + self.close) / dec!(4)
    }
}

/// Sort candles oldest-first. The exchange returns them newest-first.
pub fn sort_chronologically(candles: &mut [Candle]) {
    candles.sort_by_key(|c| c.timestamp);
}
