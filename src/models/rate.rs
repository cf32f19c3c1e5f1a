//! Net average exchange rate of our own buy/sell flow.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::errors::RateError;

use super::{Trade, TradeSide};

/// Cumulative base (`from`) and quote (`to`) amounts of our trades.
///
/// Buys add to both totals and sells subtract from them, so the average is
/// the cost basis of the inventory that is still held.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RateAccumulator {
    pub cumulative_from: Decimal,
    pub cumulative_to: Decimal,
}

impl RateAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay trades oldest-first.
    pub fn from_trades(mut trades: Vec<Trade>) -> Self {
        trades.sort_by_key(|t| t.timestamp);
        let mut rate = Self::new();
        for trade in &trades {
            rate.record(trade);
        }
        rate
    }

    pub fn record(&mut self, trade: &Trade) {
        self.record_trade(trade.side, trade.amount, trade.quote_amount());
    }

    pub fn record_trade(&mut self, side: TradeSide, base_amount: Decimal, quote_amount: Decimal) {
        match side {
            TradeSide::Buy => {
                self.cumulative_from += base_amount;
                self.cumulative_to += quote_amount;
            }
            TradeSide::Sell => {
                self.cumulative_from -= base_amount;
                self.cumulative_to -= quote_amount;
            }
        }
    }

    /// Average price paid per unit of base currency.
    pub fn average(&self) -> Result<Decimal, RateError> {
        if self.cumulative_from.is_zero() {
            return Err(RateError::NoTrades);
        }
        Ok(self.cumulative_to / self.cumulative_from)
    }
}
