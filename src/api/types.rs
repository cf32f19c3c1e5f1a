//! Wire types of the Bitvavo REST API.
//!
//! Bitvavo sends every number as a string; conversion into decimals happens
//! here so that malformed values surface as conversion errors.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{parse_decimal, Result};
use crate::models::{Balance, Candle, Trade, TradeSide};

/// Entry of `GET /ticker/price`.
#[derive(Debug, Clone, Deserialize)]
pub struct TickerPrice {
    pub market: String,
    #[serde(default)]
    pub price: Option<String>,
}

/// Entry of `GET /balance`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub symbol: String,
    pub available: String,
    pub in_order: String,
}

impl BalanceResponse {
    pub fn into_balance(self) -> Result<Balance> {
        Ok(Balance {
            available: parse_decimal(&self.available)?,
            in_order: parse_decimal(&self.in_order)?,
            symbol: self.symbol,
        })
    }
}

/// Entry of `GET /assets`.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetResponse {
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    pub decimals: u32,
}

/// Entry of `GET /trades`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeResponse {
    pub id: String,
    #[serde(default)]
    pub order_id: String,
    pub timestamp: i64,
    pub market: String,
    pub side: String,
    pub amount: String,
    pub price: String,
}

impl TradeResponse {
    /// Convert into a trade. Unknown sides and timestamps are skipped.
    pub fn into_trade(self) -> Result<Option<Trade>> {
        let Some(side) = TradeSide::parse(&self.side) else {
            warn!(side = %self.side, id = %self.id, "Unknown trade side");
            return Ok(None);
        };
        let Some(timestamp) = millis_to_datetime(self.timestamp) else {
            warn!(timestamp = self.timestamp, id = %self.id, "Invalid trade timestamp");
            return Ok(None);
        };

        Ok(Some(Trade {
            amount: parse_decimal(&self.amount)?,
            price: parse_decimal(&self.price)?,
            id: self.id,
            market: self.market,
            side,
            timestamp,
        }))
    }
}

/// Entry of `GET /{market}/candles`: `[timestamp, open, high, low, close, volume]`.
pub type CandleResponse = (i64, String, String, String, String, String);

pub fn candle_from_response(raw: CandleResponse) -> Result<Option<Candle>> {
    let (ts, open, high, low, close, volume) = raw;
    let Some(timestamp) = millis_to_datetime(ts) else {
        warn!(timestamp = ts, "Invalid candle timestamp");
        return Ok(None);
    };
    Ok(Some(Candle {
        timestamp,
        open: parse_decimal(&open)?,
        high: parse_decimal(&high)?,
        low: parse_decimal(&low)?,
        close: parse_decimal(&close)?,
        volume: parse_decimal(&volume)?,
    }))
}

/// Body of `POST /order`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    pub market: String,
    pub side: TradeSide,
    pub order_type: String,
    pub amount: String,
    pub client_order_id: String,
}

/// Response of `POST /order`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: String,
    #[serde(default)]
    pub market: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub filled_amount: Option<String>,
    #[serde(default)]
    pub filled_amount_quote: Option<String>,
}

/// Error body returned with non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error_code: i64,
    pub error: String,
}

fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}
