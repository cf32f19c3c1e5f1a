//! Exchange collaborators: the narrow interfaces the rebalancing core talks
//! to, and the Bitvavo REST implementation of them.

mod auth;
mod client;
mod types;

pub use client::BitvavoClient;

use rust_decimal::Decimal;

use crate::errors::Result;
use crate::models::{Balance, Candle, PriceSnapshot, Trade, TradeSide};

/// Read-only market data.
#[allow(async_fn_in_trait)]
pub trait MarketData {
    /// Latest price of every listed pair.
    async fn price_snapshot(&self) -> Result<PriceSnapshot>;

    /// Our balances per asset.
    async fn balances(&self) -> Result<Vec<Balance>>;

    /// Our most recent fills on a market, in no particular order.
    async fn recent_trades(&self, market: &str, limit: u32) -> Result<Vec<Trade>>;

    /// Most recent candles of a market, in no particular order.
    async fn recent_candles(&self, market: &str, interval: &str, limit: u32)
        -> Result<Vec<Candle>>;
}

/// Order submission.
#[allow(async_fn_in_trait)]
pub trait OrderExecutor {
    /// Place a market order for `amount` of base currency and return the
    /// exchange order id.
    async fn place_market_order(&self, market: &str, side: TradeSide, amount: Decimal)
        -> Result<String>;
}
