//! Data models for markets, trades, candles, balances and trade rates.

mod candle;
mod market;
mod rate;
mod trade;

pub use candle::{sort_chronologically, Candle};
pub use market::{build_market, market_name, Market, MarketBook, MarketPair, PriceSnapshot, Thresholds};
pub use rate::RateAccumulator;
pub use trade::{Balance, Trade, TradeSide};
