//! Trend ribbon readings for a single market.

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use crate::api::MarketData;
use crate::config::{MarketConfig, TraderConfig};
use crate::errors::{Error, Result};
use crate::estimator::{BandReading, TrendRibbon, Window};
use crate::models::{market_name, sort_chronologically};

#[derive(Debug, Clone, Serialize)]
pub struct TrendReport {
    pub market: String,
    pub interval: String,
    pub candles: usize,
    pub price: Option<Decimal>,
    pub bands: Vec<BandReading>,
}

/// Ribbon windows, timeframe and prewarm for a market. Without a ribbon
/// table the estimator window is used as a single band.
fn ribbon_settings(market: &MarketConfig) -> Result<(Vec<usize>, String, usize)> {
    if let Some(ribbon) = &market.ribbon {
        return Ok((ribbon.windows.clone(), ribbon.timeframe.clone(), ribbon.prewarm));
    }

    let settings = market.ema.clone().unwrap_or_default().settings();
    match settings.window {
        Window::Bounded(window) => Ok((vec![window], settings.interval, window)),
        Window::Unbounded => Err(Error::Configuration(
            "trend ribbon needs a bounded window".to_string(),
        )),
    }
}

/// Build a ribbon from recent candles of `symbol` against the fiat.
pub async fn trend_report<S: MarketData>(
    exchange: &S,
    config: &TraderConfig,
    symbol: &str,
) -> Result<TrendReport> {
    let market_config = config.market(symbol)?;
    let (windows, interval, prewarm) = ribbon_settings(market_config)?;
    let mut ribbon = TrendRibbon::new(&windows, prewarm)?;

    let market = market_name(symbol, &config.fiat);
    let limit = u32::try_from(ribbon.history_limit()).unwrap_or(u32::MAX);
    let mut candles = exchange.recent_candles(&market, &interval, limit).await?;
    sort_chronologically(&mut candles);

    for candle in &candles {
        let value = candle.average();
        if value > Decimal::ZERO {
            ribbon.add_value(value)?;
        }
    }
    debug!(market = %market, candles = candles.len(), "Ribbon seeded");

    let price = exchange.price_snapshot().await?.get(&market).copied();

    Ok(TrendReport {
        market,
        interval,
        candles: candles.len(),
        price,
        bands: ribbon.readings()?,
    })
}
