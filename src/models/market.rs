//! Market model: a tradable pair together with its algebraic inverse.
//!
//! Both directions live in a [`MarketBook`] keyed by pair name; each market
//! refers to its counterpart by name, so there is exactly one mutable copy of
//! either side.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::Serialize;

use crate::errors::{Error, Result};
use crate::estimator::LogEma;

use super::RateAccumulator;

/// Latest price per pair name, e.g. `BTC-EUR`.
pub type PriceSnapshot = HashMap<String, Decimal>;

/// Format a pair name from base and quote symbols.
pub fn market_name(from: &str, to: &str) -> String {
    format!("{}-{}", from, to)
}

/// Inventory limits of a pair, expressed in quote currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Buy when holdings drop below this value (zero disables)
    pub min: Decimal,
    /// Sell when holdings exceed this value (zero disables)
    pub max: Decimal,
    /// Smallest order value the exchange accepts
    pub min_order_notional: Decimal,
}

/// One direction of a tradable pair.
#[derive(Debug, Clone, Serialize)]
pub struct Market {
    /// Base symbol
    pub from: String,

    /// Quote symbol
    pub to: String,

    /// Free balance in base currency
    pub available: Decimal,

    /// Balance locked in open orders, in base currency
    pub in_order: Decimal,

    /// Price of one unit of base in quote currency
    pub price: Decimal,

    /// Lower inventory threshold in base currency
    pub min: Decimal,

    /// Upper inventory threshold in base currency
    pub max: Decimal,

    /// Minimum order value in quote currency
    pub min_order_notional: Decimal,

    #[serde(skip)]
    pub estimator: Option<LogEma>,

    pub rate: RateAccumulator,

    #[serde(skip)]
    inverse: String,
}

impl Market {
    pub fn name(&self) -> String {
        market_name(&self.from, &self.to)
    }

    /// Name of the counterpart market in the owning book.
    pub fn inverse_name(&self) -> &str {
        &self.inverse
    }

    pub fn total(&self) -> Decimal {
        self.available + self.in_order
    }

    /// Convert an amount of base currency into quote currency.
    pub fn exchange(&self, amount: Decimal) -> Decimal {
        self.price * amount
    }

    /// Smallest order size in base currency the exchange will accept.
    pub fn minimum_order_amount(&self) -> Decimal {
        self.min_order_notional
            .checked_div(self.price)
            .unwrap_or(Decimal::ZERO)
    }

    /// Round an order amount up to the exchange minimum.
    pub fn clamp_order_amount(&self, amount: Decimal) -> Decimal {
        amount.max(self.minimum_order_amount())
    }
}

/// Both directions of a pair, produced together.
#[derive(Debug, Clone)]
pub struct MarketPair {
    pub direct: Market,
    pub inverse: Market,
}

/// Build the `base-quote` market and its inverse from a price snapshot.
///
/// The inverse uses `1/price` and carries balances converted into quote
/// currency. Thresholds are given in quote currency; the inverse keeps them
/// as-is and the direct side receives them divided by `price`.
pub fn build_market(
    base: &str,
    quote: &str,
    available: Decimal,
    in_order: Decimal,
    thresholds: Thresholds,
    prices: &PriceSnapshot,
) -> Result<MarketPair> {
    let name = market_name(base, quote);
    let price = *prices
        .get(&name)
        .ok_or_else(|| Error::PriceNotFound(name.clone()))?;
    if price.is_zero() {
        return Err(Error::ZeroPrice(name));
    }
    let inverse_name = market_name(quote, base);

    let mut inverse = Market {
        from: quote.to_string(),
        to: base.to_string(),
        available: price * available,
        in_order: price * in_order,
        price: Decimal::ONE / price,
        min: thresholds.min,
        max: thresholds.max,
        min_order_notional: Decimal::ZERO,
        estimator: None,
        rate: RateAccumulator::default(),
        inverse: name.clone(),
    };
    inverse.min_order_notional = inverse.exchange(thresholds.min_order_notional);

    let direct = Market {
        from: base.to_string(),
        to: quote.to_string(),
        available,
        in_order,
        price,
        min: thresholds.min / price,
        max: thresholds.max / price,
        min_order_notional: thresholds.min_order_notional,
        estimator: None,
        rate: RateAccumulator::default(),
        inverse: inverse_name,
    };

    Ok(MarketPair { direct, inverse })
}

/// Owning collection of markets, iterated in lexical order of pair name.
#[derive(Debug, Clone, Default)]
pub struct MarketBook {
    markets: BTreeMap<String, Market>,
}

impl MarketBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert both directions of a pair at once.
    pub fn insert(&mut self, pair: MarketPair) {
        self.markets.insert(pair.direct.name(), pair.direct);
        self.markets.insert(pair.inverse.name(), pair.inverse);
    }

    pub fn get(&self, name: &str) -> Option<&Market> {
        self.markets.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Market> {
        self.markets.get_mut(name)
    }

    pub fn inverse_of(&self, market: &Market) -> Option<&Market> {
        self.markets.get(market.inverse_name())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Market> {
        self.markets.values()
    }

    pub fn len(&self) -> usize {
        self.markets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }
}
