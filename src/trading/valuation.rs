//! Advisory price valuation against the trend estimate and our cost basis.

use std::fmt;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    /// Price is below the expected value
    Under,
    /// Price is at or above the expected value
    Over,
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rating::Under => write!(f, "under-rated"),
            Rating::Over => write!(f, "over-rated"),
        }
    }
}

/// Price compared to the estimator's expected value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Valuation {
    pub rating: Rating,
    pub price: Decimal,
    pub expected: Decimal,
    /// Deviation in percent, relative to the larger of both values
    pub percent: Decimal,
}

impl Valuation {
    pub fn assess(price: Decimal, expected: Decimal) -> Self {
        let rating = if expected > price {
            Rating::Under
        } else {
            Rating::Over
        };

        let low = price.min(expected);
        let high = price.max(expected);
        let percent = low
            .checked_div(high)
            .map(|ratio| dec!(100) * (Decimal::ONE - ratio))
            .unwrap_or(Decimal::ZERO);

        Self {
            rating,
            price,
            expected,
            percent,
        }
    }
}

/// Price below our average cost basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UnderWater {
    pub average: Decimal,
    pub price: Decimal,
    pub percent: Decimal,
}

/// Check whether `price` is below the average rate we paid.
pub fn under_water(average: Decimal, price: Decimal) -> Option<UnderWater> {
    if average <= price || average <= Decimal::ZERO {
        return None;
    }
    Some(UnderWater {
        average,
        price,
        percent: dec!(100) * (average - price) / average,
    })
}
