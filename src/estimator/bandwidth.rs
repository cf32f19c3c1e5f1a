//! Observed price range of an estimator window.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

/// Min/max of the raw observations in a window and the current estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Bandwidth {
    pub min: Decimal,
    pub max: Decimal,
    pub current: Decimal,
}

impl Bandwidth {
    /// How far (in percent) the window minimum lies below the estimate.
    pub fn min_percent(&self) -> Decimal {
        match self.min.checked_div(self.current) {
            Some(ratio) => dec!(100) - ratio * dec!(100),
            None => Decimal::ZERO,
        }
    }

    /// How far (in percent) the estimate lies below the window maximum.
    pub fn max_percent(&self) -> Decimal {
        match self.current.checked_div(self.max) {
            Some(ratio) => dec!(100) - ratio * dec!(100),
            None => Decimal::ZERO,
        }
    }
}
