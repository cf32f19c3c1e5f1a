//! Several estimators of different window sizes over one price history.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::errors::EstimatorError;

use super::{Bandwidth, LogEma, SimpleMovingAverage};

struct Band {
    window: usize,
    ema: LogEma,
    sma: SimpleMovingAverage,
}

/// Reading of a single ribbon band.
#[derive(Debug, Clone, Serialize)]
pub struct BandReading {
    pub window: usize,
    pub ema: Decimal,
    pub ema_with_offset: Option<Decimal>,
    pub sma: Decimal,
    pub bandwidth: Bandwidth,
}

pub struct TrendRibbon {
    bands: Vec<Band>,
    prewarm: usize,
}

impl TrendRibbon {
    /// Create a ribbon with one band per window, sorted from short to long.
    pub fn new(windows: &[usize], prewarm: usize) -> Result<Self, EstimatorError> {
        if windows.is_empty() {
            return Err(EstimatorError::InvalidWindow(0));
        }

        let mut sorted = windows.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let bands = sorted
            .into_iter()
            .map(|window| {
                Ok(Band {
                    window,
                    ema: LogEma::new(window)?,
                    sma: SimpleMovingAverage::new(window)?,
                })
            })
            .collect::<Result<Vec<_>, EstimatorError>>()?;

        Ok(Self { bands, prewarm })
    }

    /// Number of historic observations needed to fill the widest band and
    /// warm up its offset.
    pub fn history_limit(&self) -> usize {
        self.bands.iter().map(|b| b.window).max().unwrap_or(0) + self.prewarm
    }

    pub fn add_value(&mut self, value: Decimal) -> Result<(), EstimatorError> {
        for band in &mut self.bands {
            band.ema.add_value(value)?;
            band.sma.add_value(value);
        }
        Ok(())
    }

    pub fn readings(&self) -> Result<Vec<BandReading>, EstimatorError> {
        self.bands
            .iter()
            .map(|band| {
                let ema_with_offset = match band.ema.value_with_offset() {
                    Ok(value) => Some(value),
                    Err(EstimatorError::InsufficientHistory) => None,
                    Err(e) => return Err(e),
                };
                Ok(BandReading {
                    window: band.window,
                    ema: band.ema.value()?,
                    ema_with_offset,
                    sma: band.sma.value()?,
                    bandwidth: band.ema.bandwidth()?,
                })
            })
            .collect()
    }
}
