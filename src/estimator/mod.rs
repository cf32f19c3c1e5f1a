//! Trend estimators: log-space moving average, simple moving average,
//! bandwidth readings and multi-window ribbons.

mod bandwidth;
mod ema;
mod ribbon;
mod sma;

pub use bandwidth::Bandwidth;
pub use ema::{LogEma, Window};
pub use ribbon::{BandReading, TrendRibbon};
pub use sma::SimpleMovingAverage;
