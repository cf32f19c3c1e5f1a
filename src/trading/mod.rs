//! Trading logic: valuation, threshold decisions and trend reports.

mod engine;
mod trend;
mod valuation;

pub use engine::{cost_basis_under_water, decide, Decision, DecisionEngine, PassSummary};
pub use trend::{trend_report, TrendReport};
pub use valuation::{under_water, Rating, UnderWater, Valuation};

#[cfg(test)]
pub(crate) use engine::tests as engine_tests;
