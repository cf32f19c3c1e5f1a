//! Error taxonomy for market construction, estimation and order placement.

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised by the rolling estimators.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EstimatorError {
    #[error("estimator window is empty")]
    EmptyWindow,
    #[error("estimator window has not been filled yet, no offset available")]
    InsufficientHistory,
    #[error("invalid estimator window size {0}")]
    InvalidWindow(usize),
    #[error("observation {0} is not positive")]
    NonPositiveObservation(Decimal),
    #[error("estimate {0} cannot be represented as a decimal")]
    NotRepresentable(f64),
}

/// Errors raised by the trade rate accumulator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateError {
    #[error("cannot calculate average rate without registered trades")]
    NoTrades,
}

/// Main error type for the rebalancing core.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("cannot convert `{value}` to decimal: {source}")]
    Conversion {
        value: String,
        #[source]
        source: rust_decimal::Error,
    },

    #[error("cannot invert market {0} when the price is zero")]
    ZeroPrice(String),

    #[error("could not find price for market {0}")]
    PriceNotFound(String),

    #[error(transparent)]
    Estimator(#[from] EstimatorError),

    #[error(transparent)]
    Rate(#[from] RateError),

    #[error("order placement failed for {market}: {source}")]
    Execution {
        market: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("transport error: {0:#}")]
    Transport(#[source] anyhow::Error),
}

impl Error {
    /// True for the expected "not enough data yet" conditions, which callers
    /// may skip over and continue with threshold-only logic.
    pub fn is_insufficient_data(&self) -> bool {
        matches!(
            self,
            Error::Estimator(EstimatorError::EmptyWindow)
                | Error::Estimator(EstimatorError::InsufficientHistory)
                | Error::Rate(RateError::NoTrades)
        )
    }

    /// Errors that only invalidate a single market rather than the whole pass.
    pub fn is_market_scoped(&self) -> bool {
        matches!(
            self,
            Error::Conversion { .. } | Error::ZeroPrice(_) | Error::PriceNotFound(_)
        ) || self.is_insufficient_data()
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Parse a decimal string coming from a collaborator.
pub fn parse_decimal(value: &str) -> Result<Decimal> {
    value.trim().parse::<Decimal>().map_err(|source| Error::Conversion {
        value: value.to_string(),
        source,
    })
}
