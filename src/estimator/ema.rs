//! Log-space sliding-window average with lag correction.
//!
//! Prices behave roughly log-normally, so observations are averaged as
//! logarithms and exponentiated back. The average only covers past values
//! and therefore trails the current price; the offset tracks the mean
//! log-residual between each new observation and the window average once the
//! window is full, and adding it back gives a better real-time estimate.
//!
//! This is the only place where the crate leaves decimal arithmetic.

use std::collections::VecDeque;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use crate::errors::EstimatorError;

use super::Bandwidth;

/// Running sum and count of log values.
#[derive(Debug, Clone, Copy, Default)]
struct LogMean {
    sum: f64,
    count: usize,
}

impl LogMean {
    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn remove(&mut self, value: f64) {
        if self.count > 0 {
            self.sum -= value;
            self.count -= 1;
        }
    }

    fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        Some(self.sum / self.count as f64)
    }
}

#[derive(Debug, Clone, Copy)]
struct Observation {
    raw: Decimal,
    log: f64,
}

/// Number of observations an estimator retains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    Bounded(usize),
    /// Keeps every observation. The offset is never populated in this mode.
    Unbounded,
}

/// Rolling estimator over the most recent `window` observations.
#[derive(Debug, Clone)]
pub struct LogEma {
    window: Window,
    value: LogMean,
    offset: LogMean,
    history: VecDeque<Observation>,
}

impl LogEma {
    /// Create a bounded estimator. A window of zero is rejected.
    pub fn new(window: usize) -> Result<Self, EstimatorError> {
        if window < 1 {
            return Err(EstimatorError::InvalidWindow(window));
        }
        Ok(Self::with_window(Window::Bounded(window)))
    }

    /// Create an estimator that never evicts observations.
    pub fn unbounded() -> Self {
        Self::with_window(Window::Unbounded)
    }

    fn with_window(window: Window) -> Self {
        let capacity = match window {
            Window::Bounded(w) => w + 1,
            Window::Unbounded => 0,
        };
        Self {
            window,
            value: LogMean::default(),
            offset: LogMean::default(),
            history: VecDeque::with_capacity(capacity),
        }
    }

    pub fn window(&self) -> Window {
        self.window
    }

    /// Number of observations currently retained.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Whether the offset statistic has been sampled at least once.
    pub fn has_offset(&self) -> bool {
        self.offset.count > 0
    }

    /// Record an observation. Values must be strictly positive.
    pub fn add_value(&mut self, value: Decimal) -> Result<(), EstimatorError> {
        if value <= Decimal::ZERO {
            return Err(EstimatorError::NonPositiveObservation(value));
        }
        let log = value
            .to_f64()
            .ok_or(EstimatorError::NonPositiveObservation(value))?
            .ln();

        self.value.add(log);
        self.history.push_back(Observation { raw: value, log });

        if let Window::Bounded(window) = self.window {
            while self.history.len() > window {
                if let Some(evicted) = self.history.pop_front() {
                    self.value.remove(evicted.log);
                }
            }
            if self.history.len() == window {
                if let Some(mean) = self.value.mean() {
                    self.offset.add(log - mean);
                }
            }
        }
        Ok(())
    }

    /// Mean of the log observations in the window.
    pub fn log_value(&self) -> Result<f64, EstimatorError> {
        self.value.mean().ok_or(EstimatorError::EmptyWindow)
    }

    /// Mean log-residual of new observations against the full window.
    pub fn log_offset(&self) -> Result<f64, EstimatorError> {
        self.offset.mean().ok_or(EstimatorError::InsufficientHistory)
    }

    /// `exp(mean(log(v)))` over the window.
    pub fn value(&self) -> Result<Decimal, EstimatorError> {
        to_decimal(self.log_value()?.exp())
    }

    /// Window value corrected by the trailing offset.
    pub fn value_with_offset(&self) -> Result<Decimal, EstimatorError> {
        let exp = self.log_value()?;
        let offset = self.log_offset()?;
        to_decimal((exp + offset).exp())
    }

    /// Raw min/max of the retained observations plus the current estimate.
    ///
    /// The current estimate is offset-corrected once an offset exists and
    /// falls back to the plain window value before that.
    pub fn bandwidth(&self) -> Result<Bandwidth, EstimatorError> {
        let first = self.history.front().ok_or(EstimatorError::EmptyWindow)?;
        let (min, max) = self
            .history
            .iter()
            .fold((first.raw, first.raw), |(min, max), obs| {
                (min.min(obs.raw), max.max(obs.raw))
            });

        let current = match self.value_with_offset() {
            Ok(value) => value,
            Err(EstimatorError::InsufficientHistory) => self.value()?,
            Err(e) => return Err(e),
        };

        Ok(Bandwidth { min, max, current })
    }
}

fn to_decimal(value: f64) -> Result<Decimal, EstimatorError> {
    Decimal::from_f64(value).ok_or(EstimatorError::NotRepresentable(value))
}
