//! Simple moving average in decimal arithmetic.

use std::collections::VecDeque;

use rust_decimal::Decimal;

use crate::errors::EstimatorError;

#[derive(Debug, Clone)]
pub struct SimpleMovingAverage {
    values: VecDeque<Decimal>,
    sum: Decimal,
    window: usize,
}

impl SimpleMovingAverage {
    pub fn new(window: usize) -> Result<Self, EstimatorError> {
        if window < 1 {
            return Err(EstimatorError::InvalidWindow(window));
        }
        Ok(Self {
            values: VecDeque::with_capacity(window + 1),
            sum: Decimal::ZERO,
            window,
        })
    }

    pub fn add_value(&mut self, value: Decimal) {
        self.values.push_back(value);
        self.sum += value;
        while self.values.len() > self.window {
            if let Some(old) = self.values.pop_front() {
                self.sum -= old;
            }
        }
    }

    pub fn value(&self) -> Result<Decimal, EstimatorError> {
        if self.values.is_empty() {
            return Err(EstimatorError::EmptyWindow);
        }
        Ok(self.sum / Decimal::from(self.values.len()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}
