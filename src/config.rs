//! Configuration loader.
//!
//! Settings are read once at startup from a TOML file and are read-only
//! afterwards. Exchange credentials are not part of this file; they come
//! from the environment.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::errors::Error;
use crate::estimator::Window;

const ENV_CONFIG_PATH: &str = "REBALANCER_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "./rebalancer.toml";

const DEFAULT_FIAT: &str = "EUR";
const DEFAULT_INTERVAL: &str = "1d";
const DEFAULT_WINDOW: usize = 42;
/// A bit more than four years of day candles.
const DEFAULT_UNBOUNDED_LIMIT: u32 = 1500;

/// What to do when a single market fails during an evaluation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketErrorPolicy {
    /// Abort the whole pass on the first failing market
    #[default]
    Abort,
    /// Log the failure and continue with the next market
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraderConfig {
    /// Quote currency every primary market is traded against
    #[serde(default = "default_fiat")]
    pub fiat: String,

    /// Submit real orders; when false decisions are only logged
    #[serde(default)]
    pub active_mode: bool,

    #[serde(default)]
    pub debug: bool,

    /// Smallest order value the exchange accepts, in fiat
    #[serde(default = "default_min_order_notional")]
    pub min_order_notional: Decimal,

    /// Skip buys while the price is below our average cost basis
    #[serde(default)]
    pub block_underwater_buys: bool,

    #[serde(default)]
    pub on_market_error: MarketErrorPolicy,

    /// Per-symbol settings keyed by base symbol
    #[serde(default)]
    pub markets: BTreeMap<String, MarketConfig>,
}

fn default_fiat() -> String {
    DEFAULT_FIAT.to_string()
}

fn default_min_order_notional() -> Decimal {
    dec!(5)
}

impl Default for TraderConfig {
    fn default() -> Self {
        Self {
            fiat: default_fiat(),
            active_mode: false,
            debug: false,
            min_order_notional: default_min_order_notional(),
            block_underwater_buys: false,
            on_market_error: MarketErrorPolicy::default(),
            markets: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Buy when holdings are worth less than this, in fiat (0 disables)
    #[serde(default)]
    pub min: Decimal,

    /// Sell when holdings are worth more than this, in fiat (0 disables)
    #[serde(default)]
    pub max: Decimal,

    /// Number of our own recent trades used for the average rate (0 disables)
    #[serde(default)]
    pub rate_window: u32,

    #[serde(default)]
    pub ema: Option<EstimatorConfig>,

    #[serde(default)]
    pub ribbon: Option<RibbonConfig>,

    /// Overrides the global `block_underwater_buys` for this market
    #[serde(default)]
    pub block_underwater_buys: Option<bool>,
}

impl MarketConfig {
    /// Per-market checks. A failing market is skipped, the others still run.
    pub fn validate(&self, symbol: &str) -> crate::errors::Result<()> {
        if self.min < Decimal::ZERO || self.max < Decimal::ZERO {
            return Err(Error::Configuration(format!(
                "market {} has negative thresholds",
                symbol
            )));
        }
        if self.min > Decimal::ZERO && self.max > Decimal::ZERO && self.min > self.max {
            return Err(Error::Configuration(format!(
                "market {}: min {} is above max {}",
                symbol, self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Estimator table as written in the file. Missing keys get defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EstimatorConfig {
    pub interval: Option<String>,
    /// Window size; `0` selects the unbounded window
    pub window: Option<usize>,
    /// Number of historic candles to seed the estimator with
    pub limit: Option<u32>,
}

/// Estimator settings with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EstimatorSettings {
    pub interval: String,
    pub window: Window,
    pub history_sample_size: u32,
}

impl EstimatorConfig {
    pub fn settings(&self) -> EstimatorSettings {
        let interval = self
            .interval
            .clone()
            .filter(|i| !i.is_empty())
            .unwrap_or_else(|| DEFAULT_INTERVAL.to_string());

        let window = match self.window {
            Some(0) => Window::Unbounded,
            Some(w) => Window::Bounded(w),
            None => Window::Bounded(DEFAULT_WINDOW),
        };

        let history_sample_size = match (self.limit, window) {
            (Some(limit), _) if limit > 0 => limit,
            (_, Window::Bounded(w)) => (2 * w).min(u32::MAX as usize) as u32,
            (_, Window::Unbounded) => DEFAULT_UNBOUNDED_LIMIT,
        };

        EstimatorSettings {
            interval,
            window,
            history_sample_size,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RibbonConfig {
    #[serde(default = "default_interval")]
    pub timeframe: String,

    pub windows: Vec<usize>,

    /// Extra candles beyond the widest window, used to warm up offsets
    #[serde(default)]
    pub prewarm: usize,
}

fn default_interval() -> String {
    DEFAULT_INTERVAL.to_string()
}

impl TraderConfig {
    /// Pick the config path: explicit argument, environment, then default.
    pub fn resolve_path(explicit: Option<PathBuf>) -> PathBuf {
        explicit
            .or_else(|| std::env::var_os(ENV_CONFIG_PATH).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_toml(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: TraderConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> crate::errors::Result<()> {
        if self.fiat.trim().is_empty() {
            return Err(Error::Configuration("fiat symbol is empty".to_string()));
        }
        if self.min_order_notional < Decimal::ZERO {
            return Err(Error::Configuration(
                "min_order_notional cannot be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Settings for a base symbol.
    pub fn market(&self, symbol: &str) -> crate::errors::Result<&MarketConfig> {
        self.markets
            .get(symbol)
            .ok_or_else(|| Error::Configuration(format!("market {} is not configured", symbol)))
    }
}
