//! Bot runner: repeats evaluation passes on a fixed interval until Ctrl+C.
//!
//! Every pass rebuilds the market book from scratch; the only state carried
//! across passes are the counters reported at shutdown.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::api::{MarketData, OrderExecutor};
use crate::trading::{DecisionEngine, PassSummary};

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Time between evaluation passes (seconds)
    pub interval_secs: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self { interval_secs: 300 }
    }
}

/// Main bot runner.
pub struct Bot<S> {
    config: BotConfig,
    engine: DecisionEngine<S>,
    stats: BotStats,
}

impl<S: MarketData + OrderExecutor> Bot<S> {
    pub fn new(config: BotConfig, engine: DecisionEngine<S>) -> Self {
        let stats = BotStats {
            started_at: Utc::now(),
            dry_run: engine.is_dry_run(),
            ..Default::default()
        };
        Self {
            config,
            engine,
            stats,
        }
    }

    /// Main run loop. A failed pass is logged and the next one still runs.
    pub async fn run(&mut self) {
        info!(
            dry_run = self.engine.is_dry_run(),
            interval = self.config.interval_secs,
            "Starting bot run loop"
        );

        let mut ticker = interval(Duration::from_secs(self.config.interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        info!(passes = self.stats.passes, "Bot stopped");
    }

    async fn tick(&mut self) {
        match self.engine.evaluate().await {
            Ok(summary) => self.stats.record(&summary),
            Err(e) => {
                self.stats.failed_passes += 1;
                error!(error = %e, "Evaluation pass failed");
            }
        }
    }

    pub fn stats(&self) -> &BotStats {
        &self.stats
    }
}

/// Counters over all passes of a bot session.
#[derive(Debug, Clone, Default)]
pub struct BotStats {
    pub started_at: DateTime<Utc>,
    pub passes: u64,
    pub failed_passes: u64,
    pub decisions: u64,
    pub orders_placed: u64,
    pub dry_run: bool,
}

impl BotStats {
    fn record(&mut self, summary: &PassSummary) {
        self.passes += 1;
        self.decisions += summary.decisions as u64;
        self.orders_placed += summary.orders_placed as u64;
    }
}

impl std::fmt::Display for BotStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Bot Statistics ===")?;
        writeln!(f, "Started:         {}", self.started_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
        writeln!(f, "Passes:          {} (Failed: {})", self.passes, self.failed_passes)?;
        writeln!(f, "Decisions:       {}", self.decisions)?;
        writeln!(f, "Orders Placed:   {}", self.orders_placed)?;
        writeln!(f, "Mode:            {}", if self.dry_run { "Dry Run" } else { "Live" })?;
        Ok(())
    }
}
