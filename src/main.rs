//! Trend Rebalancer
//!
//! Keeps exchange holdings between configured fiat-valued thresholds and
//! logs how the current price compares to a log-space moving-average trend.

mod api;
mod bot;
mod config;
mod errors;
mod estimator;
mod models;
mod trading;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::api::{BitvavoClient, MarketData};
use crate::bot::{Bot, BotConfig};
use crate::config::TraderConfig;
use crate::models::market_name;
use crate::trading::{trend_report, DecisionEngine};

/// Threshold rebalancing bot for Bitvavo.
#[derive(Parser)]
#[command(name = "rebalancer")]
#[command(about = "Rebalance exchange holdings around configured thresholds", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, env = "REBALANCER_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single evaluation pass
    Evaluate {
        /// Log decisions without placing orders
        #[arg(long)]
        dry_run: bool,
    },

    /// Evaluate repeatedly until Ctrl+C
    Run {
        /// Seconds between passes
        #[arg(short, long, default_value = "300")]
        interval: u64,

        /// Log decisions without placing orders
        #[arg(long)]
        dry_run: bool,
    },

    /// Show balances and their fiat value
    Balances,

    /// Show trend ribbon readings for a symbol
    Trend {
        /// Base symbol, e.g. BTC
        symbol: String,
    },

    /// Show the loaded configuration
    Config,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config_path = TraderConfig::resolve_path(cli.config.clone());
    let config = TraderConfig::load(&config_path)?;

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ if config.debug => Level::DEBUG,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!(path = %config_path.display(), markets = config.markets.len(), "Configuration loaded");

    match cli.command {
        Commands::Evaluate { dry_run } => {
            let engine = build_engine(config, dry_run).await?;
            let summary = engine.evaluate().await?;
            println!("{}", summary);
        }

        Commands::Run { interval, dry_run } => {
            let engine = build_engine(config, dry_run).await?;

            println!("\n=== Trend Rebalancer ===");
            println!("Interval: {}s", interval);
            println!(
                "Mode:     {}",
                if engine.is_dry_run() { "DRY RUN (no real orders)" } else { "LIVE TRADING" }
            );
            println!("Markets:  {}", engine.config().markets.len());
            println!("\nPress Ctrl+C to stop.\n");

            let mut bot = Bot::new(BotConfig { interval_secs: interval }, engine);
            bot.run().await;

            println!("\n{}", bot.stats());
        }

        Commands::Balances => {
            let client = BitvavoClient::from_env()?;
            let prices = client.price_snapshot().await?;
            let balances = client.balances().await?;

            println!(
                "\n{:<8} {:>18} {:>18} {:>14}",
                "SYMBOL", "AVAILABLE", "IN ORDER", config.fiat
            );
            println!("{}", "-".repeat(61));

            let mut total = Decimal::ZERO;
            for balance in balances {
                let value = if balance.symbol == config.fiat {
                    Some(balance.total())
                } else {
                    prices
                        .get(&market_name(&balance.symbol, &config.fiat))
                        .map(|price| *price * balance.total())
                };
                total += value.unwrap_or(Decimal::ZERO);

                println!(
                    "{:<8} {:>18} {:>18} {:>14}",
                    balance.symbol,
                    balance.available.normalize(),
                    balance.in_order.normalize(),
                    value
                        .map(|v| v.round_dp(2).to_string())
                        .unwrap_or_else(|| "-".to_string())
                );
            }

            println!("{}", "-".repeat(61));
            println!("{:<8} {:>52}", "TOTAL", total.round_dp(2));
        }

        Commands::Trend { symbol } => {
            let client = BitvavoClient::public()?;
            let symbol = symbol.to_uppercase();
            let report = trend_report(&client, &config, &symbol).await?;

            println!("\n=== {} ({}, {} candles) ===", report.market, report.interval, report.candles);
            if let Some(price) = report.price {
                println!("Price: {}", price);
            }

            println!(
                "\n{:>6} {:>16} {:>16} {:>16} {:>9} {:>9}",
                "WINDOW", "EMA", "EMA+OFFSET", "SMA", "MIN%", "MAX%"
            );
            println!("{}", "-".repeat(77));
            for band in &report.bands {
                println!(
                    "{:>6} {:>16} {:>16} {:>16} {:>9} {:>9}",
                    band.window,
                    band.ema.round_dp(8),
                    band.ema_with_offset
                        .map(|v| v.round_dp(8).to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    band.sma.round_dp(8),
                    band.bandwidth.min_percent().round_dp(2),
                    band.bandwidth.max_percent().round_dp(2),
                );
            }
        }

        Commands::Config => {
            println!("# {}", config_path.display());
            let rendered = toml::to_string_pretty(&config).context("Failed to render config")?;
            println!("{}", rendered);
        }
    }

    Ok(())
}

/// Signed client plus engine. `--dry-run` can only disable execution.
async fn build_engine(config: TraderConfig, dry_run: bool) -> Result<DecisionEngine<BitvavoClient>> {
    let mut client = BitvavoClient::from_env()?;
    client.load_assets().await?;

    let mut engine = DecisionEngine::new(config, client);
    if dry_run {
        engine.set_dry_run(true);
    }
    if engine.is_dry_run() {
        warn!("Execution disabled, decisions are only logged");
    }
    Ok(engine)
}
