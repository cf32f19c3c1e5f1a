//! Decision engine: rebuilds the market book from exchange data, decides
//! buy/sell amounts against inventory thresholds and submits the orders.

use std::collections::HashMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::api::{MarketData, OrderExecutor};
use crate::config::{EstimatorConfig, MarketConfig, MarketErrorPolicy, TraderConfig};
use crate::errors::{Error, Result};
use crate::estimator::{LogEma, Window};
use crate::models::{
    build_market, market_name, sort_chronologically, Balance, Market, MarketBook, MarketPair,
    PriceSnapshot, RateAccumulator, Thresholds, TradeSide,
};

use super::valuation::{under_water, UnderWater, Valuation};

/// An order the engine wants to place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub market: String,
    pub side: TradeSide,
    /// Order size in base currency, at least the exchange minimum
    pub amount: Decimal,
    /// Size needed to reach the threshold, before rounding up
    pub requested: Decimal,
}

impl Decision {
    fn new(market: &Market, side: TradeSide, requested: Decimal) -> Self {
        Self {
            market: market.name(),
            side,
            amount: market.clamp_order_amount(requested),
            requested,
        }
    }
}

/// Position of the market price relative to our average cost basis.
pub fn cost_basis_under_water(market: &Market) -> Option<UnderWater> {
    let average = market.rate.average().ok()?;
    under_water(average, market.price)
}

/// Threshold decision for a single market.
///
/// `counterpart` is the inverse market, which keeps the limits in this
/// market's quote currency. Holdings are valued in that currency before
/// comparing, so a position worth exactly a limit never trades.
///
/// Sells take precedence over buys. When `block_underwater_buys` is set, buys
/// are suppressed while the price is below our average cost basis.
pub fn decide(
    market: &Market,
    counterpart: &Market,
    block_underwater_buys: bool,
) -> Option<Decision> {
    let total = market.total();
    let value = market.exchange(total);

    if counterpart.max > Decimal::ZERO && value > counterpart.max {
        let requested = total - market.max;
        if requested > Decimal::ZERO {
            return Some(Decision::new(market, TradeSide::Sell, requested));
        }
    }

    if counterpart.min > Decimal::ZERO && value < counterpart.min {
        let requested = market.min - total;
        if requested <= Decimal::ZERO {
            return None;
        }
        if block_underwater_buys {
            if let Some(uw) = cost_basis_under_water(market) {
                info!(
                    market = %market.name(),
                    average = %uw.average,
                    price = %uw.price,
                    "Buy blocked, market is under water"
                );
                return None;
            }
        }
        return Some(Decision::new(market, TradeSide::Buy, requested));
    }

    None
}

/// Outcome of one evaluation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Primary markets considered
    pub markets: usize,
    pub decisions: usize,
    pub orders_placed: usize,
    /// Decisions only logged because execution is disabled
    pub dry_run: usize,
}

impl fmt::Display for PassSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} markets, {} decisions, {} orders placed, {} dry-run",
            self.markets, self.decisions, self.orders_placed, self.dry_run
        )
    }
}

pub struct DecisionEngine<S> {
    config: TraderConfig,
    exchange: S,
    dry_run: bool,
}

impl<S: MarketData + OrderExecutor> DecisionEngine<S> {
    /// Create an engine. Execution is disabled unless `active_mode` is set.
    pub fn new(config: TraderConfig, exchange: S) -> Self {
        let dry_run = !config.active_mode;
        Self {
            config,
            exchange,
            dry_run,
        }
    }

    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.dry_run = dry_run;
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn config(&self) -> &TraderConfig {
        &self.config
    }

    pub fn exchange(&self) -> &S {
        &self.exchange
    }

    /// Build both directions of every configured market from fresh prices
    /// and balances. Configured symbols we hold nothing of start at zero.
    pub async fn load_markets(&self) -> Result<MarketBook> {
        let prices = self.exchange.price_snapshot().await?;
        let balances: HashMap<String, Balance> = self
            .exchange
            .balances()
            .await?
            .into_iter()
            .map(|b| (b.symbol.clone(), b))
            .collect();

        for symbol in balances.keys() {
            if *symbol != self.config.fiat && !self.config.markets.contains_key(symbol) {
                debug!(symbol = %symbol, "Balance without market config, skipping");
            }
        }

        let mut book = MarketBook::new();
        for (symbol, market_config) in &self.config.markets {
            if *symbol == self.config.fiat {
                continue;
            }
            if let Err(e) = market_config.validate(symbol) {
                warn!(symbol = %symbol, error = %e, "Invalid market config, skipping");
                continue;
            }
            let (available, in_order) = balances
                .get(symbol)
                .map(|b| (b.available, b.in_order))
                .unwrap_or((Decimal::ZERO, Decimal::ZERO));

            match self
                .load_market(symbol, available, in_order, market_config, &prices)
                .await
            {
                Ok(pair) => book.insert(pair),
                Err(e)
                    if self.config.on_market_error == MarketErrorPolicy::Skip
                        && e.is_market_scoped() =>
                {
                    warn!(symbol = %symbol, error = %e, "Skipping market");
                }
                Err(e) => return Err(e),
            }
        }

        debug!(markets = book.len(), "Market book loaded");
        Ok(book)
    }

    async fn load_market(
        &self,
        symbol: &str,
        available: Decimal,
        in_order: Decimal,
        market_config: &MarketConfig,
        prices: &PriceSnapshot,
    ) -> Result<MarketPair> {
        let thresholds = Thresholds {
            min: market_config.min,
            max: market_config.max,
            min_order_notional: self.config.min_order_notional,
        };
        let mut pair = build_market(
            symbol,
            &self.config.fiat,
            available,
            in_order,
            thresholds,
            prices,
        )?;

        let name = market_name(symbol, &self.config.fiat);
        if let Some(ema) = &market_config.ema {
            pair.direct.estimator = Some(self.load_estimator(&name, ema).await?);
        }
        if market_config.rate_window > 0 {
            let trades = self
                .exchange
                .recent_trades(&name, market_config.rate_window)
                .await?;
            pair.direct.rate = RateAccumulator::from_trades(trades);
        }

        Ok(pair)
    }

    /// Seed an estimator with the OHLC averages of recent candles.
    async fn load_estimator(&self, market: &str, ema: &EstimatorConfig) -> Result<LogEma> {
        let settings = ema.settings();
        let mut estimator = match settings.window {
            Window::Bounded(window) => LogEma::new(window)?,
            Window::Unbounded => {
                warn!(market = %market, "Unbounded estimator window, offset will not be available");
                LogEma::unbounded()
            }
        };

        let mut candles = self
            .exchange
            .recent_candles(market, &settings.interval, settings.history_sample_size)
            .await?;
        sort_chronologically(&mut candles);

        for candle in &candles {
            let value = candle.average();
            if value <= Decimal::ZERO {
                warn!(market = %market, timestamp = %candle.timestamp, "Skipping non-positive candle");
                continue;
            }
            estimator.add_value(value)?;
        }

        debug!(
            market = %market,
            candles = candles.len(),
            interval = %settings.interval,
            "Estimator seeded"
        );
        Ok(estimator)
    }

    /// Decide on every primary market of the book, in lexical order.
    pub fn plan(&self, book: &MarketBook) -> Vec<Decision> {
        book.iter()
            .filter(|market| market.to == self.config.fiat)
            .filter_map(|market| {
                self.log_valuation(market);
                let counterpart = book.inverse_of(market)?;
                decide(market, counterpart, self.blocks_underwater_buys(&market.from))
            })
            .collect()
    }

    /// Per-market override of `block_underwater_buys`, else the global flag.
    fn blocks_underwater_buys(&self, symbol: &str) -> bool {
        self.config
            .markets
            .get(symbol)
            .and_then(|m| m.block_underwater_buys)
            .unwrap_or(self.config.block_underwater_buys)
    }

    fn log_valuation(&self, market: &Market) {
        let name = market.name();

        if let Some(estimator) = &market.estimator {
            match estimator.value_with_offset().map_err(Error::from) {
                Ok(expected) => {
                    let valuation = Valuation::assess(market.price, expected);
                    let (band_min, band_max) = match estimator.bandwidth() {
                        Ok(bw) => (bw.min_percent().round_dp(2), bw.max_percent().round_dp(2)),
                        Err(_) => (Decimal::ZERO, Decimal::ZERO),
                    };
                    info!(
                        market = %name,
                        price = %market.price,
                        expected = %expected.round_dp(8),
                        percent = %valuation.percent.round_dp(2),
                        band_min_percent = %band_min,
                        band_max_percent = %band_max,
                        "Market is {}",
                        valuation.rating
                    );
                }
                Err(e) if e.is_insufficient_data() => {
                    debug!(market = %name, reason = %e, "No valuation yet");
                }
                Err(e) => warn!(market = %name, error = %e, "Valuation failed"),
            }
        }

        if let Some(uw) = cost_basis_under_water(market) {
            info!(
                market = %name,
                average = %uw.average.round_dp(8),
                price = %uw.price,
                percent = %uw.percent.round_dp(2),
                "Market is under water"
            );
        }
    }

    /// Place the decided orders. Returns the number of orders submitted.
    ///
    /// The first failing order aborts the remaining ones.
    pub async fn execute(&self, book: &MarketBook, decisions: &[Decision]) -> Result<usize> {
        let mut placed = 0;

        for decision in decisions {
            if self.config.debug {
                self.log_market_json(book, &decision.market);
            }

            if self.dry_run {
                info!(
                    market = %decision.market,
                    side = %decision.side,
                    amount = %decision.amount,
                    "Dry run, order not placed"
                );
                continue;
            }

            info!(
                market = %decision.market,
                side = %decision.side,
                amount = %decision.amount,
                "Placing order"
            );
            let order_id = self
                .exchange
                .place_market_order(&decision.market, decision.side, decision.amount)
                .await
                .map_err(|e| Error::Execution {
                    market: decision.market.clone(),
                    source: anyhow::Error::new(e),
                })?;
            debug!(market = %decision.market, order_id = %order_id, "Order accepted");
            placed += 1;
        }

        Ok(placed)
    }

    fn log_market_json(&self, book: &MarketBook, name: &str) {
        let Some(market) = book.get(name) else {
            return;
        };
        let view = book.inverse_of(market).unwrap_or(market);
        match serde_json::to_string_pretty(view) {
            Ok(json) => debug!("{}", json),
            Err(e) => debug!(error = %e, "Cannot render market"),
        }
    }

    /// Run a full pass: load markets, plan, execute.
    pub async fn evaluate(&self) -> Result<PassSummary> {
        let book = self.load_markets().await?;
        let decisions = self.plan(&book);
        let orders_placed = self.execute(&book, &decisions).await?;

        let summary = PassSummary {
            markets: book.iter().filter(|m| m.to == self.config.fiat).count(),
            decisions: decisions.len(),
            orders_placed,
            dry_run: if self.dry_run { decisions.len() } else { 0 },
        };
        info!(summary = %summary, "Evaluation pass finished");
        Ok(summary)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    use crate::config::MarketConfig;
    use crate::models::{Candle, Trade};

    /// In-memory exchange recording submitted orders.
    #[derive(Default)]
    pub(crate) struct MockExchange {
        pub prices: PriceSnapshot,
        pub balances: Vec<Balance>,
        pub trades: HashMap<String, Vec<Trade>>,
        pub candles: HashMap<String, Vec<Candle>>,
        pub orders: Mutex<Vec<(String, TradeSide, Decimal)>>,
        /// Every candle request as (market, interval, limit)
        pub candle_requests: Mutex<Vec<(String, String, u32)>>,
        pub reject_orders: bool,
    }

    impl MockExchange {
        pub fn with_price(mut self, market: &str, price: Decimal) -> Self {
            self.prices.insert(market.to_string(), price);
            self
        }

        pub fn with_balance(mut self, symbol: &str, available: Decimal, in_order: Decimal) -> Self {
            self.balances.push(Balance {
                symbol: symbol.to_string(),
                available,
                in_order,
            });
            self
        }

        pub fn placed(&self) -> Vec<(String, TradeSide, Decimal)> {
            self.orders.lock().unwrap().clone()
        }

        pub fn requested_candles(&self) -> Vec<(String, String, u32)> {
            self.candle_requests.lock().unwrap().clone()
        }
    }

    impl MarketData for MockExchange {
        async fn price_snapshot(&self) -> Result<PriceSnapshot> {
            Ok(self.prices.clone())
        }

        async fn balances(&self) -> Result<Vec<Balance>> {
            Ok(self.balances.clone())
        }

        async fn recent_trades(&self, market: &str, limit: u32) -> Result<Vec<Trade>> {
            let trades = self.trades.get(market).cloned().unwrap_or_default();
            Ok(trades.into_iter().take(limit as usize).collect())
        }

        async fn recent_candles(
            &self,
            market: &str,
            interval: &str,
            limit: u32,
        ) -> Result<Vec<Candle>> {
            self.candle_requests.lock().unwrap().push((
                market.to_string(),
                interval.to_string(),
                limit,
            ));
            let candles = self.candles.get(market).cloned().unwrap_or_default();
            Ok(candles.into_iter().take(limit as usize).collect())
        }
    }

    impl OrderExecutor for MockExchange {
        async fn place_market_order(
            &self,
            market: &str,
            side: TradeSide,
            amount: Decimal,
        ) -> Result<String> {
            if self.reject_orders {
                return Err(Error::Transport(anyhow::anyhow!("insufficient balance")));
            }
            let mut orders = self.orders.lock().unwrap();
            orders.push((market.to_string(), side, amount));
            Ok(format!("order-{}", orders.len()))
        }
    }

    pub(crate) fn candle(ts: i64, price: Decimal) -> Candle {
        Candle {
            timestamp: Utc.timestamp_millis_opt(ts).unwrap(),
            open: price,
            high: price,
            low: price,
            close: price,
            volume: dec!(1),
        }
    }

    fn trade(ts: i64, side: TradeSide, amount: Decimal, price: Decimal) -> Trade {
        Trade {
            id: format!("t-{}", ts),
            market: "BTC-EUR".to_string(),
            side,
            amount,
            price,
            timestamp: Utc.timestamp_millis_opt(ts).unwrap(),
        }
    }

    fn config(markets: &[(&str, Decimal, Decimal)]) -> TraderConfig {
        let mut config = TraderConfig {
            active_mode: true,
            ..Default::default()
        };
        for (symbol, min, max) in markets {
            config.markets.insert(
                symbol.to_string(),
                MarketConfig {
                    min: *min,
                    max: *max,
                    ..Default::default()
                },
            );
        }
        config
    }

    #[test]
    fn test_sell_down_to_max() {
        // max of 20 EUR at price 10 is 2 ETH
        let exchange = MockExchange::default()
            .with_price("ETH-EUR", dec!(10))
            .with_balance("ETH", dec!(3), dec!(1))
            .with_balance("EUR", dec!(1000), Decimal::ZERO);
        let engine = DecisionEngine::new(config(&[("ETH", Decimal::ZERO, dec!(20))]), exchange);

        let book = tokio_test::block_on(engine.load_markets()).unwrap();
        let decisions = engine.plan(&book);

        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].market, "ETH-EUR");
        assert_eq!(decisions[0].side, TradeSide::Sell);
        assert_eq!(decisions[0].amount, dec!(2));
    }

    #[test]
    fn test_buy_is_rounded_up_to_minimum_order() {
        // min of 100 EUR at 40000 is 0.0025 BTC, minimum order is 0.000125
        let exchange = MockExchange::default()
            .with_price("BTC-EUR", dec!(40000))
            .with_balance("BTC", dec!(0.0024), Decimal::ZERO);
        let engine = DecisionEngine::new(config(&[("BTC", dec!(100), Decimal::ZERO)]), exchange);

        let book = tokio_test::block_on(engine.load_markets()).unwrap();
        let decisions = engine.plan(&book);

        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].side, TradeSide::Buy);
        assert_eq!(decisions[0].requested, dec!(0.0001));
        assert_eq!(decisions[0].amount, dec!(0.000125));
    }

    #[test]
    fn test_within_thresholds_no_action() {
        let exchange = MockExchange::default()
            .with_price("ETH-EUR", dec!(10))
            .with_balance("ETH", dec!(1), Decimal::ZERO);
        let engine = DecisionEngine::new(config(&[("ETH", dec!(5), dec!(20))]), exchange);

        let book = tokio_test::block_on(engine.load_markets()).unwrap();
        assert!(engine.plan(&book).is_empty());
    }

    #[test]
    fn test_configured_market_without_balance_is_bought() {
        let exchange = MockExchange::default().with_price("ETH-EUR", dec!(10));
        let engine = DecisionEngine::new(config(&[("ETH", dec!(50), Decimal::ZERO)]), exchange);

        let book = tokio_test::block_on(engine.load_markets()).unwrap();
        let decisions = engine.plan(&book);
        assert_eq!(decisions[0].side, TradeSide::Buy);
        assert_eq!(decisions[0].amount, dec!(5));
    }

    #[test]
    fn test_repeated_passes_are_deterministic() {
        let exchange = MockExchange::default()
            .with_price("BTC-EUR", dec!(40000))
            .with_price("ETH-EUR", dec!(10))
            .with_balance("BTC", dec!(0.01), Decimal::ZERO)
            .with_balance("ETH", dec!(3), dec!(1));
        let engine = DecisionEngine::new(
            config(&[("BTC", dec!(1000), Decimal::ZERO), ("ETH", Decimal::ZERO, dec!(20))]),
            exchange,
        );

        let first = engine.plan(&tokio_test::block_on(engine.load_markets()).unwrap());
        let second = engine.plan(&tokio_test::block_on(engine.load_markets()).unwrap());
        assert_eq!(first, second);

        let markets: Vec<&str> = first.iter().map(|d| d.market.as_str()).collect();
        assert_eq!(markets, vec!["BTC-EUR", "ETH-EUR"]);
    }

    #[test]
    fn test_dry_run_places_no_orders() {
        let exchange = MockExchange::default()
            .with_price("ETH-EUR", dec!(10))
            .with_balance("ETH", dec!(3), dec!(1));
        let mut engine = DecisionEngine::new(config(&[("ETH", Decimal::ZERO, dec!(20))]), exchange);
        engine.set_dry_run(true);

        let summary = tokio_test::block_on(engine.evaluate()).unwrap();
        assert_eq!(summary.decisions, 1);
        assert_eq!(summary.orders_placed, 0);
        assert_eq!(summary.dry_run, 1);
        assert!(engine.exchange().placed().is_empty());
    }

    #[test]
    fn test_live_pass_places_orders() {
        let exchange = MockExchange::default()
            .with_price("ETH-EUR", dec!(10))
            .with_balance("ETH", dec!(3), dec!(1));
        let engine = DecisionEngine::new(config(&[("ETH", Decimal::ZERO, dec!(20))]), exchange);
        assert!(!engine.is_dry_run());

        let summary = tokio_test::block_on(engine.evaluate()).unwrap();
        assert_eq!(summary.markets, 1);
        assert_eq!(summary.orders_placed, 1);
        assert_eq!(
            engine.exchange().placed(),
            vec![("ETH-EUR".to_string(), TradeSide::Sell, dec!(2))]
        );
    }

    #[test]
    fn test_order_failure_is_execution_error() {
        let exchange = MockExchange {
            reject_orders: true,
            ..Default::default()
        }
        .with_price("ETH-EUR", dec!(10))
        .with_balance("ETH", dec!(3), dec!(1));
        let engine = DecisionEngine::new(config(&[("ETH", Decimal::ZERO, dec!(20))]), exchange);

        let err = tokio_test::block_on(engine.evaluate()).unwrap_err();
        assert!(matches!(err, Error::Execution { ref market, .. } if market == "ETH-EUR"));
    }

    #[test]
    fn test_missing_price_policy() {
        let exchange = MockExchange::default()
            .with_price("ETH-EUR", dec!(10))
            .with_balance("ETH", dec!(3), dec!(1))
            .with_balance("XRP", dec!(10), Decimal::ZERO);
        let mut cfg = config(&[("ETH", Decimal::ZERO, dec!(20)), ("XRP", dec!(1), Decimal::ZERO)]);

        let engine = DecisionEngine::new(cfg.clone(), exchange);
        let err = tokio_test::block_on(engine.load_markets()).unwrap_err();
        assert!(matches!(err, Error::PriceNotFound(ref name) if name == "XRP-EUR"));

        cfg.on_market_error = MarketErrorPolicy::Skip;
        let engine = DecisionEngine::new(cfg, engine.exchange);
        let book = tokio_test::block_on(engine.load_markets()).unwrap();
        assert!(book.get("ETH-EUR").is_some());
        assert!(book.get("XRP-EUR").is_none());
    }

    #[test]
    fn test_estimator_and_rate_are_attached() {
        let mut exchange = MockExchange::default()
            .with_price("BTC-EUR", dec!(40000))
            .with_balance("BTC", dec!(0.01), Decimal::ZERO);
        exchange.candles.insert(
            "BTC-EUR".to_string(),
            vec![
                candle(3000, dec!(8)),
                candle(1000, dec!(1)),
                candle(2000, dec!(2)),
            ],
        );
        exchange.trades.insert(
            "BTC-EUR".to_string(),
            vec![trade(1000, TradeSide::Buy, dec!(0.01), dec!(50000))],
        );

        let mut cfg = config(&[("BTC", Decimal::ZERO, Decimal::ZERO)]);
        if let Some(market) = cfg.markets.get_mut("BTC") {
            market.rate_window = 10;
            market.ema = Some(EstimatorConfig {
                window: Some(2),
                ..Default::default()
            });
        }
        let engine = DecisionEngine::new(cfg, exchange);

        let book = tokio_test::block_on(engine.load_markets()).unwrap();
        let btc = book.get("BTC-EUR").unwrap();
        let estimator = btc.estimator.as_ref().unwrap();
        assert_eq!(estimator.len(), 2);
        // candles are sorted before feeding, so the window holds 2 and 8
        let value = estimator.value().unwrap();
        assert!((value - dec!(4)).abs() < dec!(0.000001));
        assert_eq!(btc.rate.average().unwrap(), dec!(50000));
        assert!(book.get("EUR-BTC").unwrap().estimator.is_none());
    }

    #[test]
    fn test_underwater_buys_blocked_only_when_enabled() {
        let mut exchange = MockExchange::default()
            .with_price("BTC-EUR", dec!(40000))
            .with_balance("BTC", dec!(0.001), Decimal::ZERO);
        exchange.trades.insert(
            "BTC-EUR".to_string(),
            vec![trade(1000, TradeSide::Buy, dec!(0.001), dec!(50000))],
        );

        let mut cfg = config(&[("BTC", dec!(100), Decimal::ZERO)]);
        if let Some(market) = cfg.markets.get_mut("BTC") {
            market.rate_window = 10;
        }

        let engine = DecisionEngine::new(cfg.clone(), exchange);
        let book = tokio_test::block_on(engine.load_markets()).unwrap();
        let uw = cost_basis_under_water(book.get("BTC-EUR").unwrap()).unwrap();
        assert_eq!(uw.percent, dec!(20));
        assert_eq!(engine.plan(&book).len(), 1);

        cfg.block_underwater_buys = true;
        let engine = DecisionEngine::new(cfg, engine.exchange);
        let book = tokio_test::block_on(engine.load_markets()).unwrap();
        assert!(engine.plan(&book).is_empty());
    }

    #[test]
    fn test_pass_summary_display() {
        let summary = PassSummary {
            markets: 2,
            decisions: 1,
            orders_placed: 1,
            dry_run: 0,
        };
        assert_eq!(
            summary.to_string(),
            "2 markets, 1 decisions, 1 orders placed, 0 dry-run"
        );
    }

    #[test]
    fn test_decide_values_holdings_in_quote_currency() {
        let mut prices = PriceSnapshot::new();
        prices.insert("ETH-EUR".to_string(), dec!(3));
        let thresholds = Thresholds {
            min: Decimal::ZERO,
            max: dec!(3),
            min_order_notional: dec!(5),
        };
        let pair = build_market("ETH", "EUR", dec!(1), Decimal::ZERO, thresholds, &prices).unwrap();
        assert_eq!(decide(&pair.direct, &pair.inverse, false), None);

        let pair = build_market("ETH", "EUR", dec!(1.5), Decimal::ZERO, thresholds, &prices).unwrap();
        let decision = decide(&pair.direct, &pair.inverse, false).unwrap();
        assert_eq!(decision.side, TradeSide::Sell);
        assert_eq!(decision.requested, dec!(0.5));
    }

    #[test]
    fn test_holdings_worth_exactly_the_limit_do_not_trade() {
        // 3 and 7 do not divide evenly into one, limits are worth exactly 1 unit
        let exchange = MockExchange::default()
            .with_price("ETH-EUR", dec!(3))
            .with_price("BTC-EUR", dec!(7))
            .with_balance("ETH", dec!(1), Decimal::ZERO)
            .with_balance("BTC", dec!(0.5), dec!(0.5));
        let engine = DecisionEngine::new(
            config(&[("ETH", Decimal::ZERO, dec!(3)), ("BTC", dec!(7), Decimal::ZERO)]),
            exchange,
        );

        let book = tokio_test::block_on(engine.load_markets()).unwrap();
        assert!(engine.plan(&book).is_empty());
    }

    #[test]
    fn test_invalid_market_config_is_skipped() {
        let exchange = MockExchange::default()
            .with_price("BTC-EUR", dec!(40000))
            .with_price("ETH-EUR", dec!(10))
            .with_balance("ETH", dec!(3), dec!(1));
        let engine = DecisionEngine::new(
            config(&[("BTC", dec!(600), dec!(500)), ("ETH", Decimal::ZERO, dec!(20))]),
            exchange,
        );
        assert_eq!(engine.config().on_market_error, MarketErrorPolicy::Abort);

        let book = tokio_test::block_on(engine.load_markets()).unwrap();
        assert!(book.get("BTC-EUR").is_none());

        let decisions = engine.plan(&book);
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].market, "ETH-EUR");
        assert_eq!(decisions[0].amount, dec!(2));
    }

    fn rated_exchange() -> MockExchange {
        let mut exchange = MockExchange::default()
            .with_price("BTC-EUR", dec!(10))
            .with_price("ETH-EUR", dec!(10))
            .with_balance("BTC", dec!(3), dec!(1));
        exchange
            .candles
            .insert("BTC-EUR".to_string(), vec![candle(1000, dec!(100))]);
        exchange
            .candles
            .insert("ETH-EUR".to_string(), vec![candle(1000, dec!(1))]);
        exchange
    }

    fn with_ema(mut cfg: TraderConfig, window: usize) -> TraderConfig {
        for market in cfg.markets.values_mut() {
            market.ema = Some(EstimatorConfig {
                window: Some(window),
                ..Default::default()
            });
        }
        cfg
    }

    #[test]
    fn test_valuation_does_not_change_decisions() {
        let plain = config(&[("BTC", Decimal::ZERO, dec!(20)), ("ETH", dec!(50), Decimal::ZERO)]);

        let without = DecisionEngine::new(plain.clone(), rated_exchange());
        let expected = without.plan(&tokio_test::block_on(without.load_markets()).unwrap());
        assert_eq!(expected.len(), 2);

        let with = DecisionEngine::new(with_ema(plain, 1), rated_exchange());
        let book = tokio_test::block_on(with.load_markets()).unwrap();

        let rating = |name: &str| {
            let market = book.get(name).unwrap();
            let estimate = market.estimator.as_ref().unwrap().value_with_offset().unwrap();
            Valuation::assess(market.price, estimate).rating
        };
        assert_eq!(rating("BTC-EUR"), crate::trading::Rating::Under);
        assert_eq!(rating("ETH-EUR"), crate::trading::Rating::Over);

        assert_eq!(with.plan(&book), expected);
    }

    #[test]
    fn test_unfilled_estimator_keeps_threshold_decision() {
        let cfg = with_ema(config(&[("BTC", Decimal::ZERO, dec!(20))]), 5);
        let engine = DecisionEngine::new(cfg, rated_exchange());

        let book = tokio_test::block_on(engine.load_markets()).unwrap();
        let estimator = book.get("BTC-EUR").unwrap().estimator.as_ref().unwrap();
        assert_eq!(
            estimator.value_with_offset(),
            Err(crate::errors::EstimatorError::InsufficientHistory)
        );

        let decisions = engine.plan(&book);
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].side, TradeSide::Sell);
        assert_eq!(decisions[0].amount, dec!(2));
    }

    #[test]
    fn test_market_override_of_underwater_blocking() {
        let exchange = || {
            let mut exchange = MockExchange::default()
                .with_price("BTC-EUR", dec!(40000))
                .with_balance("BTC", dec!(0.001), Decimal::ZERO);
            exchange.trades.insert(
                "BTC-EUR".to_string(),
                vec![trade(1000, TradeSide::Buy, dec!(0.001), dec!(50000))],
            );
            exchange
        };
        let cfg = |global: bool, market_override: Option<bool>| {
            let mut cfg = config(&[("BTC", dec!(100), Decimal::ZERO)]);
            cfg.block_underwater_buys = global;
            if let Some(market) = cfg.markets.get_mut("BTC") {
                market.rate_window = 10;
                market.block_underwater_buys = market_override;
            }
            cfg
        };

        let engine = DecisionEngine::new(cfg(false, Some(true)), exchange());
        let book = tokio_test::block_on(engine.load_markets()).unwrap();
        assert!(engine.plan(&book).is_empty());

        let engine = DecisionEngine::new(cfg(true, Some(false)), exchange());
        let book = tokio_test::block_on(engine.load_markets()).unwrap();
        assert_eq!(engine.plan(&book).len(), 1);

        let engine = DecisionEngine::new(cfg(true, None), exchange());
        let book = tokio_test::block_on(engine.load_markets()).unwrap();
        assert!(engine.plan(&book).is_empty());
    }

    #[test]
    fn test_estimator_interval_reaches_exchange() {
        let exchange = MockExchange::default()
            .with_price("BTC-EUR", dec!(40000))
            .with_price("ETH-EUR", dec!(10));
        let mut cfg = config(&[("BTC", Decimal::ZERO, Decimal::ZERO), ("ETH", Decimal::ZERO, Decimal::ZERO)]);
        if let Some(market) = cfg.markets.get_mut("BTC") {
            market.ema = Some(EstimatorConfig {
                interval: Some("1h".to_string()),
                window: Some(3),
                limit: None,
            });
        }
        if let Some(market) = cfg.markets.get_mut("ETH") {
            market.ema = Some(EstimatorConfig::default());
        }
        let engine = DecisionEngine::new(cfg, exchange);

        tokio_test::block_on(engine.load_markets()).unwrap();
        assert_eq!(
            engine.exchange().requested_candles(),
            vec![
                ("BTC-EUR".to_string(), "1h".to_string(), 6),
                ("ETH-EUR".to_string(), "1d".to_string(), 84),
            ]
        );
    }
}
