//! Bitvavo REST client.
//!
//! Read requests are retried with exponential backoff on timeouts, rate
//! limiting and server errors. Orders are submitted exactly once.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use backoff::ExponentialBackoffBuilder;
use reqwest::{Client, StatusCode, Url};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::errors::{parse_decimal, Error};
use crate::models::{Balance, Candle, PriceSnapshot, Trade, TradeSide};

use super::auth::BitvavoAuth;
use super::types::*;
use super::{MarketData, OrderExecutor};

const REST_URL: &str = "https://api.bitvavo.com/v2";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_ACCESS_WINDOW: u64 = 10_000;
const MAX_RETRY_ELAPSED: Duration = Duration::from_secs(60);
const MAX_TRADES_LIMIT: u32 = 1000;
const MAX_CANDLES_LIMIT: u32 = 1440;

type RequestResult<T> = std::result::Result<T, backoff::Error<anyhow::Error>>;

/// Client for the Bitvavo REST API.
pub struct BitvavoClient {
    http: Client,
    base_url: String,
    /// Path of `base_url`, part of the signed message
    path_prefix: String,
    auth: Option<BitvavoAuth>,
    access_window: u64,
    asset_decimals: HashMap<String, u32>,
}

impl BitvavoClient {
    /// Create a client. Without credentials only public endpoints work.
    pub fn new(
        base_url: &str,
        credentials: Option<(String, String)>,
        access_window: u64,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = base_url.trim_end_matches('/').to_string();
        let path_prefix = Url::parse(&base_url)
            .with_context(|| format!("Invalid REST URL {}", base_url))?
            .path()
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            http,
            base_url,
            path_prefix,
            auth: credentials.map(|(key, secret)| BitvavoAuth::new(key, secret)),
            access_window,
            asset_decimals: HashMap::new(),
        })
    }

    /// Create from environment variables:
    /// - BITVAVO_API_KEY
    /// - BITVAVO_API_SECRET
    /// - BITVAVO_REST_URL (defaults to the production API)
    /// - BITVAVO_ACCESS_WINDOW (milliseconds, defaults to 10000)
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("BITVAVO_API_KEY").context("BITVAVO_API_KEY not set")?;
        let api_secret =
            std::env::var("BITVAVO_API_SECRET").context("BITVAVO_API_SECRET not set")?;
        let base_url = std::env::var("BITVAVO_REST_URL").unwrap_or_else(|_| REST_URL.to_string());
        let access_window: u64 = match std::env::var("BITVAVO_ACCESS_WINDOW") {
            Ok(value) => value.parse().context("Invalid BITVAVO_ACCESS_WINDOW")?,
            Err(_) => DEFAULT_ACCESS_WINDOW,
        };

        Self::new(&base_url, Some((api_key, api_secret)), access_window)
    }

    /// Unsigned client for public market data.
    pub fn public() -> Result<Self> {
        let base_url = std::env::var("BITVAVO_REST_URL").unwrap_or_else(|_| REST_URL.to_string());
        Self::new(&base_url, None, DEFAULT_ACCESS_WINDOW)
    }

    /// Fetch asset precision, needed to round order amounts.
    pub async fn load_assets(&mut self) -> Result<()> {
        let assets: Vec<AssetResponse> = self.get("/assets").await?;
        self.asset_decimals = assets
            .into_iter()
            .map(|asset| (asset.symbol, asset.decimals))
            .collect();
        debug!(count = self.asset_decimals.len(), "Loaded asset precision");
        Ok(())
    }

    /// Round an order amount up to the asset's precision.
    fn round_amount(&self, market: &str, amount: Decimal) -> Result<Decimal> {
        let base = market.split('-').next().unwrap_or(market);
        let decimals = self
            .asset_decimals
            .get(base)
            .ok_or_else(|| anyhow!("Unknown asset {}", base))?;
        Ok(amount
            .round_dp_with_strategy(*decimals, RoundingStrategy::AwayFromZero)
            .normalize())
    }

    fn headers(&self, method: &str, path: &str, body: &str) -> Result<reqwest::header::HeaderMap> {
        match &self.auth {
            Some(auth) => auth.headers(
                method,
                &format!("{}{}", self.path_prefix, path),
                body,
                self.access_window,
            ),
            None => Ok(reqwest::header::HeaderMap::new()),
        }
    }

    /// GET with retries on transient failures.
    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let policy = ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(MAX_RETRY_ELAPSED))
            .build();

        backoff::future::retry(policy, || async move { self.get_once(path).await }).await
    }

    async fn get_once<T: DeserializeOwned>(&self, path: &str) -> RequestResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let headers = self
            .headers("GET", path, "")
            .map_err(backoff::Error::permanent)?;

        debug!(url = %url, "GET");

        let response = self
            .http
            .get(&url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| backoff::Error::transient(anyhow!("GET {} failed: {}", path, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| backoff::Error::transient(anyhow!("Failed to read {} body: {}", path, e)))?;

        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(backoff::Error::transient(anyhow!(
                "GET {} failed: {} - {}",
                path,
                status,
                body
            )));
        }
        if !status.is_success() {
            return Err(backoff::Error::permanent(api_error(status, &body)));
        }

        serde_json::from_str(&body)
            .with_context(|| format!("Failed to parse {} response", path))
            .map_err(backoff::Error::permanent)
    }

    async fn post<T: DeserializeOwned, B: serde::Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let body = serde_json::to_string(body).context("Failed to serialize request body")?;
        let headers = self.headers("POST", path, &body)?;

        debug!(url = %url, body = %body, "POST");

        let response = self
            .http
            .post(&url)
            .headers(headers)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .with_context(|| format!("POST {} failed", path))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(api_error(status, &text));
        }

        serde_json::from_str(&text).with_context(|| format!("Failed to parse {} response", path))
    }
}

fn api_error(status: StatusCode, body: &str) -> anyhow::Error {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(err) => anyhow!("Bitvavo error {} ({}): {}", err.error_code, status, err.error),
        Err(_) => anyhow!("Bitvavo request failed: {} - {}", status, body),
    }
}

impl MarketData for BitvavoClient {
    async fn price_snapshot(&self) -> crate::errors::Result<PriceSnapshot> {
        let tickers: Vec<TickerPrice> = self.get("/ticker/price").await.map_err(Error::Transport)?;

        let mut prices = PriceSnapshot::with_capacity(tickers.len());
        for ticker in tickers {
            // newly listed markets report no price yet
            let Some(price) = ticker.price.filter(|p| !p.is_empty()) else {
                continue;
            };
            prices.insert(ticker.market, parse_decimal(&price)?);
        }
        Ok(prices)
    }

    async fn balances(&self) -> crate::errors::Result<Vec<Balance>> {
        let items: Vec<BalanceResponse> = self.get("/balance").await.map_err(Error::Transport)?;
        items.into_iter().map(BalanceResponse::into_balance).collect()
    }

    async fn recent_trades(&self, market: &str, limit: u32) -> crate::errors::Result<Vec<Trade>> {
        let path = format!(
            "/trades?market={}&limit={}",
            market,
            limit.min(MAX_TRADES_LIMIT)
        );
        let items: Vec<TradeResponse> = self.get(&path).await.map_err(Error::Transport)?;

        let mut trades = Vec::with_capacity(items.len());
        for item in items {
            if let Some(trade) = item.into_trade()? {
                trades.push(trade);
            }
        }
        Ok(trades)
    }

    async fn recent_candles(
        &self,
        market: &str,
        interval: &str,
        limit: u32,
    ) -> crate::errors::Result<Vec<Candle>> {
        let path = format!(
            "/{}/candles?interval={}&limit={}",
            market,
            interval,
            limit.min(MAX_CANDLES_LIMIT)
        );
        let items: Vec<CandleResponse> = self.get(&path).await.map_err(Error::Transport)?;

        let mut candles = Vec::with_capacity(items.len());
        for item in items {
            if let Some(candle) = candle_from_response(item)? {
                candles.push(candle);
            }
        }
        Ok(candles)
    }
}

impl OrderExecutor for BitvavoClient {
    async fn place_market_order(
        &self,
        market: &str,
        side: TradeSide,
        amount: Decimal,
    ) -> crate::errors::Result<String> {
        let amount = self.round_amount(market, amount).map_err(Error::Transport)?;
        let request = PlaceOrderRequest {
            market: market.to_string(),
            side,
            order_type: "market".to_string(),
            amount: amount.to_string(),
            client_order_id: uuid::Uuid::new_v4().to_string(),
        };

        let response: OrderResponse = self
            .post("/order", &request)
            .await
            .map_err(Error::Transport)?;

        info!(
            order_id = %response.order_id,
            market = %market,
            side = %side,
            amount = %amount,
            status = %response.status,
            "Order placed"
        );
        if let Ok(json) = serde_json::to_string_pretty(&response) {
            debug!("{}", json);
        }

        Ok(response.order_id)
    }
}
