//! REST ticker fetchers for the Japanese BTC/JPY markets.
//!
//! Each exchange exposes a public ticker endpoint. Parsing lives in pure
//! `parse_*` functions so it can be tested against captured responses.

use crate::error::FeedError;
use arbitrage_core::{Exchange, ExchangeId, Quote};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

/// Fetches one exchange's current quote.
#[async_trait]
pub trait TickerFetcher: Send + Sync {
    /// Exchange this fetcher reports for.
    fn exchange(&self) -> ExchangeId;

    /// Fetch the current BTC/JPY quote.
    async fn fetch(&self, client: &reqwest::Client) -> Result<Quote, FeedError>;
}

/// Public ticker endpoint for an exchange.
pub fn ticker_url(exchange: Exchange) -> &'static str {
    match exchange {
        Exchange::BitFlyer => "https://api.bitflyer.com/v1/ticker?product_code=BTC_JPY",
        Exchange::Coincheck => "https://coincheck.com/api/ticker",
        Exchange::Zaif => "https://api.zaif.jp/api/1/ticker/btc_jpy",
        Exchange::GmoCoin => "https://api.coin.z.com/public/v1/ticker?symbol=BTC",
        Exchange::Bitbank => "https://public.bitbank.cc/btc_jpy/ticker",
    }
}

/// Parse a ticker body for the given exchange.
pub fn parse_ticker(
    exchange: Exchange,
    body: &str,
    observed_at: DateTime<Utc>,
) -> Result<Quote, FeedError> {
    let json: Value = serde_json::from_str(body)?;
    match exchange {
        Exchange::BitFlyer => parse_bitflyer(&json, observed_at),
        Exchange::Coincheck => parse_coincheck(&json, observed_at),
        Exchange::Zaif => parse_zaif(&json, observed_at),
        Exchange::GmoCoin => parse_gmocoin(&json, observed_at),
        Exchange::Bitbank => parse_bitbank(&json, observed_at),
    }
}

/// Read a price that may be encoded as a JSON number or a numeric string.
fn price(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn expect_object(json: &Value) -> Result<(), FeedError> {
    if json.is_object() {
        Ok(())
    } else {
        Err(FeedError::ParseError("Ticker is not a JSON object".to_string()))
    }
}

/// `{"product_code":"BTC_JPY","best_bid":..,"best_ask":..,"ltp":..}`
pub fn parse_bitflyer(json: &Value, observed_at: DateTime<Utc>) -> Result<Quote, FeedError> {
    expect_object(json)?;
    if let Some(message) = json["error_message"].as_str() {
        return Err(FeedError::ExchangeError(message.to_string()));
    }
    Ok(Quote::new(
        Exchange::BitFlyer.id(),
        price(&json["ltp"]),
        price(&json["best_bid"]),
        price(&json["best_ask"]),
        observed_at,
    ))
}

/// `{"last":..,"bid":..,"ask":..,"high":..,"low":..,"volume":..}`
pub fn parse_coincheck(json: &Value, observed_at: DateTime<Utc>) -> Result<Quote, FeedError> {
    expect_object(json)?;
    if json["success"] == Value::Bool(false) {
        let message = json["error"].as_str().unwrap_or("unknown error");
        return Err(FeedError::ExchangeError(message.to_string()));
    }
    Ok(Quote::new(
        Exchange::Coincheck.id(),
        price(&json["last"]),
        price(&json["bid"]),
        price(&json["ask"]),
        observed_at,
    ))
}

/// `{"last":..,"bid":..,"ask":..,"vwap":..}`
pub fn parse_zaif(json: &Value, observed_at: DateTime<Utc>) -> Result<Quote, FeedError> {
    expect_object(json)?;
    if let Some(message) = json["error"].as_str() {
        return Err(FeedError::ExchangeError(message.to_string()));
    }
    Ok(Quote::new(
        Exchange::Zaif.id(),
        price(&json["last"]),
        price(&json["bid"]),
        price(&json["ask"]),
        observed_at,
    ))
}

/// `{"status":0,"data":[{"symbol":"BTC","bid":"..","ask":"..","last":".."}]}`
pub fn parse_gmocoin(json: &Value, observed_at: DateTime<Utc>) -> Result<Quote, FeedError> {
    expect_object(json)?;
    match json["status"].as_i64() {
        Some(0) => {}
        Some(status) => {
            let message = json["messages"][0]["message_string"]
                .as_str()
                .unwrap_or("unknown error");
            return Err(FeedError::ExchangeError(format!("status {status}: {message}")));
        }
        None => return Err(FeedError::ParseError("Missing status".to_string())),
    }

    let ticker = json["data"]
        .as_array()
        .and_then(|list| list.first())
        .ok_or_else(|| FeedError::ParseError("Empty ticker data".to_string()))?;

    Ok(Quote::new(
        Exchange::GmoCoin.id(),
        price(&ticker["last"]),
        price(&ticker["bid"]),
        price(&ticker["ask"]),
        observed_at,
    ))
}

/// `{"success":1,"data":{"sell":"..","buy":"..","last":".."}}`
///
/// bitbank names sides from the taker's view: `buy` is the best bid and
/// `sell` the best ask.
pub fn parse_bitbank(json: &Value, observed_at: DateTime<Utc>) -> Result<Quote, FeedError> {
    expect_object(json)?;
    if json["success"].as_i64() != Some(1) {
        let code = json["data"]["code"].as_i64().unwrap_or_default();
        return Err(FeedError::ExchangeError(format!("error code {code}")));
    }

    let data = &json["data"];
    Ok(Quote::new(
        Exchange::Bitbank.id(),
        price(&data["last"]),
        price(&data["buy"]),
        price(&data["sell"]),
        observed_at,
    ))
}

/// HTTP ticker fetcher for one of the built-in exchanges.
#[derive(Debug, Clone, Copy)]
pub struct ExchangeTicker {
    exchange: Exchange,
}

impl ExchangeTicker {
    pub fn new(exchange: Exchange) -> Self {
        Self { exchange }
    }
}

#[async_trait]
impl TickerFetcher for ExchangeTicker {
    fn exchange(&self) -> ExchangeId {
        self.exchange.id()
    }

    async fn fetch(&self, client: &reqwest::Client) -> Result<Quote, FeedError> {
        let url = ticker_url(self.exchange);
        let response = client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            debug!("{}: ticker HTTP {}", self.exchange, status);
            return Err(FeedError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let quote = parse_ticker(self.exchange, &body, Utc::now())?;
        debug!(
            exchange = %self.exchange,
            bid = ?quote.bid,
            ask = ?quote.ask,
            "Fetched ticker"
        );
        Ok(quote)
    }
}
