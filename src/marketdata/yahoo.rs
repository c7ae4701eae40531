use crate::config::config::MarketDataCfg;
use crate::marketdata::client::MarketDataClient;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    #[serde(default)]
    indicators: Option<Indicators>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: Option<f64>,
    previous_close: Option<f64>,
    chart_previous_close: Option<f64>,
    #[serde(default)]
    gmtoffset: i32,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

enum ChartOutcome {
    Found(ChartResult),
    NotFound,
}

impl ChartResult {
    fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.meta.gmtoffset).unwrap_or_else(|| Utc.fix())
    }

    /// (exchange-local date, close) for every daily candle with a close.
    fn daily_closes(&self) -> Vec<(NaiveDate, f64)> {
        let offset = self.offset();
        let closes = self
            .indicators
            .as_ref()
            .and_then(|i| i.quote.first())
            .map(|q| q.close.as_slice())
            .unwrap_or(&[]);
        self.timestamp
            .iter()
            .zip(closes)
            .filter_map(|(ts, close)| {
                let close = (*close)?;
                let date = DateTime::<Utc>::from_timestamp(*ts, 0)?
                    .with_timezone(&offset)
                    .date_naive();
                Some((date, close))
            })
            .collect()
    }

    /// Close of the last session strictly before `as_of`.
    ///
    /// When the window opens on `as_of` itself, the close before the window
    /// is the answer. A window that starts after `as_of` cannot tell.
    fn previous_close(&self, as_of: NaiveDate) -> Option<f64> {
        let closes = self.daily_closes();
        let before = closes
            .iter()
            .filter(|(date, _)| *date < as_of)
            .map(|(_, close)| *close)
            .next_back();
        let close = match (before, closes.first()) {
            (Some(close), _) => Some(close),
            (None, Some((first, _))) if *first == as_of => self.meta.chart_previous_close,
            (None, Some(_)) => None,
            (None, None) => self.meta.previous_close.or(self.meta.chart_previous_close),
        };
        close.filter(|p| *p > 0.0)
    }

    fn current_price(&self) -> Option<f64> {
        self.meta
            .regular_market_price
            .or_else(|| self.daily_closes().last().map(|(_, c)| *c))
            .filter(|p| *p > 0.0)
    }
}

/// Yahoo Finance chart endpoint client.
pub struct YahooMarketData {
    client: Client,
    cfg: MarketDataCfg,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl YahooMarketData {
    pub fn new(cfg: MarketDataCfg, client: Client) -> Self {
        let rpm = NonZeroU32::new(cfg.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rpm)));
        Self {
            client,
            cfg,
            limiter,
        }
    }

    fn chart_url(&self, ticker: &str) -> String {
        format!(
            "{}/v8/finance/chart/{}?range=1mo&interval=1d",
            self.cfg.base_url.trim_end_matches('/'),
            ticker
        )
    }

    async fn fetch_chart(&self, ticker: &str) -> Result<ChartOutcome> {
        self.limiter.until_ready().await;

        let url = self.chart_url(ticker);
        debug!(%ticker, %url, "requesting chart");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("requesting chart")?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(ChartOutcome::NotFound);
        }
        if !status.is_success() {
            anyhow::bail!("chart API error for {}: {}", ticker, status);
        }

        let body = resp.bytes().await.context("reading chart body")?;
        parse_chart(&body)
    }

    async fn found_chart(&self, ticker: &str) -> Result<ChartResult> {
        match self.fetch_chart(ticker).await? {
            ChartOutcome::Found(chart) => Ok(chart),
            ChartOutcome::NotFound => anyhow::bail!("no chart data for {}", ticker),
        }
    }
}

fn parse_chart(body: &[u8]) -> Result<ChartOutcome> {
    let envelope: ChartEnvelope = serde_json::from_slice(body).context("parsing chart")?;
    if let Some(err) = envelope.chart.error {
        if err.code.eq_ignore_ascii_case("Not Found") {
            return Ok(ChartOutcome::NotFound);
        }
        anyhow::bail!(
            "chart API error {}: {}",
            err.code,
            err.description.unwrap_or_default()
        );
    }
    match envelope.chart.result.and_then(|r| r.into_iter().next()) {
        Some(result) => Ok(ChartOutcome::Found(result)),
        None => Ok(ChartOutcome::NotFound),
    }
}

#[async_trait]
impl MarketDataClient for YahooMarketData {
    async fn get_previous_close(&self, ticker: &str, as_of: NaiveDate) -> Result<f64> {
        let chart = self.found_chart(ticker).await?;
        chart
            .previous_close(as_of)
            .with_context(|| format!("no close before {} in chart for {}", as_of, ticker))
    }

    async fn get_current_price(&self, ticker: &str) -> Result<f64> {
        let chart = self.found_chart(ticker).await?;
        chart
            .current_price()
            .with_context(|| format!("no market price in chart for {}", ticker))
    }

    async fn is_valid_ticker(&self, ticker: &str) -> Result<bool> {
        match self.fetch_chart(ticker).await? {
            ChartOutcome::Found(chart) => Ok(chart.current_price().is_some()),
            ChartOutcome::NotFound => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Three daily candles, 2025-03-05..07 at 09:30 New York (UTC-5)
    const NVDA_CHART: &str = r#"{
        "chart": {
            "result": [{
                "meta": {
                    "symbol": "NVDA",
                    "regularMarketPrice": 145.0,
                    "chartPreviousClose": 90.0,
                    "gmtoffset": -18000
                },
                "timestamp": [1741185000, 1741271400, 1741357800],
                "indicators": { "quote": [{ "close": [98.0, 100.0, 145.0] }] }
            }],
            "error": null
        }
    }"#;

    const NOT_FOUND: &str = r#"{
        "chart": {
            "result": null,
            "error": { "code": "Not Found", "description": "No data found, symbol may be delisted" }
        }
    }"#;

    fn found(body: &str) -> ChartResult {
        match parse_chart(body.as_bytes()).unwrap() {
            ChartOutcome::Found(c) => c,
            ChartOutcome::NotFound => panic!("expected chart"),
        }
    }

    #[test]
    fn test_previous_close_is_last_close_before_the_date() {
        let chart = found(NVDA_CHART);
        let today = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert_eq!(chart.previous_close(today), Some(100.0));

        let thursday = NaiveDate::from_ymd_opt(2025, 3, 6).unwrap();
        assert_eq!(chart.previous_close(thursday), Some(98.0));
    }

    #[test]
    fn test_previous_close_for_a_past_collection_date() {
        // priced the morning after: the baseline is still Thursday's close
        let chart = found(NVDA_CHART);
        let friday = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        let saturday = NaiveDate::from_ymd_opt(2025, 3, 8).unwrap();
        assert_eq!(chart.previous_close(friday), Some(100.0));
        assert_eq!(chart.previous_close(saturday), Some(145.0));
    }

    #[test]
    fn test_previous_close_at_window_edges() {
        let chart = found(NVDA_CHART);
        let first_day = NaiveDate::from_ymd_opt(2025, 3, 5).unwrap();
        assert_eq!(chart.previous_close(first_day), Some(90.0));

        let long_ago = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(chart.previous_close(long_ago), None);
    }

    #[test]
    fn test_previous_close_without_candles_uses_meta() {
        let body = r#"{"chart":{"result":[{"meta":{"regularMarketPrice":12.0,"previousClose":11.0}}],"error":null}}"#;
        let chart = found(body);
        let today = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert_eq!(chart.previous_close(today), Some(11.0));
    }

    #[test]
    fn test_current_price_prefers_regular_market_price() {
        assert_eq!(found(NVDA_CHART).current_price(), Some(145.0));
    }

    #[test]
    fn test_not_found_error_body() {
        assert!(matches!(
            parse_chart(NOT_FOUND.as_bytes()).unwrap(),
            ChartOutcome::NotFound
        ));
    }

    #[test]
    fn test_other_api_error_is_err() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Too Many Requests"}}}"#;
        assert!(parse_chart(body.as_bytes()).is_err());
    }

    #[test]
    fn test_chart_url() {
        let cfg = MarketDataCfg {
            base_url: "https://example.test/".into(),
            requests_per_minute: 10,
        };
        let md = YahooMarketData::new(cfg, Client::new());
        assert_eq!(
            md.chart_url("NVDA"),
            "https://example.test/v8/finance/chart/NVDA?range=1mo&interval=1d"
        );
    }
}
