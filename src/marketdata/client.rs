use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Price and existence lookups for equity tickers.
///
/// An `Err` from `is_valid_ticker` means the lookup itself failed and the
/// ticker's existence is unknown; `Ok(false)` is a definitive "no such
/// symbol".
#[async_trait]
pub trait MarketDataClient: Send + Sync + 'static {
    /// Close of the last session before `as_of`.
    async fn get_previous_close(&self, ticker: &str, as_of: NaiveDate) -> Result<f64>;
    async fn get_current_price(&self, ticker: &str) -> Result<f64>;
    async fn is_valid_ticker(&self, ticker: &str) -> Result<bool>;
}
