use crate::marketdata::client::MarketDataClient;
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

#[derive(Debug, Default)]
pub struct SimState {
    pub previous_close: HashMap<String, f64>,
    /// Date-specific closes; `previous_close` answers for any other date.
    pub closes_before: HashMap<(String, NaiveDate), f64>,
    pub current_price: HashMap<String, f64>,
    /// Tickers whose lookups fail as if the network were down.
    pub failing: HashSet<String>,
    pub previous_close_calls: HashMap<String, usize>,
}

/// Deterministic in-memory market for tests and dry runs.
///
/// A ticker exists when it has a previous close.
#[derive(Default)]
pub struct SimMarketData {
    pub state: Mutex<SimState>,
}

impl SimMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_previous_close(&self, ticker: &str, price: f64) {
        let mut state = self.state.lock().await;
        state.previous_close.insert(ticker.to_string(), price);
    }

    pub async fn set_close_before(&self, ticker: &str, as_of: NaiveDate, price: f64) {
        let mut state = self.state.lock().await;
        state.closes_before.insert((ticker.to_string(), as_of), price);
    }

    pub async fn set_current_price(&self, ticker: &str, price: f64) {
        let mut state = self.state.lock().await;
        state.current_price.insert(ticker.to_string(), price);
    }

    /// Lists a ticker with the same previous close and current price.
    pub async fn list(&self, ticker: &str, previous_close: f64) {
        self.set_previous_close(ticker, previous_close).await;
        self.set_current_price(ticker, previous_close).await;
    }

    pub async fn set_failing(&self, ticker: &str, failing: bool) {
        let mut state = self.state.lock().await;
        if failing {
            state.failing.insert(ticker.to_string());
        } else {
            state.failing.remove(ticker);
        }
    }

    pub async fn previous_close_calls(&self, ticker: &str) -> usize {
        let state = self.state.lock().await;
        state.previous_close_calls.get(ticker).copied().unwrap_or(0)
    }
}

#[async_trait]
impl MarketDataClient for SimMarketData {
    async fn get_previous_close(&self, ticker: &str, as_of: NaiveDate) -> Result<f64> {
        let mut state = self.state.lock().await;
        *state
            .previous_close_calls
            .entry(ticker.to_string())
            .or_default() += 1;
        if state.failing.contains(ticker) {
            anyhow::bail!("simulated outage for {}", ticker);
        }
        let dated = state.closes_before.get(&(ticker.to_string(), as_of));
        match dated.or_else(|| state.previous_close.get(ticker)) {
            Some(p) => Ok(*p),
            None => anyhow::bail!("no previous close for {}", ticker),
        }
    }

    async fn get_current_price(&self, ticker: &str) -> Result<f64> {
        let state = self.state.lock().await;
        if state.failing.contains(ticker) {
            anyhow::bail!("simulated outage for {}", ticker);
        }
        match state.current_price.get(ticker) {
            Some(p) => Ok(*p),
            None => anyhow::bail!("no price for {}", ticker),
        }
    }

    async fn is_valid_ticker(&self, ticker: &str) -> Result<bool> {
        let state = self.state.lock().await;
        if state.failing.contains(ticker) {
            anyhow::bail!("simulated outage for {}", ticker);
        }
        Ok(state.previous_close.contains_key(ticker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sim_prices_and_outage() {
        let sim = SimMarketData::new();
        sim.list("NVDA", 100.0).await;
        sim.set_current_price("NVDA", 145.0).await;

        let friday = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert_eq!(sim.get_previous_close("NVDA", friday).await.unwrap(), 100.0);
        assert_eq!(sim.get_current_price("NVDA").await.unwrap(), 145.0);
        assert!(sim.is_valid_ticker("NVDA").await.unwrap());
        assert!(!sim.is_valid_ticker("ZZZZ").await.unwrap());

        sim.set_failing("NVDA", true).await;
        assert!(sim.is_valid_ticker("NVDA").await.is_err());
        assert!(sim.get_current_price("NVDA").await.is_err());
        assert_eq!(sim.previous_close_calls("NVDA").await, 1);
    }

    #[tokio::test]
    async fn test_dated_close_overrides_default() {
        let sim = SimMarketData::new();
        sim.list("AMD", 50.0).await;
        let friday = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        sim.set_close_before("AMD", friday, 48.0).await;

        assert_eq!(sim.get_previous_close("AMD", friday).await.unwrap(), 48.0);
        let monday = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        assert_eq!(sim.get_previous_close("AMD", monday).await.unwrap(), 50.0);
    }
}
