use crate::core::types::TickerVerdict;
use crate::marketdata::client::MarketDataClient;
use std::collections::HashMap;
use tracing::{debug, warn};

/// 1–5 ASCII uppercase letters.
pub fn is_well_formed(ticker: &str) -> bool {
    (1..=5).contains(&ticker.len()) && ticker.bytes().all(|b| b.is_ascii_uppercase())
}

/// Existence check against the market-data client, memoised for one run.
///
/// Only definitive answers are cached; a lookup that failed is asked again
/// the next time the ticker shows up.
pub struct TickerValidator<'a> {
    market: &'a dyn MarketDataClient,
    verdicts: HashMap<String, TickerVerdict>,
}

impl<'a> TickerValidator<'a> {
    pub fn new(market: &'a dyn MarketDataClient) -> Self {
        Self {
            market,
            verdicts: HashMap::new(),
        }
    }

    pub async fn validate(&mut self, ticker: &str) -> TickerVerdict {
        if !is_well_formed(ticker) {
            debug!(%ticker, "malformed ticker");
            record(TickerVerdict::Invalid);
            return TickerVerdict::Invalid;
        }
        if let Some(v) = self.verdicts.get(ticker) {
            return *v;
        }

        let verdict = match self.market.is_valid_ticker(ticker).await {
            Ok(true) => TickerVerdict::Valid,
            Ok(false) => {
                debug!(%ticker, "ticker does not exist");
                TickerVerdict::Invalid
            }
            Err(e) => {
                warn!(%ticker, error = %e, "ticker lookup failed, dropping candidate");
                TickerVerdict::Unknown
            }
        };
        record(verdict);

        if verdict != TickerVerdict::Unknown {
            self.verdicts.insert(ticker.to_string(), verdict);
        }
        verdict
    }
}

fn record(verdict: TickerVerdict) {
    metrics::counter!("ticker_validation_total", "verdict" => verdict.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marketdata::simulator::SimMarketData;

    #[test]
    fn test_format() {
        assert!(is_well_formed("A"));
        assert!(is_well_formed("GOOGL"));
        assert!(!is_well_formed(""));
        assert!(!is_well_formed("ABCDEF"));
        assert!(!is_well_formed("Nvda"));
        assert!(!is_well_formed("BRK.B"));
    }

    #[tokio::test]
    async fn test_verdicts() {
        let sim = SimMarketData::new();
        sim.list("NVDA", 100.0).await;
        sim.list("FLAKY", 10.0).await;
        sim.set_failing("FLAKY", true).await;

        let mut v = TickerValidator::new(&sim);
        assert_eq!(v.validate("NVDA").await, TickerVerdict::Valid);
        assert_eq!(v.validate("ZZZZ").await, TickerVerdict::Invalid);
        assert_eq!(v.validate("FLAKY").await, TickerVerdict::Unknown);
        assert_eq!(v.validate("nvda").await, TickerVerdict::Invalid);
    }

    #[tokio::test]
    async fn test_unknown_not_memoised() {
        let sim = SimMarketData::new();
        sim.list("FLAKY", 10.0).await;
        sim.set_failing("FLAKY", true).await;

        let mut v = TickerValidator::new(&sim);
        assert_eq!(v.validate("FLAKY").await, TickerVerdict::Unknown);
        sim.set_failing("FLAKY", false).await;
        assert_eq!(v.validate("FLAKY").await, TickerVerdict::Valid);

        // definitive verdicts stick for the run
        sim.set_failing("FLAKY", true).await;
        assert_eq!(v.validate("FLAKY").await, TickerVerdict::Valid);
    }
}
