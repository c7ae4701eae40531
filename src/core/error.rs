use crate::core::types::TickerVerdict;
use thiserror::Error;

/// Per-item failures of the collection and refresh pipelines.
///
/// None of these abort a batch: the affected candidate is dropped or the
/// affected prediction stays PENDING for the next cycle.
#[derive(Debug, Error)]
pub enum TrackError {
    #[error("ticker {ticker} failed validation ({verdict})")]
    Validation {
        ticker: String,
        verdict: TickerVerdict,
    },

    #[error("previous close unavailable for {ticker}: {reason}")]
    BaselineUnavailable { ticker: String, reason: String },

    #[error("current price unavailable for {ticker}: {reason}")]
    PriceUnavailable { ticker: String, reason: String },

    #[error("market session state unavailable: {0}")]
    SessionStateUnavailable(String),

    #[error("store error: {0}")]
    Store(#[source] anyhow::Error),
}

impl TrackError {
    /// Price failures leave the prediction untouched and retry next cycle.
    pub fn is_price_fetch(&self) -> bool {
        matches!(
            self,
            TrackError::BaselineUnavailable { .. } | TrackError::PriceUnavailable { .. }
        )
    }
}
