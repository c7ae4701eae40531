mod collect;
mod refresh;

pub use refresh::RolloverReport;

use crate::config::config::{ExtractionCfg, TrackingCfg};
use crate::core::types::SessionState;
use crate::extraction::Extractor;
use crate::extraction::dedup::DuplicateResolver;
use crate::marketdata::client::MarketDataClient;
use crate::persistence::store::PredictionStore;
use crate::stats::summary::{self, DailySummary, SourceAccuracy};
use crate::tracking::classifier::Thresholds;
use crate::tracking::session::SessionClock;
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use tracing::warn;

/// Entry point for collection, refresh and end-of-day processing.
///
/// Cheap to clone; every collaborator is shared.
#[derive(Clone)]
pub struct Tracker {
    extractor: Arc<Extractor>,
    resolver: DuplicateResolver,
    thresholds: Thresholds,
    concurrency: usize,
    market: Arc<dyn MarketDataClient>,
    clock: Arc<dyn SessionClock>,
    store: Arc<dyn PredictionStore>,
}

impl Tracker {
    pub fn new(
        extraction: &ExtractionCfg,
        tracking: &TrackingCfg,
        market: Arc<dyn MarketDataClient>,
        clock: Arc<dyn SessionClock>,
        store: Arc<dyn PredictionStore>,
    ) -> Self {
        Self {
            extractor: Arc::new(Extractor::new(extraction)),
            resolver: DuplicateResolver::new(
                tracking.duplicate_tolerance,
                tracking.duplicate_window,
            ),
            thresholds: Thresholds {
                hit: tracking.hit_threshold,
                partial: tracking.partial_threshold,
            },
            concurrency: tracking.concurrency.max(1),
            market,
            clock,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn PredictionStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn SessionClock> {
        &self.clock
    }

    /// Session state at `now`; an unknown state counts as OPEN so nothing
    /// is failed before the close is confirmed.
    fn session_at(&self, now: DateTime<Utc>) -> SessionState {
        match self.clock.session_state(now) {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "assuming open");
                SessionState::Open
            }
        }
    }

    pub async fn daily_summary(&self, date: NaiveDate) -> Result<DailySummary> {
        let predictions = self.store.query_by_date(date).await?;
        Ok(summary::daily_summary(date, &predictions))
    }

    pub async fn source_accuracy(&self, date: NaiveDate) -> Result<Vec<SourceAccuracy>> {
        let predictions = self.store.query_by_date(date).await?;
        Ok(summary::source_accuracy(date, &predictions))
    }
}
