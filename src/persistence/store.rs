use crate::core::types::{NewPrediction, Prediction, PredictionId, PriceSnapshot, StatusUpdate};
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Persistence of predictions, their snapshot history and archived dates.
///
/// Implementations must make `set_baseline_if_absent` atomic per prediction
/// and keep writes for different predictions independent.
#[async_trait]
pub trait PredictionStore: Send + Sync + 'static {
    async fn insert_prediction(&self, new: NewPrediction) -> Result<Prediction>;
    async fn get_prediction(&self, id: PredictionId) -> Result<Option<Prediction>>;

    async fn append_snapshot(&self, snapshot: &PriceSnapshot) -> Result<()>;
    async fn update_status(&self, id: PredictionId, update: &StatusUpdate) -> Result<()>;
    /// Stores `price` only if no baseline is set and returns whichever value
    /// is stored afterwards.
    async fn set_baseline_if_absent(&self, id: PredictionId, price: f64) -> Result<f64>;

    /// PENDING predictions of a date, duplicates included, ordered by id.
    async fn query_pending(&self, date: NaiveDate) -> Result<Vec<Prediction>>;
    async fn query_by_date(&self, date: NaiveDate) -> Result<Vec<Prediction>>;
    /// Ordered by check timestamp.
    async fn snapshots_for(&self, id: PredictionId) -> Result<Vec<PriceSnapshot>>;

    /// Returns false when the date was already archived.
    async fn archive_date(&self, date: NaiveDate) -> Result<bool>;
    async fn is_archived(&self, date: NaiveDate) -> Result<bool>;
    /// Dates holding predictions that have not been archived, oldest first.
    async fn unarchived_dates(&self) -> Result<Vec<NaiveDate>>;
}
