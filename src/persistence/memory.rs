use crate::core::types::{
    NewPrediction, Prediction, PredictionId, PredictionStatus, PriceSnapshot, StatusUpdate,
};
use crate::persistence::store::PredictionStore;
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tokio::sync::Mutex;

#[derive(Debug, Default)]
pub struct MemoryState {
    pub predictions: BTreeMap<PredictionId, Prediction>,
    pub snapshots: Vec<PriceSnapshot>,
    pub archived: BTreeSet<NaiveDate>,
    pub last_id: PredictionId,
    /// Writes touching these ids fail, to exercise error isolation.
    pub failing_writes: HashSet<PredictionId>,
}

/// Process-local store for tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    pub state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_writes_for(&self, id: PredictionId) {
        self.state.lock().await.failing_writes.insert(id);
    }
}

fn check_writable(state: &MemoryState, id: PredictionId) -> Result<()> {
    if state.failing_writes.contains(&id) {
        anyhow::bail!("simulated write failure for prediction {}", id);
    }
    Ok(())
}

#[async_trait]
impl PredictionStore for MemoryStore {
    async fn insert_prediction(&self, new: NewPrediction) -> Result<Prediction> {
        let mut state = self.state.lock().await;
        state.last_id += 1;
        let p = Prediction::from_new(state.last_id, new);
        state.predictions.insert(p.id, p.clone());
        Ok(p)
    }

    async fn get_prediction(&self, id: PredictionId) -> Result<Option<Prediction>> {
        Ok(self.state.lock().await.predictions.get(&id).cloned())
    }

    async fn append_snapshot(&self, snapshot: &PriceSnapshot) -> Result<()> {
        let mut state = self.state.lock().await;
        check_writable(&state, snapshot.prediction_id)?;
        anyhow::ensure!(
            state.predictions.contains_key(&snapshot.prediction_id),
            "prediction {} not found",
            snapshot.prediction_id
        );
        state.snapshots.push(snapshot.clone());
        Ok(())
    }

    async fn update_status(&self, id: PredictionId, update: &StatusUpdate) -> Result<()> {
        let mut state = self.state.lock().await;
        check_writable(&state, id)?;
        let p = state
            .predictions
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("prediction {} not found", id))?;
        p.status = update.status;
        p.latest_actual_percentage = update.latest_actual_percentage;
        p.latest_gap = update.latest_gap;
        Ok(())
    }

    async fn set_baseline_if_absent(&self, id: PredictionId, price: f64) -> Result<f64> {
        let mut state = self.state.lock().await;
        check_writable(&state, id)?;
        let p = state
            .predictions
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("prediction {} not found", id))?;
        Ok(*p.baseline_price.get_or_insert(price))
    }

    async fn query_pending(&self, date: NaiveDate) -> Result<Vec<Prediction>> {
        let state = self.state.lock().await;
        Ok(state
            .predictions
            .values()
            .filter(|p| p.collection_date == date && p.status == PredictionStatus::Pending)
            .cloned()
            .collect())
    }

    async fn query_by_date(&self, date: NaiveDate) -> Result<Vec<Prediction>> {
        let state = self.state.lock().await;
        Ok(state
            .predictions
            .values()
            .filter(|p| p.collection_date == date)
            .cloned()
            .collect())
    }

    async fn snapshots_for(&self, id: PredictionId) -> Result<Vec<PriceSnapshot>> {
        let state = self.state.lock().await;
        let mut out: Vec<_> = state
            .snapshots
            .iter()
            .filter(|s| s.prediction_id == id)
            .cloned()
            .collect();
        out.sort_by_key(|s| s.check_timestamp);
        Ok(out)
    }

    async fn archive_date(&self, date: NaiveDate) -> Result<bool> {
        let mut state = self.state.lock().await;
        Ok(state.archived.insert(date))
    }

    async fn is_archived(&self, date: NaiveDate) -> Result<bool> {
        Ok(self.state.lock().await.archived.contains(&date))
    }

    async fn unarchived_dates(&self) -> Result<Vec<NaiveDate>> {
        let state = self.state.lock().await;
        let dates: BTreeSet<NaiveDate> = state
            .predictions
            .values()
            .map(|p| p.collection_date)
            .filter(|d| !state.archived.contains(d))
            .collect();
        Ok(dates.into_iter().collect())
    }
}
