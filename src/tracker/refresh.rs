use super::Tracker;
use crate::core::error::TrackError;
use crate::core::types::{
    Prediction, PredictionId, PredictionStatus, SessionState, StatusUpdate,
};
use crate::tracking::classifier::{classify, evaluate, gap};
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;
use tracing::{debug, error, info, warn};

type PriceTable<K> = HashMap<K, Result<f64, String>>;
/// Baselines are keyed by the collection date they precede.
type CloseKey = (String, NaiveDate);

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RolloverReport {
    pub date: Option<NaiveDate>,
    /// The date had been archived before this call; nothing was touched.
    pub already_archived: bool,
    pub re_evaluated: usize,
    /// Finalised from the last recorded snapshot because no price was available.
    pub from_last_snapshot: usize,
    /// Finalised as MISS with no price history at all.
    pub without_price: usize,
    pub duplicates_inherited: usize,
    pub hits: usize,
    pub partials: usize,
    pub misses: usize,
}

impl RolloverReport {
    fn count(&mut self, status: PredictionStatus) {
        match status {
            PredictionStatus::Hit => self.hits += 1,
            PredictionStatus::Partial => self.partials += 1,
            PredictionStatus::Miss => self.misses += 1,
            PredictionStatus::Pending => {}
        }
    }
}

impl Tracker {
    /// One validation cycle over `pending`.
    ///
    /// Returns every input prediction with its post-cycle state and whether
    /// its status changed. Price and per-item store failures leave the
    /// prediction as it was. Predictions of an earlier collection date are
    /// judged against a closed session.
    #[tracing::instrument(skip(self, pending), fields(pending = pending.len()))]
    pub async fn refresh(
        &self,
        pending: Vec<Prediction>,
        now: DateTime<Utc>,
    ) -> Result<Vec<(Prediction, bool)>> {
        let session = self.session_at(now);
        let today = self.clock.collection_date(now);
        let (duplicates, canonical): (Vec<_>, Vec<_>) =
            pending.into_iter().partition(|p| p.is_duplicate);

        let mut out = self
            .refresh_canonical(canonical, now, |p| {
                if p.collection_date < today {
                    SessionState::Closed
                } else {
                    session
                }
            })
            .await;
        let known: HashMap<PredictionId, Prediction> =
            out.iter().map(|(p, _)| (p.id, p.clone())).collect();

        for mut dup in duplicates {
            let changed = match self.inherited_update(&dup, &known).await {
                Ok(Some(update)) => match self.store.update_status(dup.id, &update).await {
                    Ok(()) => {
                        apply(&mut dup, &update);
                        true
                    }
                    Err(e) => {
                        error!(id = dup.id, error = %e, "failed to store inherited status");
                        false
                    }
                },
                Ok(None) => false,
                Err(e) => {
                    error!(id = dup.id, error = %e, "failed to look up duplicate target");
                    false
                }
            };
            out.push((dup, changed));
        }

        let changed = out.iter().filter(|(_, c)| *c).count();
        info!(checked = out.len(), changed, session = ?session, "refresh cycle done");
        Ok(out)
    }

    /// Refreshes the PENDING predictions of one collection date.
    pub async fn refresh_date(
        &self,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Vec<(Prediction, bool)>> {
        let pending = self.store.query_pending(date).await?;
        self.refresh(pending, now).await
    }

    /// Finalises a collection date: nothing of `date` is PENDING afterwards
    /// and the date is archived. Calling it again is a no-op.
    ///
    /// Only dates before the clock's current collection date can be rolled
    /// over; collection may still be filing predictions under today.
    #[tracing::instrument(skip(self))]
    pub async fn daily_rollover(
        &self,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<RolloverReport> {
        let today = self.clock.collection_date(now);
        anyhow::ensure!(
            date < today,
            "collection date {} has not ended yet (today is {})",
            date,
            today
        );

        let mut report = RolloverReport {
            date: Some(date),
            ..RolloverReport::default()
        };
        if self.store.is_archived(date).await? {
            debug!("date already archived");
            report.already_archived = true;
            return Ok(report);
        }

        let canonical: Vec<_> = self
            .store
            .query_pending(date)
            .await?
            .into_iter()
            .filter(|p| !p.is_duplicate)
            .collect();
        report.re_evaluated = canonical.len();

        let evaluated = self
            .refresh_canonical(canonical, now, |_| SessionState::Closed)
            .await;
        for (p, _) in evaluated {
            if p.status.is_terminal() {
                report.count(p.status);
                continue;
            }
            let snapshots = self.store.snapshots_for(p.id).await?;
            let update = match snapshots.last() {
                Some(last) => {
                    report.from_last_snapshot += 1;
                    StatusUpdate {
                        status: classify(
                            p.claimed_percentage,
                            p.direction,
                            last.actual_movement_percentage,
                            SessionState::Closed,
                            self.thresholds,
                        ),
                        latest_actual_percentage: Some(last.actual_movement_percentage),
                        latest_gap: Some(last.gap),
                    }
                }
                None => {
                    report.without_price += 1;
                    StatusUpdate {
                        status: PredictionStatus::Miss,
                        latest_actual_percentage: p.latest_actual_percentage,
                        latest_gap: p.latest_gap,
                    }
                }
            };
            self.store.update_status(p.id, &update).await?;
            report.count(update.status);
            info!(id = p.id, ticker = %p.ticker, status = %update.status, "finalised without a fresh price");
        }

        let duplicates: Vec<_> = self
            .store
            .query_pending(date)
            .await?
            .into_iter()
            .filter(|p| p.is_duplicate)
            .collect();
        let known = HashMap::new();
        for dup in duplicates {
            let update = match self.inherited_update(&dup, &known).await? {
                Some(update) => update,
                None => {
                    warn!(id = dup.id, target = ?dup.duplicate_of, "duplicate target unresolved at rollover");
                    StatusUpdate {
                        status: PredictionStatus::Miss,
                        latest_actual_percentage: dup.latest_actual_percentage,
                        latest_gap: dup.latest_gap,
                    }
                }
            };
            self.store.update_status(dup.id, &update).await?;
            report.duplicates_inherited += 1;
        }

        let newly_archived = self.store.archive_date(date).await?;
        report.already_archived = !newly_archived;
        info!(
            re_evaluated = report.re_evaluated,
            hits = report.hits,
            partials = report.partials,
            misses = report.misses,
            duplicates = report.duplicates_inherited,
            "date rolled over"
        );
        Ok(report)
    }

    async fn fetch_closes(&self, keys: BTreeSet<CloseKey>) -> PriceTable<CloseKey> {
        let market = &self.market;
        stream::iter(keys)
            .map(|(ticker, as_of)| async move {
                let res = market.get_previous_close(&ticker, as_of).await;
                ((ticker, as_of), res.map_err(|e| format!("{:#}", e)))
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }

    async fn fetch_current(&self, tickers: BTreeSet<String>) -> PriceTable<String> {
        let market = &self.market;
        stream::iter(tickers)
            .map(|ticker| async move {
                let res = market.get_current_price(&ticker).await;
                (ticker, res.map_err(|e| format!("{:#}", e)))
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }

    async fn refresh_canonical(
        &self,
        predictions: Vec<Prediction>,
        now: DateTime<Utc>,
        session_for: impl Fn(&Prediction) -> SessionState,
    ) -> Vec<(Prediction, bool)> {
        let active = predictions.iter().filter(|p| p.is_trackable());
        let need_baseline: BTreeSet<CloseKey> = active
            .clone()
            .filter(|p| p.baseline_price.is_none())
            .map(|p| (p.ticker.clone(), p.collection_date))
            .collect();
        let tickers: BTreeSet<String> = active.map(|p| p.ticker.clone()).collect();

        let closes = self.fetch_closes(need_baseline).await;
        let prices = self.fetch_current(tickers).await;

        let mut out = Vec::with_capacity(predictions.len());
        for mut p in predictions {
            if !p.is_trackable() {
                out.push((p, false));
                continue;
            }
            let session = session_for(&p);
            let changed = match self
                .check_one(&mut p, &closes, &prices, session, now)
                .await
            {
                Ok(changed) => changed,
                Err(e) if e.is_price_fetch() => {
                    metrics::counter!("price_fetch_failures_total").increment(1);
                    warn!(id = p.id, error = %e, "price unavailable, staying pending");
                    false
                }
                Err(e) => {
                    error!(id = p.id, error = %e, "store write failed, prediction unchanged");
                    false
                }
            };
            out.push((p, changed));
        }
        out
    }

    async fn check_one(
        &self,
        p: &mut Prediction,
        closes: &PriceTable<CloseKey>,
        prices: &PriceTable<String>,
        session: SessionState,
        now: DateTime<Utc>,
    ) -> Result<bool, TrackError> {
        let baseline = match p.baseline_price {
            Some(b) => b,
            None => {
                let key = (p.ticker.clone(), p.collection_date);
                let close = lookup(closes, &key).map_err(|reason| {
                    TrackError::BaselineUnavailable {
                        ticker: p.ticker.clone(),
                        reason,
                    }
                })?;
                let stored = self
                    .store
                    .set_baseline_if_absent(p.id, close)
                    .await
                    .map_err(TrackError::Store)?;
                p.baseline_price = Some(stored);
                stored
            }
        };

        let current = lookup(prices, &p.ticker).map_err(|reason| TrackError::PriceUnavailable {
            ticker: p.ticker.clone(),
            reason,
        })?;

        let eval = evaluate(
            p.id,
            p.claimed_percentage,
            p.direction,
            baseline,
            current,
            session,
            self.thresholds,
            now,
        );
        self.store
            .append_snapshot(&eval.snapshot)
            .await
            .map_err(TrackError::Store)?;
        self.store
            .update_status(p.id, &eval.update)
            .await
            .map_err(TrackError::Store)?;

        let changed = p.status != eval.update.status;
        apply(p, &eval.update);
        if changed {
            info!(
                id = p.id,
                ticker = %p.ticker,
                status = %p.status,
                actual = eval.snapshot.actual_movement_percentage,
                claimed = p.claimed_percentage,
                "status changed"
            );
        }
        Ok(changed)
    }

    /// Status a duplicate takes from its canonical target, once the target
    /// is terminal.
    async fn inherited_update(
        &self,
        dup: &Prediction,
        known: &HashMap<PredictionId, Prediction>,
    ) -> Result<Option<StatusUpdate>> {
        let Some(target_id) = dup.duplicate_of else {
            return Ok(None);
        };
        let target = match known.get(&target_id) {
            Some(t) => Some(t.clone()),
            None => self.store.get_prediction(target_id).await?,
        };
        Ok(target.filter(|t| t.status.is_terminal()).map(|t| StatusUpdate {
            status: t.status,
            latest_actual_percentage: t.latest_actual_percentage,
            latest_gap: t
                .latest_actual_percentage
                .map(|actual| gap(actual, dup.claimed_percentage)),
        }))
    }
}

fn lookup<K: Hash + Eq>(table: &PriceTable<K>, key: &K) -> Result<f64, String> {
    match table.get(key) {
        Some(Ok(price)) => Ok(*price),
        Some(Err(reason)) => Err(reason.clone()),
        None => Err("not requested".to_string()),
    }
}

fn apply(p: &mut Prediction, update: &StatusUpdate) {
    p.status = update.status;
    p.latest_actual_percentage = update.latest_actual_percentage;
    p.latest_gap = update.latest_gap;
}
