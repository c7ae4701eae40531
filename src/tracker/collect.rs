use super::Tracker;
use crate::core::error::TrackError;
use crate::core::types::{Article, NewPrediction, Prediction, TickerVerdict};
use crate::extraction::dedup::{DuplicateIndex, Resolution};
use crate::extraction::ticker::TickerValidator;
use anyhow::Result;
use chrono::NaiveDate;
use tracing::{debug, info, warn};

impl Tracker {
    /// Extracts, validates and de-duplicates claims from `articles` and
    /// persists the survivors as PENDING predictions of `date`.
    ///
    /// Candidates are processed in observation order so the earliest report
    /// of a claim becomes the canonical record. An archived date accepts
    /// nothing.
    #[tracing::instrument(skip(self, articles), fields(articles = articles.len()))]
    pub async fn collect(&self, articles: &[Article], date: NaiveDate) -> Result<Vec<Prediction>> {
        if self.store.is_archived(date).await? {
            warn!(%date, "collection date already archived, skipping");
            return Ok(Vec::new());
        }

        let mut candidates: Vec<_> = articles
            .iter()
            .flat_map(|a| self.extractor.extract(a))
            .collect();
        candidates.sort_by_key(|c| c.observed_at);

        let mut index = DuplicateIndex::new();
        index.hydrate(&self.store.query_by_date(date).await?);
        let mut validator = TickerValidator::new(self.market.as_ref());

        let mut created = Vec::new();
        for candidate in candidates {
            if index.is_recollection(&candidate, date) {
                debug!(ticker = %candidate.ticker, url = %candidate.article_url, "already collected");
                continue;
            }

            let verdict = validator.validate(&candidate.ticker).await;
            if verdict != TickerVerdict::Valid {
                let err = TrackError::Validation {
                    ticker: candidate.ticker.clone(),
                    verdict,
                };
                debug!(error = %err, span = %candidate.source_text_span, "candidate dropped");
                continue;
            }

            let duplicate_of = match self.resolver.resolve(&candidate, date, &index) {
                Resolution::Unique => None,
                Resolution::DuplicateOf(id) => Some(id),
                Resolution::Recollected => continue,
            };

            let prediction = self
                .store
                .insert_prediction(NewPrediction {
                    candidate,
                    collection_date: date,
                    duplicate_of,
                })
                .await?;
            index.insert(&prediction);

            metrics::counter!(
                "predictions_collected_total",
                "duplicate" => if prediction.is_duplicate { "true" } else { "false" }
            )
            .increment(1);
            info!(
                id = prediction.id,
                ticker = %prediction.ticker,
                direction = %prediction.direction,
                claimed = prediction.claimed_percentage,
                source = %prediction.source_name,
                duplicate_of = ?prediction.duplicate_of,
                "prediction recorded"
            );
            created.push(prediction);
        }

        Ok(created)
    }
}
