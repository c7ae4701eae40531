//! Read-side projections over a day's predictions.
//!
//! Everything here is recomputed from stored predictions on demand and only
//! counts canonical (non-duplicate) records.

use crate::core::types::{Prediction, PredictionStatus};
use crate::tracking::classifier::round2;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub total_predictions: usize,
    pub duplicates: usize,
    pub hits: usize,
    pub misses: usize,
    pub partials: usize,
    pub pending: usize,
    /// Hits over resolved predictions, in percent.
    pub hit_rate: f64,
    pub avg_predicted_movement: f64,
    pub avg_actual_movement: f64,
    pub movement_accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceAccuracy {
    pub source_name: String,
    pub date: NaiveDate,
    pub predictions_count: usize,
    pub hits: usize,
    pub partials: usize,
    pub misses: usize,
    pub hit_rate: f64,
    pub avg_predicted: f64,
    pub avg_actual: f64,
    pub magnitude_accuracy: f64,
    pub weighted_score: f64,
}

#[derive(Default)]
struct Tally {
    total: usize,
    hits: usize,
    partials: usize,
    misses: usize,
    pending: usize,
    claimed: Vec<f64>,
    actual: Vec<f64>,
    accuracy: Vec<f64>,
}

impl Tally {
    fn add(&mut self, p: &Prediction) {
        self.total += 1;
        match p.status {
            PredictionStatus::Hit => self.hits += 1,
            PredictionStatus::Partial => self.partials += 1,
            PredictionStatus::Miss => self.misses += 1,
            PredictionStatus::Pending => self.pending += 1,
        }
        self.claimed.push(p.claimed_percentage);
        if let Some(actual) = p.latest_actual_percentage {
            self.actual.push(actual);
            self.accuracy.push(magnitude_accuracy(actual, p.claimed_percentage));
        }
    }

    fn resolved(&self) -> usize {
        self.hits + self.partials + self.misses
    }

    fn hit_rate(&self) -> f64 {
        ratio(self.hits as f64, self.resolved())
    }

    fn weighted_score(&self) -> f64 {
        ratio(self.hits as f64 + 0.5 * self.partials as f64, self.resolved())
    }
}

fn ratio(num: f64, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        round2(num / den as f64 * 100.0)
    }
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        0.0
    } else {
        round2(xs.iter().sum::<f64>() / xs.len() as f64)
    }
}

/// 100 for an exact call, falling linearly to 0 as the miss reaches the
/// size of the claim.
pub fn magnitude_accuracy(actual: f64, claimed: f64) -> f64 {
    if claimed <= 0.0 {
        return 0.0;
    }
    let gap = (actual.abs() - claimed).abs();
    (100.0 - gap / claimed * 100.0).max(0.0)
}

pub fn daily_summary(date: NaiveDate, predictions: &[Prediction]) -> DailySummary {
    let mut tally = Tally::default();
    let mut duplicates = 0;
    for p in predictions.iter().filter(|p| p.collection_date == date) {
        if p.is_duplicate {
            duplicates += 1;
        } else {
            tally.add(p);
        }
    }

    DailySummary {
        date,
        total_predictions: tally.total,
        duplicates,
        hits: tally.hits,
        misses: tally.misses,
        partials: tally.partials,
        pending: tally.pending,
        hit_rate: tally.hit_rate(),
        avg_predicted_movement: mean(&tally.claimed),
        avg_actual_movement: mean(&tally.actual),
        movement_accuracy: mean(&tally.accuracy),
    }
}

/// Per-source scorecard, best first.
pub fn source_accuracy(date: NaiveDate, predictions: &[Prediction]) -> Vec<SourceAccuracy> {
    let mut by_source: BTreeMap<&str, Tally> = BTreeMap::new();
    for p in predictions
        .iter()
        .filter(|p| p.collection_date == date && !p.is_duplicate)
    {
        by_source.entry(p.source_name.as_str()).or_default().add(p);
    }

    let mut out: Vec<SourceAccuracy> = by_source
        .into_iter()
        .map(|(name, t)| SourceAccuracy {
            source_name: name.to_string(),
            date,
            predictions_count: t.total,
            hits: t.hits,
            partials: t.partials,
            misses: t.misses,
            hit_rate: t.hit_rate(),
            avg_predicted: mean(&t.claimed),
            avg_actual: mean(&t.actual),
            magnitude_accuracy: mean(&t.accuracy),
            weighted_score: t.weighted_score(),
        })
        .collect();

    out.sort_by(|a, b| {
        b.weighted_score
            .total_cmp(&a.weighted_score)
            .then_with(|| a.source_name.cmp(&b.source_name))
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Direction, NewPrediction, PredictionCandidate};
    use chrono::Utc;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 7).unwrap()
    }

    fn pred(
        id: i64,
        source: &str,
        claimed: f64,
        status: PredictionStatus,
        actual: Option<f64>,
        duplicate_of: Option<i64>,
    ) -> Prediction {
        let mut p = Prediction::from_new(
            id,
            NewPrediction {
                candidate: PredictionCandidate {
                    ticker: "NVDA".into(),
                    claimed_percentage: claimed,
                    direction: Direction::Up,
                    source_text_span: String::new(),
                    source_name: source.into(),
                    article_url: format!("https://news.test/{id}"),
                    headline: String::new(),
                    observed_at: Utc::now(),
                },
                collection_date: date(),
                duplicate_of,
            },
        );
        p.status = status;
        p.latest_actual_percentage = actual;
        p
    }

    #[test]
    fn test_daily_summary_counts_canonical_only() {
        let ps = vec![
            pred(1, "Wire", 40.0, PredictionStatus::Hit, Some(40.0), None),
            pred(2, "Wire", 20.0, PredictionStatus::Miss, Some(-5.0), None),
            pred(3, "Blog", 30.0, PredictionStatus::Partial, Some(21.0), None),
            pred(4, "Blog", 30.0, PredictionStatus::Pending, None, None),
            pred(5, "Blog", 41.0, PredictionStatus::Hit, Some(40.0), Some(1)),
        ];
        let s = daily_summary(date(), &ps);
        assert_eq!(s.total_predictions, 4);
        assert_eq!(s.duplicates, 1);
        assert_eq!((s.hits, s.partials, s.misses, s.pending), (1, 1, 1, 1));
        assert_eq!(s.hit_rate, 33.33);
        assert_eq!(s.avg_predicted_movement, 30.0);
        assert_eq!(s.avg_actual_movement, 18.67);
        // accuracies: 100, 25, 70
        assert_eq!(s.movement_accuracy, 65.0);
    }

    #[test]
    fn test_empty_day() {
        let s = daily_summary(date(), &[]);
        assert_eq!(s.total_predictions, 0);
        assert_eq!(s.hit_rate, 0.0);
        assert_eq!(s.movement_accuracy, 0.0);
    }

    #[test]
    fn test_source_ranking() {
        let ps = vec![
            pred(1, "Wire", 40.0, PredictionStatus::Hit, Some(40.0), None),
            pred(2, "Wire", 20.0, PredictionStatus::Miss, Some(-5.0), None),
            pred(3, "Blog", 30.0, PredictionStatus::Partial, Some(21.0), None),
            pred(4, "Alpha", 30.0, PredictionStatus::Partial, Some(21.0), None),
            pred(5, "Zeta", 41.0, PredictionStatus::Hit, Some(40.0), Some(1)),
        ];
        let ranked = source_accuracy(date(), &ps);
        let names: Vec<_> = ranked.iter().map(|s| s.source_name.as_str()).collect();
        // Wire (1 + 0) / 2 = 50, Alpha and Blog 0.5 / 1 = 50; ties by name
        assert_eq!(names, vec!["Alpha", "Blog", "Wire"]);
        assert_eq!(ranked[2].hit_rate, 50.0);
        assert_eq!(ranked[2].weighted_score, 50.0);
        assert_eq!(ranked[0].magnitude_accuracy, 70.0);
    }

    #[test]
    fn test_magnitude_accuracy_floor() {
        assert_eq!(magnitude_accuracy(45.0, 45.0), 100.0);
        assert_eq!(magnitude_accuracy(-90.0, 30.0), 0.0);
        assert_eq!(magnitude_accuracy(0.0, 0.0), 0.0);
    }
}
