use crate::core::types::{Direction, Prediction, PredictionCandidate, PredictionId};
use crate::extraction::normalizers::canonical_url;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexedRecord {
    pub id: PredictionId,
    pub claimed_percentage: f64,
    pub direction: Direction,
    pub observed_at: DateTime<Utc>,
    pub duplicate_of: Option<PredictionId>,
}

impl IndexedRecord {
    /// The id a new duplicate of this record should point at.
    pub fn canonical_id(&self) -> PredictionId {
        self.duplicate_of.unwrap_or(self.id)
    }
}

impl From<&Prediction> for IndexedRecord {
    fn from(p: &Prediction) -> Self {
        Self {
            id: p.id,
            claimed_percentage: p.claimed_percentage,
            direction: p.direction,
            observed_at: p.observed_at,
            duplicate_of: p.duplicate_of,
        }
    }
}

/// Same-day predictions keyed by (ticker, collection_date).
#[derive(Debug, Default)]
pub struct DuplicateIndex {
    by_key: HashMap<(String, NaiveDate), Vec<IndexedRecord>>,
    seen_urls: HashSet<(NaiveDate, String, String)>,
}

impl DuplicateIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads what the store already holds for a date.
    pub fn hydrate(&mut self, predictions: &[Prediction]) {
        for p in predictions {
            self.insert(p);
        }
    }

    pub fn insert(&mut self, p: &Prediction) {
        self.by_key
            .entry((p.ticker.clone(), p.collection_date))
            .or_default()
            .push(IndexedRecord::from(p));
        if let Some(url) = url_key(&p.article_url) {
            self.seen_urls
                .insert((p.collection_date, url, p.ticker.clone()));
        }
    }

    pub fn records(&self, ticker: &str, date: NaiveDate) -> &[IndexedRecord] {
        self.by_key
            .get(&(ticker.to_string(), date))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Articles without a link cannot be recognised when seen again.
    pub fn is_recollection(&self, c: &PredictionCandidate, date: NaiveDate) -> bool {
        url_key(&c.article_url)
            .is_some_and(|url| self.seen_urls.contains(&(date, url, c.ticker.clone())))
    }
}

fn url_key(url: &str) -> Option<String> {
    let url = canonical_url(url);
    (!url.is_empty()).then_some(url)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Unique,
    DuplicateOf(PredictionId),
    /// Same article already recorded this ticker today.
    Recollected,
}

#[derive(Debug, Clone, Copy)]
pub struct DuplicateResolver {
    pub tolerance: f64,
    pub window: Duration,
}

impl Default for DuplicateResolver {
    fn default() -> Self {
        Self {
            tolerance: 3.0,
            window: Duration::from_secs(2 * 3600),
        }
    }
}

impl DuplicateResolver {
    pub fn new(tolerance: f64, window: Duration) -> Self {
        Self { tolerance, window }
    }

    pub fn is_duplicate(&self, c: &PredictionCandidate, e: &IndexedRecord) -> bool {
        let window = chrono::Duration::from_std(self.window).unwrap_or(chrono::Duration::MAX);
        c.direction == e.direction
            && (c.claimed_percentage - e.claimed_percentage).abs() <= self.tolerance
            && (c.observed_at - e.observed_at).abs() <= window
    }

    pub fn resolve(
        &self,
        c: &PredictionCandidate,
        date: NaiveDate,
        index: &DuplicateIndex,
    ) -> Resolution {
        if index.is_recollection(c, date) {
            return Resolution::Recollected;
        }

        index
            .records(&c.ticker, date)
            .iter()
            .filter(|e| self.is_duplicate(c, e))
            .min_by(|a, b| a.observed_at.cmp(&b.observed_at).then(a.id.cmp(&b.id)))
            .map(|e| Resolution::DuplicateOf(e.canonical_id()))
            .unwrap_or(Resolution::Unique)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::NewPrediction;
    use chrono::TimeZone;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 7).unwrap()
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 7, h, m, 0).unwrap()
    }

    fn candidate(ticker: &str, pct: f64, dir: Direction, observed: DateTime<Utc>) -> PredictionCandidate {
        PredictionCandidate {
            ticker: ticker.into(),
            claimed_percentage: pct,
            direction: dir,
            source_text_span: format!("{ticker} moves {pct}%"),
            source_name: "Wire".into(),
            article_url: format!("https://news.test/{ticker}/{pct}/{}", observed.timestamp()),
            headline: "h".into(),
            observed_at: observed,
        }
    }

    fn stored(id: PredictionId, c: PredictionCandidate, duplicate_of: Option<PredictionId>) -> Prediction {
        Prediction::from_new(
            id,
            NewPrediction {
                candidate: c,
                collection_date: date(),
                duplicate_of,
            },
        )
    }

    #[test]
    fn test_within_tolerance_and_window_is_duplicate() {
        let r = DuplicateResolver::default();
        let mut idx = DuplicateIndex::new();
        idx.insert(&stored(1, candidate("TSLA", 25.0, Direction::Up, at(10, 0)), None));

        let c = candidate("TSLA", 27.0, Direction::Up, at(10, 40));
        assert_eq!(r.resolve(&c, date(), &idx), Resolution::DuplicateOf(1));
    }

    #[test]
    fn test_outside_any_bound_is_unique() {
        let r = DuplicateResolver::default();
        let mut idx = DuplicateIndex::new();
        idx.insert(&stored(1, candidate("TSLA", 25.0, Direction::Up, at(10, 0)), None));

        let far_pct = candidate("TSLA", 28.5, Direction::Up, at(10, 30));
        let wrong_dir = candidate("TSLA", 25.0, Direction::Down, at(10, 30));
        let too_late = candidate("TSLA", 25.0, Direction::Up, at(12, 1));
        let other = candidate("NVDA", 25.0, Direction::Up, at(10, 30));
        for c in [far_pct, wrong_dir, too_late, other] {
            assert_eq!(r.resolve(&c, date(), &idx), Resolution::Unique);
        }
    }

    #[test]
    fn test_boundaries_inclusive() {
        let r = DuplicateResolver::default();
        let mut idx = DuplicateIndex::new();
        idx.insert(&stored(1, candidate("TSLA", 25.0, Direction::Up, at(10, 0)), None));
        let c = candidate("TSLA", 28.0, Direction::Up, at(12, 0));
        assert_eq!(r.resolve(&c, date(), &idx), Resolution::DuplicateOf(1));
    }

    #[test]
    fn test_earliest_match_wins_then_lowest_id() {
        let r = DuplicateResolver::default();
        let mut idx = DuplicateIndex::new();
        idx.insert(&stored(5, candidate("AMD", 30.0, Direction::Up, at(11, 0)), None));
        idx.insert(&stored(3, candidate("AMD", 31.0, Direction::Up, at(10, 30)), None));
        idx.insert(&stored(2, candidate("AMD", 29.0, Direction::Up, at(10, 30)), None));

        let c = candidate("AMD", 30.0, Direction::Up, at(11, 15));
        assert_eq!(r.resolve(&c, date(), &idx), Resolution::DuplicateOf(2));
    }

    #[test]
    fn test_chain_resolves_to_canonical_target() {
        let r = DuplicateResolver::default();
        let mut idx = DuplicateIndex::new();
        // 1 at 09:00 is out of window for the candidate; 2 duplicates 1
        idx.insert(&stored(1, candidate("GME", 40.0, Direction::Up, at(9, 0)), None));
        idx.insert(&stored(2, candidate("GME", 42.0, Direction::Up, at(10, 30)), Some(1)));

        let c = candidate("GME", 43.0, Direction::Up, at(12, 0));
        assert_eq!(r.resolve(&c, date(), &idx), Resolution::DuplicateOf(1));
    }

    #[test]
    fn test_same_url_same_ticker_is_recollection() {
        let r = DuplicateResolver::default();
        let mut idx = DuplicateIndex::new();
        let first = candidate("TSLA", 25.0, Direction::Up, at(10, 0));
        idx.insert(&stored(1, first.clone(), None));

        let mut again = candidate("TSLA", 60.0, Direction::Up, at(15, 0));
        again.article_url = format!("{}/#comments", first.article_url);
        assert_eq!(r.resolve(&again, date(), &idx), Resolution::Recollected);

        let next_day = date().succ_opt().unwrap();
        assert_eq!(r.resolve(&again, next_day, &idx), Resolution::Unique);
    }

    #[test]
    fn test_linkless_articles_are_never_recollections() {
        let r = DuplicateResolver::default();
        let mut idx = DuplicateIndex::new();
        let mut first = candidate("TSLA", 25.0, Direction::Up, at(10, 0));
        first.article_url = String::new();
        idx.insert(&stored(1, first, None));

        let mut other = candidate("TSLA", 60.0, Direction::Up, at(15, 0));
        other.article_url = "  ".into();
        assert!(!idx.is_recollection(&other, date()));
        assert_eq!(r.resolve(&other, date(), &idx), Resolution::Unique);
    }
}
