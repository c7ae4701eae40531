pub mod dedup;
pub mod hedge;
pub mod normalizers;
pub mod patterns;
pub mod ticker;

use crate::config::config::ExtractionCfg;
use crate::core::types::{Article, PredictionCandidate};
use hedge::{HedgeFilter, HedgeVerdict, sentence_window};
use normalizers::normalize_for_matching;
use patterns::PatternMatcher;
use tracing::debug;

/// Text-only stage of collection: matcher, hedge filter, magnitude threshold.
///
/// Needs no I/O; ticker existence and duplicates are checked later against
/// the market and the store.
pub struct Extractor {
    matcher: PatternMatcher,
    hedge: HedgeFilter,
    minimum_percentage: f64,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(&ExtractionCfg::default())
    }
}

impl Extractor {
    pub fn new(cfg: &ExtractionCfg) -> Self {
        Self {
            matcher: PatternMatcher::new(&cfg.extra_stopwords),
            hedge: HedgeFilter::new(&cfg.extra_hedge_terms, cfg.exclude_retrospective),
            minimum_percentage: cfg.minimum_percentage,
        }
    }

    pub fn extract(&self, article: &Article) -> Vec<PredictionCandidate> {
        let text = normalize_for_matching(&article.text);
        let mut out = Vec::new();

        for m in self.matcher.matches(&text) {
            let window = sentence_window(&text, m.range.clone());
            if let HedgeVerdict::Reject { kind, term } = self.hedge.check(window) {
                debug!(
                    ticker = %m.ticker,
                    kind = kind.as_str(),
                    %term,
                    span = %m.span,
                    "hedged claim rejected"
                );
                continue;
            }
            if m.percentage < self.minimum_percentage {
                debug!(ticker = %m.ticker, pct = m.percentage, "below minimum magnitude");
                continue;
            }
            out.push(PredictionCandidate {
                ticker: m.ticker,
                claimed_percentage: m.percentage,
                direction: m.direction,
                source_text_span: m.span,
                source_name: article.source_name.clone(),
                article_url: article.url.clone(),
                headline: article.headline.clone(),
                observed_at: article.published_at,
            });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Direction;
    use chrono::Utc;

    fn article(headline: &str, body: &str) -> Article {
        Article::new("Wire", "https://news.test/a", headline, body, Utc::now())
    }

    #[test]
    fn test_nvda_headline() {
        let out = Extractor::default().extract(&article("NVDA stock jumps 45% after earnings beat", ""));
        assert_eq!(out.len(), 1);
        let c = &out[0];
        assert_eq!(c.ticker, "NVDA");
        assert_eq!(c.claimed_percentage, 45.0);
        assert_eq!(c.direction, Direction::Up);
        assert_eq!(c.source_text_span, "NVDA stock jumps 45%");
        assert_eq!(c.headline, "NVDA stock jumps 45% after earnings beat");
        assert_eq!(c.source_name, "Wire");
    }

    #[test]
    fn test_hedged_claim_yields_nothing() {
        let out = Extractor::default().extract(&article("XYZ surges 50%, could double if approval lands", ""));
        assert!(out.is_empty());
    }

    #[test]
    fn test_below_threshold_discarded() {
        let out = Extractor::default().extract(&article("ABC rises 12%", ""));
        assert!(out.is_empty());
    }

    #[test]
    fn test_threshold_is_inclusive_and_configurable() {
        assert_eq!(Extractor::default().extract(&article("ABC rises 20%", "")).len(), 1);

        let cfg = ExtractionCfg {
            minimum_percentage: 10.0,
            ..ExtractionCfg::default()
        };
        assert_eq!(Extractor::new(&cfg).extract(&article("ABC rises 12%", "")).len(), 1);
    }

    #[test]
    fn test_hedge_only_applies_to_its_sentence() {
        let out = Extractor::default().extract(&article(
            "Analysts say rivals could follow",
            "Meanwhile INTC plunges 26% on weak guidance.",
        ));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].ticker, "INTC");
        assert_eq!(out[0].direction, Direction::Down);
    }

    #[test]
    fn test_no_match_is_empty_not_error() {
        assert!(Extractor::default().extract(&article("Markets were flat", "")).is_empty());
    }
}
