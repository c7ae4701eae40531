use crate::config::config::{FeedKind, FeedsCfg};
use crate::core::types::Article;
use crate::feeds::html_page::HtmlHeadlineSource;
use crate::feeds::rss_feed::RssSource;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{info, warn};

/// Supplier of raw news items.
#[async_trait]
pub trait ArticleSource: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch_articles(&self) -> Result<Vec<Article>>;
}

/// Builds a source per enabled feed.
pub fn build_sources(cfg: &FeedsCfg, client: &Client) -> Result<Vec<Box<dyn ArticleSource>>> {
    let mut out: Vec<Box<dyn ArticleSource>> = Vec::new();
    for feed in cfg.sources.iter().filter(|f| f.enabled) {
        match feed.kind {
            FeedKind::Rss => out.push(Box::new(RssSource::new(feed.clone(), client.clone()))),
            FeedKind::Html => out.push(Box::new(HtmlHeadlineSource::new(
                feed.clone(),
                client.clone(),
            )?)),
        }
    }
    Ok(out)
}

/// Fetches every source in turn. A failing source is logged and skipped.
pub async fn gather_articles(sources: &[Box<dyn ArticleSource>], delay: Duration) -> Vec<Article> {
    let mut articles = Vec::new();
    for (i, source) in sources.iter().enumerate() {
        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match source.fetch_articles().await {
            Ok(batch) => {
                info!(source = source.name(), count = batch.len(), "fetched articles");
                articles.extend(batch);
            }
            Err(e) => {
                metrics::counter!("feed_fetch_failures_total", "source" => source.name().to_string())
                    .increment(1);
                warn!(source = source.name(), error = %e, "feed fetch failed");
            }
        }
    }
    articles
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    struct Fixed(&'static str, bool);

    #[async_trait]
    impl ArticleSource for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        async fn fetch_articles(&self) -> Result<Vec<Article>> {
            if self.1 {
                anyhow::bail!("boom");
            }
            Ok(vec![Article::new(self.0, "https://x.test/1", "NVDA jumps 45%", "", Utc::now())])
        }
    }

    #[tokio::test]
    async fn test_failing_source_is_isolated() {
        let sources: Vec<Box<dyn ArticleSource>> = vec![
            Box::new(Fixed("a", false)),
            Box::new(Fixed("b", true)),
            Box::new(Fixed("c", false)),
        ];
        let articles = gather_articles(&sources, Duration::ZERO).await;
        let names: Vec<_> = articles.iter().map(|a| a.source_name.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[test]
    fn test_disabled_feeds_skipped() {
        let mut cfg = FeedsCfg::default();
        cfg.sources[0].enabled = false;
        let sources = build_sources(&cfg, &Client::new()).unwrap();
        assert_eq!(sources.len(), cfg.sources.len() - 1);
    }
}
