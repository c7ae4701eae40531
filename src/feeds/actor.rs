use crate::config::config::FeedsCfg;
use crate::core::types::{Actor, Prediction};
use crate::feeds::source::{ArticleSource, gather_articles};
use crate::tracker::Tracker;
use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Periodically pulls every feed and hands the articles to the tracker.
pub struct CollectorActor {
    pub tracker: Tracker,
    pub sources: Vec<Box<dyn ArticleSource>>,
    pub cfg: FeedsCfg,
    pub shutdown: CancellationToken,
}

impl CollectorActor {
    pub fn new(
        tracker: Tracker,
        sources: Vec<Box<dyn ArticleSource>>,
        cfg: FeedsCfg,
        shutdown: CancellationToken,
    ) -> CollectorActor {
        Self {
            tracker,
            sources,
            cfg,
            shutdown,
        }
    }

    /// One collection pass, filed under the reference-timezone date of `now`.
    pub async fn collect_once(&self, now: DateTime<Utc>) -> Result<Vec<Prediction>> {
        let articles = gather_articles(&self.sources, self.cfg.delay_between_sources).await;
        let date = self.tracker.clock().collection_date(now);
        let created = self.tracker.collect(&articles, date).await?;
        info!(%date, articles = articles.len(), created = created.len(), "collection pass done");
        Ok(created)
    }
}

#[async_trait::async_trait]
impl Actor for CollectorActor {
    async fn run(self) -> Result<()> {
        info!(sources = self.sources.len(), "CollectorActor started");

        let mut tick = interval(self.cfg.refresh);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("CollectorActor: shutdown requested");
                    break;
                }

                _ = tick.tick() => {
                    if let Err(e) = self.collect_once(Utc::now()).await {
                        error!(error = %e, "collection pass failed");
                    }
                }
            }
        }

        info!("CollectorActor stopped cleanly");
        Ok(())
    }
}
