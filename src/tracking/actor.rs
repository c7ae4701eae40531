use crate::core::types::Actor;
use crate::tracker::{RolloverReport, Tracker};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Drives refresh cycles and rolls over dates left behind by the clock.
pub struct RefreshActor {
    pub tracker: Tracker,
    pub refresh: Duration,
    pub shutdown: CancellationToken,
}

impl RefreshActor {
    pub fn new(tracker: Tracker, refresh: Duration, shutdown: CancellationToken) -> RefreshActor {
        Self {
            tracker,
            refresh,
            shutdown,
        }
    }

    /// Finalises and archives every earlier date not yet archived, including
    /// dates whose predictions all resolved during the day.
    pub async fn roll_over_stale(&self, now: DateTime<Utc>) -> Result<Vec<RolloverReport>> {
        let today = self.tracker.clock().collection_date(now);
        let mut reports = Vec::new();
        for date in self.tracker.store().unarchived_dates().await? {
            if date >= today {
                continue;
            }
            reports.push(self.tracker.daily_rollover(date, now).await?);
        }
        Ok(reports)
    }

    pub async fn cycle(&self, now: DateTime<Utc>) -> Result<()> {
        for report in self.roll_over_stale(now).await? {
            info!(date = ?report.date, misses = report.misses, hits = report.hits, "rolled over stale date");
        }
        let today = self.tracker.clock().collection_date(now);
        self.tracker.refresh_date(today, now).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Actor for RefreshActor {
    async fn run(self) -> Result<()> {
        info!("RefreshActor started");

        let mut tick = interval(self.refresh);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("RefreshActor: shutdown requested");
                    break;
                }

                _ = tick.tick() => {
                    if let Err(e) = self.cycle(Utc::now()).await {
                        error!(error = %e, "refresh cycle failed");
                    }
                }
            }
        }

        info!("RefreshActor stopped cleanly");
        Ok(())
    }
}
