use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use config::{Config, File};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppCfg {
    #[serde(default)]
    pub http: HttpCfg,
    #[serde(default)]
    pub feeds: FeedsCfg,
    #[serde(rename = "marketData", default)]
    pub market_data: MarketDataCfg,
    #[serde(default)]
    pub extraction: ExtractionCfg,
    #[serde(default)]
    pub tracking: TrackingCfg,
    #[serde(default)]
    pub session: SessionCfg,
    #[serde(default)]
    pub database: DatabaseCfg,
    #[serde(default)]
    pub log: LogCfg,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpCfg {
    #[serde(rename = "userAgent", default = "default_ua")]
    pub user_agent: String,
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
    #[serde(
        rename = "poolIdleTimeout",
        with = "humantime_serde",
        default = "default_pool_idle"
    )]
    pub pool_idle_timeout: Duration,
    #[serde(rename = "poolMaxIdlePerHost", default = "default_pool")]
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpCfg {
    fn default() -> Self {
        Self {
            user_agent: default_ua(),
            timeout: default_timeout(),
            pool_idle_timeout: default_pool_idle(),
            pool_max_idle_per_host: default_pool(),
        }
    }
}
fn default_ua() -> String {
    "Mozilla/5.0 (compatible; calltrack/0.1)".into()
}
fn default_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_pool_idle() -> Duration {
    Duration::from_secs(90)
}
fn default_pool() -> usize {
    8
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    Rss,
    Html,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedCfg {
    pub id: String,
    /// Display name stored as the prediction's source.
    pub name: String,
    pub url: String,
    pub kind: FeedKind,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_item_limit")]
    pub limit: usize,
    #[serde(rename = "itemSelector", default)]
    pub item_selector: Option<String>,
    #[serde(rename = "titleSelector", default)]
    pub title_selector: Option<String>,
}

fn default_true() -> bool {
    true
}
fn default_item_limit() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedsCfg {
    #[serde(with = "humantime_serde", default = "default_collect_every")]
    pub refresh: Duration,
    #[serde(
        rename = "delayBetweenSources",
        with = "humantime_serde",
        default = "default_source_delay"
    )]
    pub delay_between_sources: Duration,
    #[serde(default)]
    pub sources: Vec<FeedCfg>,
}

impl Default for FeedsCfg {
    fn default() -> Self {
        Self {
            refresh: default_collect_every(),
            delay_between_sources: default_source_delay(),
            sources: vec![
                FeedCfg {
                    id: "yahoo_finance".into(),
                    name: "Yahoo Finance".into(),
                    url: "https://finance.yahoo.com/news/rssindex".into(),
                    kind: FeedKind::Rss,
                    enabled: true,
                    limit: default_item_limit(),
                    item_selector: None,
                    title_selector: None,
                },
                FeedCfg {
                    id: "marketwatch".into(),
                    name: "MarketWatch".into(),
                    url: "https://www.marketwatch.com/rss/topstories".into(),
                    kind: FeedKind::Rss,
                    enabled: true,
                    limit: default_item_limit(),
                    item_selector: None,
                    title_selector: None,
                },
            ],
        }
    }
}
fn default_collect_every() -> Duration {
    Duration::from_secs(30 * 60)
}
fn default_source_delay() -> Duration {
    Duration::from_secs(2)
}

#[derive(Debug, Deserialize, Clone)]
pub struct MarketDataCfg {
    #[serde(rename = "baseUrl", default = "default_chart_url")]
    pub base_url: String,
    #[serde(rename = "requestsPerMinute", default = "default_rpm")]
    pub requests_per_minute: u32,
}

impl Default for MarketDataCfg {
    fn default() -> Self {
        Self {
            base_url: default_chart_url(),
            requests_per_minute: default_rpm(),
        }
    }
}
fn default_chart_url() -> String {
    "https://query1.finance.yahoo.com".into()
}
fn default_rpm() -> u32 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionCfg {
    #[serde(rename = "minimumPercentage", default = "default_min_pct")]
    pub minimum_percentage: f64,
    #[serde(rename = "extraStopwords", default)]
    pub extra_stopwords: Vec<String>,
    #[serde(rename = "extraHedgeTerms", default)]
    pub extra_hedge_terms: Vec<String>,
    #[serde(rename = "excludeRetrospective", default = "default_true")]
    pub exclude_retrospective: bool,
}

impl Default for ExtractionCfg {
    fn default() -> Self {
        Self {
            minimum_percentage: default_min_pct(),
            extra_stopwords: Vec::new(),
            extra_hedge_terms: Vec::new(),
            exclude_retrospective: true,
        }
    }
}
fn default_min_pct() -> f64 {
    20.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrackingCfg {
    #[serde(rename = "hitThreshold", default = "default_hit")]
    pub hit_threshold: f64,
    #[serde(rename = "partialThreshold", default = "default_partial")]
    pub partial_threshold: f64,
    #[serde(rename = "duplicateTolerance", default = "default_dup_tolerance")]
    pub duplicate_tolerance: f64,
    #[serde(
        rename = "duplicateWindow",
        with = "humantime_serde",
        default = "default_dup_window"
    )]
    pub duplicate_window: Duration,
    #[serde(with = "humantime_serde", default = "default_refresh_every")]
    pub refresh: Duration,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for TrackingCfg {
    fn default() -> Self {
        Self {
            hit_threshold: default_hit(),
            partial_threshold: default_partial(),
            duplicate_tolerance: default_dup_tolerance(),
            duplicate_window: default_dup_window(),
            refresh: default_refresh_every(),
            concurrency: default_concurrency(),
        }
    }
}
fn default_hit() -> f64 {
    5.0
}
fn default_partial() -> f64 {
    10.0
}
fn default_dup_tolerance() -> f64 {
    3.0
}
fn default_dup_window() -> Duration {
    Duration::from_secs(2 * 3600)
}
fn default_refresh_every() -> Duration {
    Duration::from_secs(30 * 60)
}
fn default_concurrency() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionCfg {
    #[serde(default = "default_tz")]
    pub timezone: String,
    #[serde(default = "default_open")]
    pub open: NaiveTime,
    #[serde(default = "default_close")]
    pub close: NaiveTime,
    #[serde(default)]
    pub holidays: Vec<NaiveDate>,
}

impl Default for SessionCfg {
    fn default() -> Self {
        Self {
            timezone: default_tz(),
            open: default_open(),
            close: default_close(),
            holidays: Vec::new(),
        }
    }
}
fn default_tz() -> String {
    "America/New_York".into()
}
fn default_open() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 30, 0).unwrap_or_default()
}
fn default_close() -> NaiveTime {
    NaiveTime::from_hms_opt(16, 0, 0).unwrap_or_default()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseCfg {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseCfg {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}
fn default_db_path() -> String {
    "predictions.db".into()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogCfg {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LogCfg {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}
fn default_level() -> String {
    "info".into()
}

impl AppCfg {
    pub fn load(path: &str) -> Result<Self> {
        let cfg = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("CALLTRACK").separator("__"))
            .build()
            .context("building config")?;

        let app: AppCfg = cfg.try_deserialize().context("deserializing config")?;
        app.validate()?;
        Ok(app)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.extraction.minimum_percentage > 0.0,
            "extraction.minimumPercentage must be > 0"
        );
        anyhow::ensure!(
            self.tracking.hit_threshold >= 0.0,
            "tracking.hitThreshold must be >= 0"
        );
        anyhow::ensure!(
            self.tracking.partial_threshold >= self.tracking.hit_threshold,
            "tracking.partialThreshold must be >= tracking.hitThreshold"
        );
        anyhow::ensure!(
            self.tracking.duplicate_tolerance >= 0.0,
            "tracking.duplicateTolerance must be >= 0"
        );
        anyhow::ensure!(
            self.tracking.concurrency > 0,
            "tracking.concurrency must be > 0"
        );
        anyhow::ensure!(
            self.session.open < self.session.close,
            "session.open must be before session.close"
        );
        anyhow::ensure!(
            self.session.timezone.parse::<chrono_tz::Tz>().is_ok(),
            "session.timezone '{}' is not a known IANA zone",
            self.session.timezone
        );
        anyhow::ensure!(
            !self.market_data.base_url.is_empty(),
            "marketData.baseUrl missing"
        );
        anyhow::ensure!(!self.database.path.is_empty(), "database.path missing");
        for feed in &self.feeds.sources {
            anyhow::ensure!(!feed.url.is_empty(), "feeds.sources[{}].url missing", feed.id);
            if feed.kind == FeedKind::Html {
                anyhow::ensure!(
                    feed.item_selector.is_some() && feed.title_selector.is_some(),
                    "feeds.sources[{}]: html feeds need itemSelector and titleSelector",
                    feed.id
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = AppCfg::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.extraction.minimum_percentage, 20.0);
        assert_eq!(cfg.tracking.hit_threshold, 5.0);
        assert_eq!(cfg.tracking.partial_threshold, 10.0);
        assert_eq!(cfg.tracking.duplicate_window, Duration::from_secs(7200));
    }

    #[test]
    fn test_partial_below_hit_rejected() {
        let mut cfg = AppCfg::default();
        cfg.tracking.partial_threshold = 2.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_unknown_timezone_rejected() {
        let mut cfg = AppCfg::default();
        cfg.session.timezone = "Mars/Olympus".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_html_feed_needs_selectors() {
        let mut cfg = AppCfg::default();
        cfg.feeds.sources.push(FeedCfg {
            id: "benzinga".into(),
            name: "Benzinga".into(),
            url: "https://www.benzinga.com/news".into(),
            kind: FeedKind::Html,
            enabled: true,
            limit: 30,
            item_selector: None,
            title_selector: None,
        });
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_env_var_override() {
        unsafe {
            env::set_var("CALLTRACK__DATABASE__PATH", "/tmp/env-test.db");
        }

        let cfg = Config::builder()
            .add_source(config::Environment::with_prefix("CALLTRACK").separator("__"))
            .build()
            .unwrap();

        let val = cfg.get_string("database.path").unwrap();
        assert_eq!(val, "/tmp/env-test.db");

        unsafe {
            env::remove_var("CALLTRACK__DATABASE__PATH");
        }
    }
}
