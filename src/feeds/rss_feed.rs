use crate::config::config::FeedCfg;
use crate::core::types::Article;
use crate::feeds::source::ArticleSource;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use scraper::Html;

pub struct RssSource {
    client: Client,
    cfg: FeedCfg,
}

impl RssSource {
    pub fn new(cfg: FeedCfg, client: Client) -> Self {
        Self { client, cfg }
    }
}

/// Feed summaries often carry markup; keep the text only.
fn strip_html(fragment: &str) -> String {
    let doc = Html::parse_fragment(fragment);
    doc.root_element()
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_pub_date(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    DateTime::parse_from_rfc2822(raw)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

pub fn parse_channel(
    body: &[u8],
    source_name: &str,
    limit: usize,
    now: DateTime<Utc>,
) -> Result<Vec<Article>> {
    let channel = ::rss::Channel::read_from(body).context("parsing rss channel")?;

    let articles = channel
        .items()
        .iter()
        .filter_map(|item| {
            let title = item.title()?.trim();
            if title.is_empty() {
                return None;
            }
            let body = item.description().map(strip_html).unwrap_or_default();
            let url = item
                .link()
                .or_else(|| item.guid().map(|g| g.value()))
                .unwrap_or_default()
                .trim();
            let published = parse_pub_date(item.pub_date()).unwrap_or(now);
            Some(Article::new(source_name, url, title, &body, published))
        })
        .take(limit)
        .collect();
    Ok(articles)
}

#[async_trait]
impl ArticleSource for RssSource {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    async fn fetch_articles(&self) -> Result<Vec<Article>> {
        let body = self
            .client
            .get(&self.cfg.url)
            .send()
            .await
            .with_context(|| format!("GET {}", self.cfg.url))?
            .error_for_status()?
            .bytes()
            .await?;

        parse_channel(&body, &self.cfg.name, self.cfg.limit, Utc::now())
    }
}
