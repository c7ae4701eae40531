use crate::config::config::FeedCfg;
use crate::core::types::Article;
use crate::feeds::source::ArticleSource;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use scraper::{ElementRef, Html, Selector};

fn selector(raw: &str) -> Result<Selector> {
    Selector::parse(raw).map_err(|e| anyhow::anyhow!("invalid selector '{}': {:?}", raw, e))
}

/// Headline list scraped from a news page.
///
/// Pages carry no reliable timestamps, so items are stamped with the fetch
/// time.
pub struct HtmlHeadlineSource {
    client: Client,
    cfg: FeedCfg,
    item: Selector,
    title: Selector,
    link: Selector,
}

impl HtmlHeadlineSource {
    pub fn new(cfg: FeedCfg, client: Client) -> Result<Self> {
        let item = selector(cfg.item_selector.as_deref().unwrap_or("article"))?;
        let title = selector(cfg.title_selector.as_deref().unwrap_or("h3"))?;
        let link = selector("a[href]")?;
        Ok(Self {
            client,
            cfg,
            item,
            title,
            link,
        })
    }

    fn href_of(&self, item: ElementRef<'_>, title: ElementRef<'_>) -> Option<String> {
        if let Some(href) = title.value().attr("href") {
            return Some(href.to_string());
        }
        title
            .select(&self.link)
            .chain(item.select(&self.link))
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(str::to_string)
    }

    pub fn parse_page(&self, html: &str, now: DateTime<Utc>) -> Result<Vec<Article>> {
        let doc = Html::parse_document(html);
        let base = Url::parse(&self.cfg.url).context("parsing feed url")?;

        let mut out = Vec::new();
        for item in doc.select(&self.item) {
            let Some(title_el) = item.select(&self.title).next() else {
                continue;
            };
            let title = title_el
                .text()
                .flat_map(str::split_whitespace)
                .collect::<Vec<_>>()
                .join(" ");
            if title.is_empty() {
                continue;
            }

            let url = self
                .href_of(item, title_el)
                .and_then(|href| base.join(&href).ok())
                .map(|u| u.to_string())
                .unwrap_or_else(|| base.to_string());

            out.push(Article::new(&self.cfg.name, url, title, "", now));
            if out.len() >= self.cfg.limit {
                break;
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl ArticleSource for HtmlHeadlineSource {
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
            .text()
            .await?;

        self.parse_page(&body, Utc::now())
    }
}
