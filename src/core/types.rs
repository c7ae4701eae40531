use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[async_trait::async_trait]
pub trait Actor: Send + Sync + 'static {
    async fn run(self) -> Result<()>;
}

pub type PredictionId = i64;

// ----------- Collaborator payloads -----------------

/// One news item as supplied by an article source.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Article {
    /// Headline and body excerpt, newline separated.
    pub text: String,
    pub source_name: String,
    pub url: String,
    pub headline: String,
    pub published_at: DateTime<Utc>,
}

impl Article {
    pub fn new(
        source_name: impl Into<String>,
        url: impl Into<String>,
        headline: impl Into<String>,
        body: &str,
        published_at: DateTime<Utc>,
    ) -> Self {
        let headline = headline.into();
        let body = body.trim();
        let text = if body.is_empty() {
            headline.clone()
        } else {
            format!("{}\n{}", headline, body)
        };
        Self {
            text,
            source_name: source_name.into(),
            url: url.into(),
            headline,
            published_at,
        }
    }
}

// ----------- Domain enums -----------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
        }
    }

    /// True when a signed movement points the same way. A flat move matches neither.
    pub fn agrees_with(&self, movement_pct: f64) -> bool {
        match self {
            Direction::Up => movement_pct > 0.0,
            Direction::Down => movement_pct < 0.0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "UP" => Ok(Direction::Up),
            "DOWN" => Ok(Direction::Down),
            other => anyhow::bail!("unknown direction '{}'", other),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PredictionStatus {
    Pending,
    Hit,
    Miss,
    Partial,
}

impl PredictionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionStatus::Pending => "PENDING",
            PredictionStatus::Hit => "HIT",
            PredictionStatus::Miss => "MISS",
            PredictionStatus::Partial => "PARTIAL",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PredictionStatus::Pending)
    }
}

impl fmt::Display for PredictionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PredictionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(PredictionStatus::Pending),
            "HIT" => Ok(PredictionStatus::Hit),
            "MISS" => Ok(PredictionStatus::Miss),
            "PARTIAL" => Ok(PredictionStatus::Partial),
            other => anyhow::bail!("unknown prediction status '{}'", other),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionState {
    Open,
    Closed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TickerVerdict {
    Valid,
    Invalid,
    /// The lookup itself failed (network, timeout); existence is not known.
    Unknown,
}

impl fmt::Display for TickerVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TickerVerdict::Valid => "VALID",
            TickerVerdict::Invalid => "INVALID",
            TickerVerdict::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

// ----------- Records -----------------

/// Unvalidated, unpersisted extraction result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PredictionCandidate {
    pub ticker: String,
    /// Magnitude only; direction carries the sign.
    pub claimed_percentage: f64,
    pub direction: Direction,
    pub source_text_span: String,
    pub source_name: String,
    pub article_url: String,
    pub headline: String,
    pub observed_at: DateTime<Utc>,
}

/// What the store needs to persist a new prediction.
#[derive(Clone, Debug)]
pub struct NewPrediction {
    pub candidate: PredictionCandidate,
    pub collection_date: NaiveDate,
    pub duplicate_of: Option<PredictionId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: PredictionId,
    pub ticker: String,
    pub claimed_percentage: f64,
    pub direction: Direction,
    pub source_text_span: String,
    pub source_name: String,
    pub article_url: String,
    pub headline: String,
    pub observed_at: DateTime<Utc>,
    pub status: PredictionStatus,
    pub is_duplicate: bool,
    pub duplicate_of: Option<PredictionId>,
    pub collection_date: NaiveDate,
    pub baseline_price: Option<f64>,
    pub latest_actual_percentage: Option<f64>,
    pub latest_gap: Option<f64>,
}

impl Prediction {
    pub fn from_new(id: PredictionId, new: NewPrediction) -> Self {
        let c = new.candidate;
        Self {
            id,
            ticker: c.ticker,
            claimed_percentage: c.claimed_percentage,
            direction: c.direction,
            source_text_span: c.source_text_span,
            source_name: c.source_name,
            article_url: c.article_url,
            headline: c.headline,
            observed_at: c.observed_at,
            status: PredictionStatus::Pending,
            is_duplicate: new.duplicate_of.is_some(),
            duplicate_of: new.duplicate_of,
            collection_date: new.collection_date,
            baseline_price: None,
            latest_actual_percentage: None,
            latest_gap: None,
        }
    }

    /// Only canonical, still-pending predictions are priced.
    pub fn is_trackable(&self) -> bool {
        !self.is_duplicate && self.status == PredictionStatus::Pending
    }
}

/// Append-only record of one price check.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub prediction_id: PredictionId,
    pub check_timestamp: DateTime<Utc>,
    pub previous_close: f64,
    pub current_price: f64,
    pub actual_movement_percentage: f64,
    pub gap: f64,
}

/// Mutable tracking fields written back after a check.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StatusUpdate {
    pub status: PredictionStatus,
    pub latest_actual_percentage: Option<f64>,
    pub latest_gap: Option<f64>,
}
