use crate::config::config::SessionCfg;
use crate::core::error::TrackError;
use crate::core::types::SessionState;
use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::HashSet;

/// Reference-market calendar.
pub trait SessionClock: Send + Sync + 'static {
    /// CLOSED once the session of `at`'s collection date has ended, OPEN
    /// before that. Days without a session stay OPEN; their predictions are
    /// finalised by the daily rollover.
    fn session_state(&self, at: DateTime<Utc>) -> Result<SessionState, TrackError>;

    /// Calendar date in the reference timezone; predictions are partitioned by it.
    fn collection_date(&self, at: DateTime<Utc>) -> NaiveDate;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MarketPhase {
    Weekend,
    Holiday,
    PreMarket,
    Open,
    AfterHours,
}

impl MarketPhase {
    pub fn label(&self) -> &'static str {
        match self {
            MarketPhase::Weekend => "Weekend",
            MarketPhase::Holiday => "Holiday",
            MarketPhase::PreMarket => "Pre-Market",
            MarketPhase::Open => "Market Open",
            MarketPhase::AfterHours => "After-Hours",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketStatus {
    pub phase: MarketPhase,
    pub is_open: bool,
    pub local_time: String,
    /// Next open or close, whichever comes first.
    pub next_change: Option<DateTime<Utc>>,
}

/// Regular trading hours of a single exchange, Monday to Friday.
#[derive(Debug, Clone)]
pub struct UsEquitySession {
    tz: Tz,
    open: NaiveTime,
    close: NaiveTime,
    holidays: HashSet<NaiveDate>,
}

impl UsEquitySession {
    pub fn new(cfg: &SessionCfg) -> Result<Self> {
        let tz: Tz = cfg
            .timezone
            .parse()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("parsing session timezone '{}'", cfg.timezone))?;
        Ok(Self {
            tz,
            open: cfg.open,
            close: cfg.close,
            holidays: cfg.holidays.iter().copied().collect(),
        })
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }

    fn at_local(&self, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
        self.tz
            .from_local_datetime(&date.and_time(time))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }

    fn next_open_after(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        let mut d = date;
        for _ in 0..14 {
            d = d.succ_opt()?;
            if self.is_trading_day(d) {
                return self.at_local(d, self.open);
            }
        }
        None
    }

    pub fn market_status(&self, now: DateTime<Utc>) -> MarketStatus {
        let local = now.with_timezone(&self.tz);
        let date = local.date_naive();
        let time = local.time();

        let (phase, next_change) = if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            (MarketPhase::Weekend, self.next_open_after(date))
        } else if self.holidays.contains(&date) {
            (MarketPhase::Holiday, self.next_open_after(date))
        } else if time < self.open {
            (MarketPhase::PreMarket, self.at_local(date, self.open))
        } else if time < self.close {
            (MarketPhase::Open, self.at_local(date, self.close))
        } else {
            (MarketPhase::AfterHours, self.next_open_after(date))
        };

        MarketStatus {
            phase,
            is_open: phase == MarketPhase::Open,
            local_time: local.format("%Y-%m-%d %H:%M %Z").to_string(),
            next_change,
        }
    }
}

impl SessionClock for UsEquitySession {
    fn session_state(&self, at: DateTime<Utc>) -> Result<SessionState, TrackError> {
        Ok(match self.market_status(at).phase {
            MarketPhase::AfterHours => SessionState::Closed,
            MarketPhase::PreMarket
            | MarketPhase::Open
            | MarketPhase::Weekend
            | MarketPhase::Holiday => SessionState::Open,
        })
    }

    fn collection_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.tz).date_naive()
    }
}

/// Clock pinned to one state; used for rollover and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedSession {
    pub state: SessionState,
}

impl SessionClock for FixedSession {
    fn session_state(&self, _at: DateTime<Utc>) -> Result<SessionState, TrackError> {
        Ok(self.state)
    }

    fn collection_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.date_naive()
    }
}
