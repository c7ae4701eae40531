use crate::core::types::{
    NewPrediction, Prediction, PredictionId, PredictionStatus, PriceSnapshot, StatusUpdate,
};
use crate::persistence::store::PredictionStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::info;

const PREDICTION_COLUMNS: &str = r#"
    id, ticker, claimed_percentage, direction, source_text_span, source_name,
    article_url, headline, observed_at, status, is_duplicate, duplicate_of,
    collection_date, baseline_price, latest_actual_percentage, latest_gap
"#;

fn record<T>(table: &'static str, op: &'static str, start: Instant, res: &Result<T, sqlx::Error>) {
    let status = if res.is_ok() { "success" } else { "error" };
    metrics::counter!("database_queries_total", "table" => table, "op" => op, "status" => status)
        .increment(1);
    metrics::histogram!("database_query_duration_seconds", "table" => table, "op" => op)
        .record(start.elapsed().as_secs_f64());
}

fn prediction_from_row(row: &SqliteRow) -> Result<Prediction> {
    let direction: String = row.try_get("direction")?;
    let status: String = row.try_get("status")?;
    Ok(Prediction {
        id: row.try_get("id")?,
        ticker: row.try_get("ticker")?,
        claimed_percentage: row.try_get("claimed_percentage")?,
        direction: direction.parse()?,
        source_text_span: row.try_get("source_text_span")?,
        source_name: row.try_get("source_name")?,
        article_url: row.try_get("article_url")?,
        headline: row.try_get("headline")?,
        observed_at: row.try_get::<DateTime<Utc>, _>("observed_at")?,
        status: status.parse()?,
        is_duplicate: row.try_get("is_duplicate")?,
        duplicate_of: row.try_get("duplicate_of")?,
        collection_date: row.try_get::<NaiveDate, _>("collection_date")?,
        baseline_price: row.try_get("baseline_price")?,
        latest_actual_percentage: row.try_get("latest_actual_percentage")?,
        latest_gap: row.try_get("latest_gap")?,
    })
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub async fn open(db_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30))
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("opening sqlite database {}", db_path))?;

        let store = Self { pool };
        store.init().await?;
        info!(path = %db_path, "prediction store ready");
        Ok(store)
    }

    /// Private in-memory database; one connection so every query sees it.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS predictions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticker TEXT NOT NULL,
                claimed_percentage REAL NOT NULL,
                direction TEXT NOT NULL,
                source_text_span TEXT NOT NULL,
                source_name TEXT NOT NULL,
                article_url TEXT NOT NULL,
                headline TEXT NOT NULL,
                observed_at TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'PENDING',
                is_duplicate BOOLEAN NOT NULL DEFAULT 0,
                duplicate_of INTEGER REFERENCES predictions(id),
                collection_date TEXT NOT NULL,
                baseline_price REAL,
                latest_actual_percentage REAL,
                latest_gap REAL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS price_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                prediction_id INTEGER NOT NULL REFERENCES predictions(id),
                check_timestamp TEXT NOT NULL,
                previous_close REAL NOT NULL,
                current_price REAL NOT NULL,
                actual_movement_percentage REAL NOT NULL,
                gap REAL NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS archived_dates (
                date TEXT PRIMARY KEY,
                archived_at TEXT DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for stmt in [
            "CREATE INDEX IF NOT EXISTS idx_predictions_ticker ON predictions(ticker)",
            "CREATE INDEX IF NOT EXISTS idx_predictions_date ON predictions(collection_date)",
            "CREATE INDEX IF NOT EXISTS idx_predictions_status ON predictions(status)",
            "CREATE INDEX IF NOT EXISTS idx_snapshots_prediction ON price_snapshots(prediction_id)",
        ] {
            sqlx::query(stmt).execute(&self.pool).await?;
        }

        Ok(())
    }
}

#[async_trait]
impl PredictionStore for SqliteStore {
    async fn insert_prediction(&self, new: NewPrediction) -> Result<Prediction> {
        let start = Instant::now();
        let c = &new.candidate;
        let res = sqlx::query(
            r#"
            INSERT INTO predictions (
                ticker, claimed_percentage, direction, source_text_span, source_name,
                article_url, headline, observed_at, status, is_duplicate, duplicate_of,
                collection_date
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&c.ticker)
        .bind(c.claimed_percentage)
        .bind(c.direction.as_str())
        .bind(&c.source_text_span)
        .bind(&c.source_name)
        .bind(&c.article_url)
        .bind(&c.headline)
        .bind(c.observed_at)
        .bind(PredictionStatus::Pending.as_str())
        .bind(new.duplicate_of.is_some())
        .bind(new.duplicate_of)
        .bind(new.collection_date)
        .execute(&self.pool)
        .await;
        record("predictions", "insert", start, &res);

        let id = res?.last_insert_rowid();
        Ok(Prediction::from_new(id, new))
    }

    async fn get_prediction(&self, id: PredictionId) -> Result<Option<Prediction>> {
        let start = Instant::now();
        let sql = format!("SELECT {} FROM predictions WHERE id = ?", PREDICTION_COLUMNS);
        let res = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await;
        record("predictions", "select", start, &res);
        res?.as_ref().map(prediction_from_row).transpose()
    }

    async fn append_snapshot(&self, snapshot: &PriceSnapshot) -> Result<()> {
        let start = Instant::now();
        let res = sqlx::query(
            r#"
            INSERT INTO price_snapshots (
                prediction_id, check_timestamp, previous_close, current_price,
                actual_movement_percentage, gap
            )
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(snapshot.prediction_id)
        .bind(snapshot.check_timestamp)
        .bind(snapshot.previous_close)
        .bind(snapshot.current_price)
        .bind(snapshot.actual_movement_percentage)
        .bind(snapshot.gap)
        .execute(&self.pool)
        .await;
        record("price_snapshots", "insert", start, &res);
        res?;
        Ok(())
    }

    async fn update_status(&self, id: PredictionId, update: &StatusUpdate) -> Result<()> {
        let start = Instant::now();
        let res = sqlx::query(
            r#"
            UPDATE predictions
            SET status = ?, latest_actual_percentage = ?, latest_gap = ?
            WHERE id = ?
            "#,
        )
        .bind(update.status.as_str())
        .bind(update.latest_actual_percentage)
        .bind(update.latest_gap)
        .bind(id)
        .execute(&self.pool)
        .await;
        record("predictions", "update", start, &res);
        anyhow::ensure!(res?.rows_affected() == 1, "prediction {} not found", id);
        Ok(())
    }

    async fn set_baseline_if_absent(&self, id: PredictionId, price: f64) -> Result<f64> {
        let start = Instant::now();
        let res = sqlx::query(
            "UPDATE predictions SET baseline_price = ? WHERE id = ? AND baseline_price IS NULL",
        )
        .bind(price)
        .bind(id)
        .execute(&self.pool)
        .await;
        record("predictions", "set_baseline", start, &res);
        res?;

        let row = sqlx::query("SELECT baseline_price FROM predictions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .with_context(|| format!("prediction {} not found", id))?;
        let stored: Option<f64> = row.try_get("baseline_price")?;
        stored.with_context(|| format!("baseline for prediction {} not stored", id))
    }

    async fn query_pending(&self, date: NaiveDate) -> Result<Vec<Prediction>> {
        let start = Instant::now();
        let sql = format!(
            "SELECT {} FROM predictions WHERE collection_date = ? AND status = ? ORDER BY id",
            PREDICTION_COLUMNS
        );
        let res = sqlx::query(&sql)
            .bind(date)
            .bind(PredictionStatus::Pending.as_str())
            .fetch_all(&self.pool)
            .await;
        record("predictions", "select", start, &res);
        res?.iter().map(prediction_from_row).collect()
    }

    async fn query_by_date(&self, date: NaiveDate) -> Result<Vec<Prediction>> {
        let start = Instant::now();
        let sql = format!(
            "SELECT {} FROM predictions WHERE collection_date = ? ORDER BY id",
            PREDICTION_COLUMNS
        );
        let res = sqlx::query(&sql).bind(date).fetch_all(&self.pool).await;
        record("predictions", "select", start, &res);
        res?.iter().map(prediction_from_row).collect()
    }

    async fn snapshots_for(&self, id: PredictionId) -> Result<Vec<PriceSnapshot>> {
        let start = Instant::now();
        let res = sqlx::query(
            r#"
            SELECT prediction_id, check_timestamp, previous_close, current_price,
                   actual_movement_percentage, gap
            FROM price_snapshots
            WHERE prediction_id = ?
            ORDER BY check_timestamp, id
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await;
        record("price_snapshots", "select", start, &res);

        res?.iter()
            .map(|row| -> Result<PriceSnapshot> {
                Ok(PriceSnapshot {
                    prediction_id: row.try_get("prediction_id")?,
                    check_timestamp: row.try_get::<DateTime<Utc>, _>("check_timestamp")?,
                    previous_close: row.try_get("previous_close")?,
                    current_price: row.try_get("current_price")?,
                    actual_movement_percentage: row.try_get("actual_movement_percentage")?,
                    gap: row.try_get("gap")?,
                })
            })
            .collect()
    }

    async fn archive_date(&self, date: NaiveDate) -> Result<bool> {
        let start = Instant::now();
        let res = sqlx::query("INSERT OR IGNORE INTO archived_dates (date) VALUES (?)")
            .bind(date)
            .execute(&self.pool)
            .await;
        record("archived_dates", "insert", start, &res);
        Ok(res?.rows_affected() == 1)
    }

    async fn is_archived(&self, date: NaiveDate) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM archived_dates WHERE date = ?")
            .bind(date)
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n > 0)
    }

    async fn unarchived_dates(&self) -> Result<Vec<NaiveDate>> {
        let start = Instant::now();
        let res = sqlx::query(
            r#"
            SELECT DISTINCT collection_date
            FROM predictions
            WHERE collection_date NOT IN (SELECT date FROM archived_dates)
            ORDER BY collection_date
            "#,
        )
        .fetch_all(&self.pool)
        .await;
        record("predictions", "unarchived_dates", start, &res);

        res?.iter()
            .map(|row| -> Result<NaiveDate> { Ok(row.try_get("collection_date")?) })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Direction, PredictionCandidate};
    use chrono::TimeZone;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 7).unwrap()
    }

    fn new_prediction(ticker: &str, duplicate_of: Option<PredictionId>) -> NewPrediction {
        NewPrediction {
            candidate: PredictionCandidate {
                ticker: ticker.into(),
                claimed_percentage: 45.0,
                direction: Direction::Up,
                source_text_span: format!("{ticker} stock jumps 45%"),
                source_name: "Wire".into(),
                article_url: "https://news.test/nvda".into(),
                headline: format!("{ticker} stock jumps 45% after earnings beat"),
                observed_at: Utc.with_ymd_and_hms(2025, 3, 7, 15, 0, 0).unwrap(),
            },
            collection_date: date(),
            duplicate_of,
        }
    }

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let store = SqliteStore::in_memory().await.unwrap();
        let p = store.insert_prediction(new_prediction("NVDA", None)).await.unwrap();
        assert_eq!(p.id, 1);

        let back = store.get_prediction(p.id).await.unwrap().unwrap();
        assert_eq!(back, p);
        assert_eq!(back.status, PredictionStatus::Pending);

        let dup = store.insert_prediction(new_prediction("NVDA", Some(p.id))).await.unwrap();
        let back = store.get_prediction(dup.id).await.unwrap().unwrap();
        assert!(back.is_duplicate);
        assert_eq!(back.duplicate_of, Some(p.id));
        assert_eq!(store.query_by_date(date()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_baseline_is_set_once() {
        let store = SqliteStore::in_memory().await.unwrap();
        let p = store.insert_prediction(new_prediction("NVDA", None)).await.unwrap();

        assert_eq!(store.set_baseline_if_absent(p.id, 100.0).await.unwrap(), 100.0);
        assert_eq!(store.set_baseline_if_absent(p.id, 120.0).await.unwrap(), 100.0);
        let back = store.get_prediction(p.id).await.unwrap().unwrap();
        assert_eq!(back.baseline_price, Some(100.0));

        assert!(store.set_baseline_if_absent(999, 1.0).await.is_err());
    }

    #[tokio::test]
    async fn test_status_snapshots_and_pending() {
        let store = SqliteStore::in_memory().await.unwrap();
        let a = store.insert_prediction(new_prediction("NVDA", None)).await.unwrap();
        let b = store.insert_prediction(new_prediction("AMD", None)).await.unwrap();

        let t0 = Utc.with_ymd_and_hms(2025, 3, 7, 16, 0, 0).unwrap();
        for (i, price) in [(1, 130.0), (0, 145.0)] {
            store
                .append_snapshot(&PriceSnapshot {
                    prediction_id: a.id,
                    check_timestamp: t0 + chrono::Duration::minutes(30 * i),
                    previous_close: 100.0,
                    current_price: price,
                    actual_movement_percentage: price - 100.0,
                    gap: price - 100.0 - 45.0,
                })
                .await
                .unwrap();
        }
        let snaps = store.snapshots_for(a.id).await.unwrap();
        assert_eq!(snaps.len(), 2);
        assert_eq!(snaps[0].current_price, 145.0);
        assert!(snaps[0].check_timestamp < snaps[1].check_timestamp);

        store
            .update_status(
                a.id,
                &StatusUpdate {
                    status: PredictionStatus::Hit,
                    latest_actual_percentage: Some(45.0),
                    latest_gap: Some(0.0),
                },
            )
            .await
            .unwrap();

        let pending = store.query_pending(date()).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b.id);
        assert_eq!(store.unarchived_dates().await.unwrap(), vec![date()]);
    }

    #[tokio::test]
    async fn test_resolved_dates_still_need_archiving() {
        let store = SqliteStore::in_memory().await.unwrap();
        let a = store.insert_prediction(new_prediction("NVDA", None)).await.unwrap();
        store
            .update_status(
                a.id,
                &StatusUpdate {
                    status: PredictionStatus::Miss,
                    latest_actual_percentage: Some(1.0),
                    latest_gap: Some(-44.0),
                },
            )
            .await
            .unwrap();

        assert!(store.query_pending(date()).await.unwrap().is_empty());
        assert_eq!(store.unarchived_dates().await.unwrap(), vec![date()]);
    }

    #[tokio::test]
    async fn test_archive_is_idempotent() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert_prediction(new_prediction("NVDA", None)).await.unwrap();

        assert!(!store.is_archived(date()).await.unwrap());
        assert!(store.archive_date(date()).await.unwrap());
        assert!(!store.archive_date(date()).await.unwrap());
        assert!(store.is_archived(date()).await.unwrap());
        assert!(store.unarchived_dates().await.unwrap().is_empty());
    }
}
