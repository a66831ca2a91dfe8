//! DuckDB-backed feedback log for retrospective analytics.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duckdb::{Connection, params};
use ndareview_core::Feedback;
use tracing::info;

use crate::StoreError;
use crate::feedback::{DocumentLocks, FeedbackLog, FeedbackStats};

const CREATE_FEEDBACK: &str = "CREATE TABLE IF NOT EXISTS feedback (
    document_id  VARCHAR NOT NULL,
    text         VARCHAR NOT NULL,
    sentiment    DOUBLE  NOT NULL,
    key_points   VARCHAR NOT NULL,
    recorded_at  VARCHAR NOT NULL
)";

const SELECT_FEEDBACK: &str =
    "SELECT document_id, text, sentiment, key_points, recorded_at FROM feedback";

/// Feedback log in a DuckDB table.
///
/// Supports both in-memory and persistent (file-backed) modes. Timestamps are
/// stored as RFC 3339 strings so ordering and month grouping stay textual.
pub struct DuckFeedbackLog {
    conn: Mutex<Connection>,
    locks: DocumentLocks,
}

impl DuckFeedbackLog {
    /// Open an in-memory DuckDB database.
    pub fn open() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Open or create a persistent DuckDB database at the given path.
    pub fn open_persistent(path: &Path) -> Result<Self, StoreError> {
        let log = Self::init(Connection::open(path)?)?;
        info!(path = %path.display(), "opened duckdb feedback log");
        Ok(log)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(CREATE_FEEDBACK)?;
        Ok(Self {
            conn: Mutex::new(conn),
            locks: DocumentLocks::default(),
        })
    }

    fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn query_feedback(
        &self,
        sql: &str,
        document_id: Option<&str>,
    ) -> Result<Vec<Feedback>, StoreError> {
        let conn = self.connection();
        let mut stmt = conn.prepare(sql)?;
        type RawRow = (String, String, f64, String, String);
        let map_row = |row: &duckdb::Row<'_>| -> duckdb::Result<RawRow> {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        };
        let rows: Vec<RawRow> = match document_id {
            Some(id) => stmt.query_map([id], map_row)?.collect::<Result<_, _>>()?,
            None => stmt.query_map([], map_row)?.collect::<Result<_, _>>()?,
        };

        rows.into_iter()
            .map(|(document_id, text, sentiment, key_points, recorded_at)| -> Result<Feedback, StoreError> {
                Ok(Feedback {
                    document_id,
                    text,
                    sentiment: sentiment as f32,
                    key_points: serde_json::from_str(&key_points)?,
                    timestamp: parse_timestamp(&recorded_at)?,
                })
            })
            .collect()
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Other(format!("bad timestamp {s:?}: {e}")))
}

#[async_trait]
impl FeedbackLog for DuckFeedbackLog {
    async fn append(&self, feedback: Feedback) -> Result<(), StoreError> {
        let key_points = serde_json::to_string(&feedback.key_points)?;
        let _guard = self.locks.lock(&feedback.document_id).await;
        self.connection().execute(
            "INSERT INTO feedback VALUES (?, ?, ?, ?, ?)",
            params![
                feedback.document_id,
                feedback.text,
                feedback.sentiment as f64,
                key_points,
                feedback.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn history(&self, document_id: &str) -> Result<Vec<Feedback>, StoreError> {
        let sql = format!("{SELECT_FEEDBACK} WHERE document_id = ? ORDER BY recorded_at");
        self.query_feedback(&sql, Some(document_id))
    }

    async fn all(&self) -> Result<Vec<Feedback>, StoreError> {
        let sql = format!("{SELECT_FEEDBACK} ORDER BY recorded_at");
        self.query_feedback(&sql, None)
    }

    /// Aggregates in SQL rather than loading every row.
    async fn statistics(&self) -> Result<FeedbackStats, StoreError> {
        let conn = self.connection();
        let (total, average): (i64, Option<f64>) = conn.query_row(
            "SELECT count(*)::BIGINT, avg(sentiment) FROM feedback",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let mut stmt = conn.prepare(
            "SELECT substr(recorded_at, 1, 7) AS month, count(*)::BIGINT
             FROM feedback GROUP BY month ORDER BY month",
        )?;
        let by_month: BTreeMap<String, usize> = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .map(|r| r.map(|(month, n)| (month, n as usize)))
            .collect::<Result<_, _>>()?;

        Ok(FeedbackStats {
            total: total as usize,
            average_sentiment: average.unwrap_or(0.0) as f32,
            by_month,
        })
    }
}
