//! # Tickerwatch Warehouse
//!
//! DuckDB-backed storage for ticker mentions and run history.
//!
//! ## Overview
//!
//! The warehouse accepts one mention at a time from the collector, keeps a
//! row per finished run in `run_log`, and serves read-only analytical
//! queries over both.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tickerwatch_warehouse::{MentionRecord, QueryGuardrails, Warehouse};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let warehouse = Warehouse::open_default()?;
//!
//!     warehouse.insert_mention(&MentionRecord {
//!         run_id: "run-1".to_string(),
//!         ticker: "AAPL".to_string(),
//!         submission_id: "abc123".to_string(),
//!         author: "someone".to_string(),
//!         subreddit: "stocks".to_string(),
//!         score: 42,
//!         kind: "POST".to_string(),
//!         created_utc: "2024-01-01T00:00:00Z".to_string(),
//!     })?;
//!
//!     let result = warehouse.execute_query(
//!         "SELECT ticker, mentions FROM vw_ticker_counts ORDER BY mentions DESC",
//!         QueryGuardrails::default(),
//!     )?;
//!     println!("{} tickers", result.row_count);
//!     Ok(())
//! }
//! ```
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `mentions` | One row per (run, submission, type, ticker) |
//! | `run_log` | Counters and terminal status of each run |
//!
//! ## Views
//!
//! | View | Description |
//! |------|-------------|
//! | `vw_ticker_counts` | Mentions per ticker and subreddit |
//! | `vw_ticker_daily` | Mentions per ticker per UTC day |

pub mod duckdb;
pub mod error;
pub mod migrations;
pub mod views;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use ::duckdb::types::Value as DuckValue;
use ::duckdb::Connection;
use ::duckdb::ToSql;
use serde::Serialize;
use serde_json::{Number, Value};

pub use crate::duckdb::{ConnectionPool, PooledConnection};
pub use crate::error::WarehouseError;

const SUBMISSION_TYPES: [&str; 3] = ["POST", "COMMENT", "REPLY"];

/// Configuration for the warehouse database.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Root directory for tickerwatch data.
    pub home: PathBuf,
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
    /// Maximum number of idle connections kept by the pool.
    pub max_pool_size: usize,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self::for_home(resolve_home())
    }
}

impl WarehouseConfig {
    /// Configuration rooted at `home`, with the database under `home/cache`.
    pub fn for_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let db_path = home.join("cache").join("warehouse.duckdb");
        Self {
            home,
            db_path,
            max_pool_size: 4,
        }
    }
}

/// Guardrails for query execution to prevent resource exhaustion.
#[derive(Debug, Clone, Copy)]
pub struct QueryGuardrails {
    /// Maximum number of rows to return.
    pub max_rows: usize,
    /// Query timeout in milliseconds.
    pub query_timeout_ms: u64,
}

impl Default for QueryGuardrails {
    fn default() -> Self {
        Self {
            max_rows: 10_000,
            query_timeout_ms: 5_000,
        }
    }
}

impl QueryGuardrails {
    fn timeout(self) -> Duration {
        Duration::from_millis(self.query_timeout_ms.max(1))
    }

    fn validate(self) -> Result<(), WarehouseError> {
        if self.max_rows == 0 {
            return Err(WarehouseError::QueryRejected(String::from(
                "--max-rows must be greater than zero",
            )));
        }
        if self.query_timeout_ms == 0 {
            return Err(WarehouseError::QueryRejected(String::from(
                "--query-timeout-ms must be greater than zero",
            )));
        }
        Ok(())
    }
}

/// Column metadata for query results.
#[derive(Debug, Clone, Serialize)]
pub struct SqlColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub r#type: String,
}

/// Result of a read-only SQL query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub columns: Vec<SqlColumn>,
    pub rows: Vec<Vec<Value>>,
    pub row_count: usize,
    /// Whether results were truncated by `max_rows`.
    pub truncated: bool,
}

/// A single mention row as written by the collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MentionRecord {
    pub run_id: String,
    pub ticker: String,
    pub submission_id: String,
    pub author: String,
    pub subreddit: String,
    pub score: i64,
    /// One of `POST`, `COMMENT`, `REPLY`.
    #[serde(rename = "type")]
    pub kind: String,
    /// RFC3339 UTC timestamp.
    pub created_utc: String,
}

/// Summary row for a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRecord {
    pub run_id: String,
    pub subreddit: String,
    pub status: String,
    pub registry_source: String,
    pub posts: u64,
    pub comments: u64,
    pub replies: u64,
    pub mentions: u64,
    pub duplicates: u64,
    pub errors_skipped: u64,
    /// RFC3339 UTC timestamp.
    pub started_at: String,
    /// RFC3339 UTC timestamp.
    pub finished_at: String,
}

/// The mention store.
#[derive(Clone)]
pub struct Warehouse {
    config: WarehouseConfig,
    pool: ConnectionPool,
}

impl Warehouse {
    /// Open a warehouse with default configuration.
    pub fn open_default() -> Result<Self, WarehouseError> {
        Self::open(WarehouseConfig::default())
    }

    /// Open (and migrate) the warehouse described by `config`.
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let pool = ConnectionPool::new(config.db_path.clone(), config.max_pool_size);
        let warehouse = Self { config, pool };
        warehouse.initialize()?;
        Ok(warehouse)
    }

    /// Apply migrations and (re)create views.
    pub fn initialize(&self) -> Result<(), WarehouseError> {
        let connection = self.connect()?;
        migrations::apply_migrations(&connection)?;
        views::create_views(&connection)?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        self.pool.db_path()
    }

    pub fn home(&self) -> &Path {
        self.config.home.as_path()
    }

    /// Insert one mention. Returns `false` when an identical
    /// `(run_id, submission_id, type, ticker)` row already exists.
    ///
    /// # Security
    /// All values are bound as parameters.
    pub fn insert_mention(&self, record: &MentionRecord) -> Result<bool, WarehouseError> {
        if !SUBMISSION_TYPES.contains(&record.kind.as_str()) {
            return Err(WarehouseError::InvalidData(format!(
                "unknown submission type '{}'",
                record.kind
            )));
        }
        if record.ticker.trim().is_empty() {
            return Err(WarehouseError::InvalidData(String::from(
                "ticker must not be empty",
            )));
        }

        let connection = self.connect()?;
        let params: [&dyn ToSql; 8] = [
            &record.run_id,
            &record.ticker,
            &record.submission_id,
            &record.author,
            &record.subreddit,
            &record.score,
            &record.kind,
            &record.created_utc,
        ];
        let inserted = connection.execute(
            "INSERT OR IGNORE INTO mentions \
             (run_id, ticker, submission_id, author, subreddit, score, \"type\", created_utc) \
             VALUES (?, ?, ?, ?, ?, ?, CAST(? AS submission_type), CAST(? AS TIMESTAMPTZ))",
            params.as_slice(),
        )?;

        Ok(inserted > 0)
    }

    /// Record the summary of a finished run. Re-recording a run id replaces the row.
    pub fn record_run(&self, record: &RunRecord) -> Result<(), WarehouseError> {
        let connection = self.connect()?;
        let params: [&dyn ToSql; 12] = [
            &record.run_id,
            &record.subreddit,
            &record.status,
            &record.registry_source,
            &record.posts,
            &record.comments,
            &record.replies,
            &record.mentions,
            &record.duplicates,
            &record.errors_skipped,
            &record.started_at,
            &record.finished_at,
        ];
        connection.execute(
            "INSERT OR REPLACE INTO run_log \
             (run_id, subreddit, status, registry_source, posts, comments, replies, mentions, \
              duplicates, errors_skipped, started_at, finished_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CAST(? AS TIMESTAMPTZ), CAST(? AS TIMESTAMPTZ))",
            params.as_slice(),
        )?;
        Ok(())
    }

    /// Execute a read-only SQL query with guardrails.
    ///
    /// # Security
    /// Only a single SELECT-like statement is accepted.
    pub fn execute_query(
        &self,
        sql: &str,
        guardrails: QueryGuardrails,
    ) -> Result<QueryResult, WarehouseError> {
        guardrails.validate()?;
        let sql = normalize_sql(sql)?;
        enforce_read_only_query(sql)?;

        let connection = self.connect()?;
        execute_select_query(&connection, sql, guardrails, Instant::now())
    }

    fn connect(&self) -> Result<PooledConnection, WarehouseError> {
        self.pool
            .acquire()
            .map_err(|error| WarehouseError::Connection(error.to_string()))
    }
}

fn execute_select_query(
    connection: &Connection,
    sql: &str,
    guardrails: QueryGuardrails,
    started: Instant,
) -> Result<QueryResult, WarehouseError> {
    let mut statement = connection.prepare(sql)?;
    // Column metadata is only available once the statement has executed.
    let _ = statement.query([] as [&dyn ToSql; 0])?;

    let column_count = statement.column_count();
    let mut columns = Vec::with_capacity(column_count);
    for index in 0..column_count {
        let name = statement
            .column_name(index)
            .map(|name| name.to_string())
            .unwrap_or_else(|_| format!("col{index}"));
        columns.push(SqlColumn {
            name,
            r#type: statement.column_type(index).to_string(),
        });
    }

    let mut rows_cursor = statement.query([] as [&dyn ToSql; 0])?;
    let mut rows = Vec::new();
    let mut truncated = false;
    while let Some(row) = rows_cursor.next()? {
        ensure_timeout(started, guardrails.timeout())?;

        if rows.len() >= guardrails.max_rows {
            truncated = true;
            break;
        }

        rows.push(read_row(row, column_count)?);
    }

    ensure_timeout(started, guardrails.timeout())?;

    Ok(QueryResult {
        columns,
        row_count: rows.len(),
        rows,
        truncated,
    })
}

fn read_row(row: &::duckdb::Row<'_>, column_count: usize) -> Result<Vec<Value>, ::duckdb::Error> {
    let mut output = Vec::with_capacity(column_count);
    for index in 0..column_count {
        let value: DuckValue = row.get(index)?;
        output.push(to_json_value(value));
    }
    Ok(output)
}

fn to_json_value(value: DuckValue) -> Value {
    match value {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(value) => Value::Bool(value),
        DuckValue::TinyInt(value) => Value::Number(Number::from(value)),
        DuckValue::SmallInt(value) => Value::Number(Number::from(value)),
        DuckValue::Int(value) => Value::Number(Number::from(value)),
        DuckValue::BigInt(value) => Value::Number(Number::from(value)),
        DuckValue::HugeInt(value) => i64::try_from(value)
            .map(|value| Value::Number(Number::from(value)))
            .unwrap_or_else(|_| Value::String(value.to_string())),
        DuckValue::UTinyInt(value) => Value::Number(Number::from(value)),
        DuckValue::USmallInt(value) => Value::Number(Number::from(value)),
        DuckValue::UInt(value) => Value::Number(Number::from(value)),
        DuckValue::UBigInt(value) => Value::Number(Number::from(value)),
        DuckValue::Float(value) => number_from_f64(f64::from(value)),
        DuckValue::Double(value) => number_from_f64(value),
        DuckValue::Text(value) => Value::String(value),
        DuckValue::Enum(value) => Value::String(value),
        other => Value::String(format!("{other:?}")),
    }
}

fn number_from_f64(value: f64) -> Value {
    Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn normalize_sql(sql: &str) -> Result<&str, WarehouseError> {
    let normalized = sql.trim();
    if normalized.is_empty() {
        return Err(WarehouseError::QueryRejected(String::from(
            "query must not be empty",
        )));
    }
    Ok(normalized.trim_end_matches(';').trim())
}

fn enforce_read_only_query(sql: &str) -> Result<(), WarehouseError> {
    if !is_select_like(sql) {
        return Err(WarehouseError::QueryRejected(String::from(
            "only SELECT/CTE queries are accepted",
        )));
    }
    if sql.split(';').filter(|part| !part.trim().is_empty()).count() > 1 {
        return Err(WarehouseError::QueryRejected(String::from(
            "multiple SQL statements are not allowed",
        )));
    }
    Ok(())
}

fn is_select_like(sql: &str) -> bool {
    let first_keyword = sql
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    matches!(
        first_keyword.as_str(),
        "SELECT" | "WITH" | "EXPLAIN" | "SHOW" | "DESCRIBE"
    )
}

fn ensure_timeout(started: Instant, timeout: Duration) -> Result<(), WarehouseError> {
    if started.elapsed() > timeout {
        return Err(WarehouseError::QueryTimeout {
            timeout_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
        });
    }
    Ok(())
}

/// Resolve the tickerwatch home directory from `TICKERWATCH_HOME`, then `$HOME`.
pub fn resolve_home() -> PathBuf {
    if let Some(path) = env::var_os("TICKERWATCH_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".tickerwatch");
    }

    PathBuf::from(".tickerwatch")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_temp() -> (tempfile::TempDir, Warehouse) {
        let temp = tempdir().expect("tempdir");
        let warehouse = Warehouse::open(WarehouseConfig {
            max_pool_size: 2,
            ..WarehouseConfig::for_home(temp.path().join("home"))
        })
        .expect("warehouse open");
        (temp, warehouse)
    }

    fn mention(ticker: &str, kind: &str) -> MentionRecord {
        MentionRecord {
            run_id: "run-1".to_string(),
            ticker: ticker.to_string(),
            submission_id: "t3_abc".to_string(),
            author: "someone".to_string(),
            subreddit: "stocks".to_string(),
            score: 12,
            kind: kind.to_string(),
            created_utc: "2024-03-01T12:00:00Z".to_string(),
        }
    }

    #[test]
    fn initializes_tables_and_views() {
        let (_temp, warehouse) = open_temp();

        let query = warehouse
            .execute_query(
                "SELECT COUNT(*) AS c FROM information_schema.tables WHERE table_name IN ('mentions', 'run_log')",
                QueryGuardrails::default(),
            )
            .expect("query");
        assert_eq!(query.rows[0][0], Value::Number(Number::from(2)));
    }

    #[test]
    fn reopening_an_existing_database_is_idempotent() {
        let temp = tempdir().expect("tempdir");
        let config = WarehouseConfig::for_home(temp.path().join("home"));
        let first = Warehouse::open(config.clone()).expect("first open");
        first.insert_mention(&mention("AAPL", "POST")).expect("insert");
        drop(first);

        let second = Warehouse::open(config).expect("second open");
        let result = second
            .execute_query("SELECT COUNT(*) FROM mentions", QueryGuardrails::default())
            .expect("query");
        assert_eq!(result.rows[0][0], Value::Number(Number::from(1)));
    }

    #[test]
    fn duplicate_mentions_are_ignored_by_the_unique_key() {
        let (_temp, warehouse) = open_temp();

        assert!(warehouse.insert_mention(&mention("AAPL", "POST")).expect("insert"));
        assert!(!warehouse.insert_mention(&mention("AAPL", "POST")).expect("insert"));
        assert!(warehouse.insert_mention(&mention("AAPL", "COMMENT")).expect("insert"));
    }

    #[test]
    fn unknown_submission_type_is_rejected_before_insert() {
        let (_temp, warehouse) = open_temp();

        let error = warehouse
            .insert_mention(&mention("AAPL", "THREAD"))
            .expect_err("must reject");
        assert!(matches!(error, WarehouseError::InvalidData(_)));
        assert!(!error.is_connection());
    }

    #[test]
    fn mention_values_are_bound_as_parameters() {
        let (_temp, warehouse) = open_temp();
        let mut record = mention("AAPL", "REPLY");
        record.author = r#"x'); DROP TABLE mentions; --"#.to_string();

        warehouse.insert_mention(&record).expect("insert");

        let result = warehouse
            .execute_query(
                "SELECT author FROM mentions WHERE author LIKE '%DROP%'",
                QueryGuardrails::default(),
            )
            .expect("query");
        assert_eq!(result.row_count, 1);
        assert_eq!(result.rows[0][0], Value::String(record.author));
    }

    #[test]
    fn read_only_guardrails_reject_writes() {
        let (_temp, warehouse) = open_temp();

        let error = warehouse
            .execute_query("DELETE FROM mentions", QueryGuardrails::default())
            .expect_err("should reject");
        assert!(matches!(error, WarehouseError::QueryRejected(_)));

        let error = warehouse
            .execute_query(
                "SELECT 1; DROP TABLE mentions",
                QueryGuardrails::default(),
            )
            .expect_err("should reject");
        assert!(matches!(error, WarehouseError::QueryRejected(_)));
    }

    #[test]
    fn max_rows_truncates_results() {
        let (_temp, warehouse) = open_temp();
        for ticker in ["AAPL", "TSLA", "MSFT"] {
            warehouse.insert_mention(&mention(ticker, "POST")).expect("insert");
        }

        let result = warehouse
            .execute_query(
                "SELECT ticker FROM mentions ORDER BY ticker",
                QueryGuardrails {
                    max_rows: 2,
                    query_timeout_ms: 5_000,
                },
            )
            .expect("query");
        assert_eq!(result.row_count, 2);
        assert!(result.truncated);
    }

    #[test]
    fn ticker_counts_view_aggregates_by_ticker() {
        let (_temp, warehouse) = open_temp();
        warehouse.insert_mention(&mention("AAPL", "POST")).expect("insert");
        warehouse.insert_mention(&mention("AAPL", "COMMENT")).expect("insert");
        warehouse.insert_mention(&mention("TSLA", "POST")).expect("insert");

        let result = warehouse
            .execute_query(
                "SELECT ticker, mentions FROM vw_ticker_counts ORDER BY ticker",
                QueryGuardrails::default(),
            )
            .expect("query");
        assert_eq!(result.row_count, 2);
        assert_eq!(result.rows[0][0], Value::String("AAPL".to_string()));
        assert_eq!(result.rows[0][1], Value::Number(Number::from(2)));
    }

    #[test]
    fn record_run_replaces_existing_row() {
        let (_temp, warehouse) = open_temp();
        let mut run = RunRecord {
            run_id: "run-1".to_string(),
            subreddit: "stocks".to_string(),
            status: "partial".to_string(),
            registry_source: "cache".to_string(),
            posts: 3,
            comments: 10,
            replies: 20,
            mentions: 4,
            duplicates: 1,
            errors_skipped: 2,
            started_at: "2024-03-01T12:00:00Z".to_string(),
            finished_at: "2024-03-01T12:05:00Z".to_string(),
        };
        warehouse.record_run(&run).expect("record");
        run.status = "completed".to_string();
        warehouse.record_run(&run).expect("record again");

        let result = warehouse
            .execute_query("SELECT status FROM run_log", QueryGuardrails::default())
            .expect("query");
        assert_eq!(result.row_count, 1);
        assert_eq!(result.rows[0][0], Value::String("completed".to_string()));
    }
}
