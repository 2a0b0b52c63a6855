//! SQLite persistence for decision runs.
//!
//! Each evaluated version is one row holding the submitted input and the
//! complete run as JSON. Rows are only ever inserted.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::SecondsFormat;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

use crate::config::DatabaseLocation;
use crate::models::{DecisionInput, DecisionRun};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Run (de)serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Version {version} of {decision_id} already exists")]
    Conflict { decision_id: String, version: i64 },
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Query(e.to_string())
    }
}

#[derive(sqlx::FromRow)]
struct RunRow {
    output_json: String,
}

impl RunRow {
    fn into_run(self) -> Result<DecisionRun, StoreError> {
        Ok(serde_json::from_str(&self.output_json)?)
    }
}

#[derive(Clone)]
pub struct DecisionStore {
    pool: Pool<Sqlite>,
}

impl DecisionStore {
    pub async fn connect(location: &DatabaseLocation) -> Result<Self, StoreError> {
        match location {
            DatabaseLocation::File(path) => Self::open(path).await,
            DatabaseLocation::Memory => Self::open_in_memory().await,
        }
    }

    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
        }

        // Taken as a plain filename, never parsed as a URL
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        tracing::info!(path = %path.display(), "Decision store opened");

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Private in-memory database, kept alive by a single pinned connection
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        tracing::debug!("Decision store migrations complete");
        Ok(())
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn insert(&self, input: &DecisionInput, run: &DecisionRun) -> Result<(), StoreError> {
        let input_json = serde_json::to_string(input)?;
        let output_json = serde_json::to_string(run)?;

        let result = sqlx::query(
            "INSERT INTO decision_runs (decision_id, version, timestamp, input_json, output_json) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&run.decision_id)
        .bind(run.version)
        .bind(run.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true))
        .bind(input_json)
        .bind(output_json)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(StoreError::Conflict {
                decision_id: run.decision_id.clone(),
                version: run.version,
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, decision_id: &str, version: i64) -> Result<Option<DecisionRun>, StoreError> {
        sqlx::query_as::<_, RunRow>(
            "SELECT output_json FROM decision_runs WHERE decision_id = ? AND version = ?",
        )
        .bind(decision_id)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?
        .map(RunRow::into_run)
        .transpose()
    }

    pub async fn latest(&self, decision_id: &str) -> Result<Option<DecisionRun>, StoreError> {
        sqlx::query_as::<_, RunRow>(
            "SELECT output_json FROM decision_runs WHERE decision_id = ? ORDER BY version DESC LIMIT 1",
        )
        .bind(decision_id)
        .fetch_optional(&self.pool)
        .await?
        .map(RunRow::into_run)
        .transpose()
    }

    /// All versions of a decision, oldest first
    pub async fn list(&self, decision_id: &str) -> Result<Vec<DecisionRun>, StoreError> {
        sqlx::query_as::<_, RunRow>(
            "SELECT output_json FROM decision_runs WHERE decision_id = ? ORDER BY version ASC",
        )
        .bind(decision_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(RunRow::into_run)
        .collect()
    }

    /// One past the highest stored version, or 1 for an unknown decision
    pub async fn next_version(&self, decision_id: &str) -> Result<i64, StoreError> {
        let (max,): (Option<i64>,) =
            sqlx::query_as("SELECT MAX(version) FROM decision_runs WHERE decision_id = ?")
                .bind(decision_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(max.map_or(1, |v| v + 1))
    }
}
