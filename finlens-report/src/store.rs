//! Persistence for finished investment reports.
//!
//! ## Database Schema
//!
//! ```sql
//! CREATE TABLE reports (
//!     id TEXT PRIMARY KEY,        -- UUID v4
//!     file_name TEXT NOT NULL,    -- name of the analyzed upload
//!     query TEXT NOT NULL,        -- user query the report answers
//!     report TEXT NOT NULL,       -- final report JSON
//!     created_at TEXT NOT NULL    -- RFC 3339, UTC
//! );
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A report to be saved.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReport {
    pub file_name: String,
    pub query: String,
    pub report: Value,
}

/// A saved report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredReport {
    pub id: String,
    pub file_name: String,
    pub query: String,
    pub report: Value,
    pub created_at: DateTime<Utc>,
}

impl StoredReport {
    fn from_new(id: String, report: NewReport) -> Self {
        Self {
            id,
            file_name: report.file_name,
            query: report.query,
            report: report.report,
            created_at: Utc::now(),
        }
    }
}

/// Storage for finished reports.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Save a report and return its new id
    async fn save_report(&self, report: NewReport) -> Result<String>;

    async fn get_report(&self, id: &str) -> Result<Option<StoredReport>>;

    /// Most recent reports first
    async fn list_reports(&self, limit: usize) -> Result<Vec<StoredReport>>;

    async fn count(&self) -> Result<usize>;
}

/// SQLite-backed [`ReportStore`].
#[derive(Clone, Debug)]
pub struct SqliteReportStore {
    pool: SqlitePool,
}

impl SqliteReportStore {
    /// Open (or create) the database file at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .create_if_missing(true),
        )
        .await
        .with_context(|| format!("failed to open report database {}", path.display()))?;
        Self::new_with_pool(pool).await
    }

    /// In-memory database for tests and dry runs.
    pub async fn open_memory() -> Result<Self> {
        // Every connection to :memory: is a separate database, so keep one
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::new_with_pool(pool).await
    }

    async fn new_with_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS reports (
                id TEXT PRIMARY KEY,
                file_name TEXT NOT NULL,
                query TEXT NOT NULL,
                report TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_reports_created_at ON reports(created_at)")
            .execute(&pool)
            .await?;

        Ok(Self { pool })
    }

    fn row_to_report(row: &sqlx::sqlite::SqliteRow) -> Result<StoredReport> {
        let report: String = row.get("report");
        let created_at: String = row.get("created_at");
        Ok(StoredReport {
            id: row.get("id"),
            file_name: row.get("file_name"),
            query: row.get("query"),
            report: serde_json::from_str(&report).context("stored report is not valid JSON")?,
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .context("stored timestamp is not RFC 3339")?
                .with_timezone(&Utc),
        })
    }
}

#[async_trait]
impl ReportStore for SqliteReportStore {
    async fn save_report(&self, report: NewReport) -> Result<String> {
        let stored = StoredReport::from_new(Uuid::new_v4().to_string(), report);

        sqlx::query(
            "INSERT INTO reports (id, file_name, query, report, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&stored.id)
        .bind(&stored.file_name)
        .bind(&stored.query)
        .bind(serde_json::to_string(&stored.report)?)
        .bind(stored.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(stored.id)
    }

    async fn get_report(&self, id: &str) -> Result<Option<StoredReport>> {
        let row = sqlx::query(
            "SELECT id, file_name, query, report, created_at FROM reports WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_report).transpose()
    }

    async fn list_reports(&self, limit: usize) -> Result<Vec<StoredReport>> {
        let rows = sqlx::query(
            "SELECT id, file_name, query, report, created_at FROM reports \
             ORDER BY created_at DESC LIMIT ?",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_report).collect()
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reports")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}

/// In-process [`ReportStore`] for tests and runs that should not touch disk.
#[derive(Debug, Default)]
pub struct MemoryReportStore {
    reports: RwLock<Vec<StoredReport>>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn save_report(&self, report: NewReport) -> Result<String> {
        let stored = StoredReport::from_new(Uuid::new_v4().to_string(), report);
        let id = stored.id.clone();
        self.reports.write().await.push(stored);
        Ok(id)
    }

    async fn get_report(&self, id: &str) -> Result<Option<StoredReport>> {
        Ok(self
            .reports
            .read()
            .await
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn list_reports(&self, limit: usize) -> Result<Vec<StoredReport>> {
        Ok(self
            .reports
            .read()
            .await
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.reports.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn sample(file_name: &str) -> NewReport {
        NewReport {
            file_name: file_name.to_string(),
            query: "Analyze this financial document for investment insights".to_string(),
            report: json!({
                "executive_summary": "Revenue declined 4% year over year.",
                "investment_conclusion": "Hold"
            }),
        }
    }

    async fn exercise(store: &dyn ReportStore) -> Result<()> {
        assert_eq!(store.count().await?, 0);

        let first = store.save_report(sample("q1.pdf")).await?;
        let second = store.save_report(sample("q2.pdf")).await?;
        assert_ne!(first, second);
        assert!(Uuid::parse_str(&first).is_ok());

        let loaded = store.get_report(&first).await?.expect("saved report exists");
        assert_eq!(loaded.file_name, "q1.pdf");
        assert_eq!(loaded.report["investment_conclusion"], "Hold");

        assert!(store.get_report("missing").await?.is_none());
        assert_eq!(store.count().await?, 2);
        assert_eq!(store.list_reports(1).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_store_round_trip() -> Result<()> {
        let store = SqliteReportStore::open_memory().await?;
        exercise(&store).await
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() -> Result<()> {
        let store = MemoryReportStore::new();
        exercise(&store).await?;

        let recent = store.list_reports(10).await?;
        assert_eq!(recent[0].file_name, "q2.pdf");
        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_store_persists_to_disk() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join("reports.db");

        let id = {
            let store = SqliteReportStore::open(&path).await?;
            store.save_report(sample("annual.pdf")).await?
        };

        let reopened = SqliteReportStore::open(&path).await?;
        let report = reopened.get_report(&id).await?.expect("report survives reopen");
        assert_eq!(report.file_name, "annual.pdf");
        Ok(())
    }
}
