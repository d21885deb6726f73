//! SQLite-backed forensic store.
//!
//! One database file holds every ingested report:
//! - `reports` — one row per report, keyed by `job_name`
//! - `artifact_types` — the TSV tables found in each report
//! - `artifact_data` — every TSV row, serialized as a JSON object
//!
//! Ingestion writes these tables; the agent only reads them.

use async_trait::async_trait;
use caseclaw_core::dataset::{
    ArtifactRow, ArtifactSummary, ForensicStore, PatternQuery, ReportSummary, RowQuery,
};
use caseclaw_core::error::StoreError;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

/// A SQLite [`ForensicStore`].
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    ///
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("Forensic store opened at {path}");
        Ok(store)
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// The underlying pool, shared with the embedding index.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the report tables if this is a fresh database.
    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS reports (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                job_name      TEXT UNIQUE NOT NULL,
                report_path   TEXT NOT NULL,
                upload_date   TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                status        TEXT DEFAULT 'processing',
                error_message TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("reports table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS artifact_types (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                job_name      TEXT NOT NULL,
                file_name     TEXT NOT NULL,
                artifact_name TEXT,
                FOREIGN KEY (job_name) REFERENCES reports(job_name) ON DELETE CASCADE,
                UNIQUE(job_name, file_name)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("artifact_types table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS artifact_data (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                job_name         TEXT NOT NULL,
                artifact_type_id INTEGER NOT NULL,
                row_index        INTEGER NOT NULL,
                data_json        TEXT NOT NULL,
                FOREIGN KEY (job_name) REFERENCES reports(job_name) ON DELETE CASCADE,
                FOREIGN KEY (artifact_type_id) REFERENCES artifact_types(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("artifact_data table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_artifact_data_lookup \
             ON artifact_data(job_name, artifact_type_id, row_index)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("artifact_data index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    // --- Writers used by ingestion fixtures ---

    /// Register a report. Returns its id.
    pub async fn insert_report(
        &self,
        job_name: &str,
        report_path: &str,
        status: &str,
    ) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO reports (job_name, report_path, status) VALUES (?1, ?2, ?3)",
        )
        .bind(job_name)
        .bind(report_path)
        .bind(status)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT report failed: {e}")))?;

        Ok(result.last_insert_rowid())
    }

    /// Register an artifact table inside a report. Returns its id.
    pub async fn insert_artifact_type(
        &self,
        job_name: &str,
        file_name: &str,
    ) -> Result<i64, StoreError> {
        let artifact_name = file_name.trim_end_matches(".tsv").replace('_', " ");
        let result = sqlx::query(
            "INSERT INTO artifact_types (job_name, file_name, artifact_name) VALUES (?1, ?2, ?3)",
        )
        .bind(job_name)
        .bind(file_name)
        .bind(artifact_name)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT artifact type failed: {e}")))?;

        Ok(result.last_insert_rowid())
    }

    /// Append one artifact row, stored verbatim.
    pub async fn insert_row(
        &self,
        job_name: &str,
        artifact_type_id: i64,
        row_index: i64,
        data_json: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO artifact_data (job_name, artifact_type_id, row_index, data_json) \
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(job_name)
        .bind(artifact_type_id)
        .bind(row_index)
        .bind(data_json)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT row failed: {e}")))?;

        Ok(())
    }

    fn row_to_artifact(row: &sqlx::sqlite::SqliteRow) -> Result<ArtifactRow, StoreError> {
        let row_index: i64 = row
            .try_get("row_index")
            .map_err(|e| StoreError::QueryFailed(format!("row_index column: {e}")))?;
        let artifact_type_id: i64 = row
            .try_get("artifact_type_id")
            .map_err(|e| StoreError::QueryFailed(format!("artifact_type_id column: {e}")))?;
        let file_name: String = row
            .try_get("file_name")
            .map_err(|e| StoreError::QueryFailed(format!("file_name column: {e}")))?;
        let data_json: String = row
            .try_get("data_json")
            .map_err(|e| StoreError::QueryFailed(format!("data_json column: {e}")))?;

        Ok(ArtifactRow::decode(row_index, artifact_type_id, file_name, data_json))
    }
}

/// `?, ?, ?` for an `IN (...)` clause.
fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// Escape `LIKE` wildcards so the pattern is matched literally.
fn escape_like(pattern: &str) -> String {
    pattern
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[async_trait]
impl ForensicStore for SqliteStore {
    async fn list_reports(&self) -> Result<Vec<ReportSummary>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, job_name, CAST(upload_date AS TEXT) AS upload_date, status, error_message
            FROM reports
            ORDER BY upload_date DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("List reports: {e}")))?;

        rows.iter()
            .map(|row| {
                Ok(ReportSummary {
                    id: row
                        .try_get("id")
                        .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?,
                    job_name: row
                        .try_get("job_name")
                        .map_err(|e| StoreError::QueryFailed(format!("job_name column: {e}")))?,
                    upload_date: row.try_get("upload_date").unwrap_or(None),
                    status: row
                        .try_get::<Option<String>, _>("status")
                        .unwrap_or(None)
                        .unwrap_or_else(|| "unknown".into()),
                    error_message: row.try_get("error_message").unwrap_or(None),
                })
            })
            .collect()
    }

    async fn report_exists(&self, job_name: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM reports WHERE job_name = ?1 LIMIT 1")
            .bind(job_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Report lookup: {e}")))?;

        Ok(row.is_some())
    }

    async fn list_artifacts(&self, job_name: &str) -> Result<Vec<ArtifactSummary>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT at.id, at.file_name, COUNT(ad.id) AS row_count
            FROM artifact_types at
            LEFT JOIN artifact_data ad
                ON ad.artifact_type_id = at.id AND ad.job_name = at.job_name
            WHERE at.job_name = ?1
            GROUP BY at.id, at.file_name
            ORDER BY at.file_name
            "#,
        )
        .bind(job_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("List artifacts: {e}")))?;

        rows.iter()
            .map(|row| {
                Ok(ArtifactSummary {
                    id: row
                        .try_get("id")
                        .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?,
                    file_name: row
                        .try_get("file_name")
                        .map_err(|e| StoreError::QueryFailed(format!("file_name column: {e}")))?,
                    row_count: row
                        .try_get("row_count")
                        .map_err(|e| StoreError::QueryFailed(format!("row_count column: {e}")))?,
                })
            })
            .collect()
    }

    async fn artifact_rows(&self, query: &RowQuery) -> Result<Vec<ArtifactRow>, StoreError> {
        if query.artifact_type_ids.is_empty() {
            return Ok(vec![]);
        }

        let sql = format!(
            r#"
            SELECT ad.row_index, ad.artifact_type_id, ad.data_json, at.file_name
            FROM artifact_data ad
            JOIN artifact_types at ON ad.artifact_type_id = at.id
            WHERE ad.job_name = ? AND ad.artifact_type_id IN ({})
            ORDER BY ad.artifact_type_id, ad.row_index
            LIMIT ? OFFSET ?
            "#,
            placeholders(query.artifact_type_ids.len())
        );

        let mut db_query = sqlx::query(&sql).bind(&query.job_name);
        for id in &query.artifact_type_ids {
            db_query = db_query.bind(*id);
        }
        let rows = db_query
            .bind(i64::from(query.limit))
            .bind(i64::from(query.offset))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Artifact rows: {e}")))?;

        rows.iter().map(Self::row_to_artifact).collect()
    }

    async fn search_rows(&self, query: &PatternQuery) -> Result<Vec<ArtifactRow>, StoreError> {
        let mut conditions = vec!["ad.job_name = ?".to_string()];

        if !query.artifact_type_ids.is_empty() {
            conditions.push(format!(
                "ad.artifact_type_id IN ({})",
                placeholders(query.artifact_type_ids.len())
            ));
        }

        // LIKE ignores ASCII case, so case-sensitive matching uses instr()
        let needle = if query.case_sensitive {
            conditions.push("instr(ad.data_json, ?) > 0".into());
            query.pattern.clone()
        } else {
            // SQLite's LOWER() only folds ASCII, so the needle must match it
            conditions.push("LOWER(ad.data_json) LIKE ? ESCAPE '\\'".into());
            format!("%{}%", escape_like(&query.pattern.to_ascii_lowercase()))
        };

        let sql = format!(
            r#"
            SELECT ad.row_index, ad.artifact_type_id, ad.data_json, at.file_name
            FROM artifact_data ad
            JOIN artifact_types at ON ad.artifact_type_id = at.id
            WHERE {}
            ORDER BY at.file_name, ad.row_index
            LIMIT ?
            "#,
            conditions.join(" AND ")
        );

        let mut db_query = sqlx::query(&sql).bind(&query.job_name);
        for id in &query.artifact_type_ids {
            db_query = db_query.bind(*id);
        }
        let rows = db_query
            .bind(needle)
            .bind(i64::from(query.limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Pattern search: {e}")))?;

        debug!(
            job_name = %query.job_name,
            pattern = %query.pattern,
            matches = rows.len(),
            "Pattern search complete"
        );

        rows.iter().map(Self::row_to_artifact).collect()
    }
}
