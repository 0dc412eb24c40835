//! SQLite-backed analysis store implementation.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{FromSqlError, Type};
use rusqlite::{params, Connection, OptionalExtension, ToSql};
use serde_json::Value;

use super::{
    AnalysisFilter, AnalysisRecord, AnalysisStatus, AnalysisStore, AnalysisStoreError,
    AnalysisUpdate, CreateAnalysisRequest,
};
use crate::document::DocumentRef;

const SELECT_COLUMNS: &str = "id, status, document, extracted_text, analysis_result, error_message, attempts, created_at, updated_at";

/// SQLite-backed analysis store.
pub struct SqliteAnalysisStore {
    conn: Mutex<Connection>,
}

impl SqliteAnalysisStore {
    /// Open (or create) the database file and make sure the schema exists.
    pub fn new(path: &Path) -> Result<Self, AnalysisStoreError> {
        let conn = Connection::open(path).map_err(db_error)?;
        // Every store opens its own connection to the shared file.
        conn.busy_timeout(Duration::from_secs(5)).map_err(db_error)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, AnalysisStoreError> {
        let conn = Connection::open_in_memory().map_err(db_error)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), AnalysisStoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS analyses (
                id TEXT PRIMARY KEY,
                status TEXT NOT NULL DEFAULT 'pending',
                document TEXT NOT NULL,
                extracted_text TEXT,
                analysis_result TEXT,
                error_message TEXT,
                attempts INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_analyses_status ON analyses(status);
            CREATE INDEX IF NOT EXISTS idx_analyses_created_at ON analyses(created_at);
            "#,
        )
        .map_err(db_error)
    }

    fn build_where_clause(filter: &AnalysisFilter) -> (String, Vec<Box<dyn ToSql>>) {
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if filter.statuses.is_empty() {
            return (String::new(), params);
        }

        let placeholders = vec!["?"; filter.statuses.len()].join(", ");
        for status in &filter.statuses {
            params.push(Box::new(status.as_str()));
        }

        (format!("WHERE status IN ({})", placeholders), params)
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<AnalysisRecord> {
        let id: String = row.get(0)?;
        let status_str: String = row.get(1)?;
        let document_json: String = row.get(2)?;
        let extracted_text: Option<String> = row.get(3)?;
        let result_json: Option<String> = row.get(4)?;
        let error_message: Option<String> = row.get(5)?;
        let attempts: u32 = row.get(6)?;
        let created_at_str: String = row.get(7)?;
        let updated_at_str: String = row.get(8)?;

        let status = AnalysisStatus::parse(&status_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(FromSqlError::InvalidType))
        })?;

        let document: DocumentRef = serde_json::from_str(&document_json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

        let analysis_result: Option<Value> = result_json
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

        Ok(AnalysisRecord {
            id,
            status,
            document,
            extracted_text,
            analysis_result,
            error_message,
            attempts,
            created_at: parse_timestamp(&created_at_str),
            updated_at: parse_timestamp(&updated_at_str),
        })
    }

    fn fetch(conn: &Connection, id: &str) -> Result<Option<AnalysisRecord>, AnalysisStoreError> {
        conn.query_row(
            &format!("SELECT {} FROM analyses WHERE id = ?", SELECT_COLUMNS),
            params![id],
            Self::row_to_record,
        )
        .optional()
        .map_err(db_error)
    }
}

impl AnalysisStore for SqliteAnalysisStore {
    fn create(&self, request: CreateAnalysisRequest) -> Result<AnalysisRecord, AnalysisStoreError> {
        let conn = self.conn.lock().unwrap();

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let document_json = serde_json::to_string(&request.document)
            .map_err(|e| AnalysisStoreError::Database(e.to_string()))?;

        conn.execute(
            "INSERT INTO analyses (id, status, document, attempts, created_at, updated_at) VALUES (?, ?, ?, 0, ?, ?)",
            params![
                id,
                AnalysisStatus::Pending.as_str(),
                document_json,
                format_timestamp(now),
                format_timestamp(now),
            ],
        )
        .map_err(db_error)?;

        Ok(AnalysisRecord {
            id,
            status: AnalysisStatus::Pending,
            document: request.document,
            extracted_text: None,
            analysis_result: None,
            error_message: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
        })
    }

    fn get(&self, id: &str) -> Result<Option<AnalysisRecord>, AnalysisStoreError> {
        let conn = self.conn.lock().unwrap();
        Self::fetch(&conn, id)
    }

    fn list(&self, filter: &AnalysisFilter) -> Result<Vec<AnalysisRecord>, AnalysisStoreError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, mut all_params) = Self::build_where_clause(filter);
        let sql = format!(
            "SELECT {} FROM analyses {} ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
            SELECT_COLUMNS, where_clause
        );

        let mut stmt = conn.prepare(&sql).map_err(db_error)?;

        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_record)
            .map_err(db_error)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(db_error)
    }

    fn count(&self, filter: &AnalysisFilter) -> Result<i64, AnalysisStoreError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM analyses {}", where_clause);
        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(db_error)
    }

    fn apply(
        &self,
        id: &str,
        update: AnalysisUpdate,
    ) -> Result<AnalysisRecord, AnalysisStoreError> {
        let conn = self.conn.lock().unwrap();

        let now = format_timestamp(Utc::now());
        let allowed = update.allowed_from();
        let target = update.target_status();

        let (assignments, mut values): (&str, Vec<Box<dyn ToSql>>) = match &update {
            AnalysisUpdate::StartAttempt => (
                "status = ?, attempts = attempts + 1, analysis_result = NULL, error_message = NULL",
                vec![Box::new(target.as_str())],
            ),
            AnalysisUpdate::ExtractedText(text) => {
                ("extracted_text = ?", vec![Box::new(text.clone())])
            }
            AnalysisUpdate::Complete(result) => {
                let json = serde_json::to_string(result)
                    .map_err(|e| AnalysisStoreError::Database(e.to_string()))?;
                (
                    "status = ?, analysis_result = ?, error_message = NULL",
                    vec![Box::new(target.as_str()), Box::new(json)],
                )
            }
            AnalysisUpdate::Fail(message) => (
                "status = ?, error_message = ?, analysis_result = NULL",
                vec![Box::new(target.as_str()), Box::new(message.clone())],
            ),
        };

        values.push(Box::new(now));
        values.push(Box::new(id.to_string()));
        for status in allowed {
            values.push(Box::new(status.as_str()));
        }

        let sql = format!(
            "UPDATE analyses SET {}, updated_at = ? WHERE id = ? AND status IN ({})",
            assignments,
            vec!["?"; allowed.len()].join(", ")
        );
        let param_refs: Vec<&dyn ToSql> = values.iter().map(|p| p.as_ref()).collect();

        let changed = conn
            .execute(&sql, param_refs.as_slice())
            .map_err(db_error)?;

        let current = Self::fetch(&conn, id)?
            .ok_or_else(|| AnalysisStoreError::NotFound(id.to_string()))?;

        if changed == 0 {
            return Err(AnalysisStoreError::StaleState {
                analysis_id: id.to_string(),
                current_status: current.status,
                operation: update.name(),
            });
        }

        Ok(current)
    }

    fn delete(&self, id: &str) -> Result<AnalysisRecord, AnalysisStoreError> {
        let conn = self.conn.lock().unwrap();

        let record = Self::fetch(&conn, id)?
            .ok_or_else(|| AnalysisStoreError::NotFound(id.to_string()))?;

        conn.execute("DELETE FROM analyses WHERE id = ?", params![id])
            .map_err(db_error)?;

        Ok(record)
    }
}

fn db_error(e: rusqlite::Error) -> AnalysisStoreError {
    AnalysisStoreError::Database(e.to_string())
}

// Fixed-width timestamps keep lexical and chronological order identical.
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
