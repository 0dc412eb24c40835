//! SQLite-backed notification store.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use rusqlite::types::{FromSqlError, Type};
use rusqlite::{params, Connection, OptionalExtension, ToSql};

use super::{
    CreateNotificationRequest, Notification, NotificationError, NotificationFilter,
    NotificationStore, SubjectRef, SubjectType,
};
use crate::analysis::{format_timestamp, parse_timestamp};

const SELECT_COLUMNS: &str = "id, subject_type, subject_id, message, link, read, created_at";

/// SQLite-backed notification store.
pub struct SqliteNotificationStore {
    conn: Mutex<Connection>,
}

impl SqliteNotificationStore {
    pub fn new(path: &Path) -> Result<Self, NotificationError> {
        let conn = Connection::open(path).map_err(db_error)?;
        // Every store opens its own connection to the shared file.
        conn.busy_timeout(Duration::from_secs(5)).map_err(db_error)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, NotificationError> {
        let conn = Connection::open_in_memory().map_err(db_error)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), NotificationError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS notifications (
                id TEXT PRIMARY KEY,
                subject_type TEXT NOT NULL,
                subject_id TEXT NOT NULL,
                message TEXT NOT NULL,
                link TEXT,
                read INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_notifications_subject
                ON notifications(subject_type, subject_id);
            CREATE INDEX IF NOT EXISTS idx_notifications_created_at
                ON notifications(created_at);
            "#,
        )
        .map_err(db_error)
    }

    fn row_to_notification(row: &rusqlite::Row) -> rusqlite::Result<Notification> {
        let subject_type_str: String = row.get(1)?;
        let subject_type = SubjectType::parse(&subject_type_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(FromSqlError::InvalidType))
        })?;
        let created_at_str: String = row.get(6)?;

        Ok(Notification {
            id: row.get(0)?,
            subject: SubjectRef {
                subject_type,
                subject_id: row.get(2)?,
            },
            message: row.get(3)?,
            link: row.get(4)?,
            read: row.get(5)?,
            created_at: parse_timestamp(&created_at_str),
        })
    }

    fn fetch(conn: &Connection, id: &str) -> Result<Option<Notification>, NotificationError> {
        conn.query_row(
            &format!("SELECT {} FROM notifications WHERE id = ?", SELECT_COLUMNS),
            params![id],
            Self::row_to_notification,
        )
        .optional()
        .map_err(db_error)
    }

    fn set_read(&self, id: &str, read: bool) -> Result<Notification, NotificationError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute(
                "UPDATE notifications SET read = ? WHERE id = ?",
                params![read, id],
            )
            .map_err(db_error)?;
        if changed == 0 {
            return Err(NotificationError::NotFound(id.to_string()));
        }
        Self::fetch(&conn, id)?.ok_or_else(|| NotificationError::NotFound(id.to_string()))
    }
}

impl NotificationStore for SqliteNotificationStore {
    fn create(
        &self,
        request: CreateNotificationRequest,
    ) -> Result<Notification, NotificationError> {
        if request.message.trim().is_empty() {
            return Err(NotificationError::Validation(
                "message cannot be empty".to_string(),
            ));
        }

        let conn = self.conn.lock().unwrap();
        let notification = Notification {
            id: uuid::Uuid::new_v4().to_string(),
            subject: request.subject,
            message: request.message,
            link: request.link,
            read: false,
            created_at: Utc::now(),
        };

        conn.execute(
            "INSERT INTO notifications (id, subject_type, subject_id, message, link, read, created_at) VALUES (?, ?, ?, ?, ?, 0, ?)",
            params![
                notification.id,
                notification.subject.subject_type.as_str(),
                notification.subject.subject_id,
                notification.message,
                notification.link,
                format_timestamp(notification.created_at),
            ],
        )
        .map_err(db_error)?;

        Ok(notification)
    }

    fn get(&self, id: &str) -> Result<Option<Notification>, NotificationError> {
        let conn = self.conn.lock().unwrap();
        Self::fetch(&conn, id)
    }

    fn list(&self, filter: &NotificationFilter) -> Result<Vec<Notification>, NotificationError> {
        let conn = self.conn.lock().unwrap();

        let mut conditions = Vec::new();
        let mut all_params: Vec<Box<dyn ToSql>> = Vec::new();

        if filter.unread_only {
            conditions.push("read = 0");
        }
        if let Some(subject) = &filter.subject {
            conditions.push("subject_type = ? AND subject_id = ?");
            all_params.push(Box::new(subject.subject_type.as_str()));
            all_params.push(Box::new(subject.subject_id.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let sql = format!(
            "SELECT {} FROM notifications {} ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
            SELECT_COLUMNS, where_clause
        );

        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql).map_err(db_error)?;
        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_notification)
            .map_err(db_error)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(db_error)
    }

    fn unread_count(&self) -> Result<i64, NotificationError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE read = 0",
            [],
            |row| row.get(0),
        )
        .map_err(db_error)
    }

    fn mark_read(&self, id: &str) -> Result<Notification, NotificationError> {
        self.set_read(id, true)
    }

    fn mark_unread(&self, id: &str) -> Result<Notification, NotificationError> {
        self.set_read(id, false)
    }

    fn mark_all_read(&self) -> Result<usize, NotificationError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("UPDATE notifications SET read = 1 WHERE read = 0", [])
            .map_err(db_error)
    }

    fn delete_for_subject(&self, subject: &SubjectRef) -> Result<usize, NotificationError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM notifications WHERE subject_type = ? AND subject_id = ?",
            params![subject.subject_type.as_str(), subject.subject_id],
        )
        .map_err(db_error)
    }
}

fn db_error(e: rusqlite::Error) -> NotificationError {
    NotificationError::Database(e.to_string())
}
