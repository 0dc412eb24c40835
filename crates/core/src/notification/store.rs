//! Notification storage trait.

use thiserror::Error;

use super::{CreateNotificationRequest, Notification, NotificationFilter, SubjectRef};

/// Error type for notification operations.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Notification not found: {0}")]
    NotFound(String),

    #[error("Invalid notification: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),
}

/// Append-only notification storage.
pub trait NotificationStore: Send + Sync {
    /// Create a new unread notification. Rejects a blank message.
    fn create(&self, request: CreateNotificationRequest)
        -> Result<Notification, NotificationError>;

    fn get(&self, id: &str) -> Result<Option<Notification>, NotificationError>;

    /// List notifications matching the filter, newest first.
    fn list(&self, filter: &NotificationFilter) -> Result<Vec<Notification>, NotificationError>;

    /// The `n` most recent notifications.
    fn latest(&self, n: i64) -> Result<Vec<Notification>, NotificationError> {
        self.list(&NotificationFilter::new().with_limit(n))
    }

    fn unread_count(&self) -> Result<i64, NotificationError>;

    fn mark_read(&self, id: &str) -> Result<Notification, NotificationError>;

    fn mark_unread(&self, id: &str) -> Result<Notification, NotificationError>;

    /// Mark every unread notification read. Returns how many changed.
    fn mark_all_read(&self) -> Result<usize, NotificationError>;

    /// Remove all notifications about a subject. Returns how many were removed.
    fn delete_for_subject(&self, subject: &SubjectRef) -> Result<usize, NotificationError>;
}
