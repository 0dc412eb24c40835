//! Notification types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Entity kinds a notification may refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
    Analysis,
}

impl SubjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectType::Analysis => "analysis",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "analysis" => Some(SubjectType::Analysis),
            _ => None,
        }
    }
}

/// Tagged reference to the entity a notification concerns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectRef {
    pub subject_type: SubjectType,
    pub subject_id: String,
}

impl SubjectRef {
    pub fn analysis(id: impl Into<String>) -> Self {
        Self {
            subject_type: SubjectType::Analysis,
            subject_id: id.into(),
        }
    }
}

/// A user-visible event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub subject: SubjectRef,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Request to create a notification.
#[derive(Debug, Clone)]
pub struct CreateNotificationRequest {
    pub subject: SubjectRef,
    pub message: String,
    pub link: Option<String>,
}

/// Filter for listing notifications.
#[derive(Debug, Clone)]
pub struct NotificationFilter {
    pub unread_only: bool,
    pub subject: Option<SubjectRef>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for NotificationFilter {
    fn default() -> Self {
        Self {
            unread_only: false,
            subject: None,
            limit: 50,
            offset: 0,
        }
    }
}

impl NotificationFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unread(mut self) -> Self {
        self.unread_only = true;
        self
    }

    pub fn for_subject(mut self, subject: SubjectRef) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}
