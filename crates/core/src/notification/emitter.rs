//! Emits user-visible notifications about analysis outcomes.

use std::sync::Arc;

use tracing::debug;

use super::{
    CreateNotificationRequest, Notification, NotificationConfig, NotificationError,
    NotificationStore, SubjectRef,
};
use crate::metrics;

pub const SUCCESS_MESSAGE: &str = "Your CV analysis is complete! Click to view the results.";

const ELLIPSIS: &str = "...";

/// Creates success and failure notifications for analysis records.
#[derive(Clone)]
pub struct Notifier {
    store: Arc<dyn NotificationStore>,
    config: NotificationConfig,
}

impl Notifier {
    pub fn new(store: Arc<dyn NotificationStore>, config: NotificationConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<dyn NotificationStore> {
        &self.store
    }

    /// Link to an analysis record.
    pub fn link_for(&self, analysis_id: &str) -> String {
        format!(
            "{}/{}",
            self.config.link_prefix.trim_end_matches('/'),
            analysis_id
        )
    }

    pub fn emit_success(&self, analysis_id: &str) -> Result<Notification, NotificationError> {
        self.emit(analysis_id, SUCCESS_MESSAGE.to_string(), "success")
    }

    pub fn emit_failure(
        &self,
        analysis_id: &str,
        error: &str,
    ) -> Result<Notification, NotificationError> {
        let message = format!(
            "CV analysis failed: {}",
            truncate(error, self.config.max_error_chars)
        );
        self.emit(analysis_id, message, "failure")
    }

    fn emit(
        &self,
        analysis_id: &str,
        message: String,
        kind: &'static str,
    ) -> Result<Notification, NotificationError> {
        let notification = self.store.create(CreateNotificationRequest {
            subject: SubjectRef::analysis(analysis_id),
            message,
            link: Some(self.link_for(analysis_id)),
        })?;

        metrics::NOTIFICATIONS_CREATED
            .with_label_values(&[kind])
            .inc();
        debug!(analysis_id, kind, notification_id = %notification.id, "Notification created");
        Ok(notification)
    }
}

/// Bound `text` to at most `max_chars` characters, marking the cut with `...`.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}
