//! User-visible notifications about analysis outcomes.

mod config;
mod emitter;
mod sqlite_store;
mod store;
mod types;

pub use config::NotificationConfig;
pub use emitter::{truncate, Notifier, SUCCESS_MESSAGE};
pub use sqlite_store::SqliteNotificationStore;
pub use store::{NotificationError, NotificationStore};
pub use types::{
    CreateNotificationRequest, Notification, NotificationFilter, SubjectRef, SubjectType,
};
