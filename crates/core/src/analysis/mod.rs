//! Analysis records: the per-upload entity tracking pipeline status and results.

mod sqlite_store;
mod store;
mod types;

pub(crate) use sqlite_store::{format_timestamp, parse_timestamp};
pub use sqlite_store::SqliteAnalysisStore;
pub use store::{AnalysisFilter, AnalysisStore, AnalysisStoreError, CreateAnalysisRequest};
pub use types::{AnalysisRecord, AnalysisStatus, AnalysisUpdate};
