pub mod analysis;
pub mod config;
pub mod document;
pub mod llm;
pub mod metrics;
pub mod notification;
pub mod pipeline;
pub mod scheduler;
pub mod testing;

pub use analysis::{
    AnalysisFilter, AnalysisRecord, AnalysisStatus, AnalysisStore, AnalysisStoreError,
    AnalysisUpdate, CreateAnalysisRequest, SqliteAnalysisStore,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use document::{
    looks_like_pdf, DocumentError, DocumentRef, DocumentStore, ExtractionError, FsDocumentStore,
    PdfTextExtractor, TextExtractor, PDF_CONTENT_TYPE,
};
pub use llm::{create_llm_client, LlmClient, LlmConfig, LlmError, LlmProvider};
pub use notification::{
    Notification, NotificationConfig, NotificationError, NotificationFilter, NotificationStore,
    Notifier, SqliteNotificationStore, SubjectRef, SubjectType,
};
pub use pipeline::{AnalysisProcessor, Disposition, PipelineConfig, PipelineFault, PromptBuilder};
pub use scheduler::{AnalysisJob, AnalysisScheduler, SchedulerConfig, SchedulerStats};
