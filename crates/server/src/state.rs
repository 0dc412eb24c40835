use std::sync::Arc;

use cvlens_core::{
    AnalysisScheduler, AnalysisStore, Config, DocumentStore, NotificationStore, SanitizedConfig,
};

/// Shared application state
pub struct AppState {
    config: Config,
    analyses: Arc<dyn AnalysisStore>,
    notifications: Arc<dyn NotificationStore>,
    documents: Arc<dyn DocumentStore>,
    scheduler: Arc<AnalysisScheduler>,
}

impl AppState {
    pub fn new(
        config: Config,
        analyses: Arc<dyn AnalysisStore>,
        notifications: Arc<dyn NotificationStore>,
        documents: Arc<dyn DocumentStore>,
        scheduler: Arc<AnalysisScheduler>,
    ) -> Self {
        Self {
            config,
            analyses,
            notifications,
            documents,
            scheduler,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn analyses(&self) -> &dyn AnalysisStore {
        self.analyses.as_ref()
    }

    pub fn notifications(&self) -> &dyn NotificationStore {
        self.notifications.as_ref()
    }

    pub fn documents(&self) -> &dyn DocumentStore {
        self.documents.as_ref()
    }

    pub fn scheduler(&self) -> &AnalysisScheduler {
        &self.scheduler
    }
}
