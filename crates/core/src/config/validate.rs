use super::{types::Config, ConfigError};
use crate::llm::LlmProvider;

/// Validate configuration beyond what serde enforces.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    if config.llm.model.trim().is_empty() {
        return Err(invalid("llm.model cannot be empty"));
    }

    if config.llm.timeout_secs == 0 {
        return Err(invalid("llm.timeout_secs must be at least 1"));
    }

    if config.llm.provider == LlmProvider::Custom && config.llm.api_base.is_none() {
        return Err(invalid("llm.api_base is required for the custom provider"));
    }

    if config.pipeline.max_attempts == 0 {
        return Err(invalid("pipeline.max_attempts must be at least 1"));
    }

    if config.scheduler.workers == 0 {
        return Err(invalid("scheduler.workers must be at least 1"));
    }

    if config.scheduler.backoff_multiplier < 1.0 {
        return Err(ConfigError::ValidationError(format!(
            "scheduler.backoff_multiplier must be >= 1.0, got {}",
            config.scheduler.backoff_multiplier
        )));
    }

    // Room for at least one character plus the ellipsis.
    if config.notifications.max_error_chars < 4 {
        return Err(invalid("notifications.max_error_chars must be at least 4"));
    }

    Ok(())
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.to_string())
}
