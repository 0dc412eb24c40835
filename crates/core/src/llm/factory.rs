//! Build a model client from configuration.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::anthropic::AnthropicClient;
use super::client::{LlmClient, LlmError};
use super::config::{LlmConfig, LlmProvider};
use super::ollama::OllamaClient;
use super::openai::OpenAiClient;
use super::transport::HttpTransport;

/// Create the client selected by `config.provider`.
pub fn create_llm_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    let transport = HttpTransport::new(
        config.provider.as_str(),
        Duration::from_secs(config.timeout_secs),
        config.max_retries,
    )?;

    let client: Arc<dyn LlmClient> = match config.provider {
        LlmProvider::Anthropic => {
            let api_key = config.resolved_api_key().ok_or_else(|| {
                LlmError::NotConfigured("anthropic requires api_key or ANTHROPIC_API_KEY".into())
            })?;
            let mut client =
                AnthropicClient::new(api_key, config.model.clone())?.with_transport(transport);
            if let Some(base) = &config.api_base {
                client = client.with_api_base(base.clone());
            }
            Arc::new(client)
        }
        LlmProvider::Ollama => {
            let mut client = OllamaClient::new(config.model.clone())?.with_transport(transport);
            if let Some(base) = &config.api_base {
                client = client.with_api_base(base.clone());
            }
            Arc::new(client)
        }
        LlmProvider::OpenAi => {
            let api_key = config.resolved_api_key().ok_or_else(|| {
                LlmError::NotConfigured("openai requires api_key or OPENAI_API_KEY".into())
            })?;
            let mut client =
                OpenAiClient::new(Some(api_key), config.model.clone())?.with_transport(transport);
            if let Some(base) = &config.api_base {
                client = client.with_api_base(base.clone());
            }
            Arc::new(client)
        }
        LlmProvider::Custom => {
            let base = config.api_base.clone().ok_or_else(|| {
                LlmError::NotConfigured("custom provider requires api_base".into())
            })?;
            Arc::new(
                OpenAiClient::new(config.resolved_api_key(), config.model.clone())?
                    .with_transport(transport)
                    .with_api_base(base),
            )
        }
    };

    info!(
        provider = client.provider(),
        model = client.model(),
        timeout_secs = config.timeout_secs,
        max_retries = config.max_retries,
        "Model client configured"
    );

    Ok(client)
}
