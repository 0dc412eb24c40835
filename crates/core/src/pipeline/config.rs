use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Analysis pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Instruction template file. The compiled-in template is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<PathBuf>,
    /// Offer the model a `submit_analysis` tool instead of relying on the
    /// final text alone.
    #[serde(default)]
    pub tool_mode: bool,
    /// Total processing attempts per analysis, the first one included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_max_attempts() -> u32 {
    3
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            prompt_template: None,
            tool_mode: false,
            max_attempts: default_max_attempts(),
        }
    }
}
