//! Prompt construction.

use std::path::Path;

use super::PipelineConfig;

const DEFAULT_TEMPLATE: &str = include_str!("prompt_template.txt");

pub const CV_TEXT_BEGIN: &str = "=== BEGIN CV TEXT ===";
pub const CV_TEXT_END: &str = "=== END CV TEXT ===";

/// Builds the model prompt from an instruction template and extracted text.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    template: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE)
    }
}

impl PromptBuilder {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Load the template from a file.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        Ok(Self::new(std::fs::read_to_string(path)?))
    }

    /// The configured template file, or the compiled-in template.
    pub fn from_config(config: &PipelineConfig) -> std::io::Result<Self> {
        match &config.prompt_template {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Append `extracted_text`, unmodified, as a delimited trailing section.
    pub fn build(&self, extracted_text: &str) -> String {
        let template = self.template.trim_end();
        let mut prompt =
            String::with_capacity(template.len() + extracted_text.len() + 64);
        prompt.push_str(template);
        prompt.push_str("\n\n");
        prompt.push_str(CV_TEXT_BEGIN);
        prompt.push('\n');
        prompt.push_str(extracted_text);
        prompt.push('\n');
        prompt.push_str(CV_TEXT_END);
        prompt.push('\n');
        prompt
    }
}
