//! Mock text extractor for testing.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::document::{DocumentRef, ExtractionError, TextExtractor};

/// Mock implementation of the TextExtractor trait.
///
/// Returns the configured text (or error) for every document and records
/// the keys it was asked about.
#[derive(Debug)]
pub struct MockTextExtractor {
    outcome: Mutex<Result<String, ExtractionError>>,
    extracted: Mutex<Vec<String>>,
}

impl Default for MockTextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTextExtractor {
    pub fn new() -> Self {
        Self {
            outcome: Mutex::new(Ok("Mock CV text".to_string())),
            extracted: Mutex::new(Vec::new()),
        }
    }

    pub fn set_text(&self, text: impl Into<String>) {
        *self.outcome.lock().unwrap() = Ok(text.into());
    }

    pub fn set_error(&self, error: ExtractionError) {
        *self.outcome.lock().unwrap() = Err(error);
    }

    /// Keys of the documents extracted so far.
    pub fn extracted_keys(&self) -> Vec<String> {
        self.extracted.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextExtractor for MockTextExtractor {
    async fn extract(&self, document: &DocumentRef) -> Result<String, ExtractionError> {
        self.extracted.lock().unwrap().push(document.key.clone());
        self.outcome.lock().unwrap().clone()
    }
}
