//! Plain-text extraction from stored documents.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use super::{DocumentError, DocumentRef, DocumentStore};

/// Errors from text extraction.
#[derive(Debug, Clone, Error)]
pub enum ExtractionError {
    /// The referenced bytes are gone from storage.
    #[error("Document is missing from storage: {key}")]
    DocumentMissing { key: String },

    /// The bytes are not a readable document.
    #[error("Could not read document: {0}")]
    Unparseable(String),

    /// The document parsed but carries no text layer.
    #[error("Could not extract text from document. The file might be empty or image-based.")]
    NoText,

    /// Storage I/O failed.
    #[error("Failed to load document: {0}")]
    Io(String),

    /// The blocking extraction task did not complete.
    #[error("Extraction task failed: {0}")]
    Join(String),
}

impl ExtractionError {
    /// Returns true if a later attempt could succeed on the same document.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExtractionError::Io(_) | ExtractionError::Join(_))
    }
}

impl From<DocumentError> for ExtractionError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::NotFound { key } | DocumentError::InvalidKey { key } => {
                ExtractionError::DocumentMissing { key }
            }
            other => ExtractionError::Io(other.to_string()),
        }
    }
}

/// Turns a stored document into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, document: &DocumentRef) -> Result<String, ExtractionError>;
}

/// PDF text extractor backed by lopdf.
pub struct PdfTextExtractor {
    store: Arc<dyn DocumentStore>,
}

impl PdfTextExtractor {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TextExtractor for PdfTextExtractor {
    async fn extract(&self, document: &DocumentRef) -> Result<String, ExtractionError> {
        let bytes = self.store.open(document).await?;
        let key = document.key.clone();

        // Parsing is CPU bound; the bytes are dropped when the task ends.
        let text = tokio::task::spawn_blocking(move || extract_pdf_text(&bytes))
            .await
            .map_err(|e| ExtractionError::Join(e.to_string()))??;

        debug!(key = %key, chars = text.chars().count(), "Extracted document text");
        Ok(text)
    }
}

/// Extract the text layer of a PDF, one block per page in page order,
/// separated by a blank line.
pub fn extract_pdf_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    let doc = lopdf::Document::load_mem(bytes)
        .map_err(|e| ExtractionError::Unparseable(e.to_string()))?;

    let mut blocks = Vec::new();
    for (page_num, _) in doc.get_pages() {
        match doc.extract_text(&[page_num]) {
            Ok(page_text) => {
                let trimmed = page_text.trim();
                if !trimmed.is_empty() {
                    blocks.push(trimmed.to_string());
                }
            }
            Err(e) => warn!(page = page_num, error = %e, "Skipping unreadable page"),
        }
    }

    if blocks.is_empty() {
        return Err(ExtractionError::NoText);
    }

    Ok(blocks.join("\n\n"))
}
