//! Uploaded documents: byte storage and text extraction.

mod extractor;
mod storage;

pub use extractor::{extract_pdf_text, ExtractionError, PdfTextExtractor, TextExtractor};
pub use storage::{DocumentError, DocumentRef, DocumentStore, FsDocumentStore};

/// Content type recorded for PDF uploads.
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Returns true if the bytes start with the PDF header magic.
pub fn looks_like_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF-")
}
