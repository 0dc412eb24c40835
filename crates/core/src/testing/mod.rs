//! Testing utilities and mock implementations.
//!
//! Mocks for the seams the pipeline talks through (model client, text
//! extractor, scheduler job) plus fixtures for building documents, so that
//! lifecycle tests run without a model server.
//!
//! # Example
//!
//! ```rust,ignore
//! use cvlens_core::testing::{MockLlmClient, MockTextExtractor};
//!
//! let llm = MockLlmClient::new();
//! llm.push_text(r#"{"summary": "Senior engineer"}"#);
//!
//! let extractor = MockTextExtractor::new();
//! extractor.set_text("Jane Doe");
//! ```

mod mock_analysis_job;
mod mock_llm_client;
mod mock_text_extractor;

pub use mock_analysis_job::MockAnalysisJob;
pub use mock_llm_client::{MockLlmClient, DEFAULT_REPLY};
pub use mock_text_extractor::MockTextExtractor;

/// Test fixtures and helper functions.
pub mod fixtures {
    use lopdf::{dictionary, Document, Object, Stream};

    use crate::document::{DocumentRef, PDF_CONTENT_TYPE};

    /// Build a PDF with one page per entry, each showing its text in
    /// Courier. An empty entry produces a page without a content stream.
    pub fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
        for text in pages {
            let mut page = dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Resources" => resources_id,
            };
            if !text.is_empty() {
                let content = format!("BT /F1 12 Tf 50 700 Td ({}) Tj ET", escape(text));
                let content_id =
                    doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
                page.set("Contents", content_id);
            }
            kids.push(doc.add_object(page).into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)
            .expect("writing a PDF to memory cannot fail");
        bytes
    }

    /// A PDF whose single page has no text layer.
    pub fn pdf_without_text() -> Vec<u8> {
        pdf_with_pages(&[""])
    }

    /// A document reference with a fresh key.
    pub fn document_ref(filename: &str) -> DocumentRef {
        DocumentRef {
            key: uuid::Uuid::new_v4().to_string(),
            filename: Some(filename.to_string()),
            content_type: PDF_CONTENT_TYPE.to_string(),
            byte_size: 1024,
        }
    }

    fn escape(text: &str) -> String {
        text.replace('\\', "\\\\")
            .replace('(', "\\(")
            .replace(')', "\\)")
    }
}
