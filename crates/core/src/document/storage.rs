//! Storage for uploaded document bytes.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Reference to a stored document.
///
/// The pipeline only ever reads through this reference; it never rewrites
/// the bytes behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Storage key (a UUID for the filesystem store).
    pub key: String,
    /// Original filename as supplied by the uploader.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub content_type: String,
    pub byte_size: u64,
}

/// Errors from document storage.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Document not found: {key}")]
    NotFound { key: String },

    #[error("Invalid document key: {key}")]
    InvalidKey { key: String },

    #[error("Failed to create documents directory: {path}")]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write document: {path}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read document: {path}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to delete document: {path}")]
    DeleteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Backend holding uploaded document bytes.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store new bytes and return a reference to them.
    async fn put(
        &self,
        bytes: Vec<u8>,
        filename: Option<String>,
        content_type: &str,
    ) -> Result<DocumentRef, DocumentError>;

    /// Read the full contents of a stored document.
    async fn open(&self, document: &DocumentRef) -> Result<Vec<u8>, DocumentError>;

    /// Remove a stored document. Removing a missing document is not an error.
    async fn delete(&self, document: &DocumentRef) -> Result<(), DocumentError>;
}

/// Filesystem document store: one file per document, named by its key.
#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, DocumentError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| DocumentError::DirectoryCreationFailed {
            path: root.clone(),
            source: e,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, DocumentError> {
        // Keys are generated UUIDs; anything else could escape the root.
        uuid::Uuid::parse_str(key).map_err(|_| DocumentError::InvalidKey {
            key: key.to_string(),
        })?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn put(
        &self,
        bytes: Vec<u8>,
        filename: Option<String>,
        content_type: &str,
    ) -> Result<DocumentRef, DocumentError> {
        let key = uuid::Uuid::new_v4().to_string();
        let path = self.path_for(&key)?;
        let byte_size = bytes.len() as u64;

        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| DocumentError::WriteFailed {
                path: path.clone(),
                source: e,
            })?;

        debug!(key = %key, byte_size, "Stored document");

        Ok(DocumentRef {
            key,
            filename,
            content_type: content_type.to_string(),
            byte_size,
        })
    }

    async fn open(&self, document: &DocumentRef) -> Result<Vec<u8>, DocumentError> {
        let path = self.path_for(&document.key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(DocumentError::NotFound {
                key: document.key.clone(),
            }),
            Err(e) => Err(DocumentError::ReadFailed { path, source: e }),
        }
    }

    async fn delete(&self, document: &DocumentRef) -> Result<(), DocumentError> {
        let path = self.path_for(&document.key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(key = %document.key, "Deleted document");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DocumentError::DeleteFailed { path, source: e }),
        }
    }
}
