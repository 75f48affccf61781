//! Source document loading

use super::{CollaboratorResult, DocumentLoader};
use crate::error::CollaboratorError;
use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

/// Reads UTF-8 text files from the local filesystem
#[derive(Debug, Clone, Default)]
pub struct FsDocumentLoader;

impl FsDocumentLoader {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DocumentLoader for FsDocumentLoader {
    async fn load(&self, path: &Path) -> CollaboratorResult<String> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| CollaboratorError::Document {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(path = %path.display(), bytes = text.len(), "Loaded document");
        Ok(text)
    }
}
