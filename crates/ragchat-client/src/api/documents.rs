//! Documents API.

use crate::client::RagClient;
use crate::error::{Error, Result};
use crate::types::{DocumentDetail, DocumentSummary, DocumentUpload, Page, PageQuery, UploadFile};

/// Documents API client.
pub struct DocumentsApi {
    client: RagClient,
}

impl DocumentsApi {
    pub(crate) fn new(client: RagClient) -> Self {
        Self { client }
    }

    /// Upload files for ingestion.
    ///
    /// Files are processed independently; the response lists the ones that
    /// succeeded.
    pub async fn upload(&self, files: &[UploadFile]) -> Result<Vec<DocumentUpload>> {
        if files.is_empty() {
            return Err(Error::Validation("no files to upload".to_string()));
        }
        self.client.upload("documents/upload", files).await
    }

    /// List documents.
    pub async fn list(&self, query: PageQuery) -> Result<Page<DocumentSummary>> {
        self.client.get_with_query("documents/", &query).await
    }

    /// Get a document with its extracted text.
    pub async fn get(&self, id: &str) -> Result<DocumentDetail> {
        self.client.get(&format!("documents/{}", id)).await
    }

    /// Delete a document and its chunks.
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.client.delete(&format!("documents/{}", id)).await
    }
}
