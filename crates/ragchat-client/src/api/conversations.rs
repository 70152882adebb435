//! Conversations API.

use crate::client::{RagClient, RequestOptions};
use crate::error::Result;
use crate::types::{
    ConversationDetail, ConversationSummary, CreateConversationRequest, Page, PageQuery,
    UpdateConversationRequest,
};

/// Conversations API client.
pub struct ConversationsApi {
    client: RagClient,
}

impl ConversationsApi {
    pub(crate) fn new(client: RagClient) -> Self {
        Self { client }
    }

    /// List conversations, most recent first.
    pub async fn list(&self, query: PageQuery) -> Result<Page<ConversationSummary>> {
        self.client.get_with_query("conversations/", &query).await
    }

    /// Create an empty conversation.
    pub async fn create(&self, title: impl Into<String>) -> Result<ConversationSummary> {
        let request = CreateConversationRequest {
            title: title.into(),
        };
        self.client
            .post("conversations/", &request, RequestOptions::default())
            .await
    }

    /// Get a conversation with all its messages.
    pub async fn get(&self, id: &str) -> Result<ConversationDetail> {
        self.client.get(&format!("conversations/{}", id)).await
    }

    /// Rename a conversation.
    pub async fn rename(&self, id: &str, title: impl Into<String>) -> Result<ConversationSummary> {
        let request = UpdateConversationRequest {
            title: title.into(),
        };
        self.client
            .patch(&format!("conversations/{}", id), &request)
            .await
    }

    /// Delete a conversation and its messages.
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.client.delete(&format!("conversations/{}", id)).await
    }
}
