//! Chat API.

use tokio_util::sync::CancellationToken;

use crate::client::RagClient;
use crate::error::Result;
use crate::stream::{CollectingHandler, StreamHandler};
use crate::types::QueryRequest;

/// Path of the streaming query endpoint.
pub(crate) const QUERY_PATH: &str = "chat/query";

/// Chat API client.
pub struct ChatApi {
    client: RagClient,
}

impl ChatApi {
    pub(crate) fn new(client: RagClient) -> Self {
        Self { client }
    }

    /// Stream an answer to `request` into `handler`.
    ///
    /// Invalid requests are reported through the handler without a network
    /// call.
    pub async fn query<H>(&self, request: &QueryRequest, handler: &mut H, cancel: &CancellationToken)
    where
        H: StreamHandler + ?Sized,
    {
        if let Err(e) = request.validate() {
            handler.on_error(e.to_string(), None);
            handler.on_done();
            return;
        }
        self.client
            .stream_events(QUERY_PATH, request, handler, cancel)
            .await;
    }

    /// Ask a question and collect the whole stream.
    pub async fn ask(&self, request: &QueryRequest) -> Result<CollectingHandler> {
        request.validate()?;
        let mut handler = CollectingHandler::new();
        self.query(request, &mut handler, &CancellationToken::new())
            .await;
        Ok(handler)
    }
}
