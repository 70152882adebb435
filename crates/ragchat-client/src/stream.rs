//! Streaming query calls.
//!
//! [`RagClient::stream_events`] drives one long-lived POST to completion and
//! reports everything through a [`StreamHandler`]. Failures never surface as
//! `Err`: they are delivered to [`StreamHandler::on_error`], and
//! [`StreamHandler::on_done`] is always the last call.

use futures::StreamExt;
use reqwest::{Method, StatusCode};
use tokio_util::sync::CancellationToken;

use crate::client::{Payload, PreparedRequest, RagClient};
use crate::error::{AUTH_FAILED_MESSAGE, Error, NETWORK_ERROR_MESSAGE, error_detail};
use crate::sse::SseDecoder;
use crate::types::StreamEvent;

const EVENT_STREAM: &str = "text/event-stream";

/// Receives the outcome of a streaming call.
pub trait StreamHandler: Send {
    /// A decoded event, in arrival order.
    fn on_event(&mut self, event: StreamEvent);

    /// A failure; `status` is set for HTTP-level failures.
    fn on_error(&mut self, message: String, status: Option<u16>);

    /// An event payload that could not be decoded.
    ///
    /// The stream keeps going after this. Defaults to [`on_error`](Self::on_error)
    /// without a status.
    fn on_parse_error(&mut self, message: String) {
        self.on_error(message, None);
    }

    /// Called exactly once after everything else.
    fn on_done(&mut self) {}
}

/// How a streaming call ended, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamOutcome {
    Completed,
    Cancelled,
    Failed,
}

impl RagClient {
    /// Issue a streaming POST and feed decoded events to `handler`.
    ///
    /// On 401 the shared [`TokenStore`](crate::auth::TokenStore) is refreshed
    /// and the request retried once. Cancelling `cancel` stops the call
    /// quietly at its next suspension point.
    pub async fn stream_events<B, H>(
        &self,
        path: &str,
        body: &B,
        handler: &mut H,
        cancel: &CancellationToken,
    ) where
        B: serde::Serialize + ?Sized,
        H: StreamHandler + ?Sized,
    {
        let outcome = self.run_stream(path, body, handler, cancel).await;
        tracing::debug!(path, ?outcome, "Stream finished");
        handler.on_done();
    }

    async fn run_stream<B, H>(
        &self,
        path: &str,
        body: &B,
        handler: &mut H,
        cancel: &CancellationToken,
    ) -> StreamOutcome
    where
        B: serde::Serialize + ?Sized,
        H: StreamHandler + ?Sized,
    {
        let request = match self.prepare_stream(path, body) {
            Ok(request) => request,
            Err(e) => {
                handler.on_error(e.to_string(), None);
                return StreamOutcome::Failed;
            }
        };

        let tokens = self.tokens();
        let token = tokens.get_token();

        let mut response = match self.send_cancellable(&request, token.as_deref(), cancel).await {
            Some(Ok(response)) => response,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Stream request failed");
                handler.on_error(NETWORK_ERROR_MESSAGE.to_string(), None);
                return StreamOutcome::Failed;
            }
            None => return StreamOutcome::Cancelled,
        };

        if response.status() == StatusCode::UNAUTHORIZED {
            let refreshed = tokio::select! {
                biased;
                _ = cancel.cancelled() => return StreamOutcome::Cancelled,
                token = tokens.refresh() => token,
            };
            let Some(new_token) = refreshed else {
                handler.on_error(AUTH_FAILED_MESSAGE.to_string(), Some(401));
                return StreamOutcome::Failed;
            };

            response = match self.send_cancellable(&request, Some(&new_token), cancel).await {
                Some(Ok(response)) => response,
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Stream retry failed");
                    handler.on_error(NETWORK_ERROR_MESSAGE.to_string(), None);
                    return StreamOutcome::Failed;
                }
                None => return StreamOutcome::Cancelled,
            };
            if response.status() == StatusCode::UNAUTHORIZED {
                tokens.reject();
            }
        }

        let status = response.status();
        if !status.is_success() {
            let body = tokio::select! {
                biased;
                _ = cancel.cancelled() => return StreamOutcome::Cancelled,
                body = response.bytes() => body.unwrap_or_default(),
            };
            handler.on_error(error_detail(status.as_u16(), &body), Some(status.as_u16()));
            return StreamOutcome::Failed;
        }

        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return StreamOutcome::Cancelled,
                next = body.next() => next,
            };

            let results = match next {
                Some(Ok(chunk)) => decoder.push_bytes(&chunk),
                Some(Err(e)) => {
                    if cancel.is_cancelled() {
                        return StreamOutcome::Cancelled;
                    }
                    let err = Error::Stream(e.to_string());
                    tracing::warn!(error = %err, "Stream interrupted");
                    handler.on_error(err.to_string(), None);
                    return StreamOutcome::Failed;
                }
                None => {
                    let tail = decoder.finish();
                    deliver(handler, tail);
                    return StreamOutcome::Completed;
                }
            };
            deliver(handler, results);
        }
    }

    fn prepare_stream<B: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> crate::Result<PreparedRequest<'static>> {
        Ok(PreparedRequest {
            method: Method::POST,
            url: self.url(path)?,
            query: None,
            payload: Payload::json(body)?,
            accept: Some(EVENT_STREAM),
            timeout: self.inner().stream_timeout,
        })
    }

    /// Send one attempt; `None` when cancelled first.
    async fn send_cancellable(
        &self,
        request: &PreparedRequest<'_>,
        token: Option<&str>,
        cancel: &CancellationToken,
    ) -> Option<crate::Result<reqwest::Response>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.inner().send(request, token) => Some(result),
        }
    }
}

fn deliver<H: StreamHandler + ?Sized>(handler: &mut H, results: Vec<crate::Result<StreamEvent>>) {
    for result in results {
        match result {
            Ok(event) => handler.on_event(event),
            Err(e) => handler.on_parse_error(e.to_string()),
        }
    }
}

/// Handler that records everything it receives.
///
/// Useful for one-shot calls that want the whole answer at once.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CollectingHandler {
    pub events: Vec<StreamEvent>,
    pub errors: Vec<(String, Option<u16>)>,
    pub done_calls: u32,
}

impl CollectingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concatenated `delta` text.
    pub fn text(&self) -> String {
        self.events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Delta(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl StreamHandler for CollectingHandler {
    fn on_event(&mut self, event: StreamEvent) {
        self.events.push(event);
    }

    fn on_error(&mut self, message: String, status: Option<u16>) {
        self.errors.push((message, status));
    }

    fn on_done(&mut self) {
        self.done_calls += 1;
    }
}
