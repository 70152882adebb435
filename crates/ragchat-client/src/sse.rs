//! Incremental decoder for the query event stream.
//!
//! The server writes frames of the form:
//!
//! ```text
//! event: delta
//! data: "Hello"
//!
//! ```
//!
//! Transport reads do not respect frame or line boundaries, and may split a
//! UTF-8 character in two. [`SseDecoder`] keeps carry-over buffers for both
//! and only acts on complete lines, so the decoded event sequence is the same
//! however the bytes are chunked.

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::types::{DonePayload, ErrorPayload, StreamEvent, Usage};

const EVENT_PREFIX: &str = "event: ";
const DATA_PREFIX: &str = "data: ";

/// Stateful event-stream decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Bytes of an incomplete UTF-8 sequence from the previous chunk.
    pending_bytes: Vec<u8>,
    /// Text after the last line break.
    buffer: String,
    /// Event name set by the most recent `event:` line in this frame.
    current_event: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a raw transport chunk.
    pub fn push_bytes(&mut self, chunk: &[u8]) -> Vec<Result<StreamEvent>> {
        self.pending_bytes.extend_from_slice(chunk);

        let valid_up_to = match std::str::from_utf8(&self.pending_bytes) {
            Ok(_) => self.pending_bytes.len(),
            Err(e) => match e.error_len() {
                // Truncated sequence at the end: wait for the rest
                None => e.valid_up_to(),
                // Genuinely invalid bytes: decode lossily rather than stall
                Some(_) => {
                    let bytes = std::mem::take(&mut self.pending_bytes);
                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    return self.push_str(&text);
                }
            },
        };

        let rest = self.pending_bytes.split_off(valid_up_to);
        let complete = std::mem::replace(&mut self.pending_bytes, rest);
        match String::from_utf8(complete) {
            Ok(text) => self.push_str(&text),
            Err(e) => {
                let text = String::from_utf8_lossy(e.as_bytes()).into_owned();
                self.push_str(&text)
            }
        }
    }

    /// Feed a chunk of decoded text.
    pub fn push_str(&mut self, chunk: &str) -> Vec<Result<StreamEvent>> {
        self.buffer.push_str(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim_end_matches('\n').trim_end_matches('\r');
            if let Some(result) = self.process_line(line) {
                events.push(result);
            }
        }
        events
    }

    /// Flush a final unterminated line at end of stream.
    pub fn finish(&mut self) -> Vec<Result<StreamEvent>> {
        let mut events = Vec::new();
        if !self.pending_bytes.is_empty() {
            let bytes = std::mem::take(&mut self.pending_bytes);
            self.buffer.push_str(&String::from_utf8_lossy(&bytes));
        }
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            let line = line.trim_end_matches('\r');
            if let Some(result) = self.process_line(line) {
                events.push(result);
            }
        }
        self.current_event = None;
        events
    }

    /// Whether any undelivered input is buffered.
    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty() || !self.pending_bytes.is_empty()
    }

    fn process_line(&mut self, line: &str) -> Option<Result<StreamEvent>> {
        if line.is_empty() {
            self.current_event = None;
            return None;
        }

        if let Some(name) = line.strip_prefix(EVENT_PREFIX) {
            self.current_event = Some(name.trim().to_string());
            return None;
        }

        let payload = line.strip_prefix(DATA_PREFIX)?;
        let event = self.current_event.as_deref()?;

        let result = match event {
            "conversation_id" => Ok(StreamEvent::ConversationId(decode_text(payload))),
            "delta" => Ok(StreamEvent::Delta(decode_text(payload))),
            "sources" => decode_json(event, payload).map(StreamEvent::Sources),
            "usage" => decode_json::<Usage>(event, payload).map(StreamEvent::Usage),
            "done" => decode_json::<DonePayload>(event, payload).map(StreamEvent::Done),
            "error" => decode_json::<ErrorPayload>(event, payload).map(StreamEvent::Error),
            other => {
                tracing::trace!(event = other, "Ignoring unknown stream event");
                return None;
            }
        };

        if let Err(ref e) = result {
            tracing::warn!(event, error = %e, "Discarding undecodable stream event");
            self.current_event = None;
        }
        Some(result)
    }
}

/// Decode a quoted string literal, falling back to the raw trimmed text.
fn decode_text(payload: &str) -> String {
    serde_json::from_str::<String>(payload).unwrap_or_else(|_| payload.trim().to_string())
}

fn decode_json<T: DeserializeOwned>(event: &str, payload: &str) -> Result<T> {
    serde_json::from_str(payload).map_err(|e| Error::Parse {
        event: event.to_string(),
        message: e.to_string(),
    })
}

/// Encode one frame in the server's wire format.
pub fn encode_frame(event: &str, data: &str) -> String {
    format!("{}{}\n{}{}\n\n", EVENT_PREFIX, event, DATA_PREFIX, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Source;

    fn sample_stream() -> String {
        let mut s = String::new();
        s.push_str(&encode_frame("conversation_id", "\"conv-123\""));
        s.push_str(&encode_frame(
            "sources",
            r#"[{"document_id":"d1","filename":"notes.md","chunk_index":0,"content":"Über café ☕","score":0.91}]"#,
        ));
        s.push_str(&encode_frame("delta", "\"Hello\""));
        s.push_str(&encode_frame("delta", "\" wörld ☕\""));
        s.push_str(&encode_frame(
            "usage",
            r#"{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}"#,
        ));
        s.push_str(&encode_frame("done", r#"{"full_text":"Hello wörld ☕"}"#));
        s
    }

    fn decode_all(decoder: &mut SseDecoder, chunks: &[&[u8]]) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(decoder.push_bytes(chunk).into_iter().map(|r| r.unwrap()));
        }
        out.extend(decoder.finish().into_iter().map(|r| r.unwrap()));
        out
    }

    #[test]
    fn test_decodes_full_stream() {
        let stream = sample_stream();
        let events = decode_all(&mut SseDecoder::new(), &[stream.as_bytes()]);

        assert_eq!(events.len(), 6);
        assert_eq!(events[0], StreamEvent::ConversationId("conv-123".to_string()));
        assert!(matches!(&events[1], StreamEvent::Sources(s) if s.len() == 1));
        assert_eq!(events[2], StreamEvent::Delta("Hello".to_string()));
        assert_eq!(events[3], StreamEvent::Delta(" wörld ☕".to_string()));
        assert_eq!(
            events[4],
            StreamEvent::Usage(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15
            })
        );
        assert!(matches!(&events[5], StreamEvent::Done(d) if d.full_text == "Hello wörld ☕"));
    }

    #[test]
    fn test_every_split_point_gives_same_events() {
        let stream = sample_stream();
        let bytes = stream.as_bytes();
        let expected = decode_all(&mut SseDecoder::new(), &[bytes]);

        for split in 0..=bytes.len() {
            let (a, b) = bytes.split_at(split);
            let events = decode_all(&mut SseDecoder::new(), &[a, b]);
            assert_eq!(events, expected, "split at byte {}", split);
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let stream = sample_stream();
        let expected = decode_all(&mut SseDecoder::new(), &[stream.as_bytes()]);

        let chunks: Vec<&[u8]> = stream.as_bytes().chunks(1).collect();
        assert_eq!(decode_all(&mut SseDecoder::new(), &chunks), expected);

        let chunks: Vec<&[u8]> = stream.as_bytes().chunks(7).collect();
        assert_eq!(decode_all(&mut SseDecoder::new(), &chunks), expected);
    }

    #[test]
    fn test_incomplete_line_is_retained() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push_str("event: delta\ndata: \"par").is_empty());
        assert!(decoder.has_pending());

        let events = decoder.push_str("tial\"\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(*events[0].as_ref().unwrap(), StreamEvent::Delta("partial".to_string()));
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_unquoted_text_falls_back_to_raw() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push_str("event: delta\ndata: I couldn't find anything \n\n");
        assert_eq!(
            *events[0].as_ref().unwrap(),
            StreamEvent::Delta("I couldn't find anything".to_string())
        );

        let events = decoder.push_str("event: conversation_id\ndata: 6f1c2d\n\n");
        assert_eq!(
            *events[0].as_ref().unwrap(),
            StreamEvent::ConversationId("6f1c2d".to_string())
        );
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push_str("event: delta\r\ndata: \"x\"\r\n\r\nevent: done\r\ndata: {}\r\n\r\n");
        assert_eq!(events.len(), 2);
        assert_eq!(*events[0].as_ref().unwrap(), StreamEvent::Delta("x".to_string()));
        assert!(matches!(events[1].as_ref().unwrap(), StreamEvent::Done(d) if d.full_text.is_empty()));
    }

    #[test]
    fn test_unknown_events_are_ignored() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push_str(
            "event: heartbeat\ndata: {}\n\n: comment\nid: 7\nevent: delta\ndata: \"ok\"\n\n",
        );
        assert_eq!(events.len(), 1);
        assert_eq!(*events[0].as_ref().unwrap(), StreamEvent::Delta("ok".to_string()));
    }

    #[test]
    fn test_data_without_event_is_ignored() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push_str("data: \"orphan\"\n\n").is_empty());
    }

    #[test]
    fn test_blank_line_resets_event_name() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push_str("event: delta\n\ndata: \"dropped\"\n\n");
        assert!(events.is_empty());
    }

    #[test]
    fn test_malformed_payload_reports_and_continues() {
        let mut decoder = SseDecoder::new();
        let input = format!(
            "{}{}{}",
            encode_frame("sources", "[{not json"),
            encode_frame("delta", "\"after\""),
            encode_frame("usage", r#"{"prompt_tokens":"many"}"#),
        );
        let results = decoder.push_str(&input);

        assert_eq!(results.len(), 3);
        assert!(matches!(&results[0], Err(Error::Parse { event, .. }) if event == "sources"));
        assert_eq!(*results[1].as_ref().unwrap(), StreamEvent::Delta("after".to_string()));
        assert!(matches!(&results[2], Err(Error::Parse { event, .. }) if event == "usage"));
    }

    #[test]
    fn test_failed_event_is_discarded_for_rest_of_frame() {
        let mut decoder = SseDecoder::new();
        let results = decoder.push_str("event: sources\ndata: nope\ndata: []\n\n");
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[test]
    fn test_error_event() {
        let mut decoder = SseDecoder::new();
        let results = decoder.push_str(&encode_frame(
            "error",
            r#"{"detail":"Failed to generate response. Please try again."}"#,
        ));
        assert!(matches!(
            results[0].as_ref().unwrap(),
            StreamEvent::Error(e) if e.detail.starts_with("Failed to generate")
        ));
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push_str("event: done\ndata: {\"full_text\":\"end\"}").is_empty());
        let events = decoder.finish();
        assert!(matches!(events[0].as_ref().unwrap(), StreamEvent::Done(d) if d.full_text == "end"));
    }

    #[test]
    fn test_empty_sources() {
        let mut decoder = SseDecoder::new();
        let results = decoder.push_str(&encode_frame("sources", "[]"));
        assert_eq!(*results[0].as_ref().unwrap(), StreamEvent::Sources(Vec::<Source>::new()));
    }
}
