//! Common test utilities for client integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::Result;
use ragchat_client::sse::encode_frame;
use ragchat_client::{RagClient, Source};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Build a client against a mock server, optionally holding a token.
pub fn client_for(server_uri: &str, token: Option<&str>) -> Result<RagClient> {
    let mut builder = RagClient::builder().base_url(server_uri);
    if let Some(token) = token {
        builder = builder.access_token(token);
    }
    Ok(builder.build()?)
}

/// Build a client whose auth failure hook increments the returned counter.
pub fn client_with_hook(server_uri: &str, token: &str) -> Result<(RagClient, Arc<AtomicU32>)> {
    let fired = Arc::new(AtomicU32::new(0));
    let counter = fired.clone();
    let client = RagClient::builder()
        .base_url(server_uri)
        .access_token(token)
        .on_auth_failure(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .build()?;
    Ok((client, fired))
}

/// Encode a sequence of `(event, data)` frames as an event-stream body.
pub fn sse_body(frames: &[(&str, String)]) -> String {
    frames
        .iter()
        .map(|(event, data)| encode_frame(event, data))
        .collect()
}

/// The frames of a complete answer: "Hello world" in conversation `conv_id`.
pub fn hello_world_frames(conv_id: &str) -> String {
    sse_body(&[
        ("conversation_id", json!(conv_id).to_string()),
        ("sources", "[]".to_string()),
        ("delta", json!("Hello").to_string()),
        ("delta", json!(" world").to_string()),
        (
            "usage",
            json!({"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}).to_string(),
        ),
        ("done", json!({"full_text": "Hello world"}).to_string()),
    ])
}

/// An event-stream response.
pub fn sse_response(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body)
}

/// A `{"detail": ...}` error response.
pub fn error_response(status: u16, detail: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(json!({ "detail": detail }))
}

/// Mount a refresh endpoint answering with `token` after `delay`.
pub async fn mount_refresh(server: &MockServer, token: &str, delay: Duration, expected: u64) {
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access": token }))
                .set_delay(delay),
        )
        .expect(expected)
        .mount(server)
        .await;
}

pub fn source(id: &str) -> Source {
    Source {
        document_id: id.to_string(),
        filename: format!("{}.pdf", id),
        chunk_index: 2,
        content: "relevant chunk".to_string(),
        score: 0.87,
    }
}

pub fn page(items: Value) -> Value {
    json!({ "items": items, "page": 1, "page_size": 20, "has_more": false })
}

/// Poll `condition` for up to two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Serve one streaming response that sends `frames` and then never ends.
///
/// Returns the server root URL and the serving task.
pub async fn stalled_stream(frames: String) -> Result<(String, JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        if read_request(&mut socket).await.is_err() {
            return;
        }

        let head = "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n";
        let chunk = format!("{:x}\r\n{}\r\n", frames.len(), frames);
        if socket.write_all(head.as_bytes()).await.is_err()
            || socket.write_all(chunk.as_bytes()).await.is_err()
            || socket.flush().await.is_err()
        {
            return;
        }

        // Keep the body open until the client goes away
        let mut sink = [0u8; 1024];
        while let Ok(n) = socket.read(&mut sink).await {
            if n == 0 {
                break;
            }
        }
    });

    Ok((format!("http://{}", addr), handle))
}

async fn read_request(socket: &mut TcpStream) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);

        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
        let length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buf.len() >= end + 4 + length {
            return Ok(());
        }
    }
}
