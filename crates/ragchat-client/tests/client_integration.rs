//! Resource client integration tests against a mock server.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Result;
use ragchat_client::client::HttpRefresher;
use ragchat_client::{
    CollectingHandler, Error, PageQuery, QueryRequest, RegisterRequest, StreamEvent,
    TokenRefresher, UploadFile,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{
    client_for, client_with_hook, error_response, hello_world_frames, mount_refresh, page,
    sse_response,
};

fn conversation(id: &str) -> serde_json::Value {
    json!({
        "id": id,
        "title": "Contract questions",
        "created_at": "2025-01-01T10:00:00",
        "updated_at": "2025-01-01T10:05:00"
    })
}

#[tokio::test]
async fn test_login_stores_token_for_later_requests() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_json(json!({"email": "a@example.com", "password": "hunter22"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "access-1"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "u1", "email": "a@example.com", "username": "alice"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), None)?;
    client.auth().login("a@example.com", "hunter22").await?;
    assert_eq!(client.tokens().get_token().as_deref(), Some("access-1"));

    let me = client.auth().me().await?;
    assert_eq!(me.username, "alice");

    Ok(())
}

#[tokio::test]
async fn test_register_is_public() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/register"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "u2", "email": "b@example.com", "username": "bob"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), Some("ignored"))?;
    let user = client
        .auth()
        .register(RegisterRequest {
            email: "b@example.com".to_string(),
            username: "bob".to_string(),
            password: "longpassword".to_string(),
        })
        .await?;
    assert_eq!(user.id, "u2");

    let requests = server.received_requests().await.unwrap_or_default();
    assert!(requests[0].headers.get("authorization").is_none());

    Ok(())
}

#[tokio::test]
async fn test_logout_clears_token_even_on_failure() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/logout"))
        .respond_with(error_response(500, "Redis unavailable"))
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), Some("access-1"))?;
    let result = client.auth().logout().await;

    assert!(result.is_err());
    assert!(!client.tokens().has_token());

    Ok(())
}

#[tokio::test]
async fn test_concurrent_401s_share_one_refresh() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/conversations/"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(json!([conversation("c1")]))))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/documents/"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(json!([]))))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(error_response(401, "Token expired"))
        .mount(&server)
        .await;
    mount_refresh(&server, "fresh", Duration::from_millis(200), 1).await;

    let client = client_for(&server.uri(), Some("stale"))?;
    let conversations = client.conversations();
    let documents = client.documents();
    let (a, b) = tokio::join!(
        conversations.list(PageQuery::default()),
        documents.list(PageQuery::default()),
    );

    assert_eq!(a?.items.len(), 1);
    assert!(b?.items.is_empty());
    assert_eq!(client.tokens().get_token().as_deref(), Some("fresh"));

    Ok(())
}

#[tokio::test]
async fn test_retry_rejected_fires_failure_hook() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .respond_with(error_response(401, "Not authenticated"))
        .expect(2)
        .mount(&server)
        .await;
    mount_refresh(&server, "fresh", Duration::ZERO, 1).await;

    let (client, fired) = client_with_hook(&server.uri(), "stale")?;
    let err = client.auth().me().await.unwrap_err();

    assert_eq!(err.status(), Some(401));
    assert!(err.is_auth_error());
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(!client.tokens().has_token());

    Ok(())
}

#[tokio::test]
async fn test_failed_refresh_returns_auth_failed() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .respond_with(error_response(401, "Not authenticated"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(error_response(401, "Invalid or expired refresh token"))
        .expect(1)
        .mount(&server)
        .await;

    let (client, fired) = client_with_hook(&server.uri(), "stale")?;
    let err = client.auth().me().await.unwrap_err();

    assert!(matches!(err, Error::AuthFailed));
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    Ok(())
}

#[tokio::test]
async fn test_empty_refresh_response_is_auth_failure() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let base = url::Url::parse(&server.uri())?;
    let refresher = HttpRefresher::new(reqwest::Client::new(), &base, Duration::from_secs(5))?;
    let err = refresher.refresh_access_token().await.unwrap_err();

    assert!(matches!(err, Error::AuthFailed));

    Ok(())
}

#[tokio::test]
async fn test_error_detail_is_surfaced() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/conversations/missing"))
        .respond_with(error_response(404, "Conversation not found"))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/conversations/c1"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "detail": [
                {"loc": ["body", "title"], "msg": "String should have at least 1 character"},
                {"loc": ["body"], "msg": "Field required"}
            ]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), Some("t"))?;

    let err = client.conversations().get("missing").await.unwrap_err();
    assert!(err.is_not_found());
    match err {
        Error::Api { detail, .. } => assert_eq!(detail, "Conversation not found"),
        other => panic!("unexpected error: {other:?}"),
    }

    let err = client.conversations().rename("c1", "").await.unwrap_err();
    assert_eq!(err.status(), Some(422));
    assert_eq!(
        err.to_string(),
        "API error (422): String should have at least 1 character; Field required"
    );

    Ok(())
}

#[tokio::test]
async fn test_no_content_resolves_without_body() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/conversations/c1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), Some("t"))?;
    client.conversations().delete("c1").await?;

    Ok(())
}

#[tokio::test]
async fn test_list_sends_pagination() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/conversations/"))
        .and(query_param("page", "2"))
        .and(query_param("page_size", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [conversation("c6")], "page": 2, "page_size": 5, "has_more": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), Some("t"))?;
    let listing = client
        .conversations()
        .list(PageQuery {
            page: 2,
            page_size: 5,
        })
        .await?;

    assert!(listing.has_more);
    assert_eq!(listing.items[0].id, "c6");

    Ok(())
}

#[tokio::test]
async fn test_conversation_detail_hydrates_messages() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/conversations/c1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "c1",
            "title": "Contract questions",
            "created_at": "2025-01-01T10:00:00",
            "updated_at": "2025-01-01T10:05:00",
            "messages": [
                {"id": "m1", "role": "user", "content": "When does it renew?",
                 "sources": null, "prompt_tokens": null, "completion_tokens": null,
                 "created_at": "2025-01-01T10:00:00"},
                {"id": "m2", "role": "assistant", "content": "Every January.",
                 "sources": [{"document_id": "d1", "filename": "contract.pdf",
                              "chunk_index": 3, "content": "renews annually", "score": 0.91}],
                 "prompt_tokens": 120, "completion_tokens": 8,
                 "created_at": "2025-01-01T10:00:02"}
            ]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), Some("t"))?;
    let detail = client.conversations().get("c1").await?;
    let messages = detail.chat_messages();

    assert_eq!(messages.len(), 2);
    assert!(messages[0].is_user());
    assert_eq!(messages[1].sources.as_ref().map(Vec::len), Some(1));
    assert_eq!(messages[1].usage.map(|u| u.total_tokens), Some(128));

    Ok(())
}

#[tokio::test]
async fn test_upload_uses_multipart_content_type() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/documents/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": "d1", "filename": "notes.txt", "file_type": "txt",
            "file_size": 11, "chunk_count": 1
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), Some("t"))?;
    let uploaded = client
        .documents()
        .upload(&[UploadFile::new("notes.txt", b"hello world".to_vec()).with_mime_type("text/plain")])
        .await?;
    assert_eq!(uploaded[0].chunk_count, 1);

    let requests = server.received_requests().await.unwrap_or_default();
    let content_type = requests[0]
        .headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(
        content_type.starts_with("multipart/form-data; boundary="),
        "unexpected content type: {content_type}"
    );

    Ok(())
}

#[tokio::test]
async fn test_upload_requires_files() -> Result<()> {
    let client = client_for("http://127.0.0.1:9", Some("t"))?;
    let err = client.documents().upload(&[]).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    Ok(())
}

#[tokio::test]
async fn test_health_is_served_under_api() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "healthy", "database": "ok", "redis": "ok"
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), None)?;
    let health = client.health().check().await?;

    assert!(health.is_healthy());
    assert!(client.health().is_healthy().await);

    Ok(())
}

#[tokio::test]
async fn test_health_reports_unhealthy_body() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "status": "unhealthy", "database": "ok", "redis": "error: connection refused"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), None)?;
    let health = client.health().check().await?;

    assert!(!health.is_healthy());
    assert_eq!(health.database.as_deref(), Some("ok"));
    assert!(!client.health().is_healthy().await);

    Ok(())
}

#[tokio::test]
async fn test_chat_query_collects_events() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat/query"))
        .respond_with(sse_response(hello_world_frames("conv-1")))
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), Some("t"))?;
    let collected = client.chat().ask(&QueryRequest::new("q")).await?;

    assert!(collected.errors.is_empty());
    assert_eq!(collected.done_calls, 1);
    assert_eq!(collected.text(), "Hello world");
    assert_eq!(
        collected.events.first(),
        Some(&StreamEvent::ConversationId("conv-1".to_string()))
    );
    assert!(matches!(collected.events.last(), Some(StreamEvent::Done(_))));

    Ok(())
}

#[tokio::test]
async fn test_chat_query_rejects_invalid_request_locally() -> Result<()> {
    let client = client_for("http://127.0.0.1:9", Some("t"))?;
    let mut handler = CollectingHandler::new();
    client
        .chat()
        .query(
            &QueryRequest::new("q").with_top_k(50),
            &mut handler,
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(handler.errors.len(), 1);
    assert!(handler.errors[0].0.contains("top_k"));
    assert_eq!(handler.done_calls, 1);

    Ok(())
}

#[tokio::test]
async fn test_malformed_payload_does_not_end_stream() -> Result<()> {
    let server = MockServer::start().await;
    let body = "event: sources\ndata: not json\n\nevent: delta\ndata: \"still here\"\n\nevent: done\ndata: {}\n\n";
    Mock::given(method("POST"))
        .and(path("/api/chat/query"))
        .respond_with(sse_response(body.to_string()))
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), Some("t"))?;
    let mut handler = CollectingHandler::new();
    client
        .chat()
        .query(&QueryRequest::new("q"), &mut handler, &CancellationToken::new())
        .await;

    assert_eq!(handler.errors.len(), 1);
    assert_eq!(handler.errors[0].1, None);
    assert_eq!(handler.text(), "still here");
    assert_eq!(handler.done_calls, 1);

    Ok(())
}
