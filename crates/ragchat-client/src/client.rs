//! Main client implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::api::{AuthApi, ChatApi, ConversationsApi, DocumentsApi, HealthApi};
use crate::auth::{AuthFailureHook, TokenRefresher, TokenStore};
use crate::error::{Error, Result, error_detail};
use crate::types::{TokenResponse, UploadFile};

/// Default timeout for requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for streaming requests.
const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_secs(300);

/// Path of the cookie-based refresh endpoint, relative to the API root.
const REFRESH_PATH: &str = "auth/refresh";

/// ragchat API client.
///
/// Provides typed access to all ragchat server endpoints. Clones share the
/// HTTP connection pool, the refresh cookie, and the [`TokenStore`].
///
/// # Example
///
/// ```no_run
/// use ragchat_client::RagClient;
///
/// # async fn example() -> ragchat_client::Result<()> {
/// let client = RagClient::builder()
///     .base_url("http://localhost:8000")
///     .build()?;
///
/// client.auth().login("me@example.com", "correct horse battery").await?;
/// let conversations = client.conversations().list(Default::default()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RagClient {
    inner: Arc<ClientInner>,
}

/// Inner client state (shared across clones).
pub(crate) struct ClientInner {
    /// HTTP client (holds the refresh cookie).
    pub(crate) http: reqwest::Client,
    /// Server root URL.
    pub(crate) base_url: Url,
    /// Request timeout.
    pub(crate) timeout: Duration,
    /// Streaming timeout.
    pub(crate) stream_timeout: Duration,
    /// Access token and single-flight refresh.
    pub(crate) tokens: TokenStore,
}

/// Whether a request carries the bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    pub authenticated: bool,
}

impl RequestOptions {
    /// Send the access token and refresh on 401.
    pub fn authenticated() -> Self {
        Self { authenticated: true }
    }

    /// No token, no refresh (login, register, health).
    pub fn public() -> Self {
        Self {
            authenticated: false,
        }
    }
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::authenticated()
    }
}

/// Request body, kept in a form that can be sent more than once.
pub(crate) enum Payload<'a> {
    Empty,
    Json(Vec<u8>),
    Multipart(&'a [UploadFile]),
}

impl Payload<'_> {
    pub(crate) fn json<B: serde::Serialize + ?Sized>(body: &B) -> Result<Self> {
        Ok(Payload::Json(serde_json::to_vec(body)?))
    }
}

/// Everything needed to (re)issue one request.
pub(crate) struct PreparedRequest<'a> {
    pub method: Method,
    pub url: Url,
    pub query: Option<Vec<(String, String)>>,
    pub payload: Payload<'a>,
    pub accept: Option<&'static str>,
    pub timeout: Duration,
}

impl RagClient {
    /// Get access to the inner client state (for API implementations).
    pub(crate) fn inner(&self) -> &ClientInner {
        &self.inner
    }

    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Create a client with default settings pointing to localhost.
    pub fn localhost() -> Result<Self> {
        Self::builder().base_url("http://127.0.0.1:8000").build()
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// The shared access token store.
    pub fn tokens(&self) -> &TokenStore {
        &self.inner.tokens
    }

    // ─────────────────────────────────────────────────────────────────────────
    // API accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Access the auth API.
    pub fn auth(&self) -> AuthApi {
        AuthApi::new(self.clone())
    }

    /// Access the streaming chat API.
    pub fn chat(&self) -> ChatApi {
        ChatApi::new(self.clone())
    }

    /// Access the conversations API.
    pub fn conversations(&self) -> ConversationsApi {
        ConversationsApi::new(self.clone())
    }

    /// Access the documents API.
    pub fn documents(&self) -> DocumentsApi {
        DocumentsApi::new(self.clone())
    }

    /// Access the health API.
    pub fn health(&self) -> HealthApi {
        HealthApi::new(self.clone())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internal HTTP methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Build a URL for an API path.
    pub(crate) fn url(&self, path: &str) -> Result<Url> {
        api_url(&self.inner.base_url, path)
    }

    /// Make a GET request.
    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let value = self
            .request(Method::GET, path, None, Payload::Empty, RequestOptions::default())
            .await?;
        expect_body(value)
    }

    /// Make a GET request with query parameters.
    pub(crate) async fn get_with_query<T, Q>(&self, path: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: serde::Serialize + ?Sized,
    {
        let pairs = query_pairs(query)?;
        let value = self
            .request(
                Method::GET,
                path,
                Some(pairs),
                Payload::Empty,
                RequestOptions::default(),
            )
            .await?;
        expect_body(value)
    }

    /// Make a POST request.
    pub(crate) async fn post<T, B>(&self, path: &str, body: &B, options: RequestOptions) -> Result<T>
    where
        T: DeserializeOwned,
        B: serde::Serialize + ?Sized,
    {
        let value = self
            .request(Method::POST, path, None, Payload::json(body)?, options)
            .await?;
        expect_body(value)
    }

    /// Make a POST request without a body.
    pub(crate) async fn post_empty<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T> {
        let value = self
            .request(Method::POST, path, None, Payload::Empty, options)
            .await?;
        expect_body(value)
    }

    /// Make a PATCH request.
    pub(crate) async fn patch<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: serde::Serialize + ?Sized,
    {
        let value = self
            .request(
                Method::PATCH,
                path,
                None,
                Payload::json(body)?,
                RequestOptions::default(),
            )
            .await?;
        expect_body(value)
    }

    /// Make a DELETE request.
    pub(crate) async fn delete(&self, path: &str) -> Result<()> {
        self.request::<serde_json::Value>(
            Method::DELETE,
            path,
            None,
            Payload::Empty,
            RequestOptions::default(),
        )
        .await?;
        Ok(())
    }

    /// Make a multipart upload request.
    pub(crate) async fn upload<T: DeserializeOwned>(
        &self,
        path: &str,
        files: &[UploadFile],
    ) -> Result<T> {
        let value = self
            .request(
                Method::POST,
                path,
                None,
                Payload::Multipart(files),
                RequestOptions::default(),
            )
            .await?;
        expect_body(value)
    }

    /// Issue a request and decode the response.
    ///
    /// Resolves to `None` for a success without content.
    pub(crate) async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: Option<Vec<(String, String)>>,
        payload: Payload<'_>,
        options: RequestOptions,
    ) -> Result<Option<T>> {
        let request = PreparedRequest {
            method,
            url: self.url(path)?,
            query,
            payload,
            accept: None,
            timeout: self.inner.timeout,
        };
        let response = self.execute(&request, options).await?;
        decode_response(response).await
    }

    /// Send a request, refreshing the token and retrying once on 401.
    pub(crate) async fn execute(
        &self,
        request: &PreparedRequest<'_>,
        options: RequestOptions,
    ) -> Result<reqwest::Response> {
        let tokens = &self.inner.tokens;
        let token = if options.authenticated {
            tokens.get_token()
        } else {
            None
        };

        let response = self.inner.send(request, token.as_deref()).await?;
        tracing::debug!(
            method = %request.method,
            url = %request.url,
            status = response.status().as_u16(),
            "Request completed"
        );

        if response.status() != StatusCode::UNAUTHORIZED || !options.authenticated {
            return Ok(response);
        }

        let Some(new_token) = tokens.refresh().await else {
            return Err(Error::AuthFailed);
        };

        let retry = self.inner.send(request, Some(&new_token)).await?;
        if retry.status() == StatusCode::UNAUTHORIZED {
            tokens.reject();
        }
        Ok(retry)
    }
}

impl ClientInner {
    /// Build one attempt of a prepared request.
    pub(crate) fn build(
        &self,
        request: &PreparedRequest<'_>,
        token: Option<&str>,
    ) -> Result<reqwest::RequestBuilder> {
        let mut builder = self
            .http
            .request(request.method.clone(), request.url.clone())
            .timeout(request.timeout);

        if let Some(query) = &request.query {
            builder = builder.query(query);
        }
        if let Some(accept) = request.accept {
            builder = builder.header(ACCEPT, accept);
        }
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| Error::Config("Invalid access token".to_string()))?;
            builder = builder.header(AUTHORIZATION, value);
        }

        builder = match &request.payload {
            Payload::Empty => builder,
            Payload::Json(bytes) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(bytes.clone()),
            // The transport writes the multipart content type with its boundary
            Payload::Multipart(files) => builder.multipart(multipart_form(files)?),
        };

        Ok(builder)
    }

    /// Send one attempt.
    pub(crate) async fn send(
        &self,
        request: &PreparedRequest<'_>,
        token: Option<&str>,
    ) -> Result<reqwest::Response> {
        Ok(self.build(request, token)?.send().await?)
    }
}

/// Build a URL under the API root.
fn api_url(base: &Url, path: &str) -> Result<Url> {
    let path = path.trim_start_matches('/');
    base.join(&format!("api/{}", path)).map_err(Error::from)
}

fn multipart_form(files: &[UploadFile]) -> Result<Form> {
    let mut form = Form::new();
    for file in files {
        let mut part = Part::bytes(file.content.clone()).file_name(file.filename.clone());
        if let Some(mime) = &file.mime_type {
            part = part
                .mime_str(mime)
                .map_err(|_| Error::Validation(format!("invalid MIME type '{}'", mime)))?;
        }
        form = form.part("files", part);
    }
    Ok(form)
}

fn query_pairs<Q: serde::Serialize + ?Sized>(query: &Q) -> Result<Vec<(String, String)>> {
    let value = serde_json::to_value(query)?;
    let serde_json::Value::Object(map) = value else {
        return Err(Error::Validation("query must be an object".to_string()));
    };
    Ok(map
        .into_iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let v = match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (k, v)
        })
        .collect())
}

/// Decode a response body, or turn a failure into [`Error::Api`].
pub(crate) async fn decode_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<Option<T>> {
    let status = response.status();
    let body = response.bytes().await?;

    if !status.is_success() {
        let detail = error_detail(status.as_u16(), &body);
        tracing::debug!(status = status.as_u16(), %detail, "Request failed");
        return Err(Error::Api {
            status: status.as_u16(),
            detail,
        });
    }

    if status == StatusCode::NO_CONTENT || body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    Ok(Some(serde_json::from_slice(&body)?))
}

/// Unwrap a body the caller requires, decoding `null` for empty responses.
fn expect_body<T: DeserializeOwned>(value: Option<T>) -> Result<T> {
    match value {
        Some(v) => Ok(v),
        None => Ok(serde_json::from_value(serde_json::Value::Null)?),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cookie-based refresh
// ─────────────────────────────────────────────────────────────────────────────

/// Refreshes through the server's refresh endpoint using the cookie jar.
pub struct HttpRefresher {
    http: reqwest::Client,
    url: Url,
    timeout: Duration,
}

impl HttpRefresher {
    pub fn new(http: reqwest::Client, base_url: &Url, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http,
            url: api_url(base_url, REFRESH_PATH)?,
            timeout,
        })
    }
}

#[async_trait]
impl TokenRefresher for HttpRefresher {
    async fn refresh_access_token(&self) -> Result<String> {
        let response = self
            .http
            .post(self.url.clone())
            .timeout(self.timeout)
            .send()
            .await?;
        let tokens: Option<TokenResponse> = decode_response(response).await?;
        tokens
            .map(|t| t.access)
            .ok_or(Error::AuthFailed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for creating a RagClient.
pub struct ClientBuilder {
    base_url: Option<String>,
    access_token: Option<String>,
    timeout: Duration,
    stream_timeout: Duration,
    user_agent: Option<String>,
    on_auth_failure: Option<AuthFailureHook>,
    refresher: Option<Arc<dyn TokenRefresher>>,
}

impl ClientBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            base_url: None,
            access_token: None,
            timeout: DEFAULT_TIMEOUT,
            stream_timeout: DEFAULT_STREAM_TIMEOUT,
            user_agent: None,
            on_auth_failure: None,
            refresher: None,
        }
    }

    /// Set the base URL for the server.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Start with an access token already held.
    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the streaming request timeout.
    pub fn stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = timeout;
        self
    }

    /// Set a custom user agent.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Hook fired when authentication is lost (the logout path).
    pub fn on_auth_failure(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_auth_failure = Some(Arc::new(hook));
        self
    }

    /// Replace the cookie-based refresher.
    pub fn refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<RagClient> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::Config("base_url is required".to_string()))?;

        // Parse and normalize base URL
        let mut base_url = Url::parse(&base_url)?;
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }

        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("ragchat-client/{}", env!("CARGO_PKG_VERSION")));

        let http = reqwest::Client::builder()
            .cookie_store(true)
            .user_agent(user_agent)
            .build()?;

        let refresher = match self.refresher {
            Some(r) => r,
            None => Arc::new(HttpRefresher::new(http.clone(), &base_url, self.timeout)?),
        };

        let tokens = TokenStore::new(refresher);
        tokens.set_auth_failure_hook(self.on_auth_failure);
        tokens.set_token(self.access_token);

        Ok(RagClient {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                timeout: self.timeout,
                stream_timeout: self.stream_timeout,
                tokens,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
