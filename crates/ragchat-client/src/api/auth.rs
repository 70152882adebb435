//! Auth API.
//!
//! Login stores the access token in the client's [`TokenStore`]; the server
//! sets the refresh cookie on the same HTTP client, so later refreshes need
//! no credentials from the caller.
//!
//! [`TokenStore`]: crate::auth::TokenStore

use crate::client::{RagClient, RequestOptions};
use crate::error::{Error, Result};
use crate::types::{LoginRequest, LogoutResponse, RegisterRequest, TokenResponse, User};

/// Auth API client.
pub struct AuthApi {
    client: RagClient,
}

impl AuthApi {
    pub(crate) fn new(client: RagClient) -> Self {
        Self { client }
    }

    /// Create an account.
    pub async fn register(&self, request: RegisterRequest) -> Result<User> {
        self.client
            .post("auth/register", &request, RequestOptions::public())
            .await
    }

    /// Log in and hold the returned access token.
    pub async fn login(&self, email: impl Into<String>, password: impl Into<String>) -> Result<()> {
        let request = LoginRequest {
            email: email.into(),
            password: password.into(),
        };
        let response: TokenResponse = self
            .client
            .post("auth/login", &request, RequestOptions::public())
            .await?;
        self.client.tokens().set_token(Some(response.access));
        tracing::info!(email = %request.email, "Logged in");
        Ok(())
    }

    /// Rotate the refresh cookie and obtain a new access token.
    ///
    /// Joins any refresh already in flight.
    pub async fn refresh(&self) -> Result<String> {
        self.client.tokens().refresh().await.ok_or(Error::AuthFailed)
    }

    /// Invalidate both tokens on the server and drop the local token.
    ///
    /// The local token is cleared even when the server call fails.
    pub async fn logout(&self) -> Result<LogoutResponse> {
        let result = self
            .client
            .post_empty::<LogoutResponse>("auth/logout", RequestOptions::default())
            .await;
        self.client.tokens().set_token(None);
        match &result {
            Ok(_) => tracing::info!("Logged out"),
            Err(e) => tracing::warn!(error = %e, "Server logout failed; local token cleared"),
        }
        result
    }

    /// The logged-in account.
    pub async fn me(&self) -> Result<User> {
        self.client.get("auth/me").await
    }
}
