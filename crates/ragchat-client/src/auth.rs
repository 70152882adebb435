//! Access token storage and single-flight refresh.
//!
//! The access token lives only in memory. The refresh credential is an
//! HttpOnly cookie held by the HTTP client's cookie jar, so refreshing is an
//! opaque operation behind [`TokenRefresher`].
//!
//! Any number of requests may observe a 401 at the same moment. They all
//! call [`TokenStore::refresh`], and all of them await one shared refresh
//! operation instead of each rotating the cookie.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};

use crate::error::Result;

/// Performs the actual refresh exchange.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Obtain a new access token.
    async fn refresh_access_token(&self) -> Result<String>;
}

/// Called when the session can no longer be authenticated.
pub type AuthFailureHook = Arc<dyn Fn() + Send + Sync>;

type PendingRefresh = Shared<BoxFuture<'static, Option<String>>>;

/// Shared holder of the current access token.
///
/// Cheap to clone; clones share the token and the in-flight refresh.
#[derive(Clone)]
pub struct TokenStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    token: RwLock<Option<String>>,
    in_flight: Mutex<Option<PendingRefresh>>,
    refresher: Arc<dyn TokenRefresher>,
    on_auth_failure: RwLock<Option<AuthFailureHook>>,
}

impl TokenStore {
    /// Create an empty store backed by the given refresher.
    pub fn new(refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                token: RwLock::new(None),
                in_flight: Mutex::new(None),
                refresher,
                on_auth_failure: RwLock::new(None),
            }),
        }
    }

    /// Set the hook fired when a refresh fails or a refreshed token is rejected.
    pub fn with_auth_failure_hook(self, hook: AuthFailureHook) -> Self {
        self.set_auth_failure_hook(Some(hook));
        self
    }

    /// Replace the auth failure hook.
    pub fn set_auth_failure_hook(&self, hook: Option<AuthFailureHook>) {
        *self.inner.on_auth_failure.write() = hook;
    }

    /// Current access token, if logged in.
    pub fn get_token(&self) -> Option<String> {
        self.inner.token.read().clone()
    }

    /// Replace the access token (`None` logs out locally).
    pub fn set_token(&self, token: Option<String>) {
        *self.inner.token.write() = token;
    }

    /// Whether an access token is held.
    pub fn has_token(&self) -> bool {
        self.inner.token.read().is_some()
    }

    /// Whether a refresh is currently outstanding.
    pub fn is_refreshing(&self) -> bool {
        self.inner.in_flight.lock().is_some()
    }

    /// Refresh the access token, joining an outstanding refresh if there is one.
    ///
    /// Returns the new token, or `None` if the refresh failed. On failure the
    /// token is cleared and the auth failure hook fires once for the whole
    /// group of waiters.
    pub async fn refresh(&self) -> Option<String> {
        let pending = {
            let mut in_flight = self.inner.in_flight.lock();
            match in_flight.as_ref() {
                Some(pending) => {
                    tracing::debug!("Joining in-flight token refresh");
                    pending.clone()
                }
                None => {
                    let pending = Self::start_refresh(self.inner.clone());
                    *in_flight = Some(pending.clone());
                    pending
                }
            }
        };
        pending.await
    }

    /// Signal that the server rejected a freshly refreshed token.
    pub(crate) fn reject(&self) {
        tracing::warn!("Refreshed access token was rejected");
        self.inner.fail();
    }

    fn start_refresh(inner: Arc<StoreInner>) -> PendingRefresh {
        async move {
            tracing::debug!("Refreshing access token");
            let outcome = inner.refresher.refresh_access_token().await;
            // Clear the marker before publishing so a later 401 starts afresh
            *inner.in_flight.lock() = None;
            match outcome {
                Ok(token) => {
                    tracing::info!("Access token refreshed");
                    *inner.token.write() = Some(token.clone());
                    Some(token)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Token refresh failed");
                    inner.fail();
                    None
                }
            }
        }
        .boxed()
        .shared()
    }
}

impl StoreInner {
    fn fail(&self) {
        *self.token.write() = None;
        let hook = self.on_auth_failure.read().clone();
        if let Some(hook) = hook {
            hook();
        }
    }
}

impl fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenStore")
            .field("has_token", &self.has_token())
            .field("refreshing", &self.is_refreshing())
            .finish()
    }
}
