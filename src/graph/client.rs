//! Shared Graph client plumbing

use crate::config::Config;
use crate::error::{RequestError, Result};
use crate::retry::RequestExecutor;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Source of OAuth access tokens for Graph requests
///
/// Token acquisition (app credentials, on-behalf-of flows) lives outside this
/// crate. The fetcher and uploader ask for a token once per operation.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return a bearer token valid for the Graph endpoint
    async fn access_token(&self) -> Result<String>;
}

/// Token provider returning a fixed token
#[derive(Clone, Debug)]
pub struct StaticToken(String);

impl StaticToken {
    /// Wrap an already acquired token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// HTTP client bound to one Graph endpoint
///
/// Cheap to clone; the underlying connection pool and token provider are shared.
#[derive(Clone)]
pub struct GraphClient {
    http: reqwest::Client,
    endpoint: String,
    executor: RequestExecutor,
    tokens: Arc<dyn TokenProvider>,
}

impl GraphClient {
    /// Create a client for the configured endpoint
    pub fn new(config: &Config, tokens: Arc<dyn TokenProvider>) -> Self {
        Self::with_http_client(reqwest::Client::new(), config, tokens)
    }

    /// Create a client reusing an existing reqwest connection pool
    pub fn with_http_client(
        http: reqwest::Client,
        config: &Config,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            http,
            endpoint: config.graph.endpoint.trim_end_matches('/').to_string(),
            executor: RequestExecutor::new(&config.retry),
            tokens,
        }
    }

    /// Versioned base URL without a trailing slash
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Absolute URL for a path relative to the endpoint
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path.trim_start_matches('/'))
    }

    /// Acquire an access token from the configured provider
    pub async fn access_token(&self) -> Result<String> {
        self.tokens.access_token().await
    }

    /// Send an authenticated request through the retrying executor
    pub(crate) async fn send<F>(
        &self,
        token: &str,
        cancel: &CancellationToken,
        build: F,
    ) -> std::result::Result<reqwest::Response, RequestError>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        self.executor
            .execute(
                || build(&self.http).bearer_auth(token),
                self.executor.max_retries(),
                cancel,
            )
            .await
    }

    /// Send a request without an Authorization header
    ///
    /// Upload session URLs are pre-authenticated and reject bearer tokens.
    pub(crate) async fn send_anonymous<F>(
        &self,
        cancel: &CancellationToken,
        build: F,
    ) -> std::result::Result<reqwest::Response, RequestError>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        self.executor
            .execute(|| build(&self.http), self.executor.max_retries(), cancel)
            .await
    }
}

impl std::fmt::Debug for GraphClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphClient")
            .field("endpoint", &self.endpoint)
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}
