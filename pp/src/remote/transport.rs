//! HTTP transport seam
//!
//! The retry loop talks to a [`PromptTransport`], which issues exactly one
//! request per call and reports the status and raw body. [`ReqwestTransport`]
//! is the production implementation; tests script their own.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::{Credentials, RemoteConfig};
use crate::error::PromptError;

/// HTTP method used by the prompt API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
            Self::Patch => write!(f, "PATCH"),
        }
    }
}

/// One request, independent of the HTTP library
///
/// Path segments are kept unencoded; the transport percent-encodes each one,
/// so prompt names containing `/` stay a single segment.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRequest {
    pub method: Method,
    pub segments: Vec<String>,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl RemoteRequest {
    fn new(method: Method, segments: &[&str]) -> Self {
        Self {
            method,
            segments: segments.iter().map(|s| s.to_string()).collect(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(segments: &[&str]) -> Self {
        Self::new(Method::Get, segments)
    }

    pub fn post(segments: &[&str], body: serde_json::Value) -> Self {
        Self {
            body: Some(body),
            ..Self::new(Method::Post, segments)
        }
    }

    pub fn patch(segments: &[&str], body: serde_json::Value) -> Self {
        Self {
            body: Some(body),
            ..Self::new(Method::Patch, segments)
        }
    }

    pub fn with_query(mut self, name: &str, value: impl ToString) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    /// Unencoded path, for logs and test matching
    pub fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }

    /// Value of the first query parameter called `name`
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }
}

/// Status and raw body of one response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteResponse {
    pub status: u16,
    pub body: String,
}

impl RemoteResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, PromptError> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Turn a non-success response into an error, truncating long bodies
    pub fn into_error(self) -> PromptError {
        const MAX_MESSAGE_CHARS: usize = 500;
        let message = if self.body.chars().count() > MAX_MESSAGE_CHARS {
            let truncated: String = self.body.chars().take(MAX_MESSAGE_CHARS).collect();
            format!("{}...", truncated)
        } else {
            self.body
        };
        PromptError::Http {
            status: self.status,
            message,
        }
    }
}

/// Issues a single request; retries are the caller's concern
#[async_trait]
pub trait PromptTransport: Send + Sync {
    async fn execute(&self, request: &RemoteRequest) -> Result<RemoteResponse, PromptError>;
}

/// reqwest-backed transport with Basic auth
///
/// The inner `Client` owns the connection pool and is shared by all calls.
pub struct ReqwestTransport {
    http: Client,
    base_url: Url,
    credentials: Credentials,
}

impl ReqwestTransport {
    /// Build the transport from remote settings
    pub fn from_config(config: &RemoteConfig) -> Result<Self, PromptError> {
        debug!("ReqwestTransport::from_config: called");
        let base_url = config
            .resolved_base_url()
            .ok_or_else(|| PromptError::NotConfigured("base-url is not set".to_string()))?;
        let credentials = config
            .credentials()
            .ok_or_else(|| PromptError::NotConfigured("public/secret keys are not set".to_string()))?;
        let base_url = Url::parse(&base_url)
            .map_err(|e| PromptError::InvalidArgument(format!("invalid base-url '{}': {}", base_url, e)))?;

        let mut builder = Client::builder().user_agent(concat!("prompt-provider/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = config.timeout() {
            debug!(?timeout, "ReqwestTransport::from_config: request timeout set");
            builder = builder.timeout(timeout);
        }
        // Only bounds idle pooled connections; in-flight requests are capped by the batch semaphore
        if let Some(max) = config.max_connections {
            debug!(max, "ReqwestTransport::from_config: idle pool per host capped");
            builder = builder.pool_max_idle_per_host(max);
        }
        let http = builder.build()?;

        Ok(Self {
            http,
            base_url,
            credentials,
        })
    }

    fn url_for(&self, request: &RemoteRequest) -> Result<Url, PromptError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| PromptError::InvalidArgument(format!("base-url '{}' cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(&request.segments);
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }
        Ok(url)
    }
}

#[async_trait]
impl PromptTransport for ReqwestTransport {
    async fn execute(&self, request: &RemoteRequest) -> Result<RemoteResponse, PromptError> {
        let url = self.url_for(request)?;
        debug!(method = %request.method, %url, "ReqwestTransport::execute: called");

        let builder = match request.method {
            Method::Get => self.http.get(url),
            Method::Post => self.http.post(url),
            Method::Patch => self.http.patch(url),
        };
        let mut builder = builder.basic_auth(&self.credentials.public_key, Some(&self.credentials.secret_key));
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(status, body_len = body.len(), "ReqwestTransport::execute: response");

        Ok(RemoteResponse { status, body })
    }
}
