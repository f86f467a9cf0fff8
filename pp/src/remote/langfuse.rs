//! Langfuse prompt API client

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::PromptBackend;
use super::retry::{AttemptOutcome, RetryDecision, RetryPolicy};
use super::transport::{PromptTransport, RemoteRequest, RemoteResponse, ReqwestTransport};
use super::types::{NewPrompt, PromptListItem, PromptListPage, RemotePrompt, UpdateLabelsRequest};
use crate::config::RemoteConfig;
use crate::domain::{PromptIdentity, PromptKind};
use crate::error::PromptError;
use crate::log_events;

/// Label requested when neither a version nor a label is given
pub const DEFAULT_LABEL: &str = "production";

/// Page size used when listing prompts
const LIST_PAGE_LIMIT: u32 = 50;

const PROMPTS_PATH: [&str; 4] = ["api", "public", "v2", "prompts"];

/// Prompt API client with retry and cancellation
pub struct LangfuseClient {
    transport: Arc<dyn PromptTransport>,
    policy: RetryPolicy,
}

impl LangfuseClient {
    /// Build a client over the reqwest transport
    ///
    /// Fails with `NotConfigured` when base URL or credentials are missing.
    pub fn from_config(config: &RemoteConfig) -> Result<Self, PromptError> {
        debug!("LangfuseClient::from_config: called");
        let transport = ReqwestTransport::from_config(config)?;
        let policy = RetryPolicy::from_config(&config.resilience);
        debug!(max_retries = policy.max_retries(), "LangfuseClient::from_config: retry policy");
        Ok(Self::with_transport(Arc::new(transport), policy))
    }

    /// Build a client over any transport
    pub fn with_transport(transport: Arc<dyn PromptTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// Send a request, retrying transient failures per the policy
    ///
    /// A retryable status on the final attempt is returned as-is; callers turn
    /// it into an error. Cancellation wins over an in-flight request and over a
    /// pending backoff.
    async fn send(&self, request: &RemoteRequest, cancel: &CancellationToken) -> Result<RemoteResponse, PromptError> {
        let path = request.path();
        debug!(method = %request.method, %path, "send: called");

        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                debug!(%path, attempt, "send: cancelled before attempt");
                return Err(PromptError::Cancelled);
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(%path, attempt, "send: cancelled in flight");
                    return Err(PromptError::Cancelled);
                }
                result = self.transport.execute(request) => result,
            };

            let outcome = match &result {
                Ok(response) => AttemptOutcome::Status(response.status),
                Err(PromptError::Cancelled) => return Err(PromptError::Cancelled),
                Err(e) if e.is_retryable() => AttemptOutcome::TransportFailure,
                Err(_) => AttemptOutcome::Fatal,
            };

            match self.policy.decide(outcome, attempt) {
                RetryDecision::Return => {
                    debug!(%path, attempt, ?outcome, "send: done");
                    return result;
                }
                RetryDecision::Retry { delay } => {
                    match &result {
                        Ok(response) => warn!(
                            event = log_events::RETRY_ATTEMPT,
                            %path,
                            attempt = attempt + 1,
                            max_attempts = self.policy.max_attempts(),
                            status = response.status,
                            delay_ms = delay.as_millis() as u64,
                            "send: retrying after transient status"
                        ),
                        Err(e) => warn!(
                            event = log_events::RETRY_ATTEMPT,
                            %path,
                            attempt = attempt + 1,
                            max_attempts = self.policy.max_attempts(),
                            error = %e,
                            delay_ms = delay.as_millis() as u64,
                            "send: retrying after transport error"
                        ),
                    }

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            info!(%path, attempt, "send: cancelled during backoff");
                            return Err(PromptError::Cancelled);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Shared fetch path for text and chat prompts
    async fn fetch(
        &self,
        identity: &PromptIdentity,
        expected: PromptKind,
        cancel: &CancellationToken,
    ) -> Result<Option<RemotePrompt>, PromptError> {
        debug!(actual_key = %identity.actual_key, ?identity.version, ?identity.label, %expected, "fetch: called");
        let request = fetch_request(identity);
        let response = self.send(&request, cancel).await?;

        if response.status == 404 {
            debug!(actual_key = %identity.actual_key, "fetch: not found");
            return Ok(None);
        }
        if !response.is_success() {
            debug!(status = response.status, "fetch: API error");
            return Err(response.into_error());
        }

        let prompt: RemotePrompt = response.json()?;
        let actual = prompt.prompt.kind();
        if actual != expected {
            debug!(%actual, %expected, "fetch: content kind mismatch");
            return Err(PromptError::Protocol(format!(
                "Prompt '{}' is a {} prompt, expected {}",
                prompt.name, actual, expected
            )));
        }

        debug!(name = %prompt.name, version = prompt.version, "fetch: success");
        Ok(Some(prompt))
    }
}

/// Build the fetch request, substituting the default label when neither a
/// version nor a label is set
fn fetch_request(identity: &PromptIdentity) -> RemoteRequest {
    let mut segments = PROMPTS_PATH.to_vec();
    segments.push(identity.actual_key.as_str());
    let mut request = RemoteRequest::get(&segments);

    let label = identity.label.as_deref().map(str::trim).filter(|l| !l.is_empty());
    if let Some(version) = identity.version {
        request = request.with_query("version", version);
    }
    match label {
        Some(label) => request = request.with_query("label", label),
        None if identity.version.is_none() => request = request.with_query("label", DEFAULT_LABEL),
        None => {}
    }
    request
}

fn require_non_blank(value: &str, what: &str) -> Result<(), PromptError> {
    if value.trim().is_empty() {
        return Err(PromptError::InvalidArgument(format!("{} must not be blank", what)));
    }
    Ok(())
}

#[async_trait]
impl PromptBackend for LangfuseClient {
    async fn fetch_prompt(
        &self,
        identity: &PromptIdentity,
        cancel: &CancellationToken,
    ) -> Result<Option<RemotePrompt>, PromptError> {
        self.fetch(identity, PromptKind::Text, cancel).await
    }

    async fn fetch_chat_prompt(
        &self,
        identity: &PromptIdentity,
        cancel: &CancellationToken,
    ) -> Result<Option<RemotePrompt>, PromptError> {
        self.fetch(identity, PromptKind::Chat, cancel).await
    }

    async fn list_prompts(&self, cancel: &CancellationToken) -> Result<Vec<PromptListItem>, PromptError> {
        debug!("list_prompts: called");
        let mut items = Vec::new();
        let mut page = 1u32;

        loop {
            let request = RemoteRequest::get(&PROMPTS_PATH)
                .with_query("page", page)
                .with_query("limit", LIST_PAGE_LIMIT);
            let response = self.send(&request, cancel).await?;
            if !response.is_success() {
                debug!(status = response.status, page, "list_prompts: API error");
                return Err(response.into_error());
            }

            let body: PromptListPage = response.json()?;
            let received = body.data.len();
            items.extend(body.data);

            let total_pages = body.meta.map(|m| m.total_pages).unwrap_or(page);
            debug!(page, total_pages, received, "list_prompts: page read");
            if received == 0 || page >= total_pages {
                break;
            }
            page += 1;
        }

        debug!(count = items.len(), "list_prompts: success");
        Ok(items)
    }

    async fn create_prompt(&self, request: &NewPrompt, cancel: &CancellationToken) -> Result<RemotePrompt, PromptError> {
        debug!(name = %request.name, kind = %request.kind, "create_prompt: called");
        require_non_blank(&request.name, "Prompt name")?;
        if request.prompt.is_empty() {
            return Err(PromptError::InvalidArgument("Prompt content must not be empty".to_string()));
        }
        if request.kind == PromptKind::Unknown {
            return Err(PromptError::InvalidArgument("Prompt type is required".to_string()));
        }

        let body = serde_json::to_value(request)?;
        let response = self.send(&RemoteRequest::post(&PROMPTS_PATH, body), cancel).await?;
        if !response.is_success() {
            debug!(status = response.status, "create_prompt: API error");
            return Err(response.into_error());
        }

        let created: RemotePrompt = response.json()?;
        info!(name = %created.name, version = created.version, "create_prompt: created");
        Ok(created)
    }

    async fn update_prompt_labels(
        &self,
        name: &str,
        version: u32,
        labels: &[String],
        cancel: &CancellationToken,
    ) -> Result<RemotePrompt, PromptError> {
        debug!(%name, version, ?labels, "update_prompt_labels: called");
        require_non_blank(name, "Prompt name")?;
        if version == 0 {
            return Err(PromptError::InvalidArgument("Version must be positive".to_string()));
        }
        if labels.is_empty() {
            return Err(PromptError::InvalidArgument("At least one label is required".to_string()));
        }

        let version_segment = version.to_string();
        let mut segments = PROMPTS_PATH.to_vec();
        segments.extend([name, "versions", version_segment.as_str()]);
        let body = serde_json::to_value(UpdateLabelsRequest {
            new_labels: labels.to_vec(),
        })?;

        let response = self.send(&RemoteRequest::patch(&segments, body), cancel).await?;
        if response.status == 404 {
            debug!(%name, version, "update_prompt_labels: not found");
            return Err(PromptError::NotFound(format!("Prompt '{}' version {} not found", name, version)));
        }
        if !response.is_success() {
            debug!(status = response.status, "update_prompt_labels: API error");
            return Err(response.into_error());
        }

        let updated: RemotePrompt = response.json()?;
        info!(%name, version, "update_prompt_labels: updated");
        Ok(updated)
    }
}
