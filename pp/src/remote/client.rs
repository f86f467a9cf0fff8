//! Remote prompt backend trait

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::types::{NewPrompt, PromptListItem, RemotePrompt};
use crate::domain::PromptIdentity;
use crate::error::PromptError;

/// Operations against the remote prompt service
///
/// Fetches return `Ok(None)` when the service does not know the prompt.
/// Every call honors `cancel` and returns `PromptError::Cancelled` once it fires.
#[async_trait]
pub trait PromptBackend: Send + Sync {
    /// Fetch a text prompt
    async fn fetch_prompt(
        &self,
        identity: &PromptIdentity,
        cancel: &CancellationToken,
    ) -> Result<Option<RemotePrompt>, PromptError>;

    /// Fetch a chat prompt
    async fn fetch_chat_prompt(
        &self,
        identity: &PromptIdentity,
        cancel: &CancellationToken,
    ) -> Result<Option<RemotePrompt>, PromptError>;

    /// List every prompt the service knows, across all pages
    async fn list_prompts(&self, cancel: &CancellationToken) -> Result<Vec<PromptListItem>, PromptError>;

    /// Create a new prompt version (text or chat, per `request.kind`)
    async fn create_prompt(&self, request: &NewPrompt, cancel: &CancellationToken) -> Result<RemotePrompt, PromptError>;

    /// Replace the labels of one prompt version
    async fn update_prompt_labels(
        &self,
        name: &str,
        version: u32,
        labels: &[String],
        cancel: &CancellationToken,
    ) -> Result<RemotePrompt, PromptError>;
}
