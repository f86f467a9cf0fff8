//! Prompt resolution service
//!
//! [`PromptService`] turns a logical key plus optional caller version/label
//! into a [`PromptResult`]: it computes the effective identity from the
//! registry, asks the remote backend, and falls back to configured local
//! defaults when the remote has nothing usable. Writes (create, label update)
//! go straight to the remote and never fall back.

mod batch;

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{Config, DEFAULT_MAX_CONCURRENCY};
use crate::domain::{ChatMessage, PromptContent, PromptIdentity, PromptKind, PromptResult};
use crate::error::PromptError;
use crate::log_events;
use crate::registry::{ResolvedPromptConfiguration, ResolvedRegistry};
use crate::remote::{LangfuseClient, NewPrompt, PromptBackend, PromptListItem};

/// Compute the identity sent to the remote service
///
/// Precedence, highest first:
/// 1. caller version (suppresses every label)
/// 2. non-blank caller label (suppresses the configured version)
/// 3. configured version, else configured label
///
/// Unregistered keys are fetched under their own name with the caller's
/// version/label only.
pub fn resolve_identity(
    config: Option<&ResolvedPromptConfiguration>,
    key: &str,
    version: Option<u32>,
    label: Option<&str>,
) -> PromptIdentity {
    let caller_label = non_blank(label);

    let Some(config) = config else {
        return PromptIdentity {
            actual_key: key.trim().to_string(),
            version,
            label: if version.is_some() { None } else { caller_label },
        };
    };

    let (version, label) = match (version, caller_label) {
        (Some(version), _) => (Some(version), None),
        (None, Some(label)) => (None, Some(label)),
        (None, None) => match config.version {
            Some(version) => (Some(version), None),
            None => (None, non_blank(config.label.as_deref())),
        },
    };

    PromptIdentity {
        actual_key: config.actual_key.clone(),
        version,
        label,
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Optional metadata attached to a newly created prompt version
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub labels: Vec<String>,
    pub tags: Vec<String>,
    pub commit_message: Option<String>,
    pub config: Option<serde_json::Value>,
}

/// Resolves prompts against the registry and an optional remote backend
pub struct PromptService {
    registry: Arc<ResolvedRegistry>,
    backend: Option<Arc<dyn PromptBackend>>,
    max_concurrency: usize,
}

impl PromptService {
    /// Create a service; without a backend every read is served from local defaults
    pub fn new(registry: Arc<ResolvedRegistry>, backend: Option<Arc<dyn PromptBackend>>) -> Self {
        debug!(prompts = registry.len(), has_backend = backend.is_some(), "PromptService::new: called");
        Self {
            registry,
            backend,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Build the registry and, when the remote section is complete, the Langfuse client
    pub fn from_config(config: &Config) -> Result<Self, PromptError> {
        debug!("PromptService::from_config: called");
        let registry = Arc::new(ResolvedRegistry::from_config(&config.prompts));

        let backend = if config.remote.is_configured() {
            let client: Arc<dyn PromptBackend> = Arc::new(LangfuseClient::from_config(&config.remote)?);
            Some(client)
        } else {
            info!("PromptService::from_config: remote prompt service not configured, serving local defaults only");
            None
        };

        Ok(Self::new(registry, backend).with_max_concurrency(config.remote.max_concurrency()))
    }

    /// Cap on concurrent resolutions in a batch, clamped to what a semaphore can hold
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.clamp(1, Semaphore::MAX_PERMITS);
        self
    }

    /// Validate the inputs and compute the effective identity for a key
    pub fn identity_for(
        &self,
        key: &str,
        version: Option<u32>,
        label: Option<&str>,
    ) -> Result<PromptIdentity, PromptError> {
        validate_key(key)?;
        if version == Some(0) {
            return Err(PromptError::InvalidArgument("Version must be positive".to_string()));
        }
        Ok(resolve_identity(self.registry.try_get(key.trim()), key, version, label))
    }

    /// Resolve a text prompt
    ///
    /// `Ok(None)` means neither the remote service nor the local defaults had it.
    pub async fn get_prompt(
        &self,
        key: &str,
        version: Option<u32>,
        label: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Option<PromptResult>, PromptError> {
        debug!(prompt_key = %key, ?version, ?label, "get_prompt: called");
        self.resolve(key, version, label, PromptKind::Text, cancel).await
    }

    /// Resolve a chat prompt
    pub async fn get_chat_prompt(
        &self,
        key: &str,
        version: Option<u32>,
        label: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Option<PromptResult>, PromptError> {
        debug!(prompt_key = %key, ?version, ?label, "get_chat_prompt: called");
        self.resolve(key, version, label, PromptKind::Chat, cancel).await
    }

    async fn resolve(
        &self,
        key: &str,
        version: Option<u32>,
        label: Option<&str>,
        kind: PromptKind,
        cancel: &CancellationToken,
    ) -> Result<Option<PromptResult>, PromptError> {
        let identity = self.identity_for(key, version, label)?;
        let key = key.trim();

        let Some(backend) = &self.backend else {
            debug!(prompt_key = %key, "resolve: no remote backend, checking local defaults");
            return Ok(self.local_default(key, kind));
        };

        let event = if kind == PromptKind::Chat {
            log_events::FETCH_CHAT_PROMPT
        } else {
            log_events::FETCH_PROMPT
        };
        info!(
            event,
            prompt_key = %key,
            actual_key = %identity.actual_key,
            version = ?identity.version,
            label = ?identity.label,
            "resolve: fetching remote prompt"
        );

        let fetched = if kind == PromptKind::Chat {
            backend.fetch_chat_prompt(&identity, cancel).await
        } else {
            backend.fetch_prompt(&identity, cancel).await
        };

        match fetched {
            Ok(Some(prompt)) => {
                debug!(prompt_key = %key, version = prompt.version, "resolve: remote prompt found");
                return Ok(Some(prompt.into_result()));
            }
            Ok(None) => {
                info!(
                    event = log_events::REMOTE_FALLBACK,
                    prompt_key = %key,
                    actual_key = %identity.actual_key,
                    "resolve: remote prompt not found, falling back to local default"
                );
            }
            Err(e) if !e.is_remote_failure() => {
                debug!(prompt_key = %key, error = %e, "resolve: not falling back");
                return Err(e);
            }
            Err(e) => {
                warn!(
                    event = log_events::REMOTE_FALLBACK,
                    prompt_key = %key,
                    actual_key = %identity.actual_key,
                    error = %e,
                    "resolve: remote fetch failed, falling back to local default"
                );
            }
        }

        Ok(self.local_default(key, kind))
    }

    fn local_default(&self, key: &str, kind: PromptKind) -> Option<PromptResult> {
        let Some(config) = self.registry.try_get(key) else {
            info!(prompt_key = %key, "local_default: no prompt configured for key");
            return None;
        };

        let content = if kind == PromptKind::Chat {
            config.default_chat().map(|messages| PromptContent::Chat(messages.to_vec()))
        } else {
            config.default_text().map(|text| PromptContent::Text(text.to_string()))
        };

        match content {
            Some(content) => {
                info!(
                    event = log_events::LOCAL_DEFAULT_RETURNED,
                    prompt_key = %key,
                    %kind,
                    "local_default: returning local default"
                );
                Some(PromptResult::local(key, content))
            }
            None => {
                info!(prompt_key = %key, %kind, "local_default: no local default configured");
                None
            }
        }
    }

    /// Create a new text prompt version under the key's remote name
    pub async fn create_prompt(
        &self,
        key: &str,
        text: &str,
        options: CreateOptions,
        cancel: &CancellationToken,
    ) -> Result<PromptResult, PromptError> {
        debug!(prompt_key = %key, "create_prompt: called");
        validate_key(key)?;
        if text.trim().is_empty() {
            return Err(PromptError::InvalidArgument("Prompt content must not be blank".to_string()));
        }
        let request = options.apply(NewPrompt::text(self.actual_key(key), text));
        self.create(key, request, cancel).await
    }

    /// Create a new chat prompt version under the key's remote name
    pub async fn create_chat_prompt(
        &self,
        key: &str,
        messages: Vec<ChatMessage>,
        options: CreateOptions,
        cancel: &CancellationToken,
    ) -> Result<PromptResult, PromptError> {
        debug!(prompt_key = %key, messages = messages.len(), "create_chat_prompt: called");
        validate_key(key)?;
        if messages.is_empty() {
            return Err(PromptError::InvalidArgument(
                "Chat prompt needs at least one message".to_string(),
            ));
        }
        if messages.iter().any(|m| m.role.trim().is_empty()) {
            return Err(PromptError::InvalidArgument("Chat message role must not be blank".to_string()));
        }
        let request = options.apply(NewPrompt::chat(self.actual_key(key), messages));
        self.create(key, request, cancel).await
    }

    async fn create(&self, key: &str, request: NewPrompt, cancel: &CancellationToken) -> Result<PromptResult, PromptError> {
        let backend = self.require_backend("create prompt", key)?;
        info!(prompt_key = %key, actual_key = %request.name, kind = %request.kind, "create: creating prompt");

        match backend.create_prompt(&request, cancel).await {
            Ok(created) => Ok(created.into_result()),
            Err(e) => {
                if !e.is_cancelled() {
                    warn!(prompt_key = %key, error = %e, "create: failed to create prompt");
                }
                Err(e)
            }
        }
    }

    /// Replace the labels of one version of the key's remote prompt
    pub async fn update_prompt_labels(
        &self,
        key: &str,
        version: u32,
        labels: &[String],
        cancel: &CancellationToken,
    ) -> Result<PromptResult, PromptError> {
        debug!(prompt_key = %key, version, ?labels, "update_prompt_labels: called");
        validate_key(key)?;
        if version == 0 {
            return Err(PromptError::InvalidArgument("Version must be positive".to_string()));
        }
        let labels: Vec<String> = labels
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        if labels.is_empty() {
            return Err(PromptError::InvalidArgument("At least one label is required".to_string()));
        }

        let backend = self.require_backend("update prompt labels", key)?;
        let actual_key = self.actual_key(key);
        info!(prompt_key = %key, %actual_key, version, ?labels, "update_prompt_labels: updating labels");

        let updated = backend.update_prompt_labels(&actual_key, version, &labels, cancel).await?;
        Ok(updated.into_result())
    }

    /// List prompts known to the remote service
    pub async fn list_prompts(&self, cancel: &CancellationToken) -> Result<Vec<PromptListItem>, PromptError> {
        debug!("list_prompts: called");
        let backend = self.require_backend("list prompts", "*")?;
        backend.list_prompts(cancel).await
    }

    fn actual_key(&self, key: &str) -> String {
        let key = key.trim();
        self.registry
            .try_get(key)
            .map(|c| c.actual_key.clone())
            .unwrap_or_else(|| key.to_string())
    }

    fn require_backend(&self, operation: &str, key: &str) -> Result<&Arc<dyn PromptBackend>, PromptError> {
        self.backend.as_ref().ok_or_else(|| {
            warn!(%operation, prompt_key = %key, "require_backend: remote prompt service not configured");
            PromptError::NotConfigured(format!("cannot {} for '{}'", operation, key))
        })
    }
}

impl CreateOptions {
    fn apply(self, request: NewPrompt) -> NewPrompt {
        let mut request = request.with_labels(self.labels).with_tags(self.tags);
        if let Some(message) = self.commit_message.filter(|m| !m.trim().is_empty()) {
            request = request.with_commit_message(message);
        }
        if let Some(config) = self.config {
            request = request.with_config(config);
        }
        request
    }
}

fn validate_key(key: &str) -> Result<(), PromptError> {
    if key.trim().is_empty() {
        return Err(PromptError::InvalidArgument("Prompt key must not be blank".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{PromptEntryConfig, PromptFragment, merge};
    use crate::remote::client::mock::{MockBackend, MockReply, chat_prompt, text_prompt};
    use proptest::prelude::*;
    use std::time::Duration;

    fn registry() -> Arc<ResolvedRegistry> {
        Arc::new(merge(vec![
            PromptFragment::text_default("greeting", "Hello from config"),
            PromptFragment::chat_default("triage", vec![ChatMessage::system("Local triage")]),
            PromptFragment::entry(
                "summarize",
                PromptEntryConfig::default()
                    .with_key("team/summarize")
                    .with_version(4)
                    .with_label("staging"),
            ),
            PromptFragment::entry(
                "classify",
                PromptEntryConfig::default().with_key("team/classify").with_label("beta"),
            ),
        ]))
    }

    fn service(backend: MockBackend) -> (PromptService, Arc<MockBackend>) {
        let backend = Arc::new(backend);
        let shared: Arc<dyn PromptBackend> = backend.clone();
        let service = PromptService::new(registry(), Some(shared));
        (service, backend)
    }

    fn resolved(version: Option<u32>, label: Option<&str>) -> ResolvedPromptConfiguration {
        ResolvedPromptConfiguration {
            logical_key: "key".to_string(),
            actual_key: "remote/key".to_string(),
            label: label.map(str::to_string),
            version,
            default_content: None,
            chat_default_content: None,
        }
    }

    #[test]
    fn test_identity_unregistered_key() {
        let identity = resolve_identity(None, "adhoc", None, Some("beta"));
        assert_eq!(identity.actual_key, "adhoc");
        assert_eq!(identity.label.as_deref(), Some("beta"));

        let identity = resolve_identity(None, "adhoc", Some(2), Some("beta"));
        assert_eq!(identity.version, Some(2));
        assert!(identity.label.is_none());
    }

    #[test]
    fn test_identity_blank_caller_label_uses_defaults() {
        let config = resolved(None, Some("staging"));
        let identity = resolve_identity(Some(&config), "key", None, Some("  "));
        assert_eq!(identity.actual_key, "remote/key");
        assert_eq!(identity.label.as_deref(), Some("staging"));
    }

    proptest! {
        #[test]
        fn prop_caller_version_suppresses_label(
            configured_version in proptest::option::of(1u32..50),
            configured_label in proptest::option::of("[a-z ]{0,6}"),
            caller_version in 1u32..50,
            caller_label in proptest::option::of("[a-z ]{0,6}"),
        ) {
            let config = resolved(configured_version, configured_label.as_deref());
            let identity = resolve_identity(Some(&config), "key", Some(caller_version), caller_label.as_deref());
            prop_assert_eq!(identity.version, Some(caller_version));
            prop_assert!(identity.label.is_none());
        }

        #[test]
        fn prop_caller_label_suppresses_configured_version(
            configured_version in proptest::option::of(1u32..50),
            configured_label in proptest::option::of("[a-z]{0,6}"),
            caller_label in "[a-z]{1,6}",
        ) {
            let config = resolved(configured_version, configured_label.as_deref());
            let identity = resolve_identity(Some(&config), "key", None, Some(caller_label.as_str()));
            prop_assert!(identity.version.is_none());
            prop_assert_eq!(identity.label, Some(caller_label));
        }

        #[test]
        fn prop_configured_version_suppresses_configured_label(
            configured_version in proptest::option::of(1u32..50),
            configured_label in "[a-z]{1,6}",
        ) {
            let config = resolved(configured_version, Some(configured_label.as_str()));
            let identity = resolve_identity(Some(&config), "key", None, None);
            prop_assert_eq!(identity.version, configured_version);
            if configured_version.is_some() {
                prop_assert!(identity.label.is_none());
            } else {
                prop_assert_eq!(identity.label, Some(configured_label));
            }
            prop_assert_eq!(identity.actual_key, "remote/key");
        }
    }

    #[tokio::test]
    async fn test_remote_result_wins() {
        let (service, backend) = service(
            MockBackend::new().with_reply("greeting", MockReply::Found(text_prompt("greeting", 7, "Hello from remote"))),
        );

        let result = service
            .get_prompt("greeting", None, None, &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_remote());
        assert_eq!(result.text(), Some("Hello from remote"));
        assert_eq!(result.version, Some(7));
        assert_eq!(backend.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_remote_uses_effective_identity() {
        let (service, backend) = service(MockBackend::new());
        let cancel = CancellationToken::new();

        service.get_prompt("Summarize", None, None, &cancel).await.unwrap();
        service.get_prompt("summarize", None, Some("beta"), &cancel).await.unwrap();

        let fetches = backend.fetches();
        assert_eq!(fetches[0].actual_key, "team/summarize");
        assert_eq!(fetches[0].version, Some(4));
        assert!(fetches[0].label.is_none());
        assert!(fetches[1].version.is_none());
        assert_eq!(fetches[1].label.as_deref(), Some("beta"));
    }

    #[tokio::test]
    async fn test_missing_remote_falls_back_to_local() {
        let (service, _) = service(MockBackend::new());

        let result = service
            .get_prompt("greeting", None, None, &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();
        assert!(!result.is_remote());
        assert_eq!(result.prompt_key, "greeting");
        assert_eq!(result.text(), Some("Hello from config"));
    }

    #[tokio::test]
    async fn test_remote_failure_falls_back_to_local() {
        let (service, _) = service(MockBackend::new().with_reply("greeting", MockReply::Fail(503)));

        let result = service
            .get_prompt("greeting", None, None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.and_then(|r| r.text().map(str::to_string)).as_deref(), Some("Hello from config"));
    }

    #[tokio::test]
    async fn test_no_remote_and_no_default_is_none() {
        let (service, _) = service(MockBackend::new().with_reply("team/classify", MockReply::Fail(500)));
        let cancel = CancellationToken::new();

        assert!(service.get_prompt("classify", None, None, &cancel).await.unwrap().is_none());
        assert!(service.get_prompt("unknown", None, None, &cancel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancellation_skips_fallback() {
        let (service, _) = service(MockBackend::new().with_reply("greeting", MockReply::Cancel));

        let err = service
            .get_prompt("greeting", None, None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_fetch_returns_cancelled_not_local_default() {
        let (service, backend) = service(
            MockBackend::new()
                .with_reply("greeting", MockReply::Found(text_prompt("greeting", 7, "Hello from remote")))
                .with_delay(Duration::from_secs(5)),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let outcome = service.get_prompt("greeting", None, None, &cancel).await;

        assert!(matches!(outcome, Err(PromptError::Cancelled)), "got {:?}", outcome);
        assert_eq!(backend.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let (service, backend) = service(MockBackend::new());
        let cancel = CancellationToken::new();

        assert!(matches!(
            service.get_prompt("  ", None, None, &cancel).await,
            Err(PromptError::InvalidArgument(_))
        ));
        assert!(matches!(
            service.get_chat_prompt("triage", Some(0), None, &cancel).await,
            Err(PromptError::InvalidArgument(_))
        ));
        assert_eq!(backend.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_chat_prompt_remote_and_local() {
        let (service, _) = service(MockBackend::new().with_reply(
            "remote-chat",
            MockReply::Found(chat_prompt("remote-chat", 2, vec![ChatMessage::user("hi")])),
        ));
        let cancel = CancellationToken::new();

        let remote = service
            .get_chat_prompt("remote-chat", None, None, &cancel)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(remote.kind, PromptKind::Chat);
        assert!(remote.is_remote());

        let local = service
            .get_chat_prompt("TRIAGE", None, None, &cancel)
            .await
            .unwrap()
            .unwrap();
        assert!(!local.is_remote());
        assert_eq!(local.content.as_chat().unwrap()[0].content, "Local triage");

        // Text default exists but no chat default
        assert!(service.get_chat_prompt("greeting", None, None, &cancel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_local_only_service() {
        let service = PromptService::new(registry(), None);
        let cancel = CancellationToken::new();

        let result = service.get_prompt("greeting", None, None, &cancel).await.unwrap().unwrap();
        assert!(!result.is_remote());

        assert!(matches!(
            service.create_prompt("greeting", "text", CreateOptions::default(), &cancel).await,
            Err(PromptError::NotConfigured(_))
        ));
        assert!(matches!(
            service.update_prompt_labels("greeting", 1, &["production".to_string()], &cancel).await,
            Err(PromptError::NotConfigured(_))
        ));
        assert!(matches!(service.list_prompts(&cancel).await, Err(PromptError::NotConfigured(_))));
    }

    #[tokio::test]
    async fn test_create_uses_actual_key() {
        let (service, backend) = service(MockBackend::new());
        let cancel = CancellationToken::new();
        let options = CreateOptions {
            labels: vec!["staging".to_string()],
            commit_message: Some("tighten wording".to_string()),
            ..Default::default()
        };

        let created = service
            .create_prompt("summarize", "Summarize {{text}}", options, &cancel)
            .await
            .unwrap();
        assert_eq!(created.prompt_key, "team/summarize");

        let sent = backend.created();
        assert_eq!(sent[0].name, "team/summarize");
        assert_eq!(sent[0].kind, PromptKind::Text);
        assert_eq!(sent[0].labels, vec!["staging"]);
        assert_eq!(sent[0].commit_message.as_deref(), Some("tighten wording"));
    }

    #[tokio::test]
    async fn test_create_chat_sends_config() {
        let (service, backend) = service(MockBackend::new());
        let options = CreateOptions {
            tags: vec!["support".to_string()],
            commit_message: Some("  ".to_string()),
            config: Some(serde_json::json!({"model": "small", "temperature": 0.2})),
            ..Default::default()
        };

        service
            .create_chat_prompt(
                "triage",
                vec![ChatMessage::system("Sort the ticket.")],
                options,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let sent = backend.created();
        assert_eq!(sent[0].kind, PromptKind::Chat);
        assert_eq!(sent[0].tags, vec!["support"]);
        assert!(sent[0].commit_message.is_none());
        assert_eq!(sent[0].config, Some(serde_json::json!({"model": "small", "temperature": 0.2})));
    }

    #[tokio::test]
    async fn test_create_validates_content() {
        let (service, backend) = service(MockBackend::new());
        let cancel = CancellationToken::new();

        assert!(matches!(
            service.create_prompt("greeting", " ", CreateOptions::default(), &cancel).await,
            Err(PromptError::InvalidArgument(_))
        ));
        assert!(matches!(
            service.create_chat_prompt("triage", vec![], CreateOptions::default(), &cancel).await,
            Err(PromptError::InvalidArgument(_))
        ));
        assert!(backend.created().is_empty());
    }

    #[tokio::test]
    async fn test_update_labels_not_found_and_success() {
        let (service, _) = service(
            MockBackend::new()
                .with_reply("team/classify", MockReply::Found(text_prompt("team/classify", 3, "Classify"))),
        );
        let cancel = CancellationToken::new();
        let labels = vec!["production".to_string(), " ".to_string()];

        let updated = service.update_prompt_labels("classify", 3, &labels, &cancel).await.unwrap();
        assert_eq!(updated.labels, vec!["production"]);

        assert!(matches!(
            service.update_prompt_labels("classify", 8, &labels, &cancel).await,
            Err(PromptError::NotFound(_))
        ));
        assert!(matches!(
            service.update_prompt_labels("classify", 3, &[" ".to_string()], &cancel).await,
            Err(PromptError::InvalidArgument(_))
        ));
    }
}
