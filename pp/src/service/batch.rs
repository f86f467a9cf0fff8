//! Batch prompt fetch
//!
//! Resolves many keys at once with at most `max_concurrency` resolutions in
//! flight. A key that fails or resolves to nothing is logged and left out; the
//! batch only fails as a whole on bad input or cancellation.

use std::collections::HashSet;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::PromptService;
use crate::domain::PromptResult;
use crate::error::PromptError;
use crate::log_events;
use crate::registry::fold_key;

impl PromptService {
    /// Resolve several text prompts concurrently
    ///
    /// Blank keys are dropped and duplicates removed ignoring case. Results
    /// are not guaranteed to follow input order.
    pub async fn get_prompts<I, S>(
        &self,
        keys: I,
        label: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<PromptResult>, PromptError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let keys: Vec<String> = keys
            .into_iter()
            .map(|k| k.as_ref().trim().to_string())
            .filter(|k| !k.is_empty())
            .filter(|k| seen.insert(fold_key(k)))
            .collect();
        debug!(count = keys.len(), max_concurrency = self.max_concurrency, ?label, "get_prompts: called");

        if keys.is_empty() {
            return Err(PromptError::InvalidArgument(
                "At least one non-blank prompt key is required".to_string(),
            ));
        }

        let semaphore = Semaphore::new(self.max_concurrency);
        let tasks = keys.iter().map(|key| {
            let semaphore = &semaphore;
            async move {
                let _permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return (key, Err(PromptError::Cancelled)),
                    permit = semaphore.acquire() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return (key, Err(PromptError::Cancelled)),
                    },
                };
                debug!(prompt_key = %key, "get_prompts: permit acquired");
                (key, self.get_prompt(key, None, label, cancel).await)
            }
        });

        let outcomes = join_all(tasks).await;

        let mut results = Vec::with_capacity(outcomes.len());
        let mut cancelled = false;
        for (key, outcome) in outcomes {
            match outcome {
                Ok(Some(result)) => results.push(result),
                Ok(None) => {
                    warn!(
                        event = log_events::BATCH_ITEM_FAILED,
                        prompt_key = %key,
                        "get_prompts: no prompt found, skipping"
                    );
                }
                Err(PromptError::Cancelled) => cancelled = true,
                Err(e) => {
                    warn!(
                        event = log_events::BATCH_ITEM_FAILED,
                        prompt_key = %key,
                        error = %e,
                        "get_prompts: failed to resolve prompt, skipping"
                    );
                }
            }
        }

        if cancelled {
            info!("get_prompts: cancelled");
            return Err(PromptError::Cancelled);
        }

        debug!(requested = keys.len(), resolved = results.len(), "get_prompts: done");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChatMessage;
    use crate::registry::{PromptFragment, ResolvedRegistry, merge};
    use crate::remote::PromptBackend;
    use crate::remote::client::mock::{MockBackend, MockReply, text_prompt};
    use std::sync::Arc;
    use std::time::Duration;

    fn key(n: usize) -> String {
        format!("prompt-{n:02}")
    }

    fn backend_with(keys: impl Iterator<Item = usize>) -> MockBackend {
        keys.fold(MockBackend::new(), |backend, n| {
            let name = key(n);
            backend.with_reply(&name, MockReply::Found(text_prompt(&name, 1, "body")))
        })
    }

    fn service(backend: &Arc<MockBackend>, registry: ResolvedRegistry, cap: usize) -> PromptService {
        let shared: Arc<dyn PromptBackend> = backend.clone();
        PromptService::new(Arc::new(registry), Some(shared)).with_max_concurrency(cap)
    }

    #[tokio::test]
    async fn test_oversized_cap_is_clamped() {
        let backend = Arc::new(backend_with(1..=2));
        let service = service(&backend, ResolvedRegistry::default(), usize::MAX);

        let results = service
            .get_prompts([key(1), key(2)], None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_never_exceeds_cap() {
        let backend = Arc::new(backend_with(1..=15).with_delay(Duration::from_millis(20)));
        let service = service(&backend, ResolvedRegistry::default(), 3);
        let keys: Vec<String> = (1..=15).map(key).collect();

        let results = service.get_prompts(&keys, None, &CancellationToken::new()).await.unwrap();

        assert_eq!(results.len(), 15);
        assert_eq!(backend.fetch_count(), 15);
        assert!(backend.peak_in_flight() <= 3, "peak was {}", backend.peak_in_flight());
        assert_eq!(backend.peak_in_flight(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_failure_does_not_abort_batch() {
        let backend = backend_with((1..=15).filter(|n| *n != 7)).with_reply(&key(7), MockReply::Fail(500));
        let backend = Arc::new(backend.with_delay(Duration::from_millis(5)));
        let service = service(&backend, ResolvedRegistry::default(), 3);
        let keys: Vec<String> = (1..=15).map(key).collect();

        let results = service.get_prompts(&keys, None, &CancellationToken::new()).await.unwrap();

        assert_eq!(results.len(), 14);
        assert!(results.iter().all(|r| r.prompt_key != key(7)));
        assert_eq!(backend.fetch_count(), 15);
    }

    #[tokio::test]
    async fn test_failed_key_with_local_default_is_kept() {
        let backend = Arc::new(MockBackend::new().with_reply("greeting", MockReply::Fail(503)));
        let registry = merge(vec![PromptFragment::text_default("greeting", "Hello")]);
        let service = service(&backend, registry, 2);

        let results = service
            .get_prompts(["greeting", "missing"], None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(!results[0].is_remote());
    }

    #[tokio::test]
    async fn test_keys_deduplicated_and_blanks_dropped() {
        let backend = Arc::new(backend_with(1..=2));
        let service = service(&backend, ResolvedRegistry::default(), 10);

        let results = service
            .get_prompts(["prompt-01", "PROMPT-01", " ", "prompt-02", ""], None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(backend.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_batch_is_invalid() {
        let backend = Arc::new(MockBackend::new());
        let service = service(&backend, ResolvedRegistry::default(), 10);

        let err = service
            .get_prompts(["", "  "], None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PromptError::InvalidArgument(_)));

        let none: Vec<String> = Vec::new();
        assert!(service.get_prompts(none, None, &CancellationToken::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_label_passed_to_each_key() {
        let backend = Arc::new(MockBackend::new());
        let service = service(&backend, ResolvedRegistry::default(), 10);

        let _ = service
            .get_prompts(["a", "b"], Some("staging"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(backend.fetches().iter().all(|i| i.label.as_deref() == Some("staging")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_propagates() {
        let backend = Arc::new(backend_with(1..=6).with_delay(Duration::from_secs(10)));
        let service = service(&backend, ResolvedRegistry::default(), 2);
        let keys: Vec<String> = (1..=6).map(key).collect();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let err = service.get_prompts(&keys, None, &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        // Keys still waiting for a permit never reached the backend
        assert_eq!(backend.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_local_only_batch() {
        let registry = merge(vec![
            PromptFragment::text_default("a", "A"),
            PromptFragment::chat_default("b", vec![ChatMessage::user("B")]),
        ]);
        let service = PromptService::new(Arc::new(registry), None);

        let results = service
            .get_prompts(["a", "b"], None, &CancellationToken::new())
            .await
            .unwrap();
        // Batch resolves text prompts, so the chat-only key is skipped
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text(), Some("A"));
    }
}
