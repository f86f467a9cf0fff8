//! Resolved prompt registry
//!
//! Read-only lookup table from logical key (case-insensitive) to the merged
//! [`ResolvedPromptConfiguration`]. Built once by [`merge`] and shared through
//! `Arc`; there are no writers after construction.

mod entry;
pub mod merge;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PromptsConfig;
use crate::domain::ChatMessage;

pub use entry::{PromptEntryConfig, PromptKeyMapping};
pub use merge::{PromptFragment, SourceKind, merge};

/// Merged configuration for one logical key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPromptConfiguration {
    /// Logical key, in the casing it was first configured with
    pub logical_key: String,

    /// Remote name; the logical key unless overridden
    pub actual_key: String,

    pub label: Option<String>,

    pub version: Option<u32>,

    pub default_content: Option<String>,

    pub chat_default_content: Option<Vec<ChatMessage>>,
}

impl ResolvedPromptConfiguration {
    /// Text fallback, if configured and not blank
    pub fn default_text(&self) -> Option<&str> {
        self.default_content.as_deref().filter(|t| !t.trim().is_empty())
    }

    /// Chat fallback, if configured and not empty
    pub fn default_chat(&self) -> Option<&[ChatMessage]> {
        self.chat_default_content.as_deref().filter(|m| !m.is_empty())
    }
}

/// Immutable map of resolved prompt configurations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedRegistry {
    prompts: BTreeMap<String, ResolvedPromptConfiguration>,
}

impl ResolvedRegistry {
    pub(crate) fn from_map(prompts: BTreeMap<String, ResolvedPromptConfiguration>) -> Self {
        Self { prompts }
    }

    /// Build the registry from the layered prompt configuration sections
    pub fn from_config(config: &PromptsConfig) -> Self {
        debug!("ResolvedRegistry::from_config: called");
        merge(config.fragments())
    }

    /// Look up a logical key, ignoring case
    pub fn try_get(&self, logical_key: &str) -> Option<&ResolvedPromptConfiguration> {
        self.prompts.get(&fold_key(logical_key))
    }

    pub fn contains(&self, logical_key: &str) -> bool {
        self.try_get(logical_key).is_some()
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    /// Iterate records ordered by folded logical key
    pub fn iter(&self) -> impl Iterator<Item = &ResolvedPromptConfiguration> {
        self.prompts.values()
    }
}

/// Case-folded form used for key comparison
pub(crate) fn fold_key(key: &str) -> String {
    key.to_lowercase()
}
