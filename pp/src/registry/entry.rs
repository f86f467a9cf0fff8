//! Configuration fragment shapes consumed by the merger

use serde::{Deserialize, Serialize};

use crate::domain::ChatMessage;

/// Unified prompt entry, the richest fragment shape
///
/// Used both as a map value (keyed by logical key) and as a list item, where
/// `name` (or `key` when `name` is blank) provides the logical key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptEntryConfig {
    /// Logical key used by callers (list form only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Name of the prompt in the remote service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Default label used when the caller gives neither version nor label
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Default version used when the caller gives neither version nor label
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,

    /// Local text fallback
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    /// Local chat fallback
    #[serde(rename = "chat-default", skip_serializing_if = "Option::is_none")]
    pub chat_default: Option<Vec<ChatMessage>>,
}

impl PromptEntryConfig {
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_default(mut self, text: impl Into<String>) -> Self {
        self.default = Some(text.into());
        self
    }

    pub fn with_chat_default(mut self, messages: Vec<ChatMessage>) -> Self {
        self.chat_default = Some(messages);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Legacy key mapping: remote key, label and version only
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptKeyMapping {
    pub key: Option<String>,
    pub label: Option<String>,
    pub version: Option<u32>,
}

impl From<&PromptKeyMapping> for PromptEntryConfig {
    fn from(mapping: &PromptKeyMapping) -> Self {
        Self {
            key: mapping.key.clone(),
            label: mapping.label.clone(),
            version: mapping.version,
            ..Default::default()
        }
    }
}
