//! Per-call identity and result types

use serde::{Deserialize, Serialize};

use super::{PromptContent, PromptKind, PromptSource};

/// The exact parameters sent to the remote service for one fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptIdentity {
    /// Name the remote service stores the prompt under
    pub actual_key: String,

    /// Effective version; when set, `label` is always `None`
    pub version: Option<u32>,

    /// Effective label
    pub label: Option<String>,
}

/// A resolved prompt handed back to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptResult {
    /// Remote name for remote results, logical key for local defaults
    pub prompt_key: String,

    pub content: PromptContent,

    pub version: Option<u32>,

    #[serde(default)]
    pub labels: Vec<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    pub kind: PromptKind,

    pub source: PromptSource,

    /// Opaque model configuration attached to the remote prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

impl PromptResult {
    /// Build a result from locally configured default content
    pub fn local(prompt_key: impl Into<String>, content: PromptContent) -> Self {
        let kind = content.kind();
        Self {
            prompt_key: prompt_key.into(),
            content,
            version: None,
            labels: Vec::new(),
            tags: Vec::new(),
            kind,
            source: PromptSource::Local,
            config: None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        self.content.as_text()
    }

    pub fn is_remote(&self) -> bool {
        self.source == PromptSource::Remote
    }
}
