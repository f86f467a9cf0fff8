//! Wire types for the remote prompt API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ChatMessage, PromptContent, PromptKind, PromptResult, PromptSource};

/// A prompt version as returned by `GET /api/public/v2/prompts/{name}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePrompt {
    pub name: String,

    pub version: u32,

    pub prompt: PromptContent,

    /// "text" or "chat"; anything else decodes to `PromptKind::Unknown`
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub prompt_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_message: Option<String>,
}

impl RemotePrompt {
    /// Kind reported by the service, or inferred from the content shape when absent
    pub fn kind(&self) -> PromptKind {
        match self.prompt_type.as_deref() {
            Some(value) => PromptKind::parse(Some(value)),
            None => self.prompt.kind(),
        }
    }

    pub fn into_result(self) -> PromptResult {
        let kind = self.kind();
        PromptResult {
            prompt_key: self.name,
            content: self.prompt,
            version: Some(self.version),
            labels: self.labels.unwrap_or_default(),
            tags: self.tags.unwrap_or_default(),
            kind,
            source: PromptSource::Remote,
            config: self.config.filter(|c| !c.is_null()),
        }
    }
}

/// Summary row of `GET /api/public/v2/prompts`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptListItem {
    pub name: String,

    #[serde(default)]
    pub versions: Vec<u32>,

    #[serde(default)]
    pub labels: Vec<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_config: Option<serde_json::Value>,
}

/// One page of the prompt list
#[derive(Debug, Clone, Deserialize)]
pub struct PromptListPage {
    #[serde(default)]
    pub data: Vec<PromptListItem>,

    #[serde(default)]
    pub meta: Option<PageMeta>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub page: u32,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub total_items: u32,
    pub total_pages: u32,
}

/// Body of `POST /api/public/v2/prompts`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPrompt {
    pub name: String,

    pub prompt: PromptContent,

    #[serde(rename = "type")]
    pub kind: PromptKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_message: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

impl NewPrompt {
    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::with_content(name, PromptContent::Text(text.into()))
    }

    pub fn chat(name: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self::with_content(name, PromptContent::Chat(messages))
    }

    fn with_content(name: impl Into<String>, prompt: PromptContent) -> Self {
        let kind = prompt.kind();
        Self {
            name: name.into(),
            prompt,
            kind,
            commit_message: None,
            labels: Vec::new(),
            tags: Vec::new(),
            config: None,
        }
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_commit_message(mut self, message: impl Into<String>) -> Self {
        self.commit_message = Some(message.into());
        self
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = Some(config);
        self
    }
}

/// Body of `PATCH /api/public/v2/prompts/{name}/versions/{version}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLabelsRequest {
    pub new_labels: Vec<String>,
}
