//! Prompt kind and provenance

use serde::{Deserialize, Serialize};

/// Shape of a prompt's content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PromptKind {
    #[default]
    Text,
    Chat,
    Unknown,
}

impl PromptKind {
    /// Parse the remote service's `type` discriminator (case-insensitive)
    ///
    /// Anything other than "text" or "chat" maps to `Unknown` rather than failing.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::to_ascii_lowercase).as_deref() {
            Some("text") => Self::Text,
            Some("chat") => Self::Chat,
            _ => Self::Unknown,
        }
    }

    /// Wire value sent in create requests
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Chat => "chat",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for PromptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a returned prompt came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptSource {
    /// Fetched from the remote prompt service
    Remote,
    /// Local default from configuration
    Local,
}

impl std::fmt::Display for PromptSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Remote => write!(f, "remote"),
            Self::Local => write!(f, "local"),
        }
    }
}
