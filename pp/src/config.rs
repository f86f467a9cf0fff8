//! Prompt provider configuration types and loading

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::domain::ChatMessage;
use crate::registry::{PromptEntryConfig, PromptFragment, PromptKeyMapping};

/// Default batch concurrency when `max-connections` is unset
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Remote prompt service connection
    pub remote: RemoteConfig,

    /// Layered prompt configuration
    pub prompts: PromptsConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// A remote section that is only partly filled in is almost always a
    /// mistake, so it is rejected here instead of silently running local-only.
    pub fn validate(&self) -> Result<()> {
        let remote = &self.remote;
        let base_url = remote.resolved_base_url();
        let credentials = remote.credentials();

        if base_url.is_some() != credentials.is_some() {
            return Err(eyre::eyre!(
                "Remote prompt service is partially configured: base-url and both keys ({} / {}) are required",
                remote.public_key_env,
                remote.secret_key_env
            ));
        }

        if let Some(url) = base_url {
            let parsed = reqwest::Url::parse(&url).context(format!("Invalid remote base-url '{}'", url))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(eyre::eyre!("Remote base-url must be http or https, got '{}'", url));
            }
        }

        if remote.max_connections == Some(0) {
            return Err(eyre::eyre!("remote.max-connections must be greater than 0"));
        }
        if let Some(max) = remote.max_connections.filter(|m| *m > Semaphore::MAX_PERMITS) {
            return Err(eyre::eyre!(
                "remote.max-connections {} exceeds the limit of {}",
                max,
                Semaphore::MAX_PERMITS
            ));
        }

        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .prompt-provider.yml
        let local_config = PathBuf::from(".prompt-provider.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/prompt-provider/prompt-provider.yml
        if let Some(user_config) = user_config_path() {
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is initialized
    ///
    /// Errors are swallowed; the full load reports them once logging is up.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let path = match config_path {
            Some(path) => path.clone(),
            None => {
                let local = PathBuf::from(".prompt-provider.yml");
                if local.exists() {
                    local
                } else {
                    user_config_path().filter(|p| p.exists())?
                }
            }
        };

        let content = fs::read_to_string(path).ok()?;
        let config: Self = serde_yaml::from_str(&content).ok()?;
        config.log_level
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("prompt-provider").join("prompt-provider.yml"))
}

/// Remote prompt service connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Service base URL, e.g. https://cloud.langfuse.com
    #[serde(rename = "base-url", skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Public key (Basic auth user)
    #[serde(rename = "public-key", skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,

    /// Secret key (Basic auth password)
    #[serde(rename = "secret-key", skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,

    /// Environment variable read when `base-url` is unset
    #[serde(rename = "base-url-env")]
    pub base_url_env: String,

    /// Environment variable read when `public-key` is unset
    #[serde(rename = "public-key-env")]
    pub public_key_env: String,

    /// Environment variable read when `secret-key` is unset
    #[serde(rename = "secret-key-env")]
    pub secret_key_env: String,

    /// Request timeout in seconds
    #[serde(rename = "timeout-secs", skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Idle pooled connections kept per host; also caps batch concurrency
    #[serde(rename = "max-connections", skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<usize>,

    /// Retry policy for remote calls
    pub resilience: ResilienceConfig,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            public_key: None,
            secret_key: None,
            base_url_env: "LANGFUSE_BASE_URL".to_string(),
            public_key_env: "LANGFUSE_PUBLIC_KEY".to_string(),
            secret_key_env: "LANGFUSE_SECRET_KEY".to_string(),
            timeout_secs: None,
            max_connections: None,
            resilience: ResilienceConfig::default(),
        }
    }
}

/// Public/secret key pair for Basic auth
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub public_key: String,
    pub secret_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("public_key", &self.public_key)
            .field("secret_key", &"***")
            .finish()
    }
}

impl RemoteConfig {
    /// Base URL from the file, else from the environment, trimmed
    pub fn resolved_base_url(&self) -> Option<String> {
        pick(self.base_url.as_deref(), &self.base_url_env)
    }

    /// Credentials from the file, else from the environment, trimmed
    pub fn credentials(&self) -> Option<Credentials> {
        let public_key = pick(self.public_key.as_deref(), &self.public_key_env)?;
        let secret_key = pick(self.secret_key.as_deref(), &self.secret_key_env)?;
        Some(Credentials { public_key, secret_key })
    }

    /// Base URL and both keys are present
    pub fn is_configured(&self) -> bool {
        self.resolved_base_url().is_some() && self.credentials().is_some()
    }

    /// Request timeout, if a positive one is configured
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.filter(|s| *s > 0).map(Duration::from_secs)
    }

    /// Batch concurrency cap
    pub fn max_concurrency(&self) -> usize {
        self.max_connections
            .unwrap_or(DEFAULT_MAX_CONCURRENCY)
            .clamp(1, Semaphore::MAX_PERMITS)
    }
}

fn pick(value: Option<&str>, env_var: &str) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| {
            std::env::var(env_var)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        })
}

/// Retry policy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Retry transient failures at all
    pub enabled: bool,

    /// Retries after the first attempt
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff in milliseconds
    #[serde(rename = "base-delay-ms")]
    pub base_delay_ms: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_retries: 2,
            base_delay_ms: 200,
        }
    }
}

impl ResilienceConfig {
    /// Base delay, never below 1ms
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms.max(1))
    }
}

/// Layered prompt configuration sections, merged in declaration order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    /// Logical key -> text default
    pub defaults: BTreeMap<String, String>,

    /// Logical key -> chat default
    #[serde(rename = "chat-defaults")]
    pub chat_defaults: BTreeMap<String, Vec<ChatMessage>>,

    /// Legacy logical key -> remote key/label/version
    #[serde(rename = "prompt-keys")]
    pub prompt_keys: BTreeMap<String, PromptKeyMapping>,

    /// Unified entries keyed by logical key
    #[serde(rename = "prompt-entries")]
    pub prompt_entries: BTreeMap<String, PromptEntryConfig>,

    /// Unified entries in list form
    pub entries: Vec<PromptEntryConfig>,
}

impl PromptsConfig {
    /// Fragments in merge order
    pub fn fragments(&self) -> Vec<PromptFragment> {
        let text = self
            .defaults
            .iter()
            .map(|(key, text)| PromptFragment::text_default(key, text));
        let chat = self
            .chat_defaults
            .iter()
            .map(|(key, messages)| PromptFragment::chat_default(key, messages.clone()));
        let legacy = self
            .prompt_keys
            .iter()
            .map(|(key, mapping)| PromptFragment::key_mapping(key, mapping));
        let mapped = self
            .prompt_entries
            .iter()
            .map(|(key, entry)| PromptFragment::entry(key, entry.clone()));
        let listed = self.entries.iter().cloned().map(PromptFragment::listed);

        text.chain(chat).chain(legacy).chain(mapped).chain(listed).collect()
    }
}
