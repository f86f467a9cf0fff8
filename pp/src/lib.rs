//! Prompt Provider - logical prompt keys resolved against a remote prompt service
//!
//! Applications ask for prompts by logical key. The provider maps each key to
//! a remote name and version/label, fetches it from a Langfuse-compatible
//! prompt service, and falls back to locally configured defaults when the
//! service is unavailable or does not have the prompt.
//!
//! # Modules
//!
//! - [`registry`] - Layered configuration merge and the resolved lookup table
//! - [`remote`] - Remote client: transport, retry/backoff, Langfuse API
//! - [`service`] - Resolution with fallback, batch fetch, prompt management
//! - [`domain`] - Prompt content, identity and result types
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod log_events;
pub mod registry;
pub mod remote;
pub mod service;

// Re-export commonly used types
pub use config::{Config, RemoteConfig, ResilienceConfig};
pub use domain::{ChatMessage, PromptContent, PromptIdentity, PromptKind, PromptResult, PromptSource};
pub use error::PromptError;
pub use registry::{PromptEntryConfig, PromptFragment, ResolvedPromptConfiguration, ResolvedRegistry, SourceKind, merge};
pub use remote::{LangfuseClient, PromptBackend, PromptTransport, RetryPolicy};
pub use service::{CreateOptions, PromptService, resolve_identity};
