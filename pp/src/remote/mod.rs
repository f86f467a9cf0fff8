//! Remote prompt service client
//!
//! Layers, bottom up:
//! - [`transport`]: one HTTP request per call, behind the [`PromptTransport`] trait
//! - [`retry`]: the pure retry/backoff decision
//! - [`langfuse`]: [`LangfuseClient`], which drives retries and cancellation
//!   over a transport and implements [`PromptBackend`]

pub mod client;
pub mod langfuse;
pub mod retry;
pub mod transport;
pub mod types;

pub use client::PromptBackend;
pub use langfuse::{DEFAULT_LABEL, LangfuseClient};
pub use retry::{AttemptOutcome, RetryDecision, RetryPolicy, is_retryable_status};
pub use transport::{Method, PromptTransport, RemoteRequest, RemoteResponse, ReqwestTransport};
pub use types::{NewPrompt, PageMeta, PromptListItem, PromptListPage, RemotePrompt, UpdateLabelsRequest};
