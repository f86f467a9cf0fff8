//! Domain types for prompt resolution
//!
//! Core value types shared by the registry, the remote client and the
//! resolution service: prompt content, kinds, provenance and the per-call
//! identity/result pair.

mod content;
mod kind;
mod result;

pub use content::{ChatMessage, PromptContent};
pub use kind::{PromptKind, PromptSource};
pub use result::{PromptIdentity, PromptResult};
