//! Event identifiers attached to log records as the `event` field
//!
//! Filter on these to follow a prompt through fetch, retry and fallback,
//! e.g. `RUST_LOG=info` and grep for `event="prompt.fallback"`.

/// Remote fetch of a text prompt is starting
pub const FETCH_PROMPT: &str = "prompt.fetch";

/// Remote fetch of a chat prompt is starting
pub const FETCH_CHAT_PROMPT: &str = "prompt.fetch_chat";

/// Remote fetch failed; local defaults will be consulted
pub const REMOTE_FALLBACK: &str = "prompt.fallback";

/// A locally configured default was returned
pub const LOCAL_DEFAULT_RETURNED: &str = "prompt.local_default";

/// One key of a batch fetch failed and was dropped
pub const BATCH_ITEM_FAILED: &str = "prompt.batch_item_failed";

/// A remote request is being retried
pub const RETRY_ATTEMPT: &str = "prompt.retry";
