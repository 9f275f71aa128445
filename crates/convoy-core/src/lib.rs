//! Session pool orchestration for an OpenAI-compatible chat proxy.
//!
//! This crate is pure domain plus ports: the pool store, the round-robin
//! rotator, the failover orchestrator and the cleanup worker pool. Transport
//! to the upstream service is reached only through [`ports::UpstreamConnector`].
#![deny(unused_crate_dependencies)]

pub mod domain;
pub mod pool;
pub mod ports;
pub mod prompt;
pub mod services;
pub mod settings;

pub use domain::{
    Attachment, ChatMessage, ContentPart, ImageUrl, MessageContent, OFFLOADED_PROMPT_PLACEHOLDER,
    PreparedPrompt, RequestContext, Session, SessionParseError, mask_credential,
    parse_session_list,
};
pub use pool::{
    Lease, Pool, PoolStore, RotationCursor, RotationError, SessionRotator, SessionSource,
    max_retry_for,
};
pub use ports::{Reply, ReplyStream, UpstreamClient, UpstreamConnector, UpstreamError};
pub use prompt::{PromptOptions, prepare_prompt};
pub use services::{
    AttemptError, ChatError, ChatOrchestrator, CleanupConfig, CleanupJob, CleanupOutcome,
    CleanupPolicy, CleanupPool, Completion, run_cleanup,
};
pub use settings::{
    DEFAULT_ADDRESS, DEFAULT_MAX_INLINE_CONTEXT, DEFAULT_MIRROR_PREFIX, DEFAULT_MODEL,
    MAX_RETRY_CAP, MODEL_CATALOG, Settings, SettingsError, validate_settings,
};
