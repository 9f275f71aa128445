//! Upstream transport port.
//!
//! The conversational web service behind the pool is reached through these
//! traits. Implementations own the wire format: authentication, conversation
//! lifecycle, attachment upload and reply streaming. The core only decides
//! which credential to use and what to do when a step fails.

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use thiserror::Error;

use crate::domain::Attachment;

/// Stream of reply text deltas.
pub type ReplyStream = Pin<Box<dyn Stream<Item = Result<String, UpstreamError>> + Send>>;

/// Reply to a sent message.
pub enum Reply {
    /// The whole reply text, for non-streaming requests.
    Complete(String),
    /// Text deltas relayed as they arrive.
    Stream(ReplyStream),
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complete(text) => f.debug_tuple("Complete").field(&text.len()).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Errors reported by the upstream transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    /// The credential was rejected (revoked or expired session).
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The upstream answered with a non-success status.
    #[error("Rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// Network-level failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The upstream answered with something the client could not parse.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Factory for per-credential upstream clients.
pub trait UpstreamConnector: Send + Sync + fmt::Debug {
    /// Build a client authenticated with `credential`, optionally routed
    /// through an outbound proxy.
    fn connect(&self, credential: &str, proxy: Option<&str>) -> Box<dyn UpstreamClient>;
}

/// A client bound to a single upstream credential.
///
/// The mutating methods configure state used by later calls on the same
/// client (identity, uploaded files, offloaded context) the way one attempt
/// of the failover loop needs it.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Look up the account identity for this credential.
    async fn fetch_identity(&self) -> Result<String, UpstreamError>;

    /// Use `identity` for every following call.
    fn set_identity(&mut self, identity: &str);

    /// Upload binary attachments to be referenced by the next message.
    async fn upload_attachments(&mut self, attachments: &[Attachment])
    -> Result<(), UpstreamError>;

    /// Hand the full prompt to the upstream out-of-band context mechanism.
    fn offload_context(&mut self, context: &str);

    /// Create a conversation and return its identifier.
    async fn create_conversation(&self, model: &str) -> Result<String, UpstreamError>;

    /// Send `prompt` into the conversation.
    async fn send_message(
        &self,
        conversation_id: &str,
        prompt: &str,
        streaming: bool,
    ) -> Result<Reply, UpstreamError>;

    /// Delete a conversation.
    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), UpstreamError>;
}
