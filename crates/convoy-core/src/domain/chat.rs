//! Chat request domain types.
//!
//! Inbound messages follow the OpenAI chat shape; the per-request
//! [`RequestContext`] carries the flattened prompt through every attempt.

use serde::{Deserialize, Serialize};

/// Text sent in place of the conversation when it is offloaded out-of-band.
pub const OFFLOADED_PROMPT_PLACEHOLDER: &str = "The complete conversation so far is attached as \
context.txt. Read it, then continue the conversation by replying to the last message as the \
assistant. Do not mention the attachment.";

/// A single inbound chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role: "system", "user", "assistant", or anything the client sends.
    pub role: String,
    /// Message content; `null` and absent are treated as empty.
    #[serde(default)]
    pub content: Option<MessageContent>,
}

impl ChatMessage {
    /// Convenience constructor for plain-text messages.
    pub fn text(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: Some(MessageContent::Text(content.into())),
        }
    }
}

/// Message content: a plain string or a list of typed parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// One part of a multi-part message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    ImageUrl {
        image_url: ImageUrl,
    },
    /// Any part type this service does not understand.
    #[serde(other)]
    Unsupported,
}

/// Image reference inside an `image_url` part.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Binary payload uploaded to the upstream service before sending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// MIME type, e.g. `image/png`.
    pub media_type: String,
    /// Decoded bytes.
    pub data: Vec<u8>,
}

/// Output of prompt assembly for one inbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreparedPrompt {
    /// Flattened conversation text.
    pub prompt: String,
    /// Images extracted from the messages.
    pub attachments: Vec<Attachment>,
}

/// Per-request state owned by the orchestrator for one inbound call.
///
/// `root_prompt` never changes; `prompt` may be swapped for the offload
/// placeholder during an attempt and is restored before the next one.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub model: String,
    pub prompt: String,
    root_prompt: String,
    pub attachments: Vec<Attachment>,
    pub streaming: bool,
}

impl RequestContext {
    pub fn new(model: impl Into<String>, prepared: PreparedPrompt, streaming: bool) -> Self {
        Self {
            model: model.into(),
            root_prompt: prepared.prompt.clone(),
            prompt: prepared.prompt,
            attachments: prepared.attachments,
            streaming,
        }
    }

    /// The prompt as it was before any offloading.
    pub fn root_prompt(&self) -> &str {
        &self.root_prompt
    }

    /// Length of the current prompt in bytes.
    pub fn prompt_len(&self) -> usize {
        self.prompt.len()
    }

    /// Whether the current prompt is the offload placeholder.
    pub fn is_offloaded(&self) -> bool {
        self.prompt == OFFLOADED_PROMPT_PLACEHOLDER && self.root_prompt != self.prompt
    }

    /// Replace the in-message prompt with the offload placeholder.
    pub fn offload_prompt(&mut self) {
        self.prompt = OFFLOADED_PROMPT_PLACEHOLDER.to_string();
    }

    /// Restore the original prompt.
    pub fn restore_root_prompt(&mut self) {
        self.prompt.clone_from(&self.root_prompt);
    }
}
