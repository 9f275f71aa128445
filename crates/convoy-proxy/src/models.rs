//! OpenAI API data models for request/response handling.
//!
//! Inbound message types live in `convoy-core`; this module handles the
//! API layer shapes around them.

use std::time::{SystemTime, UNIX_EPOCH};

use convoy_core::{ChatMessage, DEFAULT_MODEL, MODEL_CATALOG};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Owner reported for every catalog entry.
const MODEL_OWNER: &str = "anthropic";

/// Seconds since the Unix epoch.
pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

/// Fresh `chatcmpl-` identifier.
pub fn completion_id() -> String {
    format!("chatcmpl-{}", Uuid::new_v4().simple())
}

// =============================================================================
// Chat Completion Request/Response Types
// =============================================================================

/// Request to /v1/chat/completions endpoint.
///
/// Sampling parameters are accepted and ignored; the upstream service does
/// not expose them.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    /// Model name; blank or absent selects the default model.
    #[serde(default)]
    pub model: Option<String>,

    /// Array of chat messages.
    pub messages: Vec<ChatMessage>,

    /// Whether to stream the response.
    #[serde(default)]
    pub stream: bool,
}

impl ChatCompletionRequest {
    /// Requested model, or [`DEFAULT_MODEL`] when none was given.
    pub fn model_or_default(&self) -> &str {
        self.model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_MODEL)
    }
}

/// Assistant message in a non-streaming response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub role: String,
    pub content: String,
}

/// Response from /v1/chat/completions endpoint (non-streaming).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
}

impl ChatCompletionResponse {
    /// Wrap a full reply as a single-choice completion.
    pub fn from_reply(model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: completion_id(),
            object: "chat.completion".to_string(),
            created: unix_timestamp(),
            model: model.into(),
            choices: vec![ChatChoice {
                index: 0,
                message: ResponseMessage {
                    role: "assistant".to_string(),
                    content: content.into(),
                },
                finish_reason: Some("stop".to_string()),
            }],
        }
    }
}

/// A single chat completion choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ResponseMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Streaming chunk from /v1/chat/completions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatChunkChoice>,
}

impl ChatCompletionChunk {
    fn single(
        id: &str,
        created: i64,
        model: &str,
        delta: ChatDelta,
        finish: Option<&str>,
    ) -> Self {
        Self {
            id: id.to_string(),
            object: "chat.completion.chunk".to_string(),
            created,
            model: model.to_string(),
            choices: vec![ChatChunkChoice {
                index: 0,
                delta,
                finish_reason: finish.map(str::to_string),
            }],
        }
    }

    /// Opening chunk announcing the assistant role.
    pub fn role(id: &str, created: i64, model: &str) -> Self {
        let delta = ChatDelta {
            role: Some("assistant".to_string()),
            content: Some(String::new()),
        };
        Self::single(id, created, model, delta, None)
    }

    /// Chunk carrying one text delta.
    pub fn content(id: &str, created: i64, model: &str, text: String) -> Self {
        let delta = ChatDelta {
            role: None,
            content: Some(text),
        };
        Self::single(id, created, model, delta, None)
    }

    /// Closing chunk with an empty delta.
    pub fn stop(id: &str, created: i64, model: &str) -> Self {
        Self::single(id, created, model, ChatDelta::default(), Some("stop"))
    }
}

/// A single streaming choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChunkChoice {
    pub index: u32,
    pub delta: ChatDelta,
    pub finish_reason: Option<String>,
}

/// Delta content in streaming response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

// =============================================================================
// Models Endpoint Types
// =============================================================================

/// Response from /v1/models endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub object: String,
    pub data: Vec<ModelInfo>,
}

impl ModelsResponse {
    /// The fixed model catalog.
    pub fn catalog() -> Self {
        let created = unix_timestamp();
        Self {
            object: "list".to_string(),
            data: MODEL_CATALOG
                .iter()
                .map(|id| ModelInfo {
                    id: (*id).to_string(),
                    object: "model".to_string(),
                    created,
                    owned_by: MODEL_OWNER.to_string(),
                })
                .collect(),
        }
    }
}

/// Information about a single model (OpenAI format).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
}

// =============================================================================
// Error Response Types
// =============================================================================

/// Error response matching OpenAI format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

/// Error detail within an error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    pub r#type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(message: impl Into<String>, error_type: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                message: message.into(),
                r#type: error_type.into(),
                code: None,
            },
        }
    }
}
