//! Prompt assembly: flatten chat messages into one upstream prompt.
//!
//! The upstream service takes a single text message per conversation, so
//! the whole history is rendered as role-prefixed turns. Inline images are
//! pulled out as attachments.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::warn;

use crate::domain::{Attachment, ChatMessage, ContentPart, MessageContent, PreparedPrompt};
use crate::settings::Settings;

/// Appended when artifacts are disabled.
const NO_ARTIFACTS_INSTRUCTION: &str =
    "System: Do not use artifacts in your reply. Answer with plain text and code blocks only.";

/// Options that shape the rendered prompt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PromptOptions {
    pub disable_role_prefix: bool,
    pub disable_artifacts: bool,
}

impl From<&Settings> for PromptOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            disable_role_prefix: settings.disable_role_prefix,
            disable_artifacts: settings.disable_prompt_artifacts,
        }
    }
}

/// Render `messages` into a prompt plus attachments.
pub fn prepare_prompt(messages: &[ChatMessage], options: PromptOptions) -> PreparedPrompt {
    let mut turns = Vec::with_capacity(messages.len() + 1);
    let mut attachments = Vec::new();

    for message in messages {
        let text = match &message.content {
            None => String::new(),
            Some(MessageContent::Text(text)) => text.clone(),
            Some(MessageContent::Parts(parts)) => collect_parts(parts, &mut attachments),
        };

        if options.disable_role_prefix {
            turns.push(text);
        } else {
            turns.push(format!("{}: {}", role_label(&message.role), text));
        }
    }

    if options.disable_artifacts {
        turns.push(NO_ARTIFACTS_INSTRUCTION.to_string());
    }

    PreparedPrompt {
        prompt: turns.join("\n\n"),
        attachments,
    }
}

fn role_label(role: &str) -> String {
    match role {
        "user" => "Human".to_string(),
        "assistant" => "Assistant".to_string(),
        "system" => "System".to_string(),
        other => {
            let mut chars = other.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        }
    }
}

fn collect_parts(parts: &[ContentPart], attachments: &mut Vec<Attachment>) -> String {
    let mut texts = Vec::new();
    for part in parts {
        match part {
            ContentPart::Text { text } => texts.push(text.as_str()),
            ContentPart::ImageUrl { image_url } => match decode_data_url(&image_url.url) {
                Some(attachment) => attachments.push(attachment),
                None => warn!("Skipping image that is not a base64 data URL"),
            },
            ContentPart::Unsupported => {}
        }
    }
    texts.join("\n")
}

/// Decode `data:<media>;base64,<payload>`.
fn decode_data_url(url: &str) -> Option<Attachment> {
    let rest = url.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let media_type = header.strip_suffix(";base64")?;
    let data = STANDARD.decode(payload.trim()).ok()?;
    Some(Attachment {
        media_type: if media_type.is_empty() {
            "application/octet-stream".to_string()
        } else {
            media_type.to_string()
        },
        data,
    })
}
