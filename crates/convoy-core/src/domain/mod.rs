//! Core domain types.

pub mod chat;
pub mod session;

pub use chat::{
    Attachment, ChatMessage, ContentPart, ImageUrl, MessageContent, OFFLOADED_PROMPT_PLACEHOLDER,
    PreparedPrompt, RequestContext,
};
pub use session::{Session, SessionParseError, mask_credential, parse_session_list};
