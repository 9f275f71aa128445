//! Settings domain types and validation.
//!
//! Service-wide options that live next to the session list in the pool.
//! These are pure domain types; loading them from files or the environment
//! happens in `convoy-runtime`.

use serde::{Deserialize, Serialize};

/// Bind address used when none is configured.
pub const DEFAULT_ADDRESS: &str = "0.0.0.0:8080";

/// Prompt length (UTF-8 bytes) above which the prompt is offloaded.
pub const DEFAULT_MAX_INLINE_CONTEXT: usize = 10_000;

/// Path prefix for the mirror routes when none is configured.
pub const DEFAULT_MIRROR_PREFIX: &str = "/mirror";

/// Upper bound on attempts per inbound request.
pub const MAX_RETRY_CAP: usize = 5;

/// Model used when the request does not name one.
pub const DEFAULT_MODEL: &str = "claude-3-7-sonnet-20250219";

/// Models advertised by `/v1/models`.
pub const MODEL_CATALOG: &[&str] = &[
    "claude-3-7-sonnet-20250219",
    "claude-3-7-sonnet-20250219-think",
];

/// Service settings.
///
/// Field names on the wire keep the historical camelCase keys of the
/// settings file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Listen address (`host:port`).
    pub address: String,

    /// Inbound API key; `None` disables the check.
    #[serde(rename = "apiKey")]
    pub api_key: Option<String>,

    /// Outbound proxy used by the upstream client.
    pub proxy: Option<String>,

    /// Delete upstream conversations after a successful reply.
    #[serde(rename = "chatDelete")]
    pub auto_delete_conversations: bool,

    /// Prompt length above which the big-context mechanism is used.
    #[serde(rename = "maxChatHistoryLength")]
    pub max_inline_context: usize,

    /// Flatten messages without `Human:`/`Assistant:` prefixes.
    #[serde(rename = "noRolePrefix")]
    pub disable_role_prefix: bool,

    /// Append an instruction forbidding artifacts.
    #[serde(rename = "promptDisableArtifacts")]
    pub disable_prompt_artifacts: bool,

    /// Enable the single-attempt mirror routes.
    #[serde(rename = "enableMirrorApi")]
    pub mirror_enabled: bool,

    /// Path prefix of the mirror routes.
    #[serde(rename = "mirrorApiPrefix")]
    pub mirror_prefix: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            api_key: None,
            proxy: None,
            auto_delete_conversations: true,
            max_inline_context: DEFAULT_MAX_INLINE_CONTEXT,
            disable_role_prefix: false,
            disable_prompt_artifacts: false,
            mirror_enabled: false,
            mirror_prefix: DEFAULT_MIRROR_PREFIX.to_string(),
        }
    }
}

impl Settings {
    /// Get the effective bind address (with default fallback).
    pub fn effective_address(&self) -> &str {
        if self.address.trim().is_empty() {
            DEFAULT_ADDRESS
        } else {
            self.address.trim()
        }
    }

    /// Get the configured API key, ignoring blank values.
    pub fn effective_api_key(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }

    /// Get the configured outbound proxy, ignoring blank values.
    pub fn effective_proxy(&self) -> Option<&str> {
        self.proxy.as_deref().map(str::trim).filter(|p| !p.is_empty())
    }

    /// Mirror prefix with one leading `/` and no trailing `/`.
    ///
    /// Returns `None` when the prefix is empty or `/`.
    pub fn normalized_mirror_prefix(&self) -> Option<String> {
        let trimmed = self.mirror_prefix.trim().trim_matches('/');
        if trimmed.is_empty() {
            None
        } else {
            Some(format!("/{trimmed}"))
        }
    }
}

/// Settings validation error.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("Inline context threshold must be greater than zero")]
    ZeroInlineContext,

    #[error("Unsupported proxy URL '{0}' (expected http://, https:// or socks5://)")]
    InvalidProxy(String),
}

/// Validate settings values.
pub fn validate_settings(settings: &Settings) -> Result<(), SettingsError> {
    if settings.max_inline_context == 0 {
        return Err(SettingsError::ZeroInlineContext);
    }

    if let Some(proxy) = settings.effective_proxy() {
        let supported = ["http://", "https://", "socks5://"]
            .iter()
            .any(|scheme| proxy.starts_with(scheme));
        if !supported {
            return Err(SettingsError::InvalidProxy(proxy.to_string()));
        }
    }

    Ok(())
}
