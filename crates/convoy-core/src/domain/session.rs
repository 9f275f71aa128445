//! Session domain type.
//!
//! A session is one upstream credential plus the account identity the
//! upstream service associates with it. The identity is optional because it
//! is resolved lazily on first use and cached back into the pool.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of leading/trailing characters kept when masking a credential.
const MASK_KEEP: usize = 10;

/// One upstream credential with its (possibly unresolved) identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque upstream credential.
    pub credential: String,
    /// Upstream account identity, resolved lazily.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
}

/// Errors produced while parsing session credentials.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionParseError {
    /// No `Authorization` header, or a bearer with nothing after it.
    #[error("missing authorization header")]
    MissingAuthorization,

    /// The credential part of `credential[:identity]` was empty.
    #[error("empty session credential")]
    EmptyCredential,
}

impl Session {
    /// Create a session with no identity resolved yet.
    pub fn new(credential: impl Into<String>) -> Self {
        Self {
            credential: credential.into(),
            identity: None,
        }
    }

    /// Create a session whose identity is already known.
    ///
    /// An empty identity is treated as unresolved.
    pub fn with_identity(credential: impl Into<String>, identity: impl Into<String>) -> Self {
        let identity = identity.into();
        Self {
            credential: credential.into(),
            identity: (!identity.is_empty()).then_some(identity),
        }
    }

    /// Parse `credential` or `credential:identity`.
    ///
    /// Segments after a second `:` are ignored.
    pub fn parse(raw: &str) -> Result<Self, SessionParseError> {
        let raw = raw.trim();
        let mut parts = raw.split(':');
        let credential = parts.next().unwrap_or_default().trim();
        if credential.is_empty() {
            return Err(SessionParseError::EmptyCredential);
        }
        match parts.next() {
            Some(identity) => Ok(Self::with_identity(credential, identity.trim())),
            None => Ok(Self::new(credential)),
        }
    }

    /// Parse the session carried in a mirror-route `Authorization` header.
    ///
    /// Accepts `Bearer credential` and `Bearer credential:identity`.
    pub fn from_authorization(header: Option<&str>) -> Result<Self, SessionParseError> {
        let value = header.unwrap_or_default().trim_start();
        let value = value.strip_prefix("Bearer ").unwrap_or(value).trim();
        if value.is_empty() {
            return Err(SessionParseError::MissingAuthorization);
        }
        Self::parse(value)
    }

    /// Whether the identity has been resolved.
    pub const fn has_identity(&self) -> bool {
        self.identity.is_some()
    }

    /// Credential safe for logs: `first10***last10` for long credentials.
    pub fn masked_credential(&self) -> String {
        mask_credential(&self.credential)
    }
}

/// Mask a credential for logging.
pub fn mask_credential(credential: &str) -> String {
    let chars: Vec<char> = credential.chars().collect();
    if chars.len() <= MASK_KEEP * 2 {
        return credential.to_string();
    }
    let head: String = chars[..MASK_KEEP].iter().collect();
    let tail: String = chars[chars.len() - MASK_KEEP..].iter().collect();
    format!("{head}***{tail}")
}

/// Parse a comma-separated list of `credential[:identity]` entries.
///
/// Empty segments are skipped.
pub fn parse_session_list(value: &str) -> Vec<Session> {
    value
        .split(',')
        .filter_map(|pair| Session::parse(pair).ok())
        .collect()
}
