//! Session pool: the shared store of sessions plus the rotation cursor.
//!
//! Two independent critical sections live here. [`PoolStore`] guards the
//! pool behind a read/write lock; [`SessionRotator`] guards the cursor behind
//! its own mutex. The rotator copies what it needs out of the store before
//! taking its own lock, so the two are never held together.

pub mod rotator;
pub mod store;

use std::path::PathBuf;
use std::sync::Arc;

use crate::domain::Session;
use crate::settings::{MAX_RETRY_CAP, Settings};

pub use rotator::{Lease, RotationCursor, RotationError, SessionRotator};
pub use store::PoolStore;

/// Attempt budget for a pool of `session_count` sessions.
pub fn max_retry_for(session_count: usize) -> usize {
    session_count.min(MAX_RETRY_CAP)
}

/// The full set of sessions plus service settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool {
    sessions: Arc<Vec<Session>>,
    max_retry: usize,
    settings: Settings,
}

impl Pool {
    /// Build a pool, deriving the attempt budget from the session count.
    ///
    /// Sessions with an empty credential are dropped.
    pub fn new(sessions: Vec<Session>, settings: Settings) -> Self {
        let sessions: Vec<Session> = sessions
            .into_iter()
            .filter(|s| !s.credential.trim().is_empty())
            .collect();
        Self {
            max_retry: max_retry_for(sessions.len()),
            sessions: Arc::new(sessions),
            settings,
        }
    }

    /// A pool with no sessions; every pooled request fails fast.
    pub fn empty(settings: Settings) -> Self {
        Self::new(Vec::new(), settings)
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub const fn max_retry(&self) -> usize {
        self.max_retry
    }

    pub const fn settings(&self) -> &Settings {
        &self.settings
    }
}

/// Where the session list of a loaded pool came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSource {
    /// The structured settings file (not watched).
    SettingsFile(PathBuf),
    /// The comma-separated environment value (not watched).
    Environment,
    /// The JSON definitions file (watched for hot reload).
    DefinitionsFile(PathBuf),
    /// Nothing supplied sessions.
    None,
}

impl SessionSource {
    /// Path to watch for hot reload, if any.
    pub fn watch_path(&self) -> Option<&PathBuf> {
        match self {
            Self::DefinitionsFile(path) => Some(path),
            _ => None,
        }
    }
}
