//! Pool store with atomic replace-on-reload.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use super::{Pool, max_retry_for};
use crate::domain::Session;
use crate::settings::Settings;

/// Owner of the current [`Pool`].
///
/// Readers take the shared lock for a snapshot copy and release it
/// immediately; reload is the only writer besides identity write-back.
#[derive(Debug)]
pub struct PoolStore {
    inner: RwLock<Pool>,
}

impl PoolStore {
    pub fn new(pool: Pool) -> Self {
        Self {
            inner: RwLock::new(pool),
        }
    }

    /// Copy of the whole pool.
    pub fn snapshot(&self) -> Pool {
        self.inner.read().clone()
    }

    /// Sessions and attempt budget, copied out under one read lock.
    pub fn rotation_view(&self) -> (Arc<Vec<Session>>, usize) {
        let guard = self.inner.read();
        (Arc::clone(&guard.sessions), guard.max_retry)
    }

    pub fn settings(&self) -> Settings {
        self.inner.read().settings.clone()
    }

    pub fn session_count(&self) -> usize {
        self.inner.read().sessions.len()
    }

    pub fn max_retry(&self) -> usize {
        self.inner.read().max_retry
    }

    /// Swap the whole pool.
    pub fn replace(&self, pool: Pool) {
        *self.inner.write() = pool;
    }

    /// Swap the session list, keeping settings. Returns the previous count.
    ///
    /// The attempt budget is recomputed so it always matches the list.
    pub fn replace_sessions(&self, sessions: Vec<Session>) -> usize {
        let next = Pool::new(sessions, Settings::default());
        let mut guard = self.inner.write();
        let previous = guard.sessions.len();
        guard.max_retry = max_retry_for(next.sessions.len());
        guard.sessions = next.sessions;
        previous
    }

    /// Cache a resolved identity on every session with `credential`.
    ///
    /// Returns false when the credential is not in the pool (for example a
    /// mirror-route session, or a pool reloaded mid-request).
    pub fn set_identity(&self, credential: &str, identity: &str) -> bool {
        let mut guard = self.inner.write();
        if !guard.sessions.iter().any(|s| s.credential == credential) {
            return false;
        }
        for session in Arc::make_mut(&mut guard.sessions) {
            if session.credential == credential {
                session.identity = Some(identity.to_string());
            }
        }
        drop(guard);
        info!(
            session = %crate::domain::mask_credential(credential),
            identity = %identity,
            "Cached session identity"
        );
        true
    }
}
