//! Round-robin session rotation with a bounded attempt counter.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info};

use super::PoolStore;
use crate::domain::Session;

/// Shared rotation state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RotationCursor {
    /// Index handed out by the next call; always `< len` for a non-empty pool.
    pub next_index: usize,
    /// Sessions handed out since the last reset.
    pub attempts_used: usize,
}

/// A session handed out for one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    /// Position of the session in the pool at the time it was handed out.
    pub index: usize,
    pub session: Session,
    /// 1-based attempt number.
    pub attempt: usize,
    pub max_retry: usize,
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum RotationError {
    #[error("no sessions available")]
    NoSessions,

    #[error("exceeded maximum retry count ({max_retry})")]
    Exhausted { max_retry: usize },
}

/// Hands out sessions in round-robin order.
///
/// The cursor is shared by all concurrent requests so load spreads across the
/// whole pool; the attempt counter bounds how many sessions one request may
/// burn through before giving up.
#[derive(Debug)]
pub struct SessionRotator {
    store: Arc<PoolStore>,
    cursor: Mutex<RotationCursor>,
}

impl SessionRotator {
    pub fn new(store: Arc<PoolStore>) -> Self {
        Self {
            store,
            cursor: Mutex::new(RotationCursor::default()),
        }
    }

    pub const fn store(&self) -> &Arc<PoolStore> {
        &self.store
    }

    /// Current cursor state.
    pub fn cursor(&self) -> RotationCursor {
        *self.cursor.lock()
    }

    /// Return the current index and advance, without attempt accounting.
    pub fn peek_next(&self) -> Result<usize, RotationError> {
        let len = self.store.session_count();
        if len == 0 {
            return Err(RotationError::NoSessions);
        }
        let mut cursor = self.cursor.lock();
        let index = cursor.next_index % len;
        cursor.next_index = (index + 1) % len;
        Ok(index)
    }

    /// Hand out the next session for the current request.
    ///
    /// Fails without moving the cursor once the attempt budget is spent.
    pub fn next_with_retry(&self) -> Result<Lease, RotationError> {
        // Copy out of the store before taking our own lock.
        let (sessions, max_retry) = self.store.rotation_view();
        if sessions.is_empty() {
            return Err(RotationError::NoSessions);
        }

        let (index, attempt, wrapped) = {
            let mut cursor = self.cursor.lock();
            if cursor.attempts_used >= max_retry {
                return Err(RotationError::Exhausted { max_retry });
            }
            let index = cursor.next_index % sessions.len();
            cursor.next_index = (index + 1) % sessions.len();
            cursor.attempts_used += 1;
            (index, cursor.attempts_used, cursor.next_index == 0)
        };

        if wrapped {
            info!("Completed one full rotation of all sessions, starting again from the beginning");
        }

        Ok(Lease {
            index,
            session: sessions[index].clone(),
            attempt,
            max_retry,
        })
    }

    /// Zero the attempt counter.
    pub fn reset_attempts(&self) {
        self.cursor.lock().attempts_used = 0;
    }

    /// Rewind the cursor to the first session and zero the counter.
    pub fn reset(&self) {
        *self.cursor.lock() = RotationCursor::default();
        debug!("Rotation cursor reset");
    }
}
