//! Hot reload of the session definitions file.
//!
//! A filesystem watcher on the file and its parent directory forwards
//! relevant events as signals. [`debounce`] collapses bursts of signals into
//! one call, and [`PoolReloader`] swaps the new sessions into the store.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use convoy_core::{Session, SessionRotator};
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::{ConfigError, read_definitions};

/// Quiet period after the last change before reloading.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// Pending signals beyond the first are redundant; a small buffer suffices.
const SIGNAL_BUFFER: usize = 16;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("File watcher error: {0}")]
    Notify(#[from] notify::Error),

    #[error("Path has no parent directory or file name: {}", .0.display())]
    InvalidPath(PathBuf),
}

/// Re-reads the definitions file into the pool.
#[derive(Debug, Clone)]
pub struct PoolReloader {
    path: PathBuf,
    rotator: Arc<SessionRotator>,
}

impl PoolReloader {
    pub fn new(path: impl Into<PathBuf>, rotator: Arc<SessionRotator>) -> Self {
        Self {
            path: path.into(),
            rotator,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Swap in the sessions from disk and rewind the rotator.
    ///
    /// Settings are left untouched. On error the current pool stays in
    /// place. Returns the new session count.
    pub fn reload(&self) -> Result<usize, ConfigError> {
        info!(path = %self.path.display(), "Reloading session keys from definitions file");

        let sessions = match read_definitions(&self.path) {
            Ok(sessions) => sessions,
            Err(err) => {
                error!(error = %err, "Failed to reload session keys; keeping previous pool");
                return Err(err);
            }
        };

        let masked: Vec<String> = sessions.iter().map(Session::masked_credential).collect();
        let store = self.rotator.store();
        let previous = store.replace_sessions(sessions);
        self.rotator.reset();
        let count = store.session_count();

        info!(
            count,
            previous,
            max_retry = store.max_retry(),
            "Successfully reloaded session keys"
        );
        for (i, session) in masked.iter().enumerate() {
            info!(index = i + 1, session = %session, "Session");
        }
        Ok(count)
    }
}

/// Call `on_fire` once per burst of signals.
///
/// Every signal moves the deadline to `now + window`; `on_fire` runs when
/// the deadline passes with no further signal. Each call is awaited before
/// the next signal is read, so calls never overlap; signals arriving in the
/// meantime stay buffered and start a fresh window. Returns when `cancel`
/// fires or every sender is dropped.
pub async fn debounce<F, Fut>(
    mut signals: mpsc::Receiver<()>,
    window: Duration,
    cancel: CancellationToken,
    mut on_fire: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut deadline: Option<Instant> = None;

    loop {
        let timer = sleep_until(deadline.unwrap_or_else(Instant::now));
        tokio::select! {
            () = cancel.cancelled() => break,
            signal = signals.recv() => match signal {
                Some(()) => deadline = Some(Instant::now() + window),
                None => break,
            },
            () = timer, if deadline.is_some() => {
                deadline = None;
                on_fire().await;
            }
        }
    }
    debug!("Debounce loop stopped");
}

/// Whether `event` is a content change to the file called `file_name`.
fn is_relevant(event: &Event, file_name: &OsStr) -> bool {
    let kind_matches = matches!(
        event.kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Name(_) | ModifyKind::Any)
    );
    kind_matches
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(file_name))
}

/// Owns a running watcher and its debounce task.
#[derive(Debug)]
pub struct WatcherHandle {
    _watcher: RecommendedWatcher,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    /// Stop watching and wait for the debounce task to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(err) = self.task.await {
            error!(error = %err, "Watcher task failed");
        }
    }
}

/// Watch the reloader's file and reload after each debounced burst.
///
/// The parent directory is watched as well so atomic rename-into-place
/// writes are seen. Must be called inside a tokio runtime.
pub fn watch_definitions(
    reloader: PoolReloader,
    window: Duration,
    cancel: CancellationToken,
) -> Result<WatcherHandle, WatchError> {
    let path = reloader.path().to_path_buf();
    let (Some(parent), Some(file_name)) = (path.parent(), path.file_name()) else {
        return Err(WatchError::InvalidPath(path));
    };
    let file_name = file_name.to_os_string();

    let (tx, rx) = mpsc::channel::<()>(SIGNAL_BUFFER);
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) if is_relevant(&event, &file_name) => {
            debug!(kind = ?event.kind, "Definitions file changed");
            // A full buffer already holds a pending signal.
            let _ = tx.try_send(());
        }
        Ok(_) => {}
        Err(err) => error!(error = %err, "File watcher error"),
    })?;

    watcher.watch(&path, RecursiveMode::NonRecursive)?;
    watcher.watch(parent, RecursiveMode::NonRecursive)?;
    info!(path = %path.display(), "File watcher set up for session definitions");

    let task = tokio::spawn(debounce(rx, window, cancel.clone(), move || {
        let reloader = reloader.clone();
        async move {
            // File reads block; errors are logged by the reloader.
            if let Err(err) = tokio::task::spawn_blocking(move || reloader.reload()).await {
                error!(error = %err, "Reload task failed");
            }
        }
    }));

    Ok(WatcherHandle {
        _watcher: watcher,
        cancel,
        task,
    })
}
