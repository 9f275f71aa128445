//! Best-effort conversation cleanup on a bounded worker pool.
//!
//! Jobs are queued from request handlers and drained by a single dispatcher
//! task. A semaphore caps how many deletions run at once, and a full queue
//! drops the job with a warning instead of growing without limit.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::Stream;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, error, info, warn};

use crate::ports::{ReplyStream, UpstreamClient, UpstreamError};

/// Default queue capacity.
pub const DEFAULT_CLEANUP_QUEUE: usize = 256;

/// Default number of deletions in flight.
pub const DEFAULT_CLEANUP_WORKERS: usize = 8;

/// Retry policy for a single deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

/// Sizing for [`CleanupPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub policy: CleanupPolicy,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_CLEANUP_WORKERS,
            queue_capacity: DEFAULT_CLEANUP_QUEUE,
            policy: CleanupPolicy::default(),
        }
    }
}

/// One conversation to delete.
pub struct CleanupJob {
    client: Arc<dyn UpstreamClient>,
    conversation_id: String,
    /// Masked credential, for logs only.
    session: String,
}

impl CleanupJob {
    pub fn new(
        client: Arc<dyn UpstreamClient>,
        conversation_id: impl Into<String>,
        session: impl Into<String>,
    ) -> Self {
        Self {
            client,
            conversation_id: conversation_id.into(),
            session: session.into(),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }
}

impl fmt::Debug for CleanupJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupJob")
            .field("conversation_id", &self.conversation_id)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    Deleted { attempts: u32 },
    Failed { attempts: u32 },
}

/// Delete the job's conversation, retrying per `policy`.
pub async fn run_cleanup(job: &CleanupJob, policy: CleanupPolicy) -> CleanupOutcome {
    let attempts = policy.attempts.max(1);
    let mut last_error: Option<UpstreamError> = None;

    for attempt in 1..=attempts {
        match job.client.delete_conversation(&job.conversation_id).await {
            Ok(()) => {
                info!(
                    conversation_id = %job.conversation_id,
                    session = %job.session,
                    attempt,
                    "Successfully deleted conversation"
                );
                return CleanupOutcome::Deleted { attempts: attempt };
            }
            Err(err) => {
                error!(
                    conversation_id = %job.conversation_id,
                    session = %job.session,
                    attempt,
                    error = %err,
                    "Failed to delete conversation"
                );
                last_error = Some(err);
            }
        }
        if attempt < attempts {
            tokio::time::sleep(policy.delay).await;
        }
    }

    error!(
        conversation_id = %job.conversation_id,
        session = %job.session,
        attempts,
        last_error = ?last_error,
        "Cleanup failed after all retries"
    );
    CleanupOutcome::Failed { attempts }
}

/// Handle for queueing cleanup jobs. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CleanupPool {
    tx: mpsc::Sender<CleanupJob>,
}

impl CleanupPool {
    /// Spawn the dispatcher. Must be called inside a tokio runtime.
    ///
    /// The dispatcher exits once every handle has been dropped and the
    /// queue is drained.
    pub fn start(config: CleanupConfig) -> Self {
        let (tx, mut rx) = mpsc::channel::<CleanupJob>(config.queue_capacity.max(1));
        let permits = Arc::new(Semaphore::new(config.workers.max(1)));
        let policy = config.policy;

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                    break;
                };
                tokio::spawn(async move {
                    run_cleanup(&job, policy).await;
                    drop(permit);
                });
            }
            debug!("Cleanup dispatcher stopped");
        });

        Self { tx }
    }

    /// Queue a job. Returns false when it was dropped.
    pub fn schedule(&self, job: CleanupJob) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!(
                    conversation_id = %job.conversation_id,
                    session = %job.session,
                    "Cleanup queue full, dropping job"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                warn!(
                    conversation_id = %job.conversation_id,
                    "Cleanup pool stopped, dropping job"
                );
                false
            }
        }
    }

    /// Wrap a reply stream so cleanup runs when it ends or is dropped.
    pub fn guard_stream(&self, inner: ReplyStream, job: CleanupJob) -> ReplyStream {
        Box::pin(GuardedStream {
            inner,
            guard: CleanupGuard {
                pool: self.clone(),
                job: Some(job),
            },
        })
    }
}

/// Schedules its job exactly once, on [`fire`](Self::fire) or drop.
struct CleanupGuard {
    pool: CleanupPool,
    job: Option<CleanupJob>,
}

impl CleanupGuard {
    fn fire(&mut self) {
        if let Some(job) = self.job.take() {
            self.pool.schedule(job);
        }
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        self.fire();
    }
}

struct GuardedStream {
    inner: ReplyStream,
    guard: CleanupGuard,
}

impl Stream for GuardedStream {
    type Item = Result<String, UpstreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let polled = self.inner.as_mut().poll_next(cx);
        if let Poll::Ready(None) = polled {
            self.guard.fire();
        }
        polled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    use crate::domain::Attachment;
    use crate::ports::Reply;

    /// Fails `failures` deletions, then succeeds.
    struct FlakyDelete {
        failures: u32,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl UpstreamClient for FlakyDelete {
        async fn fetch_identity(&self) -> Result<String, UpstreamError> {
            unreachable!()
        }
        fn set_identity(&mut self, _identity: &str) {}
        async fn upload_attachments(
            &mut self,
            _attachments: &[Attachment],
        ) -> Result<(), UpstreamError> {
            unreachable!()
        }
        fn offload_context(&mut self, _context: &str) {}
        async fn create_conversation(&self, _model: &str) -> Result<String, UpstreamError> {
            unreachable!()
        }
        async fn send_message(
            &self,
            _conversation_id: &str,
            _prompt: &str,
            _streaming: bool,
        ) -> Result<Reply, UpstreamError> {
            unreachable!()
        }
        async fn delete_conversation(&self, _conversation_id: &str) -> Result<(), UpstreamError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                Err(UpstreamError::Transport("connection reset".into()))
            } else {
                Ok(())
            }
        }
    }

    fn job(failures: u32) -> (CleanupJob, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let client = FlakyDelete {
            failures,
            calls: Arc::clone(&calls),
        };
        (CleanupJob::new(Arc::new(client), "conv-1", "sk-***"), calls)
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_gives_up_after_three_attempts() {
        let (job, calls) = job(u32::MAX);
        let started = Instant::now();

        let outcome = run_cleanup(&job, CleanupPolicy::default()).await;

        assert_eq!(outcome, CleanupOutcome::Failed { attempts: 3 });
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Two gaps of 2s, none after the last attempt.
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_stops_on_first_success() {
        let (job, calls) = job(1);
        let outcome = run_cleanup(&job, CleanupPolicy::default()).await;
        assert_eq!(outcome, CleanupOutcome::Deleted { attempts: 2 });
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_runs_scheduled_job() {
        let pool = CleanupPool::start(CleanupConfig::default());
        let (job, calls) = job(0);

        assert!(pool.schedule(job));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_full_queue_drops_job() {
        // Capacity 1 and nobody drains it.
        let (tx, _rx) = mpsc::channel(1);
        let pool = CleanupPool { tx };

        assert!(pool.schedule(job(0).0));
        assert!(!pool.schedule(job(0).0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_guarded_stream_schedules_on_completion() {
        let pool = CleanupPool::start(CleanupConfig::default());
        let (job, calls) = job(0);
        let inner: ReplyStream = Box::pin(futures_util::stream::iter(vec![
            Ok("a".to_string()),
            Ok("b".to_string()),
        ]));

        let mut stream = pool.guard_stream(inner, job);
        while stream.next().await.is_some() {}
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Dropping after completion must not schedule a second time.
        drop(stream);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_guarded_stream_schedules_on_drop() {
        let pool = CleanupPool::start(CleanupConfig::default());
        let (job, calls) = job(0);
        let inner: ReplyStream = Box::pin(futures_util::stream::pending());

        let stream = pool.guard_stream(inner, job);
        drop(stream);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
