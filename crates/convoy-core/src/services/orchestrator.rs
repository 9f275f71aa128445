//! Request orchestration: failover across pooled sessions, plus the
//! single-attempt mirror path.

use std::sync::Arc;

use futures_util::TryStreamExt;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::cleanup::{CleanupJob, CleanupPool};
use crate::domain::{PreparedPrompt, RequestContext, Session, SessionParseError};
use crate::pool::{PoolStore, RotationError, SessionRotator};
use crate::ports::{Reply, UpstreamClient, UpstreamConnector, UpstreamError};
use crate::settings::Settings;

/// A step of a single attempt that failed.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("identity lookup failed: {0}")]
    Identity(#[source] UpstreamError),

    #[error("attachment upload failed: {0}")]
    Upload(#[source] UpstreamError),

    #[error("conversation creation failed: {0}")]
    CreateConversation(#[source] UpstreamError),

    #[error("send failed: {0}")]
    SendMessage(#[source] UpstreamError),
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("no sessions available")]
    NoSessions,

    #[error("failed after {max_retry} attempts")]
    RetryExhausted { max_retry: usize },

    #[error("Mirror API is not enabled")]
    MirrorDisabled,

    #[error("invalid authorization: {0}")]
    InvalidAuthorization(#[from] SessionParseError),

    #[error(transparent)]
    Attempt(#[from] AttemptError),
}

impl ChatError {
    /// Whether the message may be shown to the caller as is.
    pub const fn is_client_visible_detail(&self) -> bool {
        matches!(self, Self::MirrorDisabled | Self::InvalidAuthorization(_))
    }
}

/// A successful reply.
#[derive(Debug)]
pub struct Completion {
    pub model: String,
    pub reply: Reply,
    /// 1-based number of the attempt that succeeded.
    pub attempts: usize,
}

/// Drives chat requests through the session pool.
#[derive(Debug, Clone)]
pub struct ChatOrchestrator {
    store: Arc<PoolStore>,
    rotator: Arc<SessionRotator>,
    connector: Arc<dyn UpstreamConnector>,
    cleanup: CleanupPool,
}

impl ChatOrchestrator {
    pub fn new(
        rotator: Arc<SessionRotator>,
        connector: Arc<dyn UpstreamConnector>,
        cleanup: CleanupPool,
    ) -> Self {
        Self {
            store: Arc::clone(rotator.store()),
            rotator,
            connector,
            cleanup,
        }
    }

    pub const fn store(&self) -> &Arc<PoolStore> {
        &self.store
    }

    pub const fn rotator(&self) -> &Arc<SessionRotator> {
        &self.rotator
    }

    /// Serve one request from the pool, moving to the next session on any
    /// failed step until the attempt budget runs out.
    pub async fn complete(
        &self,
        model: impl Into<String>,
        prepared: PreparedPrompt,
        streaming: bool,
    ) -> Result<Completion, ChatError> {
        self.rotator.reset_attempts();
        let settings = self.store.settings();
        let mut ctx = RequestContext::new(model, prepared, streaming);

        loop {
            let lease = match self.rotator.next_with_retry() {
                Ok(lease) => lease,
                Err(RotationError::NoSessions) => {
                    error!("No sessions available");
                    return Err(ChatError::NoSessions);
                }
                Err(RotationError::Exhausted { max_retry }) => {
                    error!(max_retry, "Failed to process request after multiple attempts");
                    return Err(ChatError::RetryExhausted { max_retry });
                }
            };

            debug!(
                session = %lease.session.masked_credential(),
                attempt = lease.attempt,
                max_retry = lease.max_retry,
                "Trying session"
            );

            // Each attempt sizes the prompt from scratch.
            ctx.restore_root_prompt();

            match self.attempt(&lease.session, &mut ctx, &settings, true).await {
                Ok(reply) => {
                    self.rotator.reset_attempts();
                    return Ok(Completion {
                        model: ctx.model,
                        reply,
                        attempts: lease.attempt,
                    });
                }
                Err(err) => {
                    warn!(
                        session = %lease.session.masked_credential(),
                        attempt = lease.attempt,
                        max_retry = lease.max_retry,
                        error = %err,
                        "Session {} failed, trying next session",
                        lease.session.masked_credential()
                    );
                }
            }
        }
    }

    /// Serve one request with the session carried in `authorization`.
    ///
    /// No rotation and no retry: the first failure is returned.
    pub async fn complete_mirror(
        &self,
        authorization: Option<&str>,
        model: impl Into<String>,
        prepared: PreparedPrompt,
        streaming: bool,
    ) -> Result<Completion, ChatError> {
        let settings = self.store.settings();
        if !settings.mirror_enabled {
            return Err(ChatError::MirrorDisabled);
        }

        let session = Session::from_authorization(authorization)?;
        let mut ctx = RequestContext::new(model, prepared, streaming);

        let reply = self
            .attempt(&session, &mut ctx, &settings, false)
            .await
            .map_err(|err| {
                error!(
                    session = %session.masked_credential(),
                    error = %err,
                    "Mirror request failed"
                );
                ChatError::Attempt(err)
            })?;

        Ok(Completion {
            model: ctx.model,
            reply,
            attempts: 1,
        })
    }

    async fn attempt(
        &self,
        session: &Session,
        ctx: &mut RequestContext,
        settings: &Settings,
        pooled: bool,
    ) -> Result<Reply, AttemptError> {
        let mut client = self
            .connector
            .connect(&session.credential, settings.effective_proxy());

        match &session.identity {
            Some(identity) => client.set_identity(identity),
            None => {
                let identity = client
                    .fetch_identity()
                    .await
                    .map_err(AttemptError::Identity)?;
                client.set_identity(&identity);
                if pooled {
                    self.store.set_identity(&session.credential, &identity);
                }
            }
        }

        if !ctx.attachments.is_empty() {
            client
                .upload_attachments(&ctx.attachments)
                .await
                .map_err(AttemptError::Upload)?;
        }

        if ctx.prompt_len() > settings.max_inline_context {
            client.offload_context(ctx.root_prompt());
            ctx.offload_prompt();
            info!(
                session = %session.masked_credential(),
                length = ctx.root_prompt().len(),
                threshold = settings.max_inline_context,
                "Prompt exceeds inline limit, sending as attached context"
            );
        }

        let conversation_id = client
            .create_conversation(&ctx.model)
            .await
            .map_err(AttemptError::CreateConversation)?;

        let client: Arc<dyn UpstreamClient> = Arc::from(client);
        let job = CleanupJob::new(
            Arc::clone(&client),
            conversation_id.clone(),
            session.masked_credential(),
        );

        let sent = match client
            .send_message(&conversation_id, &ctx.prompt, ctx.streaming)
            .await
        {
            Ok(Reply::Stream(stream)) if !ctx.streaming => {
                stream.try_collect::<String>().await.map(Reply::Complete)
            }
            other => other,
        };
        let reply = match sent {
            Ok(reply) => reply,
            Err(err) => {
                // The conversation exists upstream even though the send failed.
                self.cleanup.schedule(job);
                return Err(AttemptError::SendMessage(err));
            }
        };

        if !settings.auto_delete_conversations {
            return Ok(reply);
        }

        Ok(match reply {
            Reply::Complete(text) => {
                self.cleanup.schedule(job);
                Reply::Complete(text)
            }
            Reply::Stream(stream) => Reply::Stream(self.cleanup.guard_stream(stream, job)),
        })
    }
}
