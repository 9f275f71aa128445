//! Shaping upstream replies into OpenAI responses.
//!
//! Non-streaming requests get a single `chat.completion` object. Streaming
//! requests get SSE `chat.completion.chunk` events: a role chunk, one chunk
//! per text delta, a stop chunk, then `data: [DONE]`.

use std::convert::Infallible;
use std::future;
use std::time::Duration;

use axum::Json;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use convoy_core::{Completion, Reply, ReplyStream, UpstreamError};
use futures_util::stream::{self, Stream, StreamExt, TryStreamExt};
use tracing::{error, warn};

use crate::error::{HttpError, MIRROR_FAILURE_MESSAGE};
use crate::models::{ChatCompletionChunk, ChatCompletionResponse, completion_id, unix_timestamp};

/// Terminal SSE payload.
pub const DONE_MARKER: &str = "[DONE]";

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Turn a completed orchestration into an HTTP response.
pub async fn reply_response(completion: Completion, streaming: bool) -> Response {
    let Completion { model, reply, .. } = completion;

    if streaming {
        let deltas: ReplyStream = match reply {
            Reply::Stream(deltas) => deltas,
            Reply::Complete(text) => {
                Box::pin(stream::once(future::ready(Ok::<_, UpstreamError>(text))))
            }
        };
        return Sse::new(chunk_events(model, deltas))
            .keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL).text("ping"))
            .into_response();
    }

    match collect_reply(reply).await {
        Ok(text) => Json(ChatCompletionResponse::from_reply(model, text)).into_response(),
        Err(e) => {
            error!(error = %e, "Upstream reply failed while collecting");
            HttpError::Internal(MIRROR_FAILURE_MESSAGE.to_string()).into_response()
        }
    }
}

/// Full reply text.
pub async fn collect_reply(reply: Reply) -> Result<String, UpstreamError> {
    match reply {
        Reply::Complete(text) => Ok(text),
        Reply::Stream(deltas) => deltas.try_collect().await,
    }
}

/// SSE events for a delta stream.
///
/// An upstream error ends the stream early with the usual stop chunk; the
/// caller has already received a 200 at that point.
pub fn chunk_events(
    model: String,
    deltas: ReplyStream,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    let id = completion_id();
    let created = unix_timestamp();

    let head = chunk_event(&ChatCompletionChunk::role(&id, created, &model));
    let tail = [
        chunk_event(&ChatCompletionChunk::stop(&id, created, &model)),
        Event::default().data(DONE_MARKER),
    ];

    let body = deltas
        .map(move |delta| match delta {
            Ok(text) => Some(chunk_event(&ChatCompletionChunk::content(
                &id, created, &model, text,
            ))),
            Err(e) => {
                warn!(error = %e, "Upstream stream failed, closing response");
                None
            }
        })
        .take_while(|event| future::ready(event.is_some()))
        .filter_map(future::ready);

    stream::once(future::ready(head))
        .chain(body)
        .chain(stream::iter(tail))
        .map(Ok)
}

fn chunk_event(chunk: &ChatCompletionChunk) -> Event {
    match serde_json::to_string(chunk) {
        Ok(json) => Event::default().data(json),
        Err(e) => {
            warn!("Failed to serialize chunk: {}", e);
            Event::default().comment("serialization error")
        }
    }
}
