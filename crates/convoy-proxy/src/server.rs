//! Axum HTTP server for the OpenAI-compatible surface.
//!
//! [`create_router`] wires the pooled routes, the mirror routes under the
//! configured prefix and the API-key guard. [`serve`] runs the router on a
//! pre-bound listener until cancelled.

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bytes::Bytes;
use convoy_core::{ChatError, ChatOrchestrator, PromptOptions, prepare_prompt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::auth::{RouteMode, require_api_key};
use crate::error::HttpError;
use crate::models::{ChatCompletionRequest, ModelsResponse};
use crate::stream::reply_response;

/// Shared application state for the HTTP handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    orchestrator: ChatOrchestrator,
}

impl AppState {
    pub const fn new(orchestrator: ChatOrchestrator) -> Self {
        Self { orchestrator }
    }

    pub const fn orchestrator(&self) -> &ChatOrchestrator {
        &self.orchestrator
    }
}

/// Build the full router.
///
/// The API key and mirror prefix are read once here; reloads only replace
/// the session list.
pub fn create_router(state: AppState) -> Router {
    let settings = state.orchestrator.store().settings();

    let mut pooled = chat_routes();
    if let Some(key) = settings.effective_api_key() {
        let expected: Arc<str> = Arc::from(key);
        let auth_layer = middleware::from_fn(move |req: Request, next: Next| {
            let expected = Arc::clone(&expected);
            async move { require_api_key(expected, req, next).await }
        });
        pooled = pooled.route_layer(auth_layer);
    }

    let mut app = Router::new()
        .route("/health", get(health_check))
        .merge(pooled);

    if let Some(prefix) = settings.normalized_mirror_prefix() {
        debug!(prefix = %prefix, "Mounting mirror routes");
        app = app.nest(&prefix, chat_routes().layer(Extension(RouteMode::Mirror)));
    }

    app.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn chat_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/models", get(list_models))
        .route("/v1/chat/completions", post(chat_completions))
}

/// Run the server with a pre-bound listener until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    let app = create_router(state);

    info!("Proxy listening on {addr}");
    info!("Configure clients to use: http://{addr}/v1");

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;

    info!("Proxy server shut down");
    Ok(())
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok"
    }))
}

async fn list_models() -> impl IntoResponse {
    debug!("GET /v1/models");
    Json(ModelsResponse::catalog())
}

/// Handle chat completions from the pool or, on mirror routes, with the
/// caller's own session.
async fn chat_completions(
    State(state): State<AppState>,
    mode: Option<Extension<RouteMode>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mode = mode.map_or(RouteMode::Pooled, |Extension(mode)| mode);
    let settings = state.orchestrator.store().settings();

    if mode == RouteMode::Mirror && !settings.mirror_enabled {
        warn!("Mirror request rejected: mirror API disabled");
        return HttpError::from(ChatError::MirrorDisabled).into_response();
    }

    let request: ChatCompletionRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            error!("Failed to parse request: {e}");
            return HttpError::BadRequest(format!("Invalid request: {e}")).into_response();
        }
    };
    if request.messages.is_empty() {
        return HttpError::BadRequest("Invalid request: messages must not be empty".to_string())
            .into_response();
    }

    let model = request.model_or_default().to_string();
    let streaming = request.stream;
    let prepared = prepare_prompt(&request.messages, PromptOptions::from(&settings));

    info!(
        model = %model,
        streaming,
        mode = ?mode,
        messages = request.messages.len(),
        attachments = prepared.attachments.len(),
        "Processing chat completion request"
    );

    let result = match mode {
        RouteMode::Pooled => {
            state
                .orchestrator
                .complete(model, prepared, streaming)
                .await
        }
        RouteMode::Mirror => {
            let authorization = headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok());
            state
                .orchestrator
                .complete_mirror(authorization, model, prepared, streaming)
                .await
        }
    };

    match result {
        Ok(completion) => {
            debug!(attempts = completion.attempts, "Chat completion succeeded");
            reply_response(completion, streaming).await
        }
        Err(err) => {
            if err.is_client_visible_detail() {
                warn!(error = %err, "Chat request rejected");
            } else {
                error!(error = %err, "Chat request failed");
            }
            HttpError::from(err).into_response()
        }
    }
}
