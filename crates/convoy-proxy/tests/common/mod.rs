//! Shared fixtures: an in-memory upstream and router helpers.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use convoy_core::{
    Attachment, ChatOrchestrator, CleanupConfig, CleanupPool, Pool, PoolStore, Reply,
    Session, SessionRotator, Settings, UpstreamClient, UpstreamConnector, UpstreamError,
};
use convoy_proxy::{AppState, create_router};
use http_body_util::BodyExt;
use tower::ServiceExt;

/// Upstream fake. Credentials listed in `failing` are rejected at
/// conversation creation; every other credential answers with
/// `reply from <credential>`.
#[derive(Debug, Default)]
pub struct FakeConnector {
    failing: HashSet<String>,
    connects: Arc<Mutex<Vec<String>>>,
    deleted: Arc<Mutex<Vec<String>>>,
}

impl FakeConnector {
    pub fn failing(credentials: &[&str]) -> Self {
        Self {
            failing: credentials.iter().map(|c| (*c).to_string()).collect(),
            ..Self::default()
        }
    }

    /// Credentials in connection order.
    pub fn connects(&self) -> Vec<String> {
        self.connects.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

impl UpstreamConnector for FakeConnector {
    fn connect(&self, credential: &str, _proxy: Option<&str>) -> Box<dyn UpstreamClient> {
        self.connects.lock().unwrap().push(credential.to_string());
        Box::new(FakeClient {
            credential: credential.to_string(),
            fail: self.failing.contains(credential),
            deleted: Arc::clone(&self.deleted),
        })
    }
}

struct FakeClient {
    credential: String,
    fail: bool,
    deleted: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl UpstreamClient for FakeClient {
    async fn fetch_identity(&self) -> Result<String, UpstreamError> {
        Ok(format!("org-{}", self.credential))
    }

    fn set_identity(&mut self, _identity: &str) {}

    async fn upload_attachments(
        &mut self,
        _attachments: &[Attachment],
    ) -> Result<(), UpstreamError> {
        Ok(())
    }

    fn offload_context(&mut self, _context: &str) {}

    async fn create_conversation(&self, _model: &str) -> Result<String, UpstreamError> {
        if self.fail {
            return Err(UpstreamError::Rejected {
                status: 403,
                message: "session revoked".to_string(),
            });
        }
        Ok(format!("conv-{}", self.credential))
    }

    async fn send_message(
        &self,
        _conversation_id: &str,
        _prompt: &str,
        streaming: bool,
    ) -> Result<Reply, UpstreamError> {
        if streaming {
            let deltas = vec![Ok("reply from ".to_string()), Ok(self.credential.clone())];
            Ok(Reply::Stream(Box::pin(futures_util::stream::iter(deltas))))
        } else {
            Ok(Reply::Complete(format!("reply from {}", self.credential)))
        }
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), UpstreamError> {
        self.deleted
            .lock()
            .unwrap()
            .push(conversation_id.to_string());
        Ok(())
    }
}

/// Router over a pool of `credentials` served by `connector`.
pub fn router(credentials: &[&str], settings: Settings, connector: Arc<FakeConnector>) -> Router {
    let sessions = credentials.iter().map(|c| Session::new(*c)).collect();
    let store = Arc::new(PoolStore::new(Pool::new(sessions, settings)));
    let rotator = Arc::new(SessionRotator::new(store));
    let orchestrator = ChatOrchestrator::new(
        rotator,
        connector,
        CleanupPool::start(CleanupConfig::default()),
    );
    create_router(AppState::new(orchestrator))
}

pub fn chat_request(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn chat_request_with_auth(uri: &str, body: &str, authorization: &str) -> Request<Body> {
    let mut req = chat_request(uri, body);
    req.headers_mut()
        .insert("authorization", authorization.parse().unwrap());
    req
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn send(app: Router, req: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, body)
}

pub fn json(body: &Bytes) -> serde_json::Value {
    serde_json::from_slice(body).unwrap()
}

pub const HELLO: &str = r#"{"messages":[{"role":"user","content":"hello"}]}"#;
pub const HELLO_STREAM: &str = r#"{"messages":[{"role":"user","content":"hello"}],"stream":true}"#;
