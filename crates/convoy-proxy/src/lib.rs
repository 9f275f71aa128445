//! OpenAI-compatible HTTP surface for the convoy session pool.
//!
//! Routes:
//!
//! - `GET /health`
//! - `GET /v1/models`
//! - `POST /v1/chat/completions` (pooled, API-key guarded when a key is set)
//! - `GET {mirror}/v1/models`, `POST {mirror}/v1/chat/completions` (caller's
//!   own session from the bearer header)
//!
//! The embedding application supplies the upstream transport and calls
//! [`start_server`], or [`bootstrap`] plus [`serve`] for more control.
#![deny(unused_crate_dependencies)]

// Dev-dependencies used only by the integration tests
#[cfg(test)]
use async_trait as _;
#[cfg(test)]
use http_body_util as _;
#[cfg(test)]
use tokio_test as _;
#[cfg(test)]
use tower as _;

pub mod auth;
pub mod bootstrap;
pub mod error;
pub mod models;
pub mod server;
pub mod stream;

pub use auth::RouteMode;
pub use bootstrap::{ProxyContext, bootstrap, bootstrap_with, init_tracing, start_server};
pub use error::HttpError;
pub use server::{AppState, create_router, serve};
