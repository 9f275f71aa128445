//! Composition root.
//!
//! Resolves configuration, builds the pool store, rotator, cleanup pool and
//! orchestrator, and starts the definitions watcher when the pool came from
//! the definitions file. The upstream transport is supplied by the caller.

use std::sync::Arc;

use anyhow::{Context, Result};
use convoy_core::{
    ChatOrchestrator, CleanupConfig, CleanupPool, PoolStore, SessionRotator, SessionSource,
    Settings, UpstreamConnector,
};
use convoy_runtime::{
    ConfigLoader, DEBOUNCE_WINDOW, PoolReloader, WatcherHandle, log_loaded_config,
    watch_definitions,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::server::{AppState, serve};

/// Install the global tracing subscriber.
///
/// Log level is controlled by `RUST_LOG` (default: info). Safe to call more
/// than once.
pub fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .try_init()
        .ok();
}

/// Everything a running proxy needs.
#[derive(Debug)]
pub struct ProxyContext {
    pub state: AppState,
    pub settings: Settings,
    /// Definitions watcher, present when the pool came from the
    /// definitions file.
    pub watcher: Option<WatcherHandle>,
    pub cancel: CancellationToken,
}

impl ProxyContext {
    /// Stop the watcher, if any.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Some(watcher) = self.watcher {
            watcher.shutdown().await;
        }
    }
}

/// Bootstrap from the process environment (`.env` included).
///
/// Must be called inside a tokio runtime.
pub fn bootstrap(connector: Arc<dyn UpstreamConnector>) -> ProxyContext {
    dotenvy::dotenv().ok();
    bootstrap_with(&ConfigLoader::from_process(), connector, CleanupConfig::default())
}

/// Bootstrap with an explicit loader and cleanup configuration.
pub fn bootstrap_with(
    loader: &ConfigLoader,
    connector: Arc<dyn UpstreamConnector>,
    cleanup: CleanupConfig,
) -> ProxyContext {
    let loaded = loader.load();
    log_loaded_config(&loaded);

    let settings = loaded.pool.settings().clone();
    if loaded.pool.is_empty() {
        warn!("Session pool is empty; pooled requests will fail until sessions are added");
    }

    let store = Arc::new(PoolStore::new(loaded.pool));
    let rotator = Arc::new(SessionRotator::new(store));
    let cancel = CancellationToken::new();

    let watcher = match &loaded.source {
        SessionSource::DefinitionsFile(path) => {
            let reloader = PoolReloader::new(path.clone(), Arc::clone(&rotator));
            match watch_definitions(reloader, DEBOUNCE_WINDOW, cancel.child_token()) {
                Ok(handle) => Some(handle),
                Err(err) => {
                    error!(error = %err, "Failed to watch session definitions; hot reload disabled");
                    None
                }
            }
        }
        _ => None,
    };

    let orchestrator = ChatOrchestrator::new(rotator, connector, CleanupPool::start(cleanup));

    ProxyContext {
        state: AppState::new(orchestrator),
        settings,
        watcher,
        cancel,
    }
}

/// Bootstrap, bind the configured address and serve until Ctrl-C.
pub async fn start_server(connector: Arc<dyn UpstreamConnector>) -> Result<()> {
    let ctx = bootstrap(connector);

    let addr = ctx.settings.effective_address().to_string();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Server starting on {addr}");

    let cancel = ctx.cancel.clone();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(error = %err, "Failed to listen for Ctrl-C");
                return;
            }
            info!("Shutdown requested");
            cancel.cancel();
        }
    });

    let result = serve(listener, ctx.state.clone(), cancel).await;
    ctx.shutdown().await;
    result
}
