//! Configuration loading and hot reload for convoy.
//!
//! [`config::ConfigLoader`] resolves the startup pool from the settings file,
//! the environment or the session definitions file. When the sessions came
//! from the definitions file, [`watcher::watch_definitions`] keeps the pool
//! in sync with it.
#![deny(unused_crate_dependencies)]

pub mod config;
pub mod watcher;

pub use config::{
    CONTAINER_ROOT, ConfigError, ConfigLoader, DEFINITIONS_FILE_NAME, LoadedConfig,
    SETTINGS_FILE_NAME, log_loaded_config,
};
pub use watcher::{
    DEBOUNCE_WINDOW, PoolReloader, WatchError, WatcherHandle, debounce, watch_definitions,
};
