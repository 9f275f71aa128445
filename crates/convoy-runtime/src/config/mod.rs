//! Startup configuration: settings plus the initial session pool.
//!
//! Sources are tried in order:
//!
//! 1. `config.yaml` next to the executable, then in the working directory.
//! 2. Environment variables. The session list comes from `SESSIONS`, or when
//!    that is empty from `data/sessionKeys.json` (executable dir, working
//!    dir, then `/app`).
//!
//! A settings file that fails to parse falls back to the environment rather
//! than aborting startup.

pub mod definitions;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use convoy_core::{
    DEFAULT_ADDRESS, DEFAULT_MAX_INLINE_CONTEXT, DEFAULT_MIRROR_PREFIX, Pool, Session,
    SessionSource, Settings, SettingsError, parse_session_list, validate_settings,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info, warn};

pub use definitions::{
    DATA_DIR, DEFINITIONS_FILE_NAME, find_definitions_file, parse_definitions, read_definitions,
};

/// Structured settings file name.
pub const SETTINGS_FILE_NAME: &str = "config.yaml";

/// Root checked last for the definitions file (container layout).
pub const CONTAINER_ROOT: &str = "/app";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to parse {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("sessionKeys.json not found in any data directory")]
    DefinitionsNotFound,

    #[error("Invalid settings: {0}")]
    Invalid(#[from] SettingsError),
}

/// Result of [`ConfigLoader::load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedConfig {
    pub pool: Pool,
    pub source: SessionSource,
}

/// Shape of `config.yaml`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SettingsFile {
    #[serde(flatten)]
    settings: Settings,
    sessions: Vec<SettingsFileSession>,
}

#[derive(Debug, Deserialize)]
struct SettingsFileSession {
    #[serde(rename = "sessionKey")]
    session_key: String,
    #[serde(rename = "orgID", default)]
    org_id: String,
}

/// Resolves settings and sessions from files and the environment.
///
/// Search roots and the environment are injected so tests never touch the
/// real process state.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    exe_dir: Option<PathBuf>,
    work_dir: Option<PathBuf>,
    container_dir: Option<PathBuf>,
    env: HashMap<String, String>,
}

impl ConfigLoader {
    /// Loader with no search roots and the given environment.
    pub fn new(env: HashMap<String, String>) -> Self {
        Self {
            env,
            ..Self::default()
        }
    }

    /// Loader bound to the running process: executable directory, current
    /// directory, `/app` and `std::env::vars()`.
    pub fn from_process() -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));
        Self {
            exe_dir,
            work_dir: std::env::current_dir().ok(),
            container_dir: Some(PathBuf::from(CONTAINER_ROOT)),
            env: std::env::vars().collect(),
        }
    }

    #[must_use]
    pub fn with_exe_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.exe_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_container_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.container_dir = Some(dir.into());
        self
    }

    fn var(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    fn flag(&self, key: &str) -> bool {
        self.var(key) == Some("true")
    }

    /// Whether the session list will come from the environment.
    pub fn has_session_env(&self) -> bool {
        self.var("SESSIONS").is_some_and(|v| !v.trim().is_empty())
    }

    /// First existing `config.yaml` in the executable, then working directory.
    pub fn find_settings_file(&self) -> Option<PathBuf> {
        [self.exe_dir.as_deref(), self.work_dir.as_deref()]
            .into_iter()
            .flatten()
            .map(|dir| dir.join(SETTINGS_FILE_NAME))
            .find(|candidate| candidate.is_file())
    }

    /// Locate the definitions file across the search roots.
    pub fn find_definitions_file(&self) -> Result<PathBuf, ConfigError> {
        find_definitions_file(
            [
                self.exe_dir.as_deref(),
                self.work_dir.as_deref(),
                self.container_dir.as_deref(),
            ]
            .into_iter()
            .flatten(),
        )
    }

    /// Parse a structured settings file into settings and sessions.
    pub fn load_settings_file(path: &Path) -> Result<(Settings, Vec<Session>), ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: SettingsFile =
            serde_yaml::from_str(&contents).map_err(|source| ConfigError::Yaml {
                path: path.to_path_buf(),
                source,
            })?;
        validate_settings(&file.settings)?;

        let sessions = file
            .sessions
            .into_iter()
            .map(|s| Session::with_identity(s.session_key.trim(), s.org_id.trim()))
            .collect();
        Ok((file.settings, sessions))
    }

    /// Find and parse the definitions file.
    pub fn load_definitions(&self) -> Result<(PathBuf, Vec<Session>), ConfigError> {
        let path = self.find_definitions_file()?;
        let sessions = read_definitions(&path)?;
        Ok((path, sessions))
    }

    /// Settings from environment variables.
    ///
    /// Unparsable or zero `MAX_CHAT_HISTORY_LENGTH` falls back to the default.
    /// A proxy with an unsupported scheme is ignored with a warning.
    pub fn settings_from_env(&self) -> Settings {
        let non_blank = |key: &str| {
            self.var(key)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let mut settings = Settings {
            address: non_blank("ADDRESS").unwrap_or_else(|| DEFAULT_ADDRESS.to_string()),
            api_key: non_blank("APIKEY"),
            proxy: non_blank("PROXY"),
            auto_delete_conversations: self.var("CHAT_DELETE") != Some("false"),
            max_inline_context: self
                .var("MAX_CHAT_HISTORY_LENGTH")
                .and_then(|v| v.trim().parse::<usize>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_MAX_INLINE_CONTEXT),
            disable_role_prefix: self.flag("NO_ROLE_PREFIX"),
            disable_prompt_artifacts: self.flag("PROMPT_DISABLE_ARTIFACTS"),
            mirror_enabled: self.flag("ENABLE_MIRROR_API"),
            mirror_prefix: non_blank("MIRROR_API_PREFIX")
                .unwrap_or_else(|| DEFAULT_MIRROR_PREFIX.to_string()),
        };

        if let Err(err) = validate_settings(&settings) {
            warn!(error = %err, "Ignoring invalid PROXY value");
            settings.proxy = None;
        }
        settings
    }

    /// Resolve the startup pool. Never fails: every error is logged and the
    /// next source is tried, ending with an empty pool.
    pub fn load(&self) -> LoadedConfig {
        if let Some(path) = self.find_settings_file() {
            info!(path = %path.display(), "Found settings file");
            match Self::load_settings_file(&path) {
                Ok((settings, sessions)) => {
                    info!("Loaded configuration from settings file");
                    return LoadedConfig {
                        pool: Pool::new(sessions, settings),
                        source: SessionSource::SettingsFile(path),
                    };
                }
                Err(err) => {
                    error!(
                        error = %err,
                        "Failed to load settings file, falling back to environment variables"
                    );
                }
            }
        }

        info!("Loading configuration from environment variables");
        let settings = self.settings_from_env();

        if self.has_session_env() {
            let sessions = parse_session_list(self.var("SESSIONS").unwrap_or_default());
            return LoadedConfig {
                pool: Pool::new(sessions, settings),
                source: SessionSource::Environment,
            };
        }

        info!("SESSIONS is empty, trying the session definitions file");
        match self.load_definitions() {
            Ok((path, sessions)) => {
                info!(
                    count = sessions.len(),
                    path = %path.display(),
                    "Loaded session keys from definitions file"
                );
                LoadedConfig {
                    pool: Pool::new(sessions, settings),
                    source: SessionSource::DefinitionsFile(path),
                }
            }
            Err(err) => {
                error!(error = %err, "Failed to load session keys, starting with an empty pool");
                LoadedConfig {
                    pool: Pool::empty(settings),
                    source: SessionSource::None,
                }
            }
        }
    }
}

/// Log the resolved configuration. Credentials are masked and the API key
/// is never printed.
pub fn log_loaded_config(loaded: &LoadedConfig) {
    let pool = &loaded.pool;
    let settings = pool.settings();

    info!(source = ?loaded.source, "Loaded config");
    info!(max_retry = pool.max_retry(), sessions = pool.len(), "Session pool");
    for (i, session) in pool.sessions().iter().enumerate() {
        info!(
            index = i + 1,
            session = %session.masked_credential(),
            identity = session.identity.as_deref().unwrap_or(""),
            "Session"
        );
    }
    info!(
        address = settings.effective_address(),
        api_key_set = settings.effective_api_key().is_some(),
        proxy = settings.effective_proxy().unwrap_or(""),
        auto_delete = settings.auto_delete_conversations,
        max_inline_context = settings.max_inline_context,
        no_role_prefix = settings.disable_role_prefix,
        disable_artifacts = settings.disable_prompt_artifacts,
        mirror_enabled = settings.mirror_enabled,
        mirror_prefix = %settings.mirror_prefix,
        "Settings"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio_test::assert_ok;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn write_definitions(root: &Path, json: &str) -> PathBuf {
        let dir = root.join(DATA_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(DEFINITIONS_FILE_NAME);
        std::fs::write(&path, json).unwrap();
        path
    }

    #[test]
    fn test_env_defaults() {
        let settings = ConfigLoader::new(HashMap::new()).settings_from_env();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_env_overrides() {
        let loader = ConfigLoader::new(env(&[
            ("ADDRESS", "127.0.0.1:9000"),
            ("APIKEY", "secret"),
            ("CHAT_DELETE", "false"),
            ("MAX_CHAT_HISTORY_LENGTH", "500"),
            ("NO_ROLE_PREFIX", "true"),
            ("PROMPT_DISABLE_ARTIFACTS", "true"),
            ("ENABLE_MIRROR_API", "true"),
            ("MIRROR_API_PREFIX", "/m"),
        ]));
        let settings = loader.settings_from_env();

        assert_eq!(settings.effective_address(), "127.0.0.1:9000");
        assert_eq!(settings.effective_api_key(), Some("secret"));
        assert!(!settings.auto_delete_conversations);
        assert_eq!(settings.max_inline_context, 500);
        assert!(settings.disable_role_prefix);
        assert!(settings.disable_prompt_artifacts);
        assert!(settings.mirror_enabled);
        assert_eq!(settings.mirror_prefix, "/m");
    }

    #[test]
    fn test_env_flag_values() {
        let loader = ConfigLoader::new(env(&[
            ("CHAT_DELETE", "no"),
            ("ENABLE_MIRROR_API", "1"),
            ("MAX_CHAT_HISTORY_LENGTH", "lots"),
        ]));
        let settings = loader.settings_from_env();

        // Only the literal "false" disables, only the literal "true" enables.
        assert!(settings.auto_delete_conversations);
        assert!(!settings.mirror_enabled);
        assert_eq!(settings.max_inline_context, DEFAULT_MAX_INLINE_CONTEXT);
    }

    #[test]
    fn test_env_invalid_proxy_is_dropped() {
        let loader = ConfigLoader::new(env(&[("PROXY", "ftp://nope")]));
        assert_eq!(loader.settings_from_env().proxy, None);
    }

    #[test]
    fn test_load_from_session_env() {
        let loader = ConfigLoader::new(env(&[("SESSIONS", "a,b:org-b,,c")]));
        let loaded = loader.load();

        assert_eq!(loaded.source, SessionSource::Environment);
        assert_eq!(loaded.pool.len(), 3);
        assert_eq!(loaded.pool.max_retry(), 3);
        assert_eq!(loaded.pool.sessions()[1].identity.as_deref(), Some("org-b"));
    }

    #[test]
    fn test_session_env_retry_cap() {
        let loader = ConfigLoader::new(env(&[("SESSIONS", "a,b,c,d,e,f,g")]));
        assert_eq!(loader.load().pool.max_retry(), 5);
    }

    #[test]
    fn test_load_from_definitions_file() {
        let work = TempDir::new().unwrap();
        let path = write_definitions(work.path(), r#"{"sessionKeys":[{"id":1,"key":"k1"},{"id":2,"key":"k2"}]}"#);

        let loader = ConfigLoader::new(HashMap::new()).with_work_dir(work.path());
        let loaded = loader.load();

        assert_eq!(loaded.source, SessionSource::DefinitionsFile(path));
        assert_eq!(loaded.pool.len(), 2);
        assert_eq!(loaded.pool.max_retry(), 2);
    }

    #[test]
    fn test_definitions_search_order() {
        let exe = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let container = TempDir::new().unwrap();
        write_definitions(work.path(), r#"{"sessionKeys":[{"id":1,"key":"work"}]}"#);
        let container_path =
            write_definitions(container.path(), r#"{"sessionKeys":[{"id":1,"key":"app"}]}"#);

        let loader = ConfigLoader::new(HashMap::new())
            .with_exe_dir(exe.path())
            .with_work_dir(work.path())
            .with_container_dir(container.path());
        let (path, sessions) = assert_ok!(loader.load_definitions());
        assert!(path.starts_with(work.path()));
        assert_eq!(sessions[0].credential, "work");

        let loader = ConfigLoader::new(HashMap::new()).with_container_dir(container.path());
        let (path, _) = assert_ok!(loader.load_definitions());
        assert_eq!(path, container_path);
    }

    #[test]
    fn test_no_sources_gives_empty_pool() {
        let work = TempDir::new().unwrap();
        let loaded = ConfigLoader::new(HashMap::new())
            .with_work_dir(work.path())
            .load();

        assert_eq!(loaded.source, SessionSource::None);
        assert!(loaded.pool.is_empty());
        assert_eq!(loaded.pool.max_retry(), 0);
    }

    #[test]
    fn test_load_from_settings_file() {
        let work = TempDir::new().unwrap();
        let path = work.path().join(SETTINGS_FILE_NAME);
        std::fs::write(
            &path,
            r"
address: 127.0.0.1:7000
apiKey: secret
chatDelete: false
retryCount: 9
enableMirrorApi: true
sessions:
  - sessionKey: sk-one
    orgID: org-1
  - sessionKey: sk-two
",
        )
        .unwrap();

        let loader = ConfigLoader::new(env(&[("SESSIONS", "ignored")])).with_work_dir(work.path());
        let loaded = loader.load();

        assert_eq!(loaded.source, SessionSource::SettingsFile(path));
        assert_eq!(loaded.pool.len(), 2);
        assert_eq!(loaded.pool.max_retry(), 2);
        let settings = loaded.pool.settings();
        assert_eq!(settings.effective_address(), "127.0.0.1:7000");
        assert!(!settings.auto_delete_conversations);
        assert!(settings.mirror_enabled);
        assert_eq!(loaded.pool.sessions()[0].identity.as_deref(), Some("org-1"));
        assert_eq!(loaded.pool.sessions()[1].identity, None);
    }

    #[test]
    fn test_exe_dir_settings_file_wins() {
        let exe = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        std::fs::write(exe.path().join(SETTINGS_FILE_NAME), "address: 1.1.1.1:1\n").unwrap();
        std::fs::write(work.path().join(SETTINGS_FILE_NAME), "address: 2.2.2.2:2\n").unwrap();

        let loader = ConfigLoader::new(HashMap::new())
            .with_exe_dir(exe.path())
            .with_work_dir(work.path());

        assert_eq!(
            loader.find_settings_file(),
            Some(exe.path().join(SETTINGS_FILE_NAME))
        );
    }

    #[test]
    fn test_broken_settings_file_falls_back_to_env() {
        let work = TempDir::new().unwrap();
        std::fs::write(work.path().join(SETTINGS_FILE_NAME), "sessions: [unclosed\n").unwrap();

        let loader = ConfigLoader::new(env(&[("SESSIONS", "a,b")])).with_work_dir(work.path());
        let loaded = loader.load();

        assert_eq!(loaded.source, SessionSource::Environment);
        assert_eq!(loaded.pool.len(), 2);
    }

    #[test]
    fn test_invalid_settings_file_values() {
        let work = TempDir::new().unwrap();
        let path = work.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, "maxChatHistoryLength: 0\n").unwrap();

        let err = ConfigLoader::load_settings_file(&path).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid(SettingsError::ZeroInlineContext)
        ));
    }
}
