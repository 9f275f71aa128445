//! The JSON session definitions file.
//!
//! ```json
//! { "sessionKeys": [ { "id": 1, "key": "sk-..." } ] }
//! ```
//!
//! Identities are never stored here; they are resolved on first use.

use std::path::{Path, PathBuf};

use convoy_core::Session;
use serde::Deserialize;

use super::ConfigError;

/// File name looked up under each `data/` directory.
pub const DEFINITIONS_FILE_NAME: &str = "sessionKeys.json";

/// Directory holding the definitions file, relative to each search root.
pub const DATA_DIR: &str = "data";

#[derive(Debug, Deserialize)]
struct DefinitionsFile {
    #[serde(rename = "sessionKeys", default)]
    session_keys: Vec<DefinitionEntry>,
}

#[derive(Debug, Deserialize)]
struct DefinitionEntry {
    key: String,
}

/// Parse the file contents. Blank keys are skipped.
pub fn parse_definitions(contents: &str, path: &Path) -> Result<Vec<Session>, ConfigError> {
    let file: DefinitionsFile =
        serde_json::from_str(contents).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(file
        .session_keys
        .into_iter()
        .map(|entry| entry.key.trim().to_string())
        .filter(|key| !key.is_empty())
        .map(Session::new)
        .collect())
}

/// Read and parse the definitions file at `path`.
pub fn read_definitions(path: &Path) -> Result<Vec<Session>, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_definitions(&contents, path)
}

/// First existing `<root>/data/sessionKeys.json` among `roots`, in order.
pub fn find_definitions_file<'a>(
    roots: impl IntoIterator<Item = &'a Path>,
) -> Result<PathBuf, ConfigError> {
    roots
        .into_iter()
        .map(|root| root.join(DATA_DIR).join(DEFINITIONS_FILE_NAME))
        .find(|candidate| candidate.is_file())
        .ok_or(ConfigError::DefinitionsNotFound)
}
