//! # Config Loader
//!
//! Loads `config.toml`. A missing file is not an error: a default configuration is generated,
//! written to disk for the user to edit, and returned.

use crate::core::paths::{self, PathError};
use crate::models::{AppConfig, EditorConfig, JobsConfig};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("Failed to read configuration file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write configuration file '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid configuration in '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to serialize the default configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Loads the configuration from `$JOBCTL_CONFIG` or `~/.config/jobctl/config.toml`.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let path = paths::get_config_file_path()?;
    load_config_from(&path)
}

/// Loads the configuration at `path`, generating and writing the default one if the file does
/// not exist yet.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        let default_config = generate_default_config();
        let toml_string = toml::to_string_pretty(&default_config)?;
        fs::write(path, toml_string).map_err(|source| ConfigError::Write {
            path: path.display().to_string(),
            source,
        })?;
        log::debug!("Wrote default configuration to '{}'", path.display());
        return Ok(default_config);
    }

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    log::debug!("Loaded configuration from '{}'", path.display());
    Ok(config)
}

/// Resolves the history file template of `editor` into a concrete path.
pub fn history_path(editor: &EditorConfig) -> Result<PathBuf, PathError> {
    paths::expand_path_template(&editor.history_file)
}

fn generate_default_config() -> AppConfig {
    let default_shell = find_in_path("bash").unwrap_or_else(|| JobsConfig::default().default_shell);
    AppConfig {
        editor: EditorConfig::default(),
        jobs: JobsConfig { default_shell },
    }
}

fn find_in_path(executable_name: &str) -> Option<PathBuf> {
    let path_var = env::var_os("PATH")?;
    env::split_paths(&path_var)
        .map(|dir| dir.join(executable_name))
        .find(|candidate| candidate.is_file())
}
