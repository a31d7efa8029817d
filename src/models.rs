// src/models.rs

use crate::constants::{DEFAULT_HISTORY_FILE, DEFAULT_MAX_HISTORY, DEFAULT_PROMPT};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// --- CONFIGURATION MODELS (FOR TOML) ---
// These are what the user sees and edits in ~/.config/jobctl/config.toml

/// The whole configuration file. Every section and key is optional; missing values fall back to
/// the defaults below.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub editor: EditorConfig,
    pub jobs: JobsConfig,
}

/// `[editor]`: the interactive line editor used by `jobctl repl`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EditorConfig {
    pub prompt: String,
    /// Path template; `~` and `$VARS` are expanded when the file is opened.
    pub history_file: String,
    pub max_history: usize,
    /// Lines ending in a backslash continue on the next line.
    pub multi_line: bool,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_string(),
            history_file: DEFAULT_HISTORY_FILE.to_string(),
            max_history: DEFAULT_MAX_HISTORY,
            multi_line: false,
        }
    }
}

/// `[jobs]`: how `jobctl run` and `jobctl repl` launch work.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct JobsConfig {
    /// Shell used by `jobctl run --shell` to interpret a line verbatim.
    pub default_shell: PathBuf,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            default_shell: PathBuf::from("/bin/sh"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: AppConfig = toml::from_str("[editor]\nprompt = \"% \"\n").unwrap();
        assert_eq!(config.editor.prompt, "% ");
        assert_eq!(config.editor.max_history, DEFAULT_MAX_HISTORY);
        assert_eq!(config.jobs, JobsConfig::default());
    }

    #[test]
    fn test_empty_file_is_default() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config, AppConfig::default());
    }
}
