use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::state::AppIconSelection;

/// Which analysis backend a session talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Stream replies from the analysis service.
    Live,
    /// Timed canned replies, no network.
    #[serde(alias = "simulated")]
    Scripted,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Scripted => write!(f, "scripted"),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub icon: AppIconSelection,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub app_id: String,
    /// Bearer token. Empty means no Authorization header.
    #[serde(default)]
    pub token: String,
    /// Longest silence tolerated between response chunks.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_transport")]
    pub transport: TransportKind,
    /// Scripted transport: wait before each canned reply.
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,
    /// Scripted transport: words per streamed fragment.
    #[serde(default = "default_chunk_words")]
    pub chunk_words: usize,
    /// Pause between closing and navigating to the new app.
    #[serde(default = "default_redirect_delay_ms")]
    pub redirect_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,
    /// Override log directory. Default: "logs/" next to the executable.
    pub directory: Option<String>,
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_base_url() -> String { "http://localhost:5001/console/api".into() }
fn default_timeout_secs() -> u64 { 120 }
fn default_transport() -> TransportKind { TransportKind::Live }
fn default_step_delay_ms() -> u64 { 1500 }
fn default_chunk_words() -> usize { 3 }
fn default_redirect_delay_ms() -> u64 { 300 }
fn default_logging_enabled() -> bool { true }
fn default_level() -> String { "info".into() }

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            app_id: String::new(),
            token: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            transport: default_transport(),
            step_delay_ms: default_step_delay_ms(),
            chunk_words: default_chunk_words(),
            redirect_delay_ms: default_redirect_delay_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            directory: None,
            level: default_level(),
        }
    }
}

impl LoggingConfig {
    pub fn log_directory(&self) -> Option<PathBuf> {
        if let Some(ref custom) = self.directory {
            return Some(PathBuf::from(custom));
        }
        exe_directory().map(|d| d.join("logs"))
    }
}

pub(crate) fn exe_directory() -> Option<PathBuf> {
    let mut exe = std::env::current_exe().ok()?;
    exe.pop();
    Some(exe)
}

impl Config {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Load from `path`, else `config.toml` next to the executable.
    /// Falls back to defaults when the file is missing or invalid; runs
    /// before tracing is up, so problems go to stderr.
    pub fn load(path: Option<&Path>) -> Self {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let Some(dir) = exe_directory() else {
                    eprintln!("[concept] Could not determine executable directory, using defaults");
                    return Self::default();
                };
                dir.join("config.toml")
            }
        };

        match Self::read(&config_path) {
            Ok(config) => config,
            Err(ConfigError::Read { .. }) => {
                eprintln!(
                    "[concept] config.toml not found at {}, using defaults",
                    config_path.display()
                );
                Self::default()
            }
            Err(e) => {
                eprintln!("[concept] {e}; using defaults");
                Self::default()
            }
        }
    }
}
