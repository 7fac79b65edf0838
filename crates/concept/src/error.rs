use std::path::PathBuf;

use thiserror::Error;

use crate::steps::StepKey;

/// Failures talking to the analysis or app-creation service.
/// `Display` text is written for end users; details go to the log.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request timed out. Try again.")]
    Timeout,

    #[error("Cannot connect to the analysis service at {0}.")]
    Connect(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("{message} (HTTP {code})")]
    Status { code: u16, message: &'static str },

    #[error("Analysis service reported an error: {0}")]
    Remote(String),

    #[error("Unexpected response from the service: {0}")]
    Decode(String),

    #[error("Request was stopped.")]
    Aborted,
}

impl TransportError {
    /// Map a non-success HTTP status to a readable error.
    pub fn from_status(code: u16) -> Self {
        let message = match code {
            400 => "Bad request. Try a shorter message.",
            401 | 403 => "Not authorized. Check the API token in config.toml.",
            404 => "Not found. Check base_url and app_id in config.toml.",
            429 => "Rate limited. Wait a moment and try again.",
            500..=599 => "Analysis service error. Try again.",
            _ => "Unexpected API status.",
        };
        Self::Status { code, message }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Connect(
                e.url()
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| "<unknown>".into()),
            )
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// Rejected step-tracker transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhaseError {
    #[error("phase tracking has already started")]
    AlreadyStarted,

    #[error("no phase is in progress")]
    NotStarted,

    #[error("all phases are already completed")]
    Finished,

    #[error("completion reported for {reported} while {current} is in progress")]
    OutOfOrder { current: StepKey, reported: StepKey },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
