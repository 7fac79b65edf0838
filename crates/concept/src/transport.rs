use std::future::Future;

use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::api::ApiClient;
use crate::config::{Config, TransportKind};
use crate::error::TransportError;
use crate::script::ScriptedTransport;
use crate::state::{ConceptForm, IconType};
use crate::steps::StepKey;

/// One analysis turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub input: String,
    pub session_id: Option<String>,
    /// Phase in progress when the turn was sent. Not part of the wire body;
    /// the scripted transport keys its replies on it.
    pub phase: Option<StepKey>,
}

/// Partial-response events, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisEvent {
    /// Server-side conversation token.
    Session(String),
    /// Text fragment to append to the reply.
    Content(String),
    /// The analyzer finished a phase.
    PhaseComplete { reported: Option<StepKey> },
    /// The analyzer failed mid-stream.
    Failed(String),
}

/// Finite, single-use sequence of events for one turn.
pub type EventStream = BoxStream<'static, Result<AnalysisEvent, TransportError>>;

/// Server-side view of a conversation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub status: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl SessionInfo {
    pub fn phase(&self) -> Option<StepKey> {
        self.status.parse().ok()
    }
}

pub trait AnalysisTransport: Send + Sync {
    fn submit(
        &self,
        request: AnalysisRequest,
    ) -> impl Future<Output = Result<EventStream, TransportError>> + Send;

    fn fetch_session(
        &self,
        session_id: &str,
    ) -> impl Future<Output = Result<SessionInfo, TransportError>> + Send;

    /// Record the phase the conversation has reached.
    fn update_status(
        &self,
        session_id: &str,
        phase: StepKey,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn discard_session(
        &self,
        session_id: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// The transport picked by `[session] transport` in config.
pub enum Transport {
    Live(ApiClient),
    Scripted(ScriptedTransport),
}

impl Transport {
    pub fn from_config(config: &Config, client: ApiClient) -> Self {
        match config.session.transport {
            TransportKind::Live => Self::Live(client),
            TransportKind::Scripted => Self::Scripted(ScriptedTransport::from_config(&config.session)),
        }
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Live(_) => TransportKind::Live,
            Self::Scripted(_) => TransportKind::Scripted,
        }
    }
}

impl AnalysisTransport for Transport {
    async fn submit(&self, request: AnalysisRequest) -> Result<EventStream, TransportError> {
        match self {
            Self::Live(t) => t.submit(request).await,
            Self::Scripted(t) => t.submit(request).await,
        }
    }

    async fn fetch_session(&self, session_id: &str) -> Result<SessionInfo, TransportError> {
        match self {
            Self::Live(t) => t.fetch_session(session_id).await,
            Self::Scripted(t) => t.fetch_session(session_id).await,
        }
    }

    async fn update_status(&self, session_id: &str, phase: StepKey) -> Result<(), TransportError> {
        match self {
            Self::Live(t) => t.update_status(session_id, phase).await,
            Self::Scripted(t) => t.update_status(session_id, phase).await,
        }
    }

    async fn discard_session(&self, session_id: &str) -> Result<(), TransportError> {
        match self {
            Self::Live(t) => t.discard_session(session_id).await,
            Self::Scripted(t) => t.discard_session(session_id).await,
        }
    }
}

// --- App creation ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateAppRequest {
    pub name: String,
    pub icon_type: IconType,
    pub icon: String,
    pub icon_background: Option<String>,
    pub description: String,
    pub mode: &'static str,
}

impl CreateAppRequest {
    pub const MODE: &'static str = "chat";

    pub fn from_form(form: &ConceptForm) -> Self {
        Self {
            name: form.name.trim().to_string(),
            icon_type: form.icon.icon_type,
            icon: form.icon.icon.clone(),
            icon_background: form.icon.background.clone(),
            description: form.requirements.clone(),
            mode: Self::MODE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedApp {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Creates the application record once the concept is confirmed.
pub trait AppCreator: Send + Sync {
    fn create_app(
        &self,
        request: CreateAppRequest,
    ) -> impl Future<Output = Result<CreatedApp, TransportError>> + Send;
}
