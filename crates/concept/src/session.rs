//! One concept-building session: the form, the phase tracker, the chat
//! transcript and the final hand-off to app creation.
//!
//! The session owns all of its state and is driven through `&mut self`
//! methods. Front-ends observe it through the [`SessionEvent`] channel.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{AbortHandle, AbortRegistration, Abortable};
use futures_util::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::TransportError;
use crate::logging::SessionLog;
use crate::state::{
    AppIconSelection, ChatMessage, Composer, ComposerAction, ComposerKey, ConceptForm, FormField,
    Transcript,
};
use crate::steps::{ProcessStep, StepKey, StepTracker};
use crate::transport::{
    AnalysisEvent, AnalysisRequest, AnalysisTransport, AppCreator, CreateAppRequest, SessionInfo,
};

/// Shown in place of a reply when a turn fails.
pub const ERROR_REPLY: &str =
    "Sorry, I couldn't analyze that just now. Please try sending your message again.";
/// Left in place of a reply stopped before any text arrived.
pub const STOPPED_REPLY: &str = "(Stopped before a reply arrived.)";
pub const CREATE_SUCCEEDED: &str = "Your game app has been created.";
pub const CREATE_FAILED: &str = "Failed to create the app. Please try again.";

/// Route of a newly created app's metadata view.
pub fn metadata_route(app_id: &str) -> String {
    format!("/app/{app_id}/metadata")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NoticeLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Notify(Notification),
    /// Form accepted and folded away.
    FormConfirmed,
    StepsChanged {
        current: Option<StepKey>,
        finished: bool,
    },
    MessageAppended {
        index: usize,
        message: ChatMessage,
    },
    /// Full current text of the message at `index`.
    MessageUpdated {
        index: usize,
        content: String,
    },
    TranscriptCleared,
    ProcessingChanged(bool),
    /// The owner's app list must be refreshed.
    AppListStale,
    Created {
        app_id: String,
    },
    Closed,
    Navigate(String),
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub redirect_delay: Duration,
    /// Where transcript logs go; None disables them.
    pub log_directory: Option<PathBuf>,
    pub icon: AppIconSelection,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            redirect_delay: Duration::from_millis(300),
            log_directory: None,
            icon: AppIconSelection::default(),
        }
    }
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            redirect_delay: Duration::from_millis(config.session.redirect_delay_ms),
            log_directory: config
                .logging
                .enabled
                .then(|| config.logging.log_directory())
                .flatten(),
            icon: config.icon.clone(),
        }
    }
}

/// Clears the processing flag when the turn ends, however it ends.
struct ProcessingGuard {
    flag: Arc<AtomicBool>,
    events: UnboundedSender<SessionEvent>,
}

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
        let _ = self.events.send(SessionEvent::ProcessingChanged(false));
    }
}

/// A turn that has been accepted and is waiting to be streamed.
pub struct PendingTurn {
    input: String,
    reply_index: usize,
    registration: AbortRegistration,
    _guard: ProcessingGuard,
}

impl PendingTurn {
    pub fn input(&self) -> &str {
        &self.input
    }
}

pub struct ConceptSession<T, C> {
    transport: T,
    creator: C,
    events: UnboundedSender<SessionEvent>,
    options: SessionOptions,

    form: ConceptForm,
    steps: StepTracker,
    transcript: Transcript,
    composer: Composer,
    session_id: Option<String>,

    processing: Arc<AtomicBool>,
    submitting: bool,
    /// Stops the turn in flight. Nothing in the front-end triggers it yet.
    abort: Option<AbortHandle>,
    log: Option<SessionLog>,
}

impl<T, C> ConceptSession<T, C>
where
    T: AnalysisTransport,
    C: AppCreator,
{
    pub fn new(
        transport: T,
        creator: C,
        events: UnboundedSender<SessionEvent>,
        options: SessionOptions,
    ) -> Self {
        let form = ConceptForm {
            icon: options.icon.clone(),
            ..ConceptForm::default()
        };
        Self {
            transport,
            creator,
            events,
            options,
            form,
            steps: StepTracker::new(),
            transcript: Transcript::default(),
            composer: Composer::default(),
            session_id: None,
            processing: Arc::new(AtomicBool::new(false)),
            submitting: false,
            abort: None,
            log: None,
        }
    }

    // --- Accessors ---

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn form(&self) -> &ConceptForm {
        &self.form
    }

    pub fn steps(&self) -> &[ProcessStep] {
        self.steps.steps()
    }

    pub fn current_step(&self) -> Option<StepKey> {
        self.steps.current()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.transcript.messages()
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    /// The requirements text is fixed once the chat has moved past the
    /// opening exchange, so it cannot drift from the transcript.
    pub fn requirements_frozen(&self) -> bool {
        self.transcript.len() > 1
    }

    pub fn stop_handle(&self) -> Option<AbortHandle> {
        self.abort.clone()
    }

    // --- Form ---

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.form.name = name.into();
    }

    /// Returns false when the field is frozen.
    pub fn set_requirements(&mut self, requirements: impl Into<String>) -> bool {
        if self.requirements_frozen() {
            debug!("Requirements are frozen; edit ignored");
            return false;
        }
        self.form.requirements = requirements.into();
        true
    }

    pub fn set_icon(&mut self, icon: AppIconSelection) {
        self.form.icon = icon;
    }

    /// Accept the form, start the first phase and send the requirements as
    /// the opening message. Returns false when validation fails or the form
    /// was already confirmed.
    pub async fn confirm_form(&mut self) -> bool {
        if self.form.collapsed {
            return false;
        }
        if let Err(field) = self.form.validate() {
            self.notify_missing(field);
            return false;
        }

        self.form.collapsed = true;
        self.emit(SessionEvent::FormConfirmed);
        match self.steps.start() {
            Ok(transition) => info!("Concept '{}' confirmed: {transition:?}", self.form.name),
            Err(e) => warn!("Phase tracker not started: {e}"),
        }
        self.emit_steps();

        if let Some(dir) = &self.options.log_directory {
            self.log = SessionLog::create(dir, &self.form.name);
        }

        let opening = self.form.requirements.clone();
        self.send_message(&opening).await;
        true
    }

    // --- Chat ---

    /// Feed one key to the composer; plain Enter sends the message.
    pub async fn handle_key(&mut self, key: ComposerKey) -> Option<String> {
        match self.composer.handle_key(key) {
            ComposerAction::Submit(text) => self.send_message(&text).await,
            ComposerAction::Edited | ComposerAction::Ignored => None,
        }
    }

    /// Send one message and stream the reply. Returns the reply, or None if
    /// the message was rejected or the turn failed.
    pub async fn send_message(&mut self, input: &str) -> Option<String> {
        let turn = self.begin_turn(input)?;
        self.run_turn(turn).await
    }

    /// Accept a message: append the user turn and a loading placeholder.
    /// Rejects blank input, input before the form is confirmed, and input
    /// while another turn is in flight.
    pub fn begin_turn(&mut self, input: &str) -> Option<PendingTurn> {
        if input.trim().is_empty() {
            return None;
        }
        if !self.form.collapsed {
            debug!("Message ignored: form not confirmed");
            return None;
        }
        if self.processing.swap(true, Ordering::SeqCst) {
            debug!("Message ignored: a turn is already in flight");
            return None;
        }
        let guard = ProcessingGuard {
            flag: Arc::clone(&self.processing),
            events: self.events.clone(),
        };
        self.emit(SessionEvent::ProcessingChanged(true));

        let user = ChatMessage::user(input);
        let index = self.transcript.push(user.clone());
        self.emit(SessionEvent::MessageAppended {
            index,
            message: user,
        });
        let placeholder = ChatMessage::placeholder();
        let reply_index = self.transcript.push(placeholder.clone());
        self.emit(SessionEvent::MessageAppended {
            index: reply_index,
            message: placeholder,
        });
        self.composer.clear();

        let (handle, registration) = AbortHandle::new_pair();
        self.abort = Some(handle);

        Some(PendingTurn {
            input: input.to_string(),
            reply_index,
            registration,
            _guard: guard,
        })
    }

    pub async fn run_turn(&mut self, turn: PendingTurn) -> Option<String> {
        let PendingTurn {
            input,
            reply_index,
            registration,
            _guard,
        } = turn;

        let request = AnalysisRequest {
            input: input.clone(),
            session_id: self.session_id.clone(),
            phase: self.steps.current(),
        };
        let outcome = Abortable::new(self.stream_reply(reply_index, request), registration).await;
        self.abort = None;

        let result = outcome.unwrap_or(Err(TransportError::Aborted));
        match result {
            Ok(reply) => {
                self.write_reply(reply_index, &reply);
                if let Some(log) = &self.log {
                    log.log_exchange(&input, &reply);
                }
                Some(reply)
            }
            Err(TransportError::Aborted) => {
                info!("Turn stopped");
                let partial = self
                    .transcript
                    .messages()
                    .get(reply_index)
                    .map(|m| m.content.clone())
                    .filter(|c| !c.is_empty())
                    .unwrap_or_else(|| STOPPED_REPLY.to_string());
                self.write_reply(reply_index, &partial);
                None
            }
            Err(e) => {
                error!("Analysis turn failed: {e}");
                self.write_reply(reply_index, ERROR_REPLY);
                None
            }
        }
    }

    async fn stream_reply(
        &mut self,
        index: usize,
        request: AnalysisRequest,
    ) -> Result<String, TransportError> {
        let mut events = self.transport.submit(request).await?;
        let mut reply = String::new();

        while let Some(event) = events.next().await {
            match event? {
                AnalysisEvent::Session(id) => {
                    if self.session_id.is_none() {
                        info!("Analysis session {id} started");
                        self.session_id = Some(id);
                    }
                }
                AnalysisEvent::Content(fragment) => {
                    reply.push_str(&fragment);
                    self.write_reply(index, &reply);
                }
                AnalysisEvent::PhaseComplete { reported } => self.advance_phase(reported).await,
                AnalysisEvent::Failed(message) => return Err(TransportError::Remote(message)),
            }
        }
        Ok(reply)
    }

    async fn advance_phase(&mut self, reported: Option<StepKey>) {
        match self.steps.complete(reported) {
            Ok(transition) => {
                info!("Phase transition: {transition:?}");
                self.emit_steps();
                if let (Some(id), Some(next)) = (self.session_id.clone(), self.steps.current()) {
                    if let Err(e) = self.transport.update_status(&id, next).await {
                        warn!("Failed to record phase {next} for session {id}: {e}");
                    }
                }
            }
            Err(e) => warn!("Ignoring phase completion: {e}"),
        }
    }

    fn write_reply(&mut self, index: usize, content: &str) {
        if self.transcript.write(index, content) {
            self.emit(SessionEvent::MessageUpdated {
                index,
                content: content.to_string(),
            });
        }
    }

    // --- Server session ---

    /// Server-side state of the conversation, if one has started.
    pub async fn session_info(&self) -> Result<Option<SessionInfo>, TransportError> {
        match &self.session_id {
            Some(id) => self.transport.fetch_session(id).await.map(Some),
            None => Ok(None),
        }
    }

    /// Drop the conversation and start over at the first phase.
    /// Refused while a turn is in flight.
    pub async fn reset_conversation(&mut self) -> bool {
        if self.is_processing() {
            return false;
        }
        if let Some(id) = self.session_id.take() {
            if let Err(e) = self.transport.discard_session(&id).await {
                warn!("Failed to delete session {id}: {e}");
            }
        }
        self.transcript.clear();
        self.composer.clear();
        self.steps.reset();
        if self.form.collapsed {
            let _ = self.steps.start();
        }
        self.emit(SessionEvent::TranscriptCleared);
        self.emit_steps();
        info!("Conversation reset");
        true
    }

    // --- App creation ---

    /// Create the app from the form. On success the owner is told to refresh
    /// its app list, the session closes, and navigation to the new app's
    /// metadata view follows after `redirect_delay`.
    pub async fn create_app(&mut self) -> Option<String> {
        if self.submitting {
            return None;
        }
        if let Err(field) = self.form.validate() {
            self.notify_missing(field);
            return None;
        }

        self.submitting = true;
        let result = self
            .creator
            .create_app(CreateAppRequest::from_form(&self.form))
            .await;
        self.submitting = false;

        match result {
            Ok(app) => {
                self.emit(SessionEvent::AppListStale);
                self.notify(NoticeLevel::Success, CREATE_SUCCEEDED);
                self.emit(SessionEvent::Created {
                    app_id: app.id.clone(),
                });
                self.emit(SessionEvent::Closed);

                let events = self.events.clone();
                let delay = self.options.redirect_delay;
                let route = metadata_route(&app.id);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = events.send(SessionEvent::Navigate(route));
                });
                Some(app.id)
            }
            Err(e) => {
                error!("App creation failed: {e}");
                self.notify(NoticeLevel::Error, CREATE_FAILED);
                None
            }
        }
    }

    /// Close without creating anything.
    pub fn close(self) {
        if let Some(handle) = &self.abort {
            handle.abort();
        }
        self.emit(SessionEvent::Closed);
    }

    // --- Events ---

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn emit_steps(&self) {
        self.emit(SessionEvent::StepsChanged {
            current: self.steps.current(),
            finished: self.steps.is_finished(),
        });
    }

    fn notify(&self, level: NoticeLevel, message: &str) {
        self.emit(SessionEvent::Notify(Notification {
            level,
            message: message.to_string(),
        }));
    }

    fn notify_missing(&self, field: FormField) {
        warn!("Form incomplete: {field:?} missing");
        self.notify(NoticeLevel::Error, field.missing_message());
    }
}
