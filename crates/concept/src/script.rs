use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Local;
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use tracing::debug;

use crate::config::SessionConfig;
use crate::error::TransportError;
use crate::steps::StepKey;
use crate::transport::{
    AnalysisEvent, AnalysisRequest, AnalysisTransport, EventStream, SessionInfo,
};

/// Reply once every phase is done.
pub const WRAP_UP_REPLY: &str = "All four phases are complete. Review the summary above and \
     confirm when you are ready to create the app.";

/// Canned analyzer reply for a phase.
pub fn canned_reply(phase: StepKey) -> &'static str {
    match phase {
        StepKey::Requirements => {
            "Thanks! I've captured the core idea: who the player is, what they are trying \
             to achieve and the main loop that keeps them playing. Next I'll shape the game design."
        }
        StepKey::Design => {
            "Here is a first design pass: a short onboarding area, a hub the player returns \
             to between runs, and difficulty that ramps with each region. Next I'll break this \
             into features."
        }
        StepKey::Features => {
            "Feature breakdown: character creation, inventory, a quest log, save slots and a \
             settings menu. Each one maps to a screen or a background system. Next I'll turn \
             these into a workflow."
        }
        StepKey::Workflow => {
            "Workflow drafted: player input flows through intent detection, then the game \
             state update, then narration of the result. The concept is ready to be created."
        }
    }
}

struct LocalSession {
    status: StepKey,
    inputs: Vec<String>,
    created_at: String,
    updated_at: String,
}

fn timestamp() -> String {
    Local::now().format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// Offline stand-in for the analysis service.
///
/// Each turn waits `step_delay`, streams the canned reply for the phase in
/// progress a few words at a time, then reports that phase complete.
pub struct ScriptedTransport {
    step_delay: Duration,
    chunk_words: usize,
    next_id: AtomicU64,
    sessions: Mutex<HashMap<String, LocalSession>>,
}

impl ScriptedTransport {
    pub fn new(step_delay: Duration, chunk_words: usize) -> Self {
        Self {
            step_delay,
            chunk_words: chunk_words.max(1),
            next_id: AtomicU64::new(1),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            Duration::from_millis(config.step_delay_ms),
            config.chunk_words,
        )
    }

    fn open_session(&self, requested: Option<String>) -> (String, bool) {
        let mut sessions = self.sessions.lock();
        if let Some(id) = requested.filter(|id| sessions.contains_key(id)) {
            return (id, false);
        }
        let id = format!("local-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let now = timestamp();
        sessions.insert(
            id.clone(),
            LocalSession {
                status: StepKey::Requirements,
                inputs: Vec::new(),
                created_at: now.clone(),
                updated_at: now,
            },
        );
        (id, true)
    }

    fn fragments(&self, text: &str) -> Vec<String> {
        let words: Vec<&str> = text.split_inclusive(' ').collect();
        words
            .chunks(self.chunk_words)
            .map(|chunk| chunk.concat())
            .collect()
    }
}

impl AnalysisTransport for ScriptedTransport {
    async fn submit(&self, request: AnalysisRequest) -> Result<EventStream, TransportError> {
        let (session_id, created) = self.open_session(request.session_id);
        if let Some(session) = self.sessions.lock().get_mut(&session_id) {
            session.inputs.push(request.input);
            session.updated_at = timestamp();
        }
        debug!("Scripted turn for {session_id} in phase {:?}", request.phase);

        let mut events = Vec::new();
        if created {
            events.push(AnalysisEvent::Session(session_id));
        }
        let text = request.phase.map(canned_reply).unwrap_or(WRAP_UP_REPLY);
        events.extend(self.fragments(text).into_iter().map(AnalysisEvent::Content));
        if let Some(phase) = request.phase {
            events.push(AnalysisEvent::PhaseComplete {
                reported: Some(phase),
            });
        }

        let delay = self.step_delay;
        Ok(stream::once(async move {
            tokio::time::sleep(delay).await;
            stream::iter(events.into_iter().map(Ok))
        })
        .flatten()
        .boxed())
    }

    async fn fetch_session(&self, session_id: &str) -> Result<SessionInfo, TransportError> {
        let sessions = self.sessions.lock();
        let session = sessions
            .get(session_id)
            .ok_or_else(|| TransportError::from_status(404))?;
        Ok(SessionInfo {
            session_id: session_id.to_string(),
            status: session.status.to_string(),
            data: serde_json::json!({ "inputs": session.inputs }),
            created_at: Some(session.created_at.clone()),
            updated_at: Some(session.updated_at.clone()),
        })
    }

    async fn update_status(&self, session_id: &str, phase: StepKey) -> Result<(), TransportError> {
        let mut sessions = self.sessions.lock();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| TransportError::from_status(404))?;
        session.status = phase;
        session.updated_at = timestamp();
        Ok(())
    }

    async fn discard_session(&self, session_id: &str) -> Result<(), TransportError> {
        match self.sessions.lock().remove(session_id) {
            Some(_) => Ok(()),
            None => Err(TransportError::from_status(404)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(input: &str, session_id: Option<&str>, phase: Option<StepKey>) -> AnalysisRequest {
        AnalysisRequest {
            input: input.into(),
            session_id: session_id.map(String::from),
            phase,
        }
    }

    async fn run(t: &ScriptedTransport, req: AnalysisRequest) -> Vec<AnalysisEvent> {
        t.submit(req)
            .await
            .unwrap()
            .map(|e| e.unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn first_turn_opens_a_session_and_completes_the_phase() {
        let t = ScriptedTransport::new(Duration::ZERO, 4);
        let events = run(&t, request("Make an RPG", None, Some(StepKey::Requirements))).await;

        assert_eq!(events[0], AnalysisEvent::Session("local-1".into()));
        assert_eq!(
            events.last(),
            Some(&AnalysisEvent::PhaseComplete {
                reported: Some(StepKey::Requirements)
            })
        );
        let text: String = events
            .iter()
            .filter_map(|e| match e {
                AnalysisEvent::Content(c) => Some(c.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, canned_reply(StepKey::Requirements));
    }

    #[tokio::test(start_paused = true)]
    async fn reply_waits_for_the_step_delay() {
        let t = ScriptedTransport::new(Duration::from_millis(1500), 4);
        let started = tokio::time::Instant::now();
        let mut events = t
            .submit(request("Make an RPG", None, Some(StepKey::Requirements)))
            .await
            .unwrap();

        let early = tokio::time::timeout(Duration::from_millis(1400), events.next()).await;
        assert!(early.is_err(), "reply arrived before the step delay");

        let first = events.next().await.unwrap().unwrap();
        assert_eq!(first, AnalysisEvent::Session("local-1".into()));
        assert!(started.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn known_session_is_reused_without_a_new_id() {
        let t = ScriptedTransport::new(Duration::ZERO, 50);
        run(&t, request("one", None, Some(StepKey::Requirements))).await;
        let events = run(&t, request("two", Some("local-1"), Some(StepKey::Design))).await;
        assert!(!events
            .iter()
            .any(|e| matches!(e, AnalysisEvent::Session(_))));

        let info = t.fetch_session("local-1").await.unwrap();
        assert_eq!(info.data, serde_json::json!({ "inputs": ["one", "two"] }));
    }

    #[tokio::test]
    async fn finished_tracker_gets_wrap_up_without_completion() {
        let t = ScriptedTransport::new(Duration::ZERO, 100);
        let events = run(&t, request("anything else?", None, None)).await;
        assert!(events.contains(&AnalysisEvent::Content(WRAP_UP_REPLY.into())));
        assert!(!events
            .iter()
            .any(|e| matches!(e, AnalysisEvent::PhaseComplete { .. })));
    }

    #[tokio::test]
    async fn session_status_and_discard() {
        let t = ScriptedTransport::new(Duration::ZERO, 8);
        run(&t, request("x", None, Some(StepKey::Requirements))).await;
        t.update_status("local-1", StepKey::Design).await.unwrap();
        assert_eq!(
            t.fetch_session("local-1").await.unwrap().phase(),
            Some(StepKey::Design)
        );
        t.discard_session("local-1").await.unwrap();
        assert!(matches!(
            t.fetch_session("local-1").await,
            Err(TransportError::Status { code: 404, .. })
        ));
    }
}
