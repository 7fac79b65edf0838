//! Decoder for the analysis endpoint's `text/event-stream` body.
//!
//! Records are separated by a blank line. Only `data: ` records carry
//! anything; the payload is either the `[DONE]` sentinel or a JSON object.

use std::collections::VecDeque;

use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::transport::{AnalysisEvent, EventStream};

pub const DATA_PREFIX: &str = "data: ";
pub const DONE_SENTINEL: &str = "[DONE]";

/// One JSON record from the stream. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AnalysisPayload {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub complete: bool,
    /// Server-side phase of the session.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl AnalysisPayload {
    /// Split a record into events, in the order the session applies them.
    pub fn into_events(self) -> Vec<AnalysisEvent> {
        let mut events = Vec::new();
        if let Some(id) = self.session_id.filter(|id| !id.is_empty()) {
            events.push(AnalysisEvent::Session(id));
        }
        if let Some(error) = self.error {
            events.push(AnalysisEvent::Failed(error));
        }
        if let Some(content) = self.content.filter(|c| !c.is_empty()) {
            events.push(AnalysisEvent::Content(content));
        }
        if self.complete {
            let reported = self.status.as_deref().and_then(|s| s.parse().ok());
            events.push(AnalysisEvent::PhaseComplete { reported });
        }
        events
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseRecord {
    Payload(AnalysisPayload),
    Done,
}

/// Incremental record splitter.
///
/// Splitting works on bytes so a UTF-8 sequence cut between two network
/// chunks is put back together before decoding.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes held back waiting for a separator.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Feed one chunk; returns every actionable record it completed.
    ///
    /// Records end at a blank line, framed either `\n\n` or `\r\n\r\n`.
    /// Only the new bytes are scanned; the held-back tail was already
    /// searched on earlier calls.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseRecord> {
        let resume = self.buffer.len();
        self.buffer.extend_from_slice(chunk);

        let mut records = Vec::new();
        let mut start = 0;
        for i in resume..self.buffer.len() {
            if let Some(end) = record_end(&self.buffer, start, i) {
                if let Some(record) = parse_record(&self.buffer[start..end]) {
                    records.push(record);
                }
                start = i + 1;
            }
        }
        self.buffer.drain(..start);
        records
    }

    /// Decode whatever is left once the body has ended.
    pub fn finish(&mut self) -> Option<SseRecord> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        parse_record(&rest)
    }
}

/// When `buffer[i]` closes a blank line, the end of the record before it.
fn record_end(buffer: &[u8], start: usize, i: usize) -> Option<usize> {
    if buffer[i] != b'\n' {
        return None;
    }
    let mut j = i;
    if j > start && buffer[j - 1] == b'\r' {
        j -= 1;
    }
    (j > start && buffer[j - 1] == b'\n').then_some(j - 1)
}

fn parse_record(raw: &[u8]) -> Option<SseRecord> {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim_matches(|c| c == '\r' || c == '\n');
    if text.is_empty() {
        return None;
    }

    let Some(data) = text.strip_prefix(DATA_PREFIX) else {
        debug!("Ignoring non-data stream record: {text:?}");
        return None;
    };

    if data.trim() == DONE_SENTINEL {
        return Some(SseRecord::Done);
    }

    match serde_json::from_str::<AnalysisPayload>(data) {
        Ok(payload) => Some(SseRecord::Payload(payload)),
        Err(e) => {
            warn!("Skipping malformed stream record: {e}");
            None
        }
    }
}

// --- Byte stream -> event stream ---

struct DecodeState<S> {
    body: std::pin::Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<AnalysisEvent, TransportError>>,
    finished: bool,
}

impl<S> DecodeState<S> {
    fn enqueue(&mut self, record: SseRecord) {
        if self.finished {
            return;
        }
        match record {
            SseRecord::Done => self.finished = true,
            SseRecord::Payload(payload) => {
                self.pending
                    .extend(payload.into_events().into_iter().map(Ok));
            }
        }
    }
}

/// Turn a response body into analysis events.
///
/// The stream ends at `[DONE]`, at the end of the body, or after the first
/// transport error (which is yielded as the last item). Dropping the stream
/// drops the body.
pub fn decode_events<S, B, E>(body: S) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<TransportError> + Send + 'static,
{
    let state = DecodeState {
        body: Box::pin(body),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    for record in state.decoder.push(chunk.as_ref()) {
                        state.enqueue(record);
                    }
                }
                Some(Err(e)) => {
                    state.pending.push_back(Err(e.into()));
                    state.finished = true;
                }
                None => {
                    if let Some(record) = state.decoder.finish() {
                        state.enqueue(record);
                    }
                    state.finished = true;
                }
            }
        }
    })
    .boxed()
}
