use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PhaseError;

/// The four analysis phases, in the order they are worked through.
/// The lowercase names double as the server-side session status strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKey {
    Requirements,
    Design,
    Features,
    Workflow,
}

impl StepKey {
    pub const ALL: [StepKey; 4] = [
        StepKey::Requirements,
        StepKey::Design,
        StepKey::Features,
        StepKey::Workflow,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Requirements => "requirements",
            Self::Design => "design",
            Self::Features => "features",
            Self::Workflow => "workflow",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Requirements => "Requirements Analysis",
            Self::Design => "Game Design",
            Self::Features => "Feature Breakdown",
            Self::Workflow => "Workflow Generation",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Requirements => "Understand the core idea, audience and goals",
            Self::Design => "Shape the game loop, world and progression",
            Self::Features => "Split the design into concrete features",
            Self::Workflow => "Turn the features into an application workflow",
        }
    }
}

impl fmt::Display for StepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "requirements" => Ok(Self::Requirements),
            "design" => Ok(Self::Design),
            "features" => Ok(Self::Features),
            "workflow" => Ok(Self::Workflow),
            other => Err(format!("unknown phase '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Pending,
    Current,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessStep {
    pub key: StepKey,
    pub title: &'static str,
    pub description: &'static str,
    pub status: StepStatus,
}

impl ProcessStep {
    fn new(key: StepKey) -> Self {
        Self {
            key,
            title: key.title(),
            description: key.description(),
            status: StepStatus::Pending,
        }
    }
}

/// Named inputs to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    /// The form was confirmed; the first phase begins.
    Start,
    /// The analyzer finished a phase. `reported` is the phase it claims to
    /// have finished, when it says so.
    Complete { reported: Option<StepKey> },
}

/// What an accepted event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Started(StepKey),
    Advanced { completed: StepKey, current: StepKey },
    Finished(StepKey),
}

/// Left-to-right phase state machine over [`StepKey::ALL`].
///
/// `cursor` is the index of the current step. It equals `steps.len()` once
/// every step is completed, and is `None` before `Start`. Everything left of
/// the cursor is completed and everything right of it is pending.
#[derive(Debug, Clone)]
pub struct StepTracker {
    steps: Vec<ProcessStep>,
    cursor: Option<usize>,
}

impl Default for StepTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StepTracker {
    pub fn new() -> Self {
        Self {
            steps: StepKey::ALL.into_iter().map(ProcessStep::new).collect(),
            cursor: None,
        }
    }

    pub fn steps(&self) -> &[ProcessStep] {
        &self.steps
    }

    pub fn current(&self) -> Option<StepKey> {
        self.cursor
            .and_then(|i| self.steps.get(i))
            .map(|step| step.key)
    }

    pub fn is_started(&self) -> bool {
        self.cursor.is_some()
    }

    pub fn is_finished(&self) -> bool {
        self.cursor == Some(self.steps.len())
    }

    pub fn apply(&mut self, event: PhaseEvent) -> Result<Transition, PhaseError> {
        match event {
            PhaseEvent::Start => self.start(),
            PhaseEvent::Complete { reported } => self.complete(reported),
        }
    }

    pub fn start(&mut self) -> Result<Transition, PhaseError> {
        if self.cursor.is_some() {
            return Err(PhaseError::AlreadyStarted);
        }
        self.cursor = Some(0);
        self.steps[0].status = StepStatus::Current;
        Ok(Transition::Started(self.steps[0].key))
    }

    /// Complete the current phase and make the next one current.
    /// A completion naming a different phase is rejected without any change.
    pub fn complete(&mut self, reported: Option<StepKey>) -> Result<Transition, PhaseError> {
        let index = match self.cursor {
            None => return Err(PhaseError::NotStarted),
            Some(i) if i >= self.steps.len() => return Err(PhaseError::Finished),
            Some(i) => i,
        };
        let current = self.steps[index].key;
        if let Some(reported) = reported {
            if reported != current {
                return Err(PhaseError::OutOfOrder { current, reported });
            }
        }

        self.steps[index].status = StepStatus::Completed;
        let next = index + 1;
        self.cursor = Some(next);
        match self.steps.get_mut(next) {
            Some(step) => {
                step.status = StepStatus::Current;
                Ok(Transition::Advanced {
                    completed: current,
                    current: step.key,
                })
            }
            None => Ok(Transition::Finished(current)),
        }
    }

    /// Back to all-pending.
    pub fn reset(&mut self) {
        for step in &mut self.steps {
            step.status = StepStatus::Pending;
        }
        self.cursor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statuses(tracker: &StepTracker) -> Vec<StepStatus> {
        tracker.steps().iter().map(|s| s.status).collect()
    }

    fn assert_well_formed(tracker: &StepTracker) {
        let s = statuses(tracker);
        let current = s.iter().filter(|st| **st == StepStatus::Current).count();
        assert!(current <= 1, "more than one current step: {s:?}");
        // completed* current? pending*
        let first_not_done = s
            .iter()
            .position(|st| *st != StepStatus::Completed)
            .unwrap_or(s.len());
        for st in &s[first_not_done..] {
            assert_ne!(*st, StepStatus::Completed, "gap in completed prefix: {s:?}");
        }
        for st in s.iter().skip(first_not_done + 1) {
            assert_eq!(*st, StepStatus::Pending, "non-pending after current: {s:?}");
        }
    }

    #[test]
    fn starts_all_pending() {
        let tracker = StepTracker::new();
        assert_eq!(statuses(&tracker), vec![StepStatus::Pending; 4]);
        assert_eq!(tracker.current(), None);
        assert!(!tracker.is_started());
    }

    #[test]
    fn start_makes_first_step_current() {
        let mut tracker = StepTracker::new();
        assert_eq!(
            tracker.start(),
            Ok(Transition::Started(StepKey::Requirements))
        );
        assert_eq!(tracker.current(), Some(StepKey::Requirements));
        assert_eq!(tracker.start(), Err(PhaseError::AlreadyStarted));
    }

    #[test]
    fn complete_before_start_is_rejected() {
        let mut tracker = StepTracker::new();
        assert_eq!(tracker.complete(None), Err(PhaseError::NotStarted));
        assert_eq!(statuses(&tracker), vec![StepStatus::Pending; 4]);
    }

    #[test]
    fn advances_one_step_per_completion() {
        let mut tracker = StepTracker::new();
        tracker.start().unwrap();
        assert_eq!(
            tracker.complete(None),
            Ok(Transition::Advanced {
                completed: StepKey::Requirements,
                current: StepKey::Design,
            })
        );
        assert_eq!(
            statuses(&tracker),
            vec![
                StepStatus::Completed,
                StepStatus::Current,
                StepStatus::Pending,
                StepStatus::Pending,
            ]
        );
    }

    #[test]
    fn last_completion_finishes_and_later_signals_are_ignored() {
        let mut tracker = StepTracker::new();
        tracker.start().unwrap();
        for _ in 0..3 {
            tracker.complete(None).unwrap();
        }
        assert_eq!(tracker.current(), Some(StepKey::Workflow));
        assert_eq!(
            tracker.complete(None),
            Ok(Transition::Finished(StepKey::Workflow))
        );
        assert!(tracker.is_finished());
        assert_eq!(tracker.current(), None);
        assert_eq!(tracker.complete(None), Err(PhaseError::Finished));
        assert_eq!(statuses(&tracker), vec![StepStatus::Completed; 4]);
    }

    #[test]
    fn out_of_order_completion_is_rejected_without_change() {
        let mut tracker = StepTracker::new();
        tracker.start().unwrap();
        let before = statuses(&tracker);
        assert_eq!(
            tracker.complete(Some(StepKey::Features)),
            Err(PhaseError::OutOfOrder {
                current: StepKey::Requirements,
                reported: StepKey::Features,
            })
        );
        assert_eq!(statuses(&tracker), before);
        assert!(tracker.complete(Some(StepKey::Requirements)).is_ok());
    }

    #[test]
    fn no_sequence_of_events_breaks_the_ordering() {
        let events = [
            PhaseEvent::Start,
            PhaseEvent::Complete { reported: None },
            PhaseEvent::Complete {
                reported: Some(StepKey::Design),
            },
            PhaseEvent::Complete {
                reported: Some(StepKey::Workflow),
            },
        ];
        // Every sequence of length 6 over the event alphabet.
        let total = events.len().pow(6);
        for mut n in 0..total {
            let mut tracker = StepTracker::new();
            let mut completed_before = 0;
            for _ in 0..6 {
                let event = events[n % events.len()];
                n /= events.len();
                let _ = tracker.apply(event);
                assert_well_formed(&tracker);
                let completed = statuses(&tracker)
                    .iter()
                    .filter(|s| **s == StepStatus::Completed)
                    .count();
                assert!(completed >= completed_before, "a completed step regressed");
                assert!(completed <= completed_before + 1, "a step was skipped");
                completed_before = completed;
            }
        }
    }

    #[test]
    fn reset_returns_to_pending() {
        let mut tracker = StepTracker::new();
        tracker.start().unwrap();
        tracker.complete(None).unwrap();
        tracker.reset();
        assert_eq!(statuses(&tracker), vec![StepStatus::Pending; 4]);
        assert!(!tracker.is_started());
    }

    #[test]
    fn step_keys_parse_server_status_strings() {
        assert_eq!("requirements".parse::<StepKey>(), Ok(StepKey::Requirements));
        assert_eq!(" Design ".parse::<StepKey>(), Ok(StepKey::Design));
        assert!("shipping".parse::<StepKey>().is_err());
        assert_eq!(StepKey::Workflow.to_string(), "workflow");
    }
}
