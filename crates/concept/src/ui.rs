//! Plain-text rendering of session state for terminal front-ends.

use std::fmt::Write;

use crate::session::{NoticeLevel, Notification};
use crate::state::{ChatMessage, ConceptForm, MessageRole};
use crate::steps::{ProcessStep, StepStatus};

pub const USER_LABEL: &str = "You";
pub const ASSISTANT_LABEL: &str = "Designer";
pub const LOADING_TEXT: &str = "Analyzing...";

pub fn role_label(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => USER_LABEL,
        MessageRole::Assistant => ASSISTANT_LABEL,
    }
}

fn badge(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Completed => "[x]",
        StepStatus::Current => "[>]",
        StepStatus::Pending => "[ ]",
    }
}

/// One line per step: badge, number, title and description.
pub fn render_steps(steps: &[ProcessStep]) -> String {
    let mut out = String::new();
    for (i, step) in steps.iter().enumerate() {
        let _ = writeln!(
            out,
            "{} {}. {} - {}",
            badge(step.status),
            i + 1,
            step.title,
            step.description
        );
    }
    out
}

pub fn render_message(message: &ChatMessage) -> String {
    let label = role_label(message.role);
    if message.is_loading {
        format!("{label}: {LOADING_TEXT}")
    } else {
        format!("{label}: {}", message.content)
    }
}

pub fn render_transcript(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(render_message)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Summary of the form. The requirements are marked locked when frozen.
pub fn render_form(form: &ConceptForm, requirements_frozen: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Name:         {}", form.name);
    let background = form.icon.background.as_deref().unwrap_or("none");
    let _ = writeln!(
        out,
        "Icon:         {} ({}, background {background})",
        form.icon.icon,
        form.icon.icon_type.as_str()
    );
    let lock = if requirements_frozen { " (locked)" } else { "" };
    let _ = writeln!(out, "Requirements{lock}:");
    for line in form.requirements.lines() {
        let _ = writeln!(out, "  {line}");
    }
    out
}

pub fn render_notification(notice: &Notification) -> String {
    let prefix = match notice.level {
        NoticeLevel::Success => "ok",
        NoticeLevel::Error => "error",
    };
    format!("[{prefix}] {}", notice.message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::{StepKey, StepTracker};

    #[test]
    fn steps_show_progress_badges() {
        let mut tracker = StepTracker::new();
        tracker.start().unwrap();
        tracker.complete(Some(StepKey::Requirements)).unwrap();

        let text = render_steps(tracker.steps());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("[x] 1. Requirements Analysis"));
        assert!(lines[1].starts_with("[>] 2. Game Design"));
        assert!(lines[2].starts_with("[ ] 3."));
        assert!(lines[3].starts_with("[ ] 4. Workflow Generation"));
    }

    #[test]
    fn placeholder_renders_as_loading() {
        let messages = vec![ChatMessage::user("Make an RPG"), ChatMessage::placeholder()];
        assert_eq!(
            render_transcript(&messages),
            "You: Make an RPG\n\nDesigner: Analyzing..."
        );
    }

    #[test]
    fn form_marks_frozen_requirements() {
        let form = ConceptForm {
            name: "Dungeon".into(),
            requirements: "Rooms\nLoot".into(),
            ..ConceptForm::default()
        };
        let text = render_form(&form, true);
        assert!(text.contains("Name:         Dungeon"));
        assert!(text.contains("Requirements (locked):\n  Rooms\n  Loot\n"));
        assert!(text.contains("🎮 (emoji, background #FFEAD5)"));
        assert!(!render_form(&form, false).contains("locked"));
    }

    #[test]
    fn notification_prefix_follows_level() {
        let notice = Notification {
            level: NoticeLevel::Error,
            message: "Please enter a name for your game app.".into(),
        };
        assert_eq!(
            render_notification(&notice),
            "[error] Please enter a name for your game app."
        );
    }
}
