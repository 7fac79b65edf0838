use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    /// Placeholder shown while a reply is pending.
    pub is_loading: bool,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            is_loading: false,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            is_loading: false,
        }
    }

    pub fn placeholder() -> Self {
        Self {
            role: MessageRole::Assistant,
            content: String::new(),
            is_loading: true,
        }
    }
}

/// Ordered chat turns. Append-only apart from overwriting a reply in place.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append a message and return its index.
    pub fn push(&mut self, message: ChatMessage) -> usize {
        self.messages.push(message);
        self.messages.len() - 1
    }

    /// Overwrite the assistant message at `index` and clear its loading flag.
    /// Returns false when there is no assistant message there.
    pub fn write(&mut self, index: usize, content: &str) -> bool {
        match self.messages.get_mut(index) {
            Some(msg) if msg.role == MessageRole::Assistant => {
                msg.content.clear();
                msg.content.push_str(content);
                msg.is_loading = false;
                true
            }
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IconType {
    Emoji,
    Image,
}

impl IconType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Emoji => "emoji",
            Self::Image => "image",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppIconSelection {
    #[serde(default = "default_icon_type")]
    pub icon_type: IconType,
    #[serde(default = "default_icon")]
    pub icon: String,
    #[serde(default = "default_icon_background")]
    pub background: Option<String>,
}

fn default_icon_type() -> IconType { IconType::Emoji }
fn default_icon() -> String { "🎮".into() }
fn default_icon_background() -> Option<String> { Some("#FFEAD5".into()) }

impl Default for AppIconSelection {
    fn default() -> Self {
        Self {
            icon_type: default_icon_type(),
            icon: default_icon(),
            background: default_icon_background(),
        }
    }
}

/// Required form fields, in the order they are validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    Name,
    Requirements,
}

impl FormField {
    /// User-facing message for a missing field.
    pub fn missing_message(self) -> &'static str {
        match self {
            Self::Name => "Please enter a name for your game app.",
            Self::Requirements => "Please describe your game requirements.",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConceptForm {
    pub name: String,
    pub requirements: String,
    pub icon: AppIconSelection,
    /// Form panel folded away after confirmation.
    pub collapsed: bool,
}

impl ConceptForm {
    /// First missing field wins.
    pub fn validate(&self) -> Result<(), FormField> {
        if self.name.trim().is_empty() {
            return Err(FormField::Name);
        }
        if self.requirements.trim().is_empty() {
            return Err(FormField::Requirements);
        }
        Ok(())
    }
}

// --- Composer ---

/// Key input the composer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposerKey {
    Char(char),
    Backspace,
    /// `modifier` is Shift/Ctrl/Alt held with Enter.
    Enter { modifier: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposerAction {
    Edited,
    /// Plain Enter on non-blank input. Carries the text; the buffer is kept
    /// until the session accepts the turn.
    Submit(String),
    Ignored,
}

#[derive(Debug, Clone, Default)]
pub struct Composer {
    buffer: String,
}

impl Composer {
    pub fn text(&self) -> &str {
        &self.buffer
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn handle_key(&mut self, key: ComposerKey) -> ComposerAction {
        match key {
            ComposerKey::Char(c) => {
                self.buffer.push(c);
                ComposerAction::Edited
            }
            ComposerKey::Backspace => match self.buffer.pop() {
                Some(_) => ComposerAction::Edited,
                None => ComposerAction::Ignored,
            },
            ComposerKey::Enter { modifier: true } => {
                self.buffer.push('\n');
                ComposerAction::Edited
            }
            ComposerKey::Enter { modifier: false } => {
                if self.buffer.trim().is_empty() {
                    ComposerAction::Ignored
                } else {
                    ComposerAction::Submit(self.buffer.clone())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_text(composer: &mut Composer, text: &str) {
        for c in text.chars() {
            composer.handle_key(ComposerKey::Char(c));
        }
    }

    #[test]
    fn enter_submits_and_modifier_enter_inserts_newline() {
        let mut composer = Composer::default();
        type_text(&mut composer, "a castle");
        assert_eq!(
            composer.handle_key(ComposerKey::Enter { modifier: true }),
            ComposerAction::Edited
        );
        type_text(&mut composer, "with dragons");
        assert_eq!(
            composer.handle_key(ComposerKey::Enter { modifier: false }),
            ComposerAction::Submit("a castle\nwith dragons".into())
        );
    }

    #[test]
    fn enter_on_blank_input_is_ignored() {
        let mut composer = Composer::default();
        type_text(&mut composer, "  \t ");
        assert_eq!(
            composer.handle_key(ComposerKey::Enter { modifier: false }),
            ComposerAction::Ignored
        );
        assert_eq!(composer.text(), "  \t ");
    }

    #[test]
    fn backspace_on_empty_buffer_is_ignored() {
        let mut composer = Composer::default();
        assert_eq!(
            composer.handle_key(ComposerKey::Backspace),
            ComposerAction::Ignored
        );
        type_text(&mut composer, "ab");
        composer.handle_key(ComposerKey::Backspace);
        assert_eq!(composer.text(), "a");
    }

    #[test]
    fn form_validation_reports_name_before_requirements() {
        let mut form = ConceptForm::default();
        assert_eq!(form.validate(), Err(FormField::Name));
        form.requirements = "a roguelike".into();
        assert_eq!(form.validate(), Err(FormField::Name));
        form.name = "Dungeon".into();
        form.requirements = "   ".into();
        assert_eq!(form.validate(), Err(FormField::Requirements));
        form.requirements = "a roguelike".into();
        assert_eq!(form.validate(), Ok(()));
    }

    #[test]
    fn write_only_touches_assistant_messages() {
        let mut transcript = Transcript::default();
        let user = transcript.push(ChatMessage::user("hi"));
        let reply = transcript.push(ChatMessage::placeholder());
        assert!(!transcript.write(user, "nope"));
        assert!(transcript.write(reply, "hello"));
        assert!(!transcript.write(42, "nope"));
        assert_eq!(transcript.messages()[0].content, "hi");
        assert_eq!(transcript.messages()[1], ChatMessage::assistant("hello"));
    }

    #[test]
    fn default_icon_is_the_game_emoji() {
        let icon = AppIconSelection::default();
        assert_eq!(icon.icon_type, IconType::Emoji);
        assert_eq!(icon.icon, "🎮");
        assert_eq!(icon.background.as_deref(), Some("#FFEAD5"));
    }
}
