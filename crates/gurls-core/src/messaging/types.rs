use crate::domain::{ChatId, UserId};

/// Cross-messenger incoming update model.
///
/// Telegram-specific fields live in the Telegram adapter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncomingUpdate {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub event: InboundEvent,
}

/// What the user did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundEvent {
    /// `/name args...`; `name` is already lower-cased with any `@bot` suffix removed.
    Command { name: String, args: String },
    Text(String),
    /// Inline button press carrying its opaque token.
    Callback { callback_id: String, data: String },
}

impl InboundEvent {
    /// Build a command event from raw message text (`/cmd@botname arg1 ...`).
    pub fn parse_command(text: &str) -> Self {
        let mut parts = text.trim().splitn(2, char::is_whitespace);
        let first = parts.next().unwrap_or("").trim();
        let args = parts.next().unwrap_or("").trim().to_string();

        let name = first
            .trim_start_matches('/')
            .split('@')
            .next()
            .unwrap_or("")
            .to_lowercase();

        InboundEvent::Command { name, args }
    }
}

/// Inline keyboard: ordered rows of buttons.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(label: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            callback_data: callback_data.into(),
        }
    }
}

impl InlineKeyboard {
    pub fn row(mut self, buttons: Vec<InlineButton>) -> Self {
        self.rows.push(buttons);
        self
    }
}

/// One reply: plain text plus an optional keyboard.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,
    pub keyboard: Option<InlineKeyboard>,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
        }
    }

    pub fn with_keyboard(text: impl Into<String>, keyboard: InlineKeyboard) -> Self {
        Self {
            text: text.into(),
            keyboard: Some(keyboard),
        }
    }
}
