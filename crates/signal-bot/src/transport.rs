use async_trait::async_trait;
use signal_core::entitlement::ChatId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({}): {description}", code_label(.code))]
    Api {
        code: Option<i64>,
        description: String,
    },

    #[error("Parse error: {0}")]
    Parse(String),
}

fn code_label(code: &Option<i64>) -> String {
    code.map_or_else(|| "?".to_string(), |c| c.to_string())
}

/// A delivered message that can later be edited in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageHandle {
    pub chat: ChatId,
    pub message_id: i64,
}

/// Inline button; `action` comes back verbatim when it is pressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub action: String,
}

impl Button {
    pub fn new(label: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: action.into(),
        }
    }
}

/// Inline keyboard attached to a message, one `Vec` per row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn row(mut self, buttons: Vec<Button>) -> Self {
        self.rows.push(buttons);
        self
    }

    pub fn actions(&self) -> Vec<&str> {
        self.rows
            .iter()
            .flatten()
            .map(|b| b.action.as_str())
            .collect()
    }
}

/// Delivery of text messages to chats.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Send a new message, optionally with an inline keyboard.
    async fn send_text(
        &self,
        chat: ChatId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageHandle, TransportError>;

    /// Replace the text of a previously sent message.
    async fn edit_message(&self, handle: MessageHandle, text: &str) -> Result<(), TransportError>;

    /// Acknowledge a button press, optionally with a short ephemeral notice.
    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), TransportError>;
}
