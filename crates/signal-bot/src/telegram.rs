use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use signal_core::entitlement::{ChatId, UserId};

use crate::responder::{Action, Interaction};
use crate::transport::{Keyboard, MessageHandle, MessageTransport, TransportError};

const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Telegram Bot API client.
/// The token is part of every request URL, so HTTP errors are stripped of
/// their URL before being returned.
pub struct TelegramClient {
    client: Client,
    base_url: String,
}

impl TelegramClient {
    /// Create a client; every call except long polling is bounded by `timeout`.
    pub fn new(token: &str, timeout: Duration) -> Result<Self, TransportError> {
        Self::with_api_url(token, timeout, TELEGRAM_API_URL)
    }

    /// Create with a custom API root (for testing or a local Bot API server).
    pub fn with_api_url(
        token: &str,
        timeout: Duration,
        api_url: &str,
    ) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<T, TransportError> {
        let mut request = self
            .client
            .post(format!("{}/{method}", self.base_url))
            .json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| e.without_url())?;
        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| TransportError::Parse(format!("{method}: {}", e.without_url())))?;
        envelope.into_result()
    }

    /// Verify the token by asking who the bot is.
    pub async fn get_me(&self) -> Result<User, TransportError> {
        self.call("getMe", &json!({}), None).await
    }

    /// Long-poll for updates after `offset`, waiting up to `poll_secs` on the server.
    pub async fn get_updates(
        &self,
        offset: i64,
        poll_secs: u64,
    ) -> Result<Vec<Update>, TransportError> {
        let body = json!({
            "offset": offset,
            "timeout": poll_secs,
            "allowed_updates": ["message", "callback_query"],
        });
        // Leave headroom above the server-side wait.
        let timeout = Duration::from_secs(poll_secs + 10);
        self.call("getUpdates", &body, Some(timeout)).await
    }
}

/// `{ok, result, description, error_code}` wrapper around every Bot API reply.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> Result<T, TransportError> {
        if !self.ok {
            return Err(TransportError::Api {
                code: self.error_code,
                description: self.description.unwrap_or_else(|| "unknown error".into()),
            });
        }
        self.result
            .ok_or_else(|| TransportError::Parse("ok response without result".into()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<Message>,
    pub data: Option<String>,
}

#[derive(Debug, Serialize)]
struct InlineButton<'a> {
    text: &'a str,
    callback_data: &'a str,
}

fn reply_markup(keyboard: &Keyboard) -> serde_json::Value {
    let rows: Vec<Vec<InlineButton<'_>>> = keyboard
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| InlineButton {
                    text: &b.label,
                    callback_data: &b.action,
                })
                .collect()
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

fn is_start_command(text: &str) -> bool {
    let Some(command) = text.split_whitespace().next() else {
        return false;
    };
    // `/start@SomeBot` is how commands arrive in groups.
    command == "/start" || command.starts_with("/start@")
}

/// Translate a raw update into an interaction the responder understands.
/// Returns `None` for updates the bot ignores.
pub fn interaction(update: &Update) -> Option<Interaction> {
    if let Some(query) = &update.callback_query {
        return Some(Interaction::Button {
            callback_id: query.id.clone(),
            user: UserId(query.from.id),
            message: query.message.as_ref().map(|m| MessageHandle {
                chat: ChatId(m.chat.id),
                message_id: m.message_id,
            }),
            action: Action::parse(query.data.as_deref().unwrap_or_default()),
        });
    }

    let message = update.message.as_ref()?;
    let from = message.from.as_ref()?;
    if is_start_command(message.text.as_deref()?) {
        return Some(Interaction::Start {
            chat: ChatId(message.chat.id),
            user: UserId(from.id),
        });
    }
    None
}

#[async_trait]
impl MessageTransport for TelegramClient {
    async fn send_text(
        &self,
        chat: ChatId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageHandle, TransportError> {
        let mut body = json!({ "chat_id": chat.0, "text": text });
        if let Some(keyboard) = keyboard {
            body["reply_markup"] = reply_markup(keyboard);
        }
        let sent: Message = self.call("sendMessage", &body, None).await?;
        Ok(MessageHandle {
            chat: ChatId(sent.chat.id),
            message_id: sent.message_id,
        })
    }

    async fn edit_message(&self, handle: MessageHandle, text: &str) -> Result<(), TransportError> {
        let body = json!({
            "chat_id": handle.chat.0,
            "message_id": handle.message_id,
            "text": text,
        });
        // Result is the edited Message, or `true` for inline messages.
        let _: serde_json::Value = self.call("editMessageText", &body, None).await?;
        Ok(())
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), TransportError> {
        let mut body = json!({ "callback_query_id": callback_id });
        if let Some(text) = text {
            body["text"] = json!(text);
        }
        let _: bool = self.call("answerCallbackQuery", &body, None).await?;
        Ok(())
    }
}
