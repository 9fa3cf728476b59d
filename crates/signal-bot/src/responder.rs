use std::sync::Arc;

use signal_core::clock::Clock;
use signal_core::entitlement::{ChatId, Decision, DenyReason, UserId};
use signal_core::error::SignalError;
use signal_core::gate::EntitlementGate;
use signal_core::scorer::ScoreResult;
use thiserror::Error;
use tracing::{info, warn};

use crate::messages;
use crate::selector::SignalSelector;
use crate::transport::{MessageHandle, MessageTransport, TransportError};

#[derive(Debug, Error)]
pub enum ResponderError {
    #[error("delivery failed: {0}")]
    Transport(#[from] TransportError),

    #[error("entitlement check failed: {0}")]
    Entitlement(#[from] SignalError),
}

/// Button pressed on the main keyboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    GetSignal,
    OwnerPanel,
    Unknown(String),
}

impl Action {
    pub fn parse(data: &str) -> Self {
        match data {
            messages::GET_SIGNAL_ACTION => Action::GetSignal,
            messages::OWNER_PANEL_ACTION => Action::OwnerPanel,
            other => Action::Unknown(other.to_string()),
        }
    }
}

/// Inbound user interaction, independent of the messaging platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    /// `/start` typed in a chat.
    Start { chat: ChatId, user: UserId },
    /// Inline button pressed on `message`.
    Button {
        callback_id: String,
        user: UserId,
        message: Option<MessageHandle>,
        action: Action,
    },
}

/// What the responder did for one interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Welcomed,
    Denied(DenyReason),
    Delivered(ScoreResult),
    NoSignal,
    Acknowledged,
}

/// Answers `/start` and "get signal" presses for a single user.
pub struct InteractiveResponder {
    gate: Arc<EntitlementGate>,
    selector: Arc<SignalSelector>,
    transport: Arc<dyn MessageTransport>,
    clock: Arc<dyn Clock>,
    owner_username: String,
}

impl InteractiveResponder {
    pub fn new(
        gate: Arc<EntitlementGate>,
        selector: Arc<SignalSelector>,
        transport: Arc<dyn MessageTransport>,
        clock: Arc<dyn Clock>,
        owner_username: impl Into<String>,
    ) -> Self {
        Self {
            gate,
            selector,
            transport,
            clock,
            owner_username: owner_username.into(),
        }
    }

    pub async fn handle(&self, interaction: Interaction) -> Result<Outcome, ResponderError> {
        match interaction {
            Interaction::Start { chat, user } => {
                let keyboard = messages::main_keyboard(self.gate.is_owner(user));
                self.transport
                    .send_text(
                        chat,
                        &messages::welcome(&self.owner_username),
                        Some(&keyboard),
                    )
                    .await?;
                Ok(Outcome::Welcomed)
            }
            Interaction::Button {
                callback_id,
                user,
                message,
                action: Action::GetSignal,
            } => self.get_signal(&callback_id, user, message).await,
            Interaction::Button {
                callback_id,
                user,
                action,
                ..
            } => {
                if action == Action::OwnerPanel && !self.gate.is_owner(user) {
                    let toast = messages::denial_toast(DenyReason::NotAuthorized);
                    self.transport
                        .answer_callback(&callback_id, Some(toast))
                        .await?;
                    return Ok(Outcome::Denied(DenyReason::NotAuthorized));
                }
                self.transport.answer_callback(&callback_id, None).await?;
                Ok(Outcome::Acknowledged)
            }
        }
    }

    async fn get_signal(
        &self,
        callback_id: &str,
        user: UserId,
        message: Option<MessageHandle>,
    ) -> Result<Outcome, ResponderError> {
        let decision = match self.gate.evaluate(user, self.clock.today()) {
            Ok(decision) => decision,
            Err(e) => {
                if let Err(answer_err) = self
                    .transport
                    .answer_callback(callback_id, Some(messages::TEMPORARY_FAILURE_TOAST))
                    .await
                {
                    warn!(%user, "failed to answer callback: {answer_err}");
                }
                return Err(e.into());
            }
        };

        if let Decision::Deny(reason) = decision {
            self.transport
                .answer_callback(callback_id, Some(messages::denial_toast(reason)))
                .await?;
            self.reply(user, message, &messages::denial(reason, &self.owner_username))
                .await?;
            return Ok(Outcome::Denied(reason));
        }

        // Stop the client-side spinner before the slow part.
        self.transport.answer_callback(callback_id, None).await?;

        let selection = self.selector.select_best().await;
        match selection.best {
            Some(best) => {
                info!(
                    %user,
                    pair = %best.pair,
                    timeframe = %best.timeframe,
                    confidence = best.confidence,
                    "delivering signal"
                );
                let text = messages::signal_reply(&best, &self.owner_username);
                self.reply(user, message, &text).await?;
                Ok(Outcome::Delivered(best))
            }
            None => {
                info!(%user, failures = selection.failures.len(), "no signal available");
                self.reply(user, message, &messages::no_signal(&self.owner_username))
                    .await?;
                Ok(Outcome::NoSignal)
            }
        }
    }

    /// Edit the originating message, or message the user directly if there is none.
    async fn reply(
        &self,
        user: UserId,
        message: Option<MessageHandle>,
        text: &str,
    ) -> Result<(), TransportError> {
        match message {
            Some(handle) => self.transport.edit_message(handle, text).await,
            None => self
                .transport
                .send_text(ChatId(user.0), text, None)
                .await
                .map(|_| ()),
        }
    }
}
