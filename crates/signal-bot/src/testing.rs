//! Test doubles shared by the unit tests of this crate.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use signal_core::candle::Candle;
use signal_core::entitlement::ChatId;
use signal_providers::error::ProviderError;
use signal_providers::provider::CandleProvider;

use crate::transport::{Keyboard, MessageHandle, MessageTransport, TransportError};

pub fn candles(closes: &[f64]) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Candle {
            timestamp: start + chrono::Duration::minutes(i as i64),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        })
        .collect()
}

/// Straight line up: RSI saturates, scores 75.
pub fn rising_closes(n: usize) -> Vec<f64> {
    (0..n).map(|i| 100.0 + i as f64).collect()
}

/// Straight line down: oversold only, scores 25.
pub fn falling_closes(n: usize) -> Vec<f64> {
    (0..n).map(|i| 500.0 - i as f64).collect()
}

/// No movement: RSI saturates, scores 25.
pub fn flat_closes(n: usize) -> Vec<f64> {
    vec![100.0; n]
}

/// Alternating steps where the last step is `last`, the one before `other`.
fn alternating(n: usize, last: f64, other: f64) -> Vec<f64> {
    let mut closes = vec![100.0];
    for i in 1..n {
        let step = if (n - 1 - i) % 2 == 0 { last } else { other };
        closes.push(closes[i - 1] + step);
    }
    closes
}

/// Uptrend in +2/-1.5 steps ending on an up step: scores 50.
pub fn zigzag_closes(n: usize) -> Vec<f64> {
    alternating(n, 2.0, -1.5)
}

/// Downtrend in -2/+1.5 steps ending on a down step: scores 0.
pub fn pullback_closes(n: usize) -> Vec<f64> {
    alternating(n, -2.0, 1.5)
}

/// Provider serving canned closes per pair/timeframe.
#[derive(Default)]
pub struct StaticProvider {
    data: HashMap<(String, String), Vec<f64>>,
    delays: HashMap<(String, String), Duration>,
}

impl StaticProvider {
    pub fn with(mut self, pair: &str, timeframe: &str, closes: Vec<f64>) -> Self {
        self.data.insert((pair.into(), timeframe.into()), closes);
        self
    }

    pub fn with_delay(mut self, pair: &str, timeframe: &str, delay: Duration) -> Self {
        self.delays.insert((pair.into(), timeframe.into()), delay);
        self
    }
}

#[async_trait]
impl CandleProvider for StaticProvider {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch_candles(
        &self,
        pair: &str,
        timeframe: &str,
        _limit: usize,
    ) -> Result<Vec<Candle>, ProviderError> {
        let key = (pair.to_string(), timeframe.to_string());
        if let Some(delay) = self.delays.get(&key) {
            tokio::time::sleep(*delay).await;
        }
        self.data
            .get(&key)
            .map(|closes| candles(closes))
            .ok_or_else(|| ProviderError::Api {
                status: 400,
                message: format!("Invalid symbol {pair}"),
            })
    }
}

/// What a transport call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text {
        chat: ChatId,
        text: String,
        keyboard: Option<Keyboard>,
    },
    Edit {
        handle: MessageHandle,
        text: String,
    },
    Callback {
        id: String,
        text: Option<String>,
    },
}

/// Transport that records every call and can fail for chosen chats.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    failing_chats: HashSet<ChatId>,
}

impl RecordingTransport {
    pub fn failing_for(chats: &[ChatId]) -> Self {
        Self {
            sent: Mutex::default(),
            failing_chats: chats.iter().copied().collect(),
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts_to(&self, chat: ChatId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { chat: c, text, .. } if c == chat => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn edits(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Edit { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn callback_answers(&self) -> Vec<Option<String>> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Callback { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl MessageTransport for RecordingTransport {
    async fn send_text(
        &self,
        chat: ChatId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageHandle, TransportError> {
        if self.failing_chats.contains(&chat) {
            return Err(TransportError::Api {
                code: Some(403),
                description: "Forbidden: bot was blocked by the user".into(),
            });
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(Sent::Text {
            chat,
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(MessageHandle {
            chat,
            message_id: sent.len() as i64,
        })
    }

    async fn edit_message(&self, handle: MessageHandle, text: &str) -> Result<(), TransportError> {
        if self.failing_chats.contains(&handle.chat) {
            return Err(TransportError::Api {
                code: Some(400),
                description: "Bad Request: message to edit not found".into(),
            });
        }
        self.sent.lock().unwrap().push(Sent::Edit {
            handle,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(Sent::Callback {
            id: callback_id.to_string(),
            text: text.map(str::to_string),
        });
        Ok(())
    }
}
