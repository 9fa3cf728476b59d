use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use serde::Deserialize;

use crate::entitlement::{ChatId, Subscription, UserEntitlement, UserId};
use crate::error::SignalError;
use crate::scorer::ScorerParams;
use crate::store::BotState;

/// Environment variable that overrides `telegram_token` from the file.
pub const TOKEN_ENV_VAR: &str = "TELEGRAM_TOKEN";

/// Bot configuration, loaded once at startup from a JSON file.
///
/// Upper-case keys from older config files (`PAIRS`, `SCORE_THRESHOLD`, ...)
/// are accepted as aliases.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    #[serde(default, alias = "TELEGRAM_TOKEN")]
    pub telegram_token: String,

    /// Display name shown in every message, e.g. `@owner`.
    pub owner_username: String,
    pub owner_user_id: UserId,
    pub channel_id: ChatId,

    #[serde(alias = "PAIRS")]
    pub pairs: Vec<String>,
    #[serde(alias = "TIMEFRAMES")]
    pub timeframes: Vec<String>,

    #[serde(default = "default_rsi_oversold", alias = "RSI_OVERSOLD")]
    pub rsi_oversold: f64,
    #[serde(default = "default_rsi_overbought", alias = "RSI_OVERBOUGHT")]
    pub rsi_overbought: f64,
    #[serde(alias = "SCORE_THRESHOLD")]
    pub score_threshold: u32,

    #[serde(default = "default_quote_asset")]
    pub quote_asset: String,
    #[serde(default = "default_candle_limit")]
    pub candle_limit: usize,
    #[serde(default = "default_broadcast_interval_secs")]
    pub broadcast_interval_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// IANA timezone that defines "today" for expiry and quota checks.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Where usage counters are persisted. In-memory only when absent.
    #[serde(default)]
    pub state_path: Option<PathBuf>,
    #[serde(default)]
    pub binance_base_url: Option<String>,

    #[serde(default)]
    pub allowed_users: BTreeMap<UserId, UserEntitlement>,
    #[serde(default)]
    pub subscriptions: BTreeMap<ChatId, Subscription>,
}

fn default_rsi_oversold() -> f64 {
    30.0
}

fn default_rsi_overbought() -> f64 {
    70.0
}

fn default_quote_asset() -> String {
    "USDT".to_string()
}

fn default_candle_limit() -> usize {
    100
}

fn default_broadcast_interval_secs() -> u64 {
    60
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl BotConfig {
    /// Read, apply the token env override, and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SignalError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let mut config: BotConfig = serde_json::from_str(&contents)?;
        config.apply_token_override(std::env::var(TOKEN_ENV_VAR).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate without consulting the environment.
    pub fn from_json_str(json: &str) -> Result<Self, SignalError> {
        let config: BotConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_token_override(&mut self, token: Option<String>) {
        if let Some(token) = token.map(|t| t.trim().to_string())
            && !token.is_empty()
        {
            self.telegram_token = token;
        }
    }

    pub fn validate(&self) -> Result<(), SignalError> {
        let invalid = |msg: String| Err(SignalError::InvalidConfig(msg));

        if self.pairs.is_empty() {
            return invalid("pairs must not be empty".into());
        }
        if self.timeframes.is_empty() {
            return invalid("timeframes must not be empty".into());
        }
        if let Some(dup) = first_duplicate(&self.pairs) {
            return invalid(format!("duplicate pair: {dup}"));
        }
        if let Some(dup) = first_duplicate(&self.timeframes) {
            return invalid(format!("duplicate timeframe: {dup}"));
        }
        if self.pairs.iter().any(|p| p.trim().is_empty()) {
            return invalid("pairs must not contain blank entries".into());
        }
        if !(0.0..=100.0).contains(&self.rsi_oversold)
            || !(0.0..=100.0).contains(&self.rsi_overbought)
        {
            return invalid("RSI thresholds must be within 0-100".into());
        }
        if self.rsi_oversold >= self.rsi_overbought {
            return invalid(format!(
                "rsi_oversold ({}) must be below rsi_overbought ({})",
                self.rsi_oversold, self.rsi_overbought
            ));
        }

        let min_candles = crate::scorer::SignalScorer::new(self.scorer_params()).min_candles();
        if self.candle_limit < min_candles {
            return invalid(format!(
                "candle_limit must be at least {min_candles}, got {}",
                self.candle_limit
            ));
        }
        if self.broadcast_interval_secs == 0 {
            return invalid("broadcast_interval_secs must be positive".into());
        }
        if self.request_timeout_secs == 0 {
            return invalid("request_timeout_secs must be positive".into());
        }
        if self.quote_asset.trim().is_empty() {
            return invalid("quote_asset must not be empty".into());
        }
        self.tz()?;
        Ok(())
    }

    /// The configured business timezone.
    pub fn tz(&self) -> Result<Tz, SignalError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| SignalError::InvalidConfig(format!("timezone '{}': {e}", self.timezone)))
    }

    /// Bot token, or an error when neither the file nor the environment set one.
    pub fn token(&self) -> Result<&str, SignalError> {
        if self.telegram_token.trim().is_empty() {
            return Err(SignalError::InvalidConfig(format!(
                "telegram_token is empty (set it in the config or {TOKEN_ENV_VAR})"
            )));
        }
        Ok(&self.telegram_token)
    }

    pub fn scorer_params(&self) -> ScorerParams {
        ScorerParams {
            rsi_oversold: self.rsi_oversold,
            rsi_overbought: self.rsi_overbought,
            ..ScorerParams::default()
        }
    }

    pub fn initial_state(&self) -> BotState {
        BotState {
            allowed_users: self.allowed_users.clone(),
            subscriptions: self.subscriptions.clone(),
        }
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_secs(self.broadcast_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn first_duplicate(values: &[String]) -> Option<&str> {
    let mut seen = HashSet::new();
    values
        .iter()
        .find(|v| !seen.insert(v.as_str()))
        .map(|v| v.as_str())
}
