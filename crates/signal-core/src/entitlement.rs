use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Messaging-platform user identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Messaging-platform chat identity (private chat, group or channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Broadcast subscription for one chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub active: bool,
    pub expiry_date: NaiveDate,
}

impl Subscription {
    /// Whether the chat should receive signals on `today` (expiry day inclusive).
    pub fn is_live(&self, today: NaiveDate) -> bool {
        self.active && today <= self.expiry_date
    }
}

/// Interactive access rights for one allow-listed user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntitlement {
    pub expiry_date: NaiveDate,
    pub daily_limit: u32,
    #[serde(default)]
    pub used_today: u32,
    /// Day `used_today` was counted on. `None` for counters never stamped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_date: Option<NaiveDate>,
}

impl UserEntitlement {
    pub fn new(expiry_date: NaiveDate, daily_limit: u32) -> Self {
        Self {
            expiry_date,
            daily_limit,
            used_today: 0,
            usage_date: None,
        }
    }

    pub fn is_expired(&self, today: NaiveDate) -> bool {
        today > self.expiry_date
    }

    /// Usage counted against `today`, honoring the date-keyed reset.
    pub fn usage_on(&self, today: NaiveDate) -> u32 {
        match self.usage_date {
            Some(date) if date != today => 0,
            _ => self.used_today,
        }
    }

    /// Move the counter onto `today`, zeroing it if it belonged to another day.
    pub fn roll_to(&mut self, today: NaiveDate) {
        self.used_today = self.usage_on(today);
        self.usage_date = Some(today);
    }
}

/// Why an interactive request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenyReason {
    NotAuthorized,
    Expired,
    QuotaExceeded,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::NotAuthorized => write!(f, "not authorized"),
            DenyReason::Expired => write!(f, "subscription expired"),
            DenyReason::QuotaExceeded => write!(f, "daily limit reached"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}
