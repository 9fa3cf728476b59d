use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entitlement::{ChatId, Subscription, UserEntitlement, UserId};
use crate::error::SignalError;

/// Read/write access to allow-listed users.
pub trait EntitlementStore: Send + Sync {
    fn entitlement(&self, user: UserId) -> Result<Option<UserEntitlement>, SignalError>;

    fn save_entitlement(
        &self,
        user: UserId,
        entitlement: UserEntitlement,
    ) -> Result<(), SignalError>;
}

/// Read access to broadcast subscriptions.
pub trait SubscriptionStore: Send + Sync {
    /// All subscriptions, ordered by chat id.
    fn subscriptions(&self) -> Result<Vec<(ChatId, Subscription)>, SignalError>;
}

/// Allow-list and subscriptions as held in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotState {
    #[serde(default)]
    pub allowed_users: BTreeMap<UserId, UserEntitlement>,
    #[serde(default)]
    pub subscriptions: BTreeMap<ChatId, Subscription>,
}

/// Usage counter persisted per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct UsageRecord {
    used_today: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    usage_date: Option<NaiveDate>,
}

/// In-memory state with optional write-through of usage counters.
///
/// Entitlement terms and subscriptions always come from configuration. Only
/// `used_today`/`usage_date` are written to the usage file.
pub struct StateStore {
    usage_path: Option<PathBuf>,
    state: RwLock<BotState>,
}

impl StateStore {
    /// Store with no backing file. Usage is lost on exit.
    pub fn in_memory(state: BotState) -> Self {
        Self {
            usage_path: None,
            state: RwLock::new(state),
        }
    }

    /// Store seeded from `state`, overlaying counters from `usage_path` if it exists.
    pub fn open(usage_path: impl AsRef<Path>, mut state: BotState) -> Result<Self, SignalError> {
        let usage_path = usage_path.as_ref().to_path_buf();

        if usage_path.exists() {
            let contents = std::fs::read_to_string(&usage_path)?;
            let ledger: BTreeMap<UserId, UsageRecord> = serde_json::from_str(&contents)?;
            for (user, record) in ledger {
                if let Some(entitlement) = state.allowed_users.get_mut(&user) {
                    entitlement.used_today = record.used_today;
                    entitlement.usage_date = record.usage_date;
                } else {
                    debug!(%user, "dropping usage for user no longer allow-listed");
                }
            }
        }

        Ok(Self {
            usage_path: Some(usage_path),
            state: RwLock::new(state),
        })
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> BotState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn persist(&self, state: &BotState) -> Result<(), SignalError> {
        let Some(path) = &self.usage_path else {
            return Ok(());
        };

        let ledger: BTreeMap<UserId, UsageRecord> = state
            .allowed_users
            .iter()
            .map(|(user, e)| {
                (
                    *user,
                    UsageRecord {
                        used_today: e.used_today,
                        usage_date: e.usage_date,
                    },
                )
            })
            .collect();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        // Write beside the target and rename so readers never see a partial file.
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&ledger)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl EntitlementStore for StateStore {
    fn entitlement(&self, user: UserId) -> Result<Option<UserEntitlement>, SignalError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state.allowed_users.get(&user).cloned())
    }

    fn save_entitlement(
        &self,
        user: UserId,
        entitlement: UserEntitlement,
    ) -> Result<(), SignalError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.allowed_users.insert(user, entitlement);
        self.persist(&state)
    }
}

impl SubscriptionStore for StateStore {
    fn subscriptions(&self) -> Result<Vec<(ChatId, Subscription)>, SignalError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state
            .subscriptions
            .iter()
            .map(|(chat, sub)| (*chat, sub.clone()))
            .collect())
    }
}
