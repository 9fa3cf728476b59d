use std::sync::{Arc, Mutex, PoisonError};

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::entitlement::{Decision, DenyReason, UserId};
use crate::error::SignalError;
use crate::store::EntitlementStore;

/// Decides whether a user may request a signal and counts the usage.
///
/// Checks run in a fixed order: owner bypass, allow-list, expiry, daily quota.
/// The read-check-increment sequence is serialized so concurrent requests
/// never lose an increment.
pub struct EntitlementGate {
    owner: UserId,
    store: Arc<dyn EntitlementStore>,
    write_lock: Mutex<()>,
}

impl EntitlementGate {
    pub fn new(owner: UserId, store: Arc<dyn EntitlementStore>) -> Self {
        Self {
            owner,
            store,
            write_lock: Mutex::new(()),
        }
    }

    pub fn owner(&self) -> UserId {
        self.owner
    }

    pub fn is_owner(&self, user: UserId) -> bool {
        user == self.owner
    }

    /// Evaluate a request from `user` on `today`.
    ///
    /// On `Allow` for a non-owner, `used_today` is incremented exactly once and
    /// written back to the store before returning.
    pub fn evaluate(&self, user: UserId, today: NaiveDate) -> Result<Decision, SignalError> {
        if self.is_owner(user) {
            debug!(%user, "owner bypass");
            return Ok(Decision::Allow);
        }

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(mut entitlement) = self.store.entitlement(user)? else {
            info!(%user, "denied: not on allow-list");
            return Ok(Decision::Deny(DenyReason::NotAuthorized));
        };

        // Denials leave the stored record untouched.
        let decision = if entitlement.is_expired(today) {
            Decision::Deny(DenyReason::Expired)
        } else if entitlement.usage_on(today) >= entitlement.daily_limit {
            Decision::Deny(DenyReason::QuotaExceeded)
        } else {
            entitlement.roll_to(today);
            entitlement.used_today += 1;
            self.store.save_entitlement(user, entitlement.clone())?;
            Decision::Allow
        };

        match decision {
            Decision::Allow => info!(
                %user,
                used_today = entitlement.usage_on(today),
                daily_limit = entitlement.daily_limit,
                "allowed"
            ),
            Decision::Deny(reason) => info!(%user, %reason, "denied"),
        }

        Ok(decision)
    }
}
