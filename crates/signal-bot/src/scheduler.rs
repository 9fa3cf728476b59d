use std::sync::Arc;
use std::time::Duration;

use signal_core::clock::Clock;
use signal_core::scorer::ScoreResult;
use signal_core::store::SubscriptionStore;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::messages;
use crate::selector::SignalSelector;
use crate::transport::MessageTransport;

/// Why a tick sent nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoSignal,
    BelowThreshold { confidence: u32, threshold: u32 },
    SubscriptionsUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Skipped(SkipReason),
    Broadcast(ScoreResult),
}

/// Summary of one broadcast tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub outcome: TickOutcome,
    pub signals_sent: usize,
    pub notices_sent: usize,
    pub failures: usize,
}

impl TickReport {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            outcome: TickOutcome::Skipped(reason),
            signals_sent: 0,
            notices_sent: 0,
            failures: 0,
        }
    }

    /// Delivery attempts made, successful or not.
    pub fn attempts(&self) -> usize {
        self.signals_sent + self.notices_sent + self.failures
    }
}

/// Periodically selects the best signal and fans it out to every subscription.
pub struct BroadcastScheduler {
    selector: Arc<SignalSelector>,
    subscriptions: Arc<dyn SubscriptionStore>,
    transport: Arc<dyn MessageTransport>,
    clock: Arc<dyn Clock>,
    threshold: u32,
    period: Duration,
    owner_username: String,
}

impl BroadcastScheduler {
    pub fn new(
        selector: Arc<SignalSelector>,
        subscriptions: Arc<dyn SubscriptionStore>,
        transport: Arc<dyn MessageTransport>,
        clock: Arc<dyn Clock>,
        threshold: u32,
        period: Duration,
        owner_username: impl Into<String>,
    ) -> Self {
        Self {
            selector,
            subscriptions,
            transport,
            clock,
            threshold,
            period,
            owner_username: owner_username.into(),
        }
    }

    /// Run one evaluate-and-fan-out cycle.
    ///
    /// Below the threshold nothing is sent. Otherwise every subscription gets
    /// exactly one attempt: the signal if it is live, the disabled notice if
    /// not. A failed send is logged and does not stop the others.
    pub async fn tick(&self) -> TickReport {
        let selection = self.selector.select_best().await;

        let Some(best) = selection.best else {
            info!(
                failures = selection.failures.len(),
                "broadcast skipped: no signal"
            );
            return TickReport::skipped(SkipReason::NoSignal);
        };

        if best.confidence < self.threshold {
            info!(
                pair = %best.pair,
                timeframe = %best.timeframe,
                confidence = best.confidence,
                threshold = self.threshold,
                "broadcast skipped: below threshold"
            );
            return TickReport::skipped(SkipReason::BelowThreshold {
                confidence: best.confidence,
                threshold: self.threshold,
            });
        }

        let subscriptions = match self.subscriptions.subscriptions() {
            Ok(subscriptions) => subscriptions,
            Err(e) => {
                error!("broadcast skipped: cannot read subscriptions: {e}");
                return TickReport::skipped(SkipReason::SubscriptionsUnavailable);
            }
        };

        let today = self.clock.today();
        let signal_text = messages::auto_signal(&best, &self.owner_username);
        let notice_text = messages::disabled_notice(&self.owner_username);

        let mut report = TickReport {
            outcome: TickOutcome::Broadcast(best.clone()),
            signals_sent: 0,
            notices_sent: 0,
            failures: 0,
        };

        for (chat, subscription) in subscriptions {
            let live = subscription.is_live(today);
            let text = if live { &signal_text } else { &notice_text };
            match self.transport.send_text(chat, text, None).await {
                Ok(_) if live => report.signals_sent += 1,
                Ok(_) => report.notices_sent += 1,
                Err(e) => {
                    warn!(%chat, live, "broadcast delivery failed: {e}");
                    report.failures += 1;
                }
            }
        }

        info!(
            pair = %best.pair,
            timeframe = %best.timeframe,
            confidence = best.confidence,
            signals = report.signals_sent,
            notices = report.notices_sent,
            failures = report.failures,
            "broadcast complete"
        );
        report
    }

    /// Tick every period until `shutdown` turns `true` or its sender is dropped.
    /// The first tick fires immediately.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            period_secs = self.period.as_secs(),
            threshold = self.threshold,
            "broadcast scheduler started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("broadcast scheduler stopped");
    }
}
