//! Best-effort notification delivery. Settlement never talks to the
//! notifier directly: it writes durable outbox events in the same atomic
//! boundary as the money movement, and [`OutboxWorker`] drains them here.
//! A delivery failure is logged and the event stays pending for the next
//! pass; it can never fail a settlement.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{debug, warn};
use uuid::Uuid;

use wagerbook_db::Store;
use wagerbook_models::NotificationPayload;

use crate::metrics::MetricsCollector;

/// Outbound transport seam. The real push/email/socket delivery lives
/// outside this system.
#[allow(async_fn_in_trait)]
pub trait Notifier: Send + Sync {
    async fn notify_won(&self, user_id: Uuid, bet_slip_id: &str, amount: Decimal)
        -> anyhow::Result<()>;
    async fn notify_batch_lost(&self, user_ids: &[Uuid], match_title: &str) -> anyhow::Result<()>;
    async fn notify_refunded(
        &self,
        user_id: Uuid,
        bet_slip_id: &str,
        amount: Decimal,
    ) -> anyhow::Result<()>;
}

/// Default wiring: structured log lines in place of a delivery transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

impl Notifier for LoggingNotifier {
    async fn notify_won(
        &self,
        user_id: Uuid,
        bet_slip_id: &str,
        amount: Decimal,
    ) -> anyhow::Result<()> {
        debug!(%user_id, bet_slip_id, %amount, "notify: bet won");
        Ok(())
    }

    async fn notify_batch_lost(&self, user_ids: &[Uuid], match_title: &str) -> anyhow::Result<()> {
        debug!(users = user_ids.len(), match_title, "notify: batch lost");
        Ok(())
    }

    async fn notify_refunded(
        &self,
        user_id: Uuid,
        bet_slip_id: &str,
        amount: Decimal,
    ) -> anyhow::Result<()> {
        debug!(%user_id, bet_slip_id, %amount, "notify: stake refunded");
        Ok(())
    }
}

/// Captures deliveries instead of sending them; used by tests asserting on
/// notification traffic.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    pub deliveries: Arc<std::sync::Mutex<Vec<NotificationPayload>>>,
}

impl RecordingNotifier {
    pub fn delivered(&self) -> Vec<NotificationPayload> {
        match self.deliveries.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn record(&self, payload: NotificationPayload) {
        if let Ok(mut guard) = self.deliveries.lock() {
            guard.push(payload);
        }
    }
}

impl Notifier for RecordingNotifier {
    async fn notify_won(
        &self,
        user_id: Uuid,
        bet_slip_id: &str,
        amount: Decimal,
    ) -> anyhow::Result<()> {
        self.record(NotificationPayload::Won {
            user_id,
            bet_slip_id: bet_slip_id.to_string(),
            amount,
        });
        Ok(())
    }

    async fn notify_batch_lost(&self, user_ids: &[Uuid], match_title: &str) -> anyhow::Result<()> {
        self.record(NotificationPayload::BatchLost {
            user_ids: user_ids.to_vec(),
            match_title: match_title.to_string(),
        });
        Ok(())
    }

    async fn notify_refunded(
        &self,
        user_id: Uuid,
        bet_slip_id: &str,
        amount: Decimal,
    ) -> anyhow::Result<()> {
        self.record(NotificationPayload::Refunded {
            user_id,
            bet_slip_id: bet_slip_id.to_string(),
            amount,
        });
        Ok(())
    }
}

pub struct OutboxWorker<S, N> {
    store: Arc<S>,
    notifier: N,
    metrics: Arc<MetricsCollector>,
    poll_interval: Duration,
    batch_size: i64,
}

impl<S: Store, N: Notifier> OutboxWorker<S, N> {
    pub fn new(store: Arc<S>, notifier: N, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            store,
            notifier,
            metrics,
            poll_interval: Duration::from_secs(2),
            batch_size: 100,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Drain one batch of pending events. Returns how many were delivered;
    /// failed deliveries stay pending for the next pass.
    pub async fn drain_once(&self) -> usize {
        let events = match self.store.pending_events(self.batch_size).await {
            Ok(events) => events,
            Err(e) => {
                warn!("outbox read failed: {e}");
                return 0;
            }
        };

        let mut delivered = 0;
        for event in events {
            let attempt = match &event.payload {
                NotificationPayload::Won {
                    user_id,
                    bet_slip_id,
                    amount,
                } => self.notifier.notify_won(*user_id, bet_slip_id, *amount).await,
                NotificationPayload::BatchLost {
                    user_ids,
                    match_title,
                } => self.notifier.notify_batch_lost(user_ids, match_title).await,
                NotificationPayload::Refunded {
                    user_id,
                    bet_slip_id,
                    amount,
                } => {
                    self.notifier
                        .notify_refunded(*user_id, bet_slip_id, *amount)
                        .await
                }
            };

            match attempt {
                Ok(()) => {
                    self.metrics.record_notification(true).await;
                    if let Err(e) = self.store.mark_dispatched(event.id).await {
                        warn!(event_id = %event.id, "outbox ack failed: {e}");
                    } else {
                        delivered += 1;
                    }
                }
                Err(e) => {
                    self.metrics.record_notification(false).await;
                    warn!(event_id = %event.id, "notification delivery failed: {e}");
                }
            }
        }
        delivered
    }

    /// Poll loop for the background task.
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(self.poll_interval);
        loop {
            interval.tick().await;
            self.drain_once().await;
        }
    }
}
