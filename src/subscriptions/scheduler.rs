//! Lifecycle scheduler.
//!
//! Each tick runs two passes over the ledger, in order:
//!
//! 1. **Expiry**: `Active`/`Upcoming` entries with `period_expiry < now` become
//!    `Expired`. When an institute is left without an active entry, its
//!    projection is marked `Inactive`.
//! 2. **Activation**: `Upcoming` entries with `period_start <= now` become
//!    `Active` and overwrite the institute projection.
//!
//! Every transition is conditional on the current status, so ticks are
//! idempotent and safe to run next to request handlers. Per-row failures are
//! logged and skipped.

use super::error::SubscriptionError;
use super::storage::{BatchCursor, SubscriptionStore};
use super::types::{Subscription, SubscriptionStatus};
use crate::clock::Clock;
use crate::institutes::{InstituteProjection, InstituteStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

/// Default number of rows fetched per batch.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Upper bound on batches per pass.
const MAX_BATCHES_PER_PASS: usize = 1_000;

/// What a single tick did.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub expired: u32,
    pub activated: u32,
    /// Institutes whose projection went `Inactive`.
    pub lapsed: u32,
    /// Activations postponed because the institute still had an active entry.
    pub deferred: u32,
    pub failed: u32,
}

impl TickReport {
    /// Whether the tick changed anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expired == 0 && self.activated == 0 && self.lapsed == 0
    }
}

/// Shared record of the last completed tick.
#[derive(Clone, Debug, Default)]
pub struct SchedulerHeartbeat {
    last_tick: Arc<RwLock<Option<DateTime<Utc>>>>,
}

impl SchedulerHeartbeat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time of the last completed tick, if any.
    #[must_use]
    pub fn last_tick(&self) -> Option<DateTime<Utc>> {
        *self.last_tick.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, at: DateTime<Utc>) {
        *self.last_tick.write().unwrap_or_else(PoisonError::into_inner) = Some(at);
    }
}

/// Moves ledger entries through their lifecycle.
#[derive(Clone)]
pub struct LifecycleScheduler {
    subscriptions: Arc<dyn SubscriptionStore>,
    projection: InstituteProjection,
    clock: Arc<dyn Clock>,
    batch_size: usize,
    heartbeat: SchedulerHeartbeat,
}

impl LifecycleScheduler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        institutes: Arc<dyn InstituteStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            subscriptions,
            projection: InstituteProjection::new(institutes),
            clock,
            batch_size: DEFAULT_BATCH_SIZE,
            heartbeat: SchedulerHeartbeat::new(),
        }
    }

    /// Set the number of rows fetched per batch (minimum 1).
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Share an existing heartbeat, e.g. one already handed to a health check.
    #[must_use]
    pub fn with_heartbeat(mut self, heartbeat: SchedulerHeartbeat) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    #[must_use]
    pub fn heartbeat(&self) -> SchedulerHeartbeat {
        self.heartbeat.clone()
    }

    /// Time of the last completed tick.
    #[must_use]
    pub fn last_tick(&self) -> Option<DateTime<Utc>> {
        self.heartbeat.last_tick()
    }

    /// Run one expiry pass followed by one activation pass.
    pub async fn run_tick(&self) -> TickReport {
        let now = self.clock.now();
        let mut report = TickReport::default();

        self.expiry_pass(now, &mut report).await;
        self.activation_pass(now, &mut report).await;

        self.heartbeat.record(now);

        if report.is_empty() && report.failed == 0 {
            tracing::debug!(%now, "Lifecycle tick: nothing due");
        } else {
            tracing::info!(
                %now,
                expired = report.expired,
                activated = report.activated,
                lapsed = report.lapsed,
                deferred = report.deferred,
                failed = report.failed,
                "Lifecycle tick completed"
            );
        }

        report
    }

    async fn expiry_pass(&self, now: DateTime<Utc>, report: &mut TickReport) {
        let mut cursor: Option<BatchCursor> = None;

        for _ in 0..MAX_BATCHES_PER_PASS {
            let due = match self
                .subscriptions
                .due_for_expiry(now, cursor.as_ref(), self.batch_size)
                .await
            {
                Ok(due) => due,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to load subscriptions due for expiry");
                    report.failed += 1;
                    return;
                }
            };
            let Some(last) = due.last() else {
                return;
            };
            let next = BatchCursor::new(last.period_expiry, &last.id);
            let fetched = due.len();

            for subscription in due {
                if let Err(e) = self.expire(&subscription, now, report).await {
                    report.failed += 1;
                    tracing::warn!(
                        subscription_id = %subscription.id,
                        institute_id = %subscription.institute_id,
                        error = %e,
                        "Failed to expire subscription"
                    );
                }
            }

            if fetched < self.batch_size {
                return;
            }
            cursor = Some(next);
        }
        tracing::warn!("Expiry pass stopped at batch limit");
    }

    async fn expire(
        &self,
        subscription: &Subscription,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> Result<(), SubscriptionError> {
        let moved = self
            .subscriptions
            .transition(&subscription.id, subscription.status, SubscriptionStatus::Expired)
            .await?;
        if !moved {
            // Someone else already moved it.
            return Ok(());
        }
        report.expired += 1;

        tracing::info!(
            subscription_id = %subscription.id,
            institute_id = %subscription.institute_id,
            from = %subscription.status,
            plan = %subscription.plan,
            period_expiry = %subscription.period_expiry,
            "Subscription expired"
        );

        if self.subscriptions.count_active(&subscription.institute_id).await? == 0 {
            self.projection
                .record_lapse(&subscription.institute_id, now)
                .await?;
            report.lapsed += 1;
        }
        Ok(())
    }

    async fn activation_pass(&self, now: DateTime<Utc>, report: &mut TickReport) {
        let mut cursor: Option<BatchCursor> = None;

        for _ in 0..MAX_BATCHES_PER_PASS {
            let due = match self
                .subscriptions
                .due_for_activation(now, cursor.as_ref(), self.batch_size)
                .await
            {
                Ok(due) => due,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to load subscriptions due for activation");
                    report.failed += 1;
                    return;
                }
            };
            let Some(last) = due.last() else {
                return;
            };
            let next = BatchCursor::new(last.period_start, &last.id);
            let fetched = due.len();

            for subscription in due {
                match self.activate(&subscription, now).await {
                    Ok(Activation::Done) => report.activated += 1,
                    Ok(Activation::AlreadyMoved) => {}
                    Ok(Activation::Deferred) => {
                        report.deferred += 1;
                        tracing::debug!(
                            subscription_id = %subscription.id,
                            institute_id = %subscription.institute_id,
                            "Activation deferred: institute still has an active subscription"
                        );
                    }
                    Err(e) => {
                        report.failed += 1;
                        tracing::warn!(
                            subscription_id = %subscription.id,
                            institute_id = %subscription.institute_id,
                            error = %e,
                            "Failed to activate subscription"
                        );
                    }
                }
            }

            if fetched < self.batch_size {
                return;
            }
            cursor = Some(next);
        }
        tracing::warn!("Activation pass stopped at batch limit");
    }

    async fn activate(
        &self,
        subscription: &Subscription,
        now: DateTime<Utc>,
    ) -> Result<Activation, SubscriptionError> {
        // The predecessor expires strictly after its expiry instant, while this
        // entry starts at that same instant. Wait for the next tick.
        if self.subscriptions.count_active(&subscription.institute_id).await? > 0 {
            return Ok(Activation::Deferred);
        }

        let moved = match self
            .subscriptions
            .transition(
                &subscription.id,
                SubscriptionStatus::Upcoming,
                SubscriptionStatus::Active,
            )
            .await
        {
            Ok(moved) => moved,
            Err(e) => match SubscriptionError::from(e) {
                SubscriptionError::Conflict { .. } => return Ok(Activation::Deferred),
                other => return Err(other),
            },
        };
        if !moved {
            return Ok(Activation::AlreadyMoved);
        }

        let activated = Subscription {
            status: SubscriptionStatus::Active,
            ..subscription.clone()
        };
        self.projection.record_activation(&activated, now).await?;

        tracing::info!(
            subscription_id = %activated.id,
            institute_id = %activated.institute_id,
            plan = %activated.plan,
            period_start = %activated.period_start,
            period_expiry = %activated.period_expiry,
            "Subscription activated"
        );
        Ok(Activation::Done)
    }

    /// Run ticks every `interval` on a background task until shut down.
    ///
    /// The first tick runs immediately.
    pub fn spawn(self, interval: Duration) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let heartbeat = self.heartbeat.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::info!(
                interval_seconds = interval.as_secs(),
                batch_size = self.batch_size,
                "Lifecycle scheduler started"
            );

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        self.run_tick().await;
                    }
                }
            }

            tracing::info!("Lifecycle scheduler stopped");
        });

        SchedulerHandle {
            shutdown_tx,
            task,
            heartbeat,
        }
    }
}

enum Activation {
    Done,
    AlreadyMoved,
    Deferred,
}

/// Handle to a running scheduler task.
pub struct SchedulerHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
    heartbeat: SchedulerHeartbeat,
}

impl SchedulerHandle {
    #[must_use]
    pub fn heartbeat(&self) -> SchedulerHeartbeat {
        self.heartbeat.clone()
    }

    /// Stop the scheduler, letting an in-flight tick finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;

        match tokio::time::timeout(Duration::from_secs(30), self.task).await {
            Ok(_) => tracing::debug!("Lifecycle scheduler shut down cleanly"),
            Err(_) => tracing::warn!("Lifecycle scheduler did not stop within timeout"),
        }
    }
}
