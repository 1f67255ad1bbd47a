//! Subscription ledger.
//!
//! Creates subscriptions and answers "what is active now" queries against the
//! ledger, which is the source of truth for plan enforcement.

use super::duration::PlanDuration;
use super::error::{Result, SubscriptionError};
use super::storage::SubscriptionStore;
use super::types::{
    CreatedSubscription, CreationOutcome, NewSubscription, Subscription, SubscriptionOverview,
    SubscriptionStatus,
};
use crate::clock::Clock;
use crate::institutes::{InstituteProjection, InstituteStore};
use crate::plans::PlanCatalog;
use crate::validation::validate;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Subscription ledger service.
///
/// # Example
///
/// ```rust,ignore
/// let created = ledger
///     .create_subscription("INST-1", "ADM-1", "pro", "3M")
///     .await?;
///
/// match created.outcome {
///     CreationOutcome::ActivatedNow => { /* plan is live */ }
///     CreationOutcome::QueuedRenewal => { /* starts when the current plan ends */ }
/// }
/// ```
#[derive(Clone)]
pub struct SubscriptionLedger {
    subscriptions: Arc<dyn SubscriptionStore>,
    institutes: Arc<dyn InstituteStore>,
    projection: InstituteProjection,
    catalog: Arc<PlanCatalog>,
    clock: Arc<dyn Clock>,
}

impl SubscriptionLedger {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        institutes: Arc<dyn InstituteStore>,
        catalog: Arc<PlanCatalog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let projection = InstituteProjection::new(institutes.clone());
        Self {
            subscriptions,
            institutes,
            projection,
            catalog,
            clock,
        }
    }

    /// Create a subscription, or queue a renewal behind the active one.
    ///
    /// With no active subscription the new one is `Active` from now and the
    /// institute projection is overwritten. Otherwise it is `Upcoming` and
    /// starts exactly when the active one expires. Only one renewal may be
    /// queued at a time.
    ///
    /// # Errors
    ///
    /// * `InvalidInput` for a blank field, `InvalidDuration` for a bad code.
    /// * `UnknownPlan` when the plan is not in the catalog. Plans are checked
    ///   here, at creation, as well as by the quota enforcer.
    /// * `InstituteNotFound`.
    /// * `Conflict` when a renewal is already queued.
    pub async fn create_subscription(
        &self,
        institute_id: &str,
        admin_id: &str,
        plan: &str,
        duration_code: &str,
    ) -> Result<CreatedSubscription> {
        self.create(NewSubscription {
            institute_id: institute_id.to_string(),
            admin_id: admin_id.to_string(),
            plan: plan.to_string(),
            plan_duration: duration_code.to_string(),
        })
        .await
    }

    /// [`create_subscription`](Self::create_subscription) for a request body.
    #[instrument(
        skip(self, request),
        fields(institute_id = %request.institute_id, plan = %request.plan, subscription_id)
    )]
    pub async fn create(&self, request: NewSubscription) -> Result<CreatedSubscription> {
        validate(&request)?;
        let institute_id = request.institute_id.trim();
        let admin_id = request.admin_id.trim();
        let duration: PlanDuration = request.plan_duration.trim().parse()?;
        let plan = self.catalog.resolve(&request.plan)?.plan_name.clone();

        if !self.institutes.exists(institute_id).await? {
            debug!(institute_id, "Institute not found");
            return Err(SubscriptionError::institute_not_found(institute_id));
        }

        if let Some(queued) = self.subscriptions.upcoming_for(institute_id).await? {
            debug!(institute_id, upcoming_id = %queued.id, "Renewal already queued");
            return Err(SubscriptionError::conflict(format!(
                "Institute {institute_id} already has an upcoming plan starting {}",
                queued.period_start
            )));
        }

        let now = self.clock.now();
        let active = self.subscriptions.active_for(institute_id).await?;

        let (status, period_start, outcome) = match &active {
            None => (SubscriptionStatus::Active, now, CreationOutcome::ActivatedNow),
            Some(current) => (
                SubscriptionStatus::Upcoming,
                current.period_expiry,
                CreationOutcome::QueuedRenewal,
            ),
        };

        let subscription = Subscription {
            id: Uuid::new_v4().to_string(),
            institute_id: institute_id.to_string(),
            admin_id: admin_id.to_string(),
            plan,
            plan_duration: duration.code(),
            status,
            period_start,
            period_expiry: duration.period_end(period_start),
            created_at: now,
        };
        tracing::Span::current().record("subscription_id", subscription.id.as_str());

        self.subscriptions.insert(&subscription).await?;

        if outcome == CreationOutcome::ActivatedNow {
            self.projection.record_activation(&subscription, now).await?;
        }

        info!(
            institute_id,
            subscription_id = %subscription.id,
            plan = %subscription.plan,
            plan_duration = %subscription.plan_duration,
            status = %subscription.status,
            period_start = %subscription.period_start,
            period_expiry = %subscription.period_expiry,
            "Subscription created"
        );

        Ok(CreatedSubscription {
            subscription,
            outcome,
        })
    }

    /// A single ledger entry.
    pub async fn get(&self, subscription_id: &str) -> Result<Subscription> {
        self.subscriptions
            .get(subscription_id)
            .await?
            .ok_or_else(|| SubscriptionError::SubscriptionNotFound {
                subscription_id: subscription_id.to_string(),
            })
    }

    /// The institute's active subscription, read from the ledger.
    pub async fn active_subscription_for(&self, institute_id: &str) -> Result<Option<Subscription>> {
        Ok(self.subscriptions.active_for(institute_id).await?)
    }

    /// Every subscription of an institute, newest `period_start` first.
    pub async fn history_for(&self, institute_id: &str) -> Result<Vec<Subscription>> {
        Ok(self.subscriptions.list_for_institute(institute_id).await?)
    }

    /// The active (or most recently started expired) subscription plus the next upcoming one.
    pub async fn current_and_upcoming(&self, institute_id: &str) -> Result<SubscriptionOverview> {
        let history = self.history_for(institute_id).await?;

        let current_subscription = history
            .iter()
            .find(|s| s.is_active())
            .or_else(|| {
                history
                    .iter()
                    .find(|s| s.status == SubscriptionStatus::Expired)
            })
            .cloned();

        // History is newest first, so the earliest upcoming entry is the last one.
        let upcoming_plan_details = history.iter().rev().find(|s| s.is_upcoming()).cloned();

        Ok(SubscriptionOverview {
            current_subscription,
            has_upcoming_plan: upcoming_plan_details.is_some(),
            upcoming_plan_details,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::institutes::{Institute, InstituteStatus};
    use crate::memory::InMemoryStore;
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn setup(now: DateTime<Utc>) -> (SubscriptionLedger, InMemoryStore, ManualClock) {
        let store = InMemoryStore::new();
        store.insert_institute(Institute::new("INST-1", "Springfield", "1 Main St", "ADM-1", now));
        let clock = ManualClock::new(now);
        let ledger = SubscriptionLedger::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(PlanCatalog::default()),
            Arc::new(clock.clone()),
        );
        (ledger, store, clock)
    }

    #[tokio::test]
    async fn test_first_subscription_activates_immediately() {
        let now = ts(2024, 1, 15);
        let (ledger, store, _) = setup(now);

        let created = ledger
            .create_subscription("INST-1", "ADM-1", "basic", "1M")
            .await
            .unwrap();

        assert_eq!(created.outcome, CreationOutcome::ActivatedNow);
        assert_eq!(created.subscription.status, SubscriptionStatus::Active);
        assert_eq!(created.subscription.period_start, now);
        assert_eq!(created.subscription.period_expiry, ts(2024, 2, 15));

        let institute = store.find_by_id("INST-1").await.unwrap().unwrap();
        assert_eq!(institute.status, InstituteStatus::Active);
        assert_eq!(institute.current_plan.as_deref(), Some("basic"));
        assert_eq!(institute.current_period_expiry, Some(ts(2024, 2, 15)));
    }

    #[tokio::test]
    async fn test_renewal_chains_onto_active_expiry() {
        let (ledger, store, clock) = setup(ts(2024, 5, 1));
        ledger
            .create_subscription("INST-1", "ADM-1", "basic", "1M")
            .await
            .unwrap();

        clock.set(ts(2024, 5, 20));
        let renewal = ledger
            .create_subscription("INST-1", "ADM-1", "pro", "3M")
            .await
            .unwrap();

        assert_eq!(renewal.outcome, CreationOutcome::QueuedRenewal);
        assert_eq!(renewal.subscription.status, SubscriptionStatus::Upcoming);
        assert_eq!(renewal.subscription.period_start, ts(2024, 6, 1));
        assert_eq!(renewal.subscription.period_expiry, ts(2024, 9, 1));

        // The projection still shows the running plan.
        let institute = store.find_by_id("INST-1").await.unwrap().unwrap();
        assert_eq!(institute.current_plan.as_deref(), Some("basic"));
    }

    #[tokio::test]
    async fn test_renewal_starts_at_expiry_even_if_already_past() {
        let (ledger, _, clock) = setup(ts(2024, 1, 1));
        ledger
            .create_subscription("INST-1", "ADM-1", "basic", "1M")
            .await
            .unwrap();

        // The scheduler has not yet expired the old plan.
        clock.set(ts(2024, 2, 10));
        let renewal = ledger
            .create_subscription("INST-1", "ADM-1", "basic", "1M")
            .await
            .unwrap();
        assert_eq!(renewal.subscription.period_start, ts(2024, 2, 1));
        assert_eq!(renewal.outcome, CreationOutcome::QueuedRenewal);
    }

    #[tokio::test]
    async fn test_second_renewal_is_a_conflict() {
        let (ledger, store, _) = setup(ts(2024, 5, 1));
        for plan in ["basic", "pro"] {
            ledger
                .create_subscription("INST-1", "ADM-1", plan, "1M")
                .await
                .unwrap();
        }

        let err = ledger
            .create_subscription("INST-1", "ADM-1", "enterprise", "1M")
            .await
            .unwrap_err();
        assert!(matches!(err, SubscriptionError::Conflict { .. }));
        assert_eq!(store.all_subscriptions().len(), 2);
    }

    #[tokio::test]
    async fn test_rejects_bad_input() {
        let (ledger, _, _) = setup(ts(2024, 1, 1));

        let err = ledger
            .create_subscription("INST-1", "ADM-1", "basic", "3W")
            .await
            .unwrap_err();
        assert!(matches!(err, SubscriptionError::InvalidDuration(_)));

        let err = ledger
            .create_subscription("INST-1", "ADM-1", "platinum", "1M")
            .await
            .unwrap_err();
        assert!(matches!(err, SubscriptionError::UnknownPlan { .. }));

        let err = ledger
            .create_subscription("INST-1", "  ", "basic", "1M")
            .await
            .unwrap_err();
        assert!(matches!(err, SubscriptionError::InvalidInput { .. }));

        let err = ledger
            .create_subscription("NOPE", "ADM-1", "basic", "1M")
            .await
            .unwrap_err();
        assert!(matches!(err, SubscriptionError::InstituteNotFound { .. }));
    }

    #[tokio::test]
    async fn test_plan_name_is_case_insensitive_and_canonicalized() {
        let (ledger, _, _) = setup(ts(2024, 1, 1));
        let created = ledger
            .create_subscription("INST-1", "ADM-1", "PRO", "6M")
            .await
            .unwrap();
        assert_eq!(created.subscription.plan, "pro");
        assert_eq!(created.subscription.plan_duration, "6M");
    }

    #[tokio::test]
    async fn test_current_and_upcoming() {
        let (ledger, _, clock) = setup(ts(2024, 5, 1));

        let empty = ledger.current_and_upcoming("INST-1").await.unwrap();
        assert!(empty.current_subscription.is_none());
        assert!(!empty.has_upcoming_plan);

        let first = ledger
            .create_subscription("INST-1", "ADM-1", "basic", "1M")
            .await
            .unwrap();
        clock.set(ts(2024, 5, 2));
        let second = ledger
            .create_subscription("INST-1", "ADM-1", "pro", "1M")
            .await
            .unwrap();

        let overview = ledger.current_and_upcoming("INST-1").await.unwrap();
        assert_eq!(
            overview.current_subscription.map(|s| s.id),
            Some(first.subscription.id)
        );
        assert!(overview.has_upcoming_plan);
        assert_eq!(
            overview.upcoming_plan_details.map(|s| s.id),
            Some(second.subscription.id)
        );
    }
}
