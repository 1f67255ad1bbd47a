//! Cached "current plan" view on the institute record.
//!
//! The projection is written when a subscription activates (immediately at
//! creation, or later by the lifecycle scheduler) and when the last active
//! subscription expires. It is never recomputed on read.

use super::storage::InstituteStore;
use super::types::InstituteStatus;
use crate::subscriptions::Subscription;
use crate::subscriptions::error::{Result, SubscriptionError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The plan fields cached on an institute.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionSnapshot {
    pub plan: Option<String>,
    pub plan_duration: Option<String>,
    pub status: InstituteStatus,
    pub period_start: Option<DateTime<Utc>>,
    pub period_expiry: Option<DateTime<Utc>>,
}

impl ProjectionSnapshot {
    /// Snapshot describing `subscription` as the running plan.
    #[must_use]
    pub fn from_active(subscription: &Subscription) -> Self {
        Self {
            plan: Some(subscription.plan.clone()),
            plan_duration: Some(subscription.plan_duration.clone()),
            status: InstituteStatus::Active,
            period_start: Some(subscription.period_start),
            period_expiry: Some(subscription.period_expiry),
        }
    }
}

/// Reads and writes the institute projection.
#[derive(Clone)]
pub struct InstituteProjection {
    store: Arc<dyn InstituteStore>,
}

impl InstituteProjection {
    pub fn new(store: Arc<dyn InstituteStore>) -> Self {
        Self { store }
    }

    /// Current cached plan fields of an institute.
    pub async fn snapshot(&self, institute_id: &str) -> Result<ProjectionSnapshot> {
        self.store
            .find_by_id(institute_id)
            .await?
            .map(|institute| institute.projection())
            .ok_or_else(|| SubscriptionError::institute_not_found(institute_id))
    }

    /// Overwrite the projection with a newly activated subscription.
    pub async fn record_activation(
        &self,
        subscription: &Subscription,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let snapshot = ProjectionSnapshot::from_active(subscription);
        let updated = self
            .store
            .update_projection(&subscription.institute_id, &snapshot, at)
            .await?;

        if !updated {
            return Err(SubscriptionError::institute_not_found(
                &subscription.institute_id,
            ));
        }

        tracing::debug!(
            institute_id = %subscription.institute_id,
            subscription_id = %subscription.id,
            plan = %subscription.plan,
            "Institute projection updated"
        );
        Ok(())
    }

    /// Mark the institute inactive, keeping the last plan fields for reference.
    pub async fn record_lapse(&self, institute_id: &str, at: DateTime<Utc>) -> Result<()> {
        let updated = self
            .store
            .set_status(institute_id, InstituteStatus::Inactive, at)
            .await?;

        if !updated {
            return Err(SubscriptionError::institute_not_found(institute_id));
        }

        tracing::debug!(institute_id = %institute_id, "Institute marked inactive");
        Ok(())
    }
}
