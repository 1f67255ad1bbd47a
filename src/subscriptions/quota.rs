//! Plan quota enforcement.
//!
//! Decides whether another member of a role fits within the institute's
//! active plan. Reads the live ledger, never the cached institute projection.
//! The check is read-then-decide; callers re-check at approval time.

use super::error::{Result, SubscriptionError};
use super::storage::SubscriptionStore;
use crate::members::{MembershipDirectory, Role};
use crate::plans::{PlanCatalog, PlanLimits};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Outcome of a quota check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaDecision {
    /// `current < max`.
    #[serde(rename = "canAdd")]
    pub allowed: bool,
    pub current: u32,
    pub max: u32,
    pub plan: String,
}

/// Headcount against the limit for one role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RoleUsage {
    pub current: u32,
    pub max: u32,
}

impl RoleUsage {
    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.max.saturating_sub(self.current)
    }
}

/// Usage of every role under the active plan.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UsageSummary {
    pub plan: String,
    pub admin: RoleUsage,
    pub teacher: RoleUsage,
    pub student: RoleUsage,
}

impl UsageSummary {
    #[must_use]
    pub fn for_role(&self, role: Role) -> RoleUsage {
        match role {
            Role::Admin => self.admin,
            Role::Teacher => self.teacher,
            Role::Student => self.student,
        }
    }
}

/// Checks headcounts against the active plan.
#[derive(Clone)]
pub struct QuotaEnforcer {
    subscriptions: Arc<dyn SubscriptionStore>,
    directory: Arc<dyn MembershipDirectory>,
    catalog: Arc<PlanCatalog>,
}

impl QuotaEnforcer {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        directory: Arc<dyn MembershipDirectory>,
        catalog: Arc<PlanCatalog>,
    ) -> Self {
        Self {
            subscriptions,
            directory,
            catalog,
        }
    }

    /// Whether one more member of `role` fits within the active plan.
    pub async fn can_add(&self, institute_id: &str, role: Role) -> Result<QuotaDecision> {
        let (plan, limits) = self.active_limits(institute_id).await?;
        let current = self.directory.count_by_role(institute_id, role).await?;
        let max = limits.max_for(role);

        Ok(QuotaDecision {
            allowed: current < max,
            current,
            max,
            plan,
        })
    }

    /// Same as [`can_add`](Self::can_add) with the role given as a string.
    pub async fn can_add_named(&self, institute_id: &str, role: &str) -> Result<QuotaDecision> {
        let role: Role = role.parse()?;
        self.can_add(institute_id, role).await
    }

    /// Fail with `LimitExceeded` when no more members of `role` fit.
    pub async fn ensure_can_add(&self, institute_id: &str, role: Role) -> Result<QuotaDecision> {
        let decision = self.can_add(institute_id, role).await?;
        if !decision.allowed {
            debug!(
                institute_id,
                role = %role,
                current = decision.current,
                max = decision.max,
                plan = %decision.plan,
                "Quota reached"
            );
            return Err(SubscriptionError::LimitExceeded {
                role,
                current: decision.current,
                max: decision.max,
                plan: decision.plan,
            });
        }
        Ok(decision)
    }

    /// Headcount and limit for all roles.
    pub async fn usage(&self, institute_id: &str) -> Result<UsageSummary> {
        let (plan, limits) = self.active_limits(institute_id).await?;

        let mut counts = [0u32; 3];
        for (slot, role) in counts.iter_mut().zip(Role::ALL) {
            *slot = self.directory.count_by_role(institute_id, role).await?;
        }
        let [admins, teachers, students] = counts;

        Ok(UsageSummary {
            plan,
            admin: RoleUsage {
                current: admins,
                max: limits.max_admins,
            },
            teacher: RoleUsage {
                current: teachers,
                max: limits.max_teachers,
            },
            student: RoleUsage {
                current: students,
                max: limits.max_students,
            },
        })
    }

    async fn active_limits(&self, institute_id: &str) -> Result<(String, PlanLimits)> {
        let active = self
            .subscriptions
            .active_for(institute_id)
            .await?
            .ok_or_else(|| SubscriptionError::no_active_subscription(institute_id))?;

        let limits = self.catalog.limits_for(&active.plan)?;
        Ok((active.plan, limits))
    }
}
