//! Subscription ledger types.

use crate::validation::not_blank;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

/// Lifecycle state of a ledger entry.
///
/// The only legal moves are `Upcoming → Active`, `Active → Expired` and
/// `Upcoming → Expired` (a renewal whose whole period elapsed unseen).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubscriptionStatus {
    Upcoming,
    Active,
    Expired,
}

impl SubscriptionStatus {
    /// Get the string representation used in storage and JSON.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upcoming => "Upcoming",
            Self::Active => "Active",
            Self::Expired => "Expired",
        }
    }

    /// Parse a stored status string.
    #[must_use]
    pub fn from_stored(s: &str) -> Option<Self> {
        match s {
            "Upcoming" => Some(Self::Upcoming),
            "Active" => Some(Self::Active),
            "Expired" => Some(Self::Expired),
            _ => None,
        }
    }

    /// Whether a transition from `self` to `to` is allowed.
    #[must_use]
    pub fn can_transition_to(&self, to: SubscriptionStatus) -> bool {
        matches!(
            (self, to),
            (Self::Upcoming, Self::Active)
                | (Self::Active, Self::Expired)
                | (Self::Upcoming, Self::Expired)
        )
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One subscription period in an institute's ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub institute_id: String,
    pub admin_id: String,
    /// Plan name as requested; resolved case-insensitively against the catalog.
    pub plan: String,
    /// Duration code, e.g. `"3M"`.
    pub plan_duration: String,
    pub status: SubscriptionStatus,
    pub period_start: DateTime<Utc>,
    pub period_expiry: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }

    #[must_use]
    pub fn is_upcoming(&self) -> bool {
        self.status == SubscriptionStatus::Upcoming
    }

    /// Due for the expiry pass at `now`.
    #[must_use]
    pub fn is_due_for_expiry(&self, now: DateTime<Utc>) -> bool {
        matches!(
            self.status,
            SubscriptionStatus::Active | SubscriptionStatus::Upcoming
        ) && self.period_expiry < now
    }

    /// Due for the activation pass at `now`.
    #[must_use]
    pub fn is_due_for_activation(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Upcoming && self.period_start <= now
    }
}

/// How a newly created subscription entered the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreationOutcome {
    /// No subscription was active; this one is active immediately.
    ActivatedNow,
    /// Queued behind the current active subscription.
    QueuedRenewal,
}

impl CreationOutcome {
    /// Human-readable message for API clients.
    #[must_use]
    pub fn message(&self) -> &'static str {
        match self {
            Self::ActivatedNow => "New subscription activated successfully",
            Self::QueuedRenewal => {
                "Renewal plan saved successfully. It will activate after the current plan expires."
            }
        }
    }
}

/// A request to create or renew a subscription.
///
/// Accepts both snake_case and camelCase field names. The duration code is
/// checked separately so a bad code reports `invalid_duration`.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewSubscription {
    #[serde(alias = "instituteId")]
    #[validate(custom(function = "not_blank"))]
    pub institute_id: String,
    #[serde(alias = "adminId")]
    #[validate(custom(function = "not_blank"))]
    pub admin_id: String,
    #[validate(custom(function = "not_blank"))]
    pub plan: String,
    #[serde(alias = "planDuration")]
    #[validate(custom(function = "not_blank"))]
    pub plan_duration: String,
}

/// Result of `create_subscription`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CreatedSubscription {
    pub subscription: Subscription,
    pub outcome: CreationOutcome,
}

/// The subscriptions worth showing for an institute right now.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SubscriptionOverview {
    /// The active subscription, or the most recently started expired one.
    pub current_subscription: Option<Subscription>,
    pub has_upcoming_plan: bool,
    pub upcoming_plan_details: Option<Subscription>,
}
