//! Subscription lifecycle and plan enforcement.
//!
//! The ledger ([`SubscriptionLedger`]) is the source of truth for which plan
//! an institute is on. The [`LifecycleScheduler`] moves entries through
//! `Upcoming → Active → Expired` and mirrors the result onto the institute
//! record. The [`QuotaEnforcer`] checks headcounts against the active plan.

pub mod duration;
pub mod error;
pub mod ledger;
pub mod quota;
pub mod routes;
pub mod scheduler;
pub mod storage;
pub mod types;

pub use duration::{ParseDurationError, PlanDuration};
pub use error::SubscriptionError;
pub use ledger::SubscriptionLedger;
pub use quota::{QuotaDecision, QuotaEnforcer, RoleUsage, UsageSummary};
pub use routes::SubscriptionRoutes;
pub use scheduler::{LifecycleScheduler, SchedulerHandle, SchedulerHeartbeat, TickReport};
pub use storage::{BatchCursor, SubscriptionStore};
pub use types::{
    CreatedSubscription, CreationOutcome, NewSubscription, Subscription, SubscriptionOverview,
    SubscriptionStatus,
};
