//! Membership directory and registration storage traits.

use super::types::{Member, PendingRegistration, Role};
use crate::error::Result;
use async_trait::async_trait;

/// Registered members of institutes.
///
/// The quota enforcer only needs [`count_by_role`](Self::count_by_role).
#[async_trait]
pub trait MembershipDirectory: Send + Sync {
    /// Number of members of `role` in an institute.
    async fn count_by_role(&self, institute_id: &str, role: Role) -> Result<u32>;

    /// Add a member. Fails with `Conflict` if the email is already registered.
    async fn add_member(&self, member: &Member) -> Result<()>;

    async fn list_members(&self, institute_id: &str) -> Result<Vec<Member>>;

    /// Look up a member by email, compared case-insensitively.
    async fn find_by_email(&self, email: &str) -> Result<Option<Member>>;

    /// Remove one member. Returns `false` if there was no such member.
    async fn remove_member(&self, id: &str) -> Result<bool>;

    /// Remove all members of an institute. Returns the number removed.
    async fn remove_members_for(&self, institute_id: &str) -> Result<u64>;
}

/// Registration requests awaiting review.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    async fn insert_registration(&self, registration: &PendingRegistration) -> Result<()>;

    async fn get_registration(&self, id: &str) -> Result<Option<PendingRegistration>>;

    /// Pending (not rejected) request with this email, compared case-insensitively.
    async fn find_pending_by_email(&self, email: &str) -> Result<Option<PendingRegistration>>;

    /// Pending requests of an institute, oldest first.
    async fn list_pending(&self, institute_id: &str) -> Result<Vec<PendingRegistration>>;

    /// Mark a pending request rejected. Returns `false` if it was not pending.
    async fn mark_rejected(&self, id: &str, reason: Option<&str>) -> Result<bool>;

    /// Remove a pending request. Returns `false` if it was not pending.
    async fn take_pending(&self, id: &str) -> Result<bool>;

    /// Delete every request of an institute. Returns the number removed.
    async fn delete_registrations_for(&self, institute_id: &str) -> Result<u64>;
}
