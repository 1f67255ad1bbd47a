//! In-memory storage backend.
//!
//! One [`InMemoryStore`] implements every storage trait. All tables sit behind
//! a single lock, so the checked `Active` insert and conditional transitions
//! are atomic. Suitable for development, tests and single-instance use; data
//! is lost on restart.

use crate::error::{CampusError, Result};
use crate::institutes::{Institute, InstituteStatus, InstituteStore, ProjectionSnapshot};
use crate::members::{
    Member, MembershipDirectory, PendingRegistration, RegistrationStatus, RegistrationStore, Role,
};
use crate::subscriptions::{BatchCursor, Subscription, SubscriptionStatus, SubscriptionStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Tables {
    institutes: HashMap<String, Institute>,
    subscriptions: HashMap<String, Subscription>,
    members: HashMap<String, Member>,
    registrations: HashMap<String, PendingRegistration>,
}

impl Tables {
    fn has_other_in(&self, institute_id: &str, status: SubscriptionStatus, except_id: &str) -> bool {
        self.subscriptions.values().any(|s| {
            s.institute_id == institute_id && s.status == status && s.id != except_id
        })
    }
}

/// In-memory store implementing all storage traits.
///
/// Cloning shares the same underlying data.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert an institute directly, bypassing name checks (for test setup).
    pub fn insert_institute(&self, institute: Institute) {
        self.write()
            .institutes
            .insert(institute.id.clone(), institute);
    }

    /// Insert a ledger entry directly, bypassing the single-active check (for test setup).
    pub fn insert_subscription(&self, subscription: Subscription) {
        self.write()
            .subscriptions
            .insert(subscription.id.clone(), subscription);
    }

    /// Insert a member directly (for test setup).
    pub fn insert_member(&self, member: Member) {
        self.write().members.insert(member.id.clone(), member);
    }

    /// Every ledger entry, ordered by id.
    #[must_use]
    pub fn all_subscriptions(&self) -> Vec<Subscription> {
        let mut all: Vec<_> = self.read().subscriptions.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }
}

#[async_trait]
impl InstituteStore for InMemoryStore {
    async fn create(&self, institute: &Institute) -> Result<()> {
        let mut tables = self.write();
        let name = institute.name.to_lowercase();
        if tables
            .institutes
            .values()
            .any(|i| i.name.to_lowercase() == name)
        {
            return Err(CampusError::conflict(format!(
                "Institute name '{}' is already taken",
                institute.name
            )));
        }
        if tables.institutes.contains_key(&institute.id) {
            return Err(CampusError::conflict(format!(
                "Institute '{}' already exists",
                institute.id
            )));
        }
        tables
            .institutes
            .insert(institute.id.clone(), institute.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Institute>> {
        Ok(self.read().institutes.get(id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Institute>> {
        let name = name.to_lowercase();
        Ok(self
            .read()
            .institutes
            .values()
            .find(|i| i.name.to_lowercase() == name)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Institute>> {
        let mut institutes: Vec<_> = self.read().institutes.values().cloned().collect();
        institutes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(institutes)
    }

    async fn update_projection(
        &self,
        id: &str,
        snapshot: &ProjectionSnapshot,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tables = self.write();
        match tables.institutes.get_mut(id) {
            Some(institute) => {
                institute.apply_projection(snapshot, at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_status(
        &self,
        id: &str,
        status: InstituteStatus,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tables = self.write();
        match tables.institutes.get_mut(id) {
            Some(institute) => {
                institute.status = status;
                institute.updated_at = at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.write().institutes.remove(id).is_some())
    }
}

#[async_trait]
impl SubscriptionStore for InMemoryStore {
    async fn insert(&self, subscription: &Subscription) -> Result<()> {
        let mut tables = self.write();
        if subscription.status != SubscriptionStatus::Expired
            && tables.has_other_in(
                &subscription.institute_id,
                subscription.status,
                &subscription.id,
            )
        {
            return Err(CampusError::conflict(format!(
                "Institute {} already has an {} subscription",
                subscription.institute_id,
                subscription.status.as_str().to_lowercase()
            )));
        }
        tables
            .subscriptions
            .insert(subscription.id.clone(), subscription.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Subscription>> {
        Ok(self.read().subscriptions.get(id).cloned())
    }

    async fn active_for(&self, institute_id: &str) -> Result<Option<Subscription>> {
        Ok(self
            .read()
            .subscriptions
            .values()
            .find(|s| s.institute_id == institute_id && s.is_active())
            .cloned())
    }

    async fn upcoming_for(&self, institute_id: &str) -> Result<Option<Subscription>> {
        Ok(self
            .read()
            .subscriptions
            .values()
            .find(|s| s.institute_id == institute_id && s.is_upcoming())
            .cloned())
    }

    async fn list_for_institute(&self, institute_id: &str) -> Result<Vec<Subscription>> {
        let mut entries: Vec<_> = self
            .read()
            .subscriptions
            .values()
            .filter(|s| s.institute_id == institute_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| {
            b.period_start
                .cmp(&a.period_start)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(entries)
    }

    async fn due_for_expiry(
        &self,
        now: DateTime<Utc>,
        after: Option<&BatchCursor>,
        limit: usize,
    ) -> Result<Vec<Subscription>> {
        let mut due: Vec<_> = self
            .read()
            .subscriptions
            .values()
            .filter(|s| s.is_due_for_expiry(now))
            .filter(|s| after.is_none_or(|c| c.precedes(s.period_expiry, &s.id)))
            .cloned()
            .collect();
        due.sort_by(|a, b| a.period_expiry.cmp(&b.period_expiry).then(a.id.cmp(&b.id)));
        due.truncate(limit);
        Ok(due)
    }

    async fn due_for_activation(
        &self,
        now: DateTime<Utc>,
        after: Option<&BatchCursor>,
        limit: usize,
    ) -> Result<Vec<Subscription>> {
        let mut due: Vec<_> = self
            .read()
            .subscriptions
            .values()
            .filter(|s| s.is_due_for_activation(now))
            .filter(|s| after.is_none_or(|c| c.precedes(s.period_start, &s.id)))
            .cloned()
            .collect();
        due.sort_by(|a, b| a.period_start.cmp(&b.period_start).then(a.id.cmp(&b.id)));
        due.truncate(limit);
        Ok(due)
    }

    async fn transition(
        &self,
        id: &str,
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    ) -> Result<bool> {
        let mut tables = self.write();
        let institute_id = match tables.subscriptions.get(id) {
            Some(s) if s.status == from => s.institute_id.clone(),
            _ => return Ok(false),
        };

        if to == SubscriptionStatus::Active
            && tables.has_other_in(&institute_id, SubscriptionStatus::Active, id)
        {
            return Err(CampusError::conflict(format!(
                "Institute {institute_id} already has an active subscription"
            )));
        }

        if let Some(subscription) = tables.subscriptions.get_mut(id) {
            subscription.status = to;
        }
        Ok(true)
    }

    async fn count_active(&self, institute_id: &str) -> Result<u32> {
        let count = self
            .read()
            .subscriptions
            .values()
            .filter(|s| s.institute_id == institute_id && s.is_active())
            .count();
        Ok(count as u32)
    }

    async fn delete_for_institute(&self, institute_id: &str) -> Result<u64> {
        let mut tables = self.write();
        let before = tables.subscriptions.len();
        tables
            .subscriptions
            .retain(|_, s| s.institute_id != institute_id);
        Ok((before - tables.subscriptions.len()) as u64)
    }
}

#[async_trait]
impl MembershipDirectory for InMemoryStore {
    async fn count_by_role(&self, institute_id: &str, role: Role) -> Result<u32> {
        let count = self
            .read()
            .members
            .values()
            .filter(|m| m.institute_id == institute_id && m.role == role)
            .count();
        Ok(count as u32)
    }

    async fn add_member(&self, member: &Member) -> Result<()> {
        let mut tables = self.write();
        let email = member.email.to_lowercase();
        if tables
            .members
            .values()
            .any(|m| m.email.to_lowercase() == email)
        {
            return Err(CampusError::conflict(format!(
                "Email '{}' is already registered",
                member.email
            )));
        }
        tables.members.insert(member.id.clone(), member.clone());
        Ok(())
    }

    async fn list_members(&self, institute_id: &str) -> Result<Vec<Member>> {
        let mut members: Vec<_> = self
            .read()
            .members
            .values()
            .filter(|m| m.institute_id == institute_id)
            .cloned()
            .collect();
        members.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(members)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Member>> {
        let email = email.to_lowercase();
        Ok(self
            .read()
            .members
            .values()
            .find(|m| m.email.to_lowercase() == email)
            .cloned())
    }

    async fn remove_member(&self, id: &str) -> Result<bool> {
        Ok(self.write().members.remove(id).is_some())
    }

    async fn remove_members_for(&self, institute_id: &str) -> Result<u64> {
        let mut tables = self.write();
        let before = tables.members.len();
        tables.members.retain(|_, m| m.institute_id != institute_id);
        Ok((before - tables.members.len()) as u64)
    }
}

#[async_trait]
impl RegistrationStore for InMemoryStore {
    async fn insert_registration(&self, registration: &PendingRegistration) -> Result<()> {
        self.write()
            .registrations
            .insert(registration.id.clone(), registration.clone());
        Ok(())
    }

    async fn get_registration(&self, id: &str) -> Result<Option<PendingRegistration>> {
        Ok(self.read().registrations.get(id).cloned())
    }

    async fn find_pending_by_email(&self, email: &str) -> Result<Option<PendingRegistration>> {
        let email = email.to_lowercase();
        Ok(self
            .read()
            .registrations
            .values()
            .find(|r| r.status == RegistrationStatus::Pending && r.email.to_lowercase() == email)
            .cloned())
    }

    async fn list_pending(&self, institute_id: &str) -> Result<Vec<PendingRegistration>> {
        let mut pending: Vec<_> = self
            .read()
            .registrations
            .values()
            .filter(|r| r.institute_id == institute_id && r.status == RegistrationStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at).then(a.id.cmp(&b.id)));
        Ok(pending)
    }

    async fn mark_rejected(&self, id: &str, reason: Option<&str>) -> Result<bool> {
        let mut tables = self.write();
        match tables.registrations.get_mut(id) {
            Some(r) if r.status == RegistrationStatus::Pending => {
                r.status = RegistrationStatus::Rejected;
                r.rejection_reason = reason.map(str::to_string);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn take_pending(&self, id: &str) -> Result<bool> {
        let mut tables = self.write();
        let is_pending = tables
            .registrations
            .get(id)
            .is_some_and(|r| r.status == RegistrationStatus::Pending);
        if is_pending {
            tables.registrations.remove(id);
        }
        Ok(is_pending)
    }

    async fn delete_registrations_for(&self, institute_id: &str) -> Result<u64> {
        let mut tables = self.write();
        let before = tables.registrations.len();
        tables
            .registrations
            .retain(|_, r| r.institute_id != institute_id);
        Ok((before - tables.registrations.len()) as u64)
    }
}
