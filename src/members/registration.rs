//! Registration approval flow.
//!
//! A prospective admin, teacher or student submits a request; an institute
//! administrator approves or rejects it. The quota is checked on submission
//! and again on approval, since other approvals may land in between.

use super::directory::{MembershipDirectory, RegistrationStore};
use super::types::{Member, PendingRegistration, RegistrationStatus, Role};
use crate::clock::Clock;
use crate::institutes::InstituteStore;
use crate::subscriptions::QuotaEnforcer;
use crate::subscriptions::error::{Result, SubscriptionError};
use crate::subscriptions::quota::UsageSummary;
use crate::validation::{not_blank, validate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// A registration request.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct RegistrationRequest {
    #[serde(alias = "instituteId")]
    #[validate(custom(function = "not_blank"))]
    pub institute_id: String,
    pub role: String,
    #[validate(custom(function = "not_blank"))]
    pub name: String,
    #[validate(email)]
    pub email: String,
}

/// Pending requests of an institute alongside its current usage.
#[derive(Clone, Debug, Serialize)]
pub struct PendingOverview {
    pub registrations: Vec<PendingRegistration>,
    pub usage: UsageSummary,
}

/// Handles registration requests.
#[derive(Clone)]
pub struct RegistrationService {
    institutes: Arc<dyn InstituteStore>,
    directory: Arc<dyn MembershipDirectory>,
    registrations: Arc<dyn RegistrationStore>,
    quota: QuotaEnforcer,
    clock: Arc<dyn Clock>,
}

impl RegistrationService {
    pub fn new(
        institutes: Arc<dyn InstituteStore>,
        directory: Arc<dyn MembershipDirectory>,
        registrations: Arc<dyn RegistrationStore>,
        quota: QuotaEnforcer,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            institutes,
            directory,
            registrations,
            quota,
            clock,
        }
    }

    /// Store a pending request if the institute's plan has room for the role.
    #[instrument(skip(self, request), fields(institute_id = %request.institute_id, role = %request.role))]
    pub async fn submit(&self, mut request: RegistrationRequest) -> Result<PendingRegistration> {
        let role: Role = request.role.parse()?;
        request.name = request.name.trim().to_string();
        request.email = request.email.trim().to_string();
        validate(&request)?;
        let name = request.name.as_str();
        let email = request.email.as_str();

        if !self.institutes.exists(&request.institute_id).await? {
            return Err(SubscriptionError::institute_not_found(&request.institute_id));
        }

        self.quota.ensure_can_add(&request.institute_id, role).await?;

        if self.directory.find_by_email(email).await?.is_some()
            || self.registrations.find_pending_by_email(email).await?.is_some()
        {
            debug!(email, "Email already registered or pending");
            return Err(SubscriptionError::conflict(format!(
                "Email '{email}' is already registered"
            )));
        }

        let registration = PendingRegistration {
            id: Uuid::new_v4().to_string(),
            institute_id: request.institute_id.clone(),
            role,
            name: name.to_string(),
            email: email.to_string(),
            status: RegistrationStatus::Pending,
            rejection_reason: None,
            submitted_at: self.clock.now(),
        };
        self.registrations.insert_registration(&registration).await?;

        info!(registration_id = %registration.id, "Registration submitted");
        Ok(registration)
    }

    /// Approve a pending request, re-checking the quota first.
    ///
    /// The member is written before the request is consumed, so a failed
    /// insert leaves the request pending. If the request was consumed
    /// concurrently the new member is removed again.
    #[instrument(skip(self))]
    pub async fn approve(&self, registration_id: &str) -> Result<Member> {
        let registration = self.pending(registration_id).await?;

        self.quota
            .ensure_can_add(&registration.institute_id, registration.role)
            .await?;

        let member = Member {
            id: Uuid::new_v4().to_string(),
            institute_id: registration.institute_id,
            role: registration.role,
            name: registration.name,
            email: registration.email,
            created_at: self.clock.now(),
        };
        self.directory.add_member(&member).await?;

        let taken = match self.registrations.take_pending(registration_id).await {
            Ok(taken) => taken,
            Err(e) => {
                self.discard_member(&member.id).await;
                return Err(e.into());
            }
        };
        if !taken {
            self.discard_member(&member.id).await;
            return Err(SubscriptionError::conflict(format!(
                "Registration {registration_id} was already processed"
            )));
        }

        info!(
            registration_id,
            member_id = %member.id,
            institute_id = %member.institute_id,
            role = %member.role,
            "Registration approved"
        );
        Ok(member)
    }

    /// Reject a pending request.
    #[instrument(skip(self))]
    pub async fn reject(
        &self,
        registration_id: &str,
        reason: Option<&str>,
    ) -> Result<PendingRegistration> {
        let mut registration = self.pending(registration_id).await?;
        let reason = reason.map(str::trim).filter(|r| !r.is_empty());

        if !self.registrations.mark_rejected(registration_id, reason).await? {
            return Err(SubscriptionError::conflict(format!(
                "Registration {registration_id} was already processed"
            )));
        }

        registration.status = RegistrationStatus::Rejected;
        registration.rejection_reason = reason.map(str::to_string);

        info!(registration_id, "Registration rejected");
        Ok(registration)
    }

    /// Pending requests of an institute plus its current usage.
    pub async fn pending_for(&self, institute_id: &str) -> Result<PendingOverview> {
        if !self.institutes.exists(institute_id).await? {
            return Err(SubscriptionError::institute_not_found(institute_id));
        }

        let usage = self.quota.usage(institute_id).await?;
        let registrations = self.registrations.list_pending(institute_id).await?;
        Ok(PendingOverview {
            registrations,
            usage,
        })
    }

    async fn pending(&self, registration_id: &str) -> Result<PendingRegistration> {
        let registration = self
            .registrations
            .get_registration(registration_id)
            .await?
            .ok_or_else(|| SubscriptionError::registration_not_found(registration_id))?;

        if registration.status != RegistrationStatus::Pending {
            return Err(SubscriptionError::conflict(format!(
                "Registration {registration_id} was already processed"
            )));
        }
        Ok(registration)
    }

    async fn discard_member(&self, member_id: &str) {
        if let Err(e) = self.directory.remove_member(member_id).await {
            warn!(member_id, error = %e, "Failed to remove member of an unapproved request");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::Result as StoreResult;
    use crate::institutes::Institute;
    use crate::memory::InMemoryStore;
    use crate::plans::PlanCatalog;
    use crate::subscriptions::SubscriptionLedger;
    use chrono::{TimeZone, Utc};

    struct Harness {
        store: InMemoryStore,
        service: RegistrationService,
    }

    async fn harness(plan: Option<&str>) -> Harness {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let store = InMemoryStore::new();
        store.insert_institute(Institute::new("INST-1", "Springfield", "1 Main St", "ADM-1", now));
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(now));
        let catalog = Arc::new(PlanCatalog::default());

        if let Some(plan) = plan {
            SubscriptionLedger::new(
                Arc::new(store.clone()),
                Arc::new(store.clone()),
                catalog.clone(),
                clock.clone(),
            )
            .create_subscription("INST-1", "ADM-1", plan, "1M")
            .await
            .unwrap();
        }

        let quota = QuotaEnforcer::new(Arc::new(store.clone()), Arc::new(store.clone()), catalog);
        let service = RegistrationService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            quota,
            clock,
        );
        Harness { store, service }
    }

    fn request(role: &str, email: &str) -> RegistrationRequest {
        RegistrationRequest {
            institute_id: "INST-1".to_string(),
            role: role.to_string(),
            name: "Someone".to_string(),
            email: email.to_string(),
        }
    }

    #[tokio::test]
    async fn test_submit_and_approve() {
        let h = harness(Some("basic")).await;
        let pending = h
            .service
            .submit(request("teacher", "edna@example.com"))
            .await
            .unwrap();
        assert_eq!(pending.status, RegistrationStatus::Pending);

        let member = h.service.approve(&pending.id).await.unwrap();
        assert_eq!(member.role, Role::Teacher);
        assert_eq!(
            h.store.count_by_role("INST-1", Role::Teacher).await.unwrap(),
            1
        );

        let err = h.service.approve(&pending.id).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::RegistrationNotFound { .. }));
    }

    #[tokio::test]
    async fn test_submit_requires_active_plan() {
        let h = harness(None).await;
        let err = h
            .service
            .submit(request("student", "bart@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, SubscriptionError::NoActiveSubscription { .. }));
    }

    #[tokio::test]
    async fn test_submit_validation() {
        let h = harness(Some("basic")).await;

        let err = h
            .service
            .submit(request("janitor", "willie@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, SubscriptionError::InvalidRole(_)));

        let err = h
            .service
            .submit(request("student", "not-an-email"))
            .await
            .unwrap_err();
        assert!(matches!(err, SubscriptionError::InvalidInput { .. }));

        let mut missing = request("student", "bart@example.com");
        missing.institute_id = "NOPE".to_string();
        let err = h.service.submit(missing).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::InstituteNotFound { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_email_is_a_conflict() {
        let h = harness(Some("pro")).await;
        h.service
            .submit(request("student", "lisa@example.com"))
            .await
            .unwrap();
        let err = h
            .service
            .submit(request("teacher", "LISA@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, SubscriptionError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_approval_rechecks_quota() {
        // basic allows one admin; ADM-1 is not a directory member yet.
        let h = harness(Some("basic")).await;
        let first = h
            .service
            .submit(request("admin", "a1@example.com"))
            .await
            .unwrap();
        let second = h
            .service
            .submit(request("admin", "a2@example.com"))
            .await
            .unwrap();

        h.service.approve(&first.id).await.unwrap();
        let err = h.service.approve(&second.id).await.unwrap_err();
        assert!(matches!(
            err,
            SubscriptionError::LimitExceeded {
                role: Role::Admin,
                current: 1,
                max: 1,
                ..
            }
        ));

        // The refused request stays pending.
        let overview = h.service.pending_for("INST-1").await.unwrap();
        assert_eq!(overview.registrations.len(), 1);
        assert_eq!(overview.usage.admin.current, 1);
    }

    #[tokio::test]
    async fn test_reject() {
        let h = harness(Some("basic")).await;
        let pending = h
            .service
            .submit(request("student", "nelson@example.com"))
            .await
            .unwrap();

        let rejected = h
            .service
            .reject(&pending.id, Some("  not enrolled "))
            .await
            .unwrap();
        assert_eq!(rejected.status, RegistrationStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("not enrolled"));

        let err = h.service.approve(&pending.id).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::Conflict { .. }));
        assert!(h.service.pending_for("INST-1").await.unwrap().registrations.is_empty());
    }

    #[tokio::test]
    async fn test_submit_trims_before_validating() {
        let h = harness(Some("basic")).await;
        let mut padded = request("student", "  milhouse@example.com ");
        padded.name = "  Milhouse  ".to_string();
        let pending = h.service.submit(padded).await.unwrap();
        assert_eq!(pending.name, "Milhouse");
        assert_eq!(pending.email, "milhouse@example.com");

        let mut blank = request("student", "sherri@example.com");
        blank.name = "   ".to_string();
        let err = h.service.submit(blank).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_failed_approval_keeps_request_pending() {
        let h = harness(Some("pro")).await;
        let pending = h
            .service
            .submit(request("student", "dup@example.com"))
            .await
            .unwrap();

        // The email is taken between submission and approval.
        h.store
            .add_member(&Member {
                id: "M-EXISTING".to_string(),
                institute_id: "INST-1".to_string(),
                role: Role::Teacher,
                name: "Early Bird".to_string(),
                email: "dup@example.com".to_string(),
                created_at: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            })
            .await
            .unwrap();

        let err = h.service.approve(&pending.id).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::Conflict { .. }));

        let stored = h
            .store
            .get_registration(&pending.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, RegistrationStatus::Pending);
        assert_eq!(h.store.list_members("INST-1").await.unwrap().len(), 1);
    }

    /// Registrations whose pending rows are consumed by someone else
    /// between the status check and the take.
    struct RacedRegistrations(InMemoryStore);

    #[async_trait::async_trait]
    impl RegistrationStore for RacedRegistrations {
        async fn insert_registration(&self, registration: &PendingRegistration) -> StoreResult<()> {
            self.0.insert_registration(registration).await
        }

        async fn get_registration(&self, id: &str) -> StoreResult<Option<PendingRegistration>> {
            self.0.get_registration(id).await
        }

        async fn find_pending_by_email(&self, email: &str) -> StoreResult<Option<PendingRegistration>> {
            self.0.find_pending_by_email(email).await
        }

        async fn list_pending(&self, institute_id: &str) -> StoreResult<Vec<PendingRegistration>> {
            self.0.list_pending(institute_id).await
        }

        async fn mark_rejected(&self, id: &str, reason: Option<&str>) -> StoreResult<bool> {
            self.0.mark_rejected(id, reason).await
        }

        async fn take_pending(&self, _id: &str) -> StoreResult<bool> {
            Ok(false)
        }

        async fn delete_registrations_for(&self, institute_id: &str) -> StoreResult<u64> {
            self.0.delete_registrations_for(institute_id).await
        }
    }

    #[tokio::test]
    async fn test_consumed_request_discards_new_member() {
        let h = harness(Some("pro")).await;
        let pending = h
            .service
            .submit(request("student", "jimbo@example.com"))
            .await
            .unwrap();

        let catalog = Arc::new(PlanCatalog::default());
        let raced = RegistrationService::new(
            Arc::new(h.store.clone()),
            Arc::new(h.store.clone()),
            Arc::new(RacedRegistrations(h.store.clone())),
            QuotaEnforcer::new(Arc::new(h.store.clone()), Arc::new(h.store.clone()), catalog),
            Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap())),
        );

        let err = raced.approve(&pending.id).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::Conflict { .. }));
        assert!(h.store.list_members("INST-1").await.unwrap().is_empty());
        assert!(h.store.find_by_email("jimbo@example.com").await.unwrap().is_none());
    }
}
