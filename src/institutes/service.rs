//! Institute registry.

use super::storage::InstituteStore;
use super::types::{Institute, NewInstitute};
use crate::clock::Clock;
use crate::members::{MembershipDirectory, RegistrationStore};
use crate::subscriptions::SubscriptionStore;
use crate::subscriptions::error::{Result, SubscriptionError};
use crate::validation::validate;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// What an institute deletion removed.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct DeletionSummary {
    pub subscriptions: u64,
    pub members: u64,
    pub registrations: u64,
}

/// Creates, reads and deletes institutes.
#[derive(Clone)]
pub struct InstituteService {
    institutes: Arc<dyn InstituteStore>,
    subscriptions: Arc<dyn SubscriptionStore>,
    members: Arc<dyn MembershipDirectory>,
    registrations: Arc<dyn RegistrationStore>,
    clock: Arc<dyn Clock>,
}

impl InstituteService {
    pub fn new(
        institutes: Arc<dyn InstituteStore>,
        subscriptions: Arc<dyn SubscriptionStore>,
        members: Arc<dyn MembershipDirectory>,
        registrations: Arc<dyn RegistrationStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            institutes,
            subscriptions,
            members,
            registrations,
            clock,
        }
    }

    /// Register a new institute. It starts `Pending` with no plan.
    pub async fn create(
        &self,
        name: &str,
        address: &str,
        owner_admin_id: &str,
    ) -> Result<Institute> {
        self.create_from(NewInstitute {
            name: name.to_string(),
            address: address.to_string(),
            owner_admin_id: owner_admin_id.to_string(),
        })
        .await
    }

    /// [`create`](Self::create) for a request body.
    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_from(&self, request: NewInstitute) -> Result<Institute> {
        validate(&request)?;
        let name = request.name.trim();
        let address = request.address.trim();
        let owner_admin_id = request.owner_admin_id.trim();

        if self.institutes.find_by_name(name).await?.is_some() {
            debug!(name, "Institute name already taken");
            return Err(SubscriptionError::conflict(format!(
                "Institute name '{name}' is already taken"
            )));
        }

        let institute = Institute::new(
            Uuid::new_v4().to_string(),
            name,
            address,
            owner_admin_id,
            self.clock.now(),
        );
        self.institutes.create(&institute).await?;

        info!(institute_id = %institute.id, name, owner_admin_id, "Institute created");
        Ok(institute)
    }

    pub async fn get(&self, institute_id: &str) -> Result<Institute> {
        self.institutes
            .find_by_id(institute_id)
            .await?
            .ok_or_else(|| SubscriptionError::institute_not_found(institute_id))
    }

    pub async fn list(&self) -> Result<Vec<Institute>> {
        Ok(self.institutes.list().await?)
    }

    /// Delete an institute together with its ledger, members and registrations.
    #[instrument(skip(self))]
    pub async fn delete(&self, institute_id: &str) -> Result<DeletionSummary> {
        if !self.institutes.exists(institute_id).await? {
            return Err(SubscriptionError::institute_not_found(institute_id));
        }

        // Remove the institute first so no new work can attach to it.
        self.institutes.delete(institute_id).await?;

        let summary = DeletionSummary {
            subscriptions: self.subscriptions.delete_for_institute(institute_id).await?,
            members: self.members.remove_members_for(institute_id).await?,
            registrations: self
                .registrations
                .delete_registrations_for(institute_id)
                .await?,
        };

        info!(
            institute_id,
            subscriptions = summary.subscriptions,
            members = summary.members,
            registrations = summary.registrations,
            "Institute deleted"
        );
        Ok(summary)
    }
}
