//! Institute types.

use super::projection::ProjectionSnapshot;
use crate::validation::not_blank;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

/// Status cached on the institute record.
///
/// `Pending` until the first subscription activates, `Active` while a plan is
/// running, `Inactive` once the last active plan expired.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstituteStatus {
    #[default]
    Pending,
    Active,
    Inactive,
}

impl InstituteStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Active => "Active",
            Self::Inactive => "Inactive",
        }
    }

    #[must_use]
    pub fn from_stored(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(Self::Pending),
            "Active" => Some(Self::Active),
            "Inactive" => Some(Self::Inactive),
            _ => None,
        }
    }
}

impl fmt::Display for InstituteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to register an institute.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewInstitute {
    #[validate(custom(function = "not_blank"))]
    pub name: String,
    #[validate(custom(function = "not_blank"))]
    pub address: String,
    #[serde(alias = "ownerAdminId", alias = "adminId")]
    #[validate(custom(function = "not_blank"))]
    pub owner_admin_id: String,
}

/// An institute and its cached view of the latest activated subscription.
///
/// The `current_*` fields and `status` are written only by the ledger and the
/// lifecycle scheduler. They may lag the ledger between scheduler runs and
/// must not be used for quota decisions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Institute {
    pub id: String,
    pub name: String,
    pub address: String,
    pub owner_admin_id: String,
    pub current_plan: Option<String>,
    pub current_plan_duration: Option<String>,
    pub status: InstituteStatus,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_expiry: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Institute {
    /// A fresh institute with no plan.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        address: impl Into<String>,
        owner_admin_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address: address.into(),
            owner_admin_id: owner_admin_id.into(),
            current_plan: None,
            current_plan_duration: None,
            status: InstituteStatus::Pending,
            current_period_start: None,
            current_period_expiry: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The cached plan fields.
    #[must_use]
    pub fn projection(&self) -> ProjectionSnapshot {
        ProjectionSnapshot {
            plan: self.current_plan.clone(),
            plan_duration: self.current_plan_duration.clone(),
            status: self.status,
            period_start: self.current_period_start,
            period_expiry: self.current_period_expiry,
        }
    }

    /// Overwrite the cached plan fields.
    pub fn apply_projection(&mut self, snapshot: &ProjectionSnapshot, at: DateTime<Utc>) {
        self.current_plan = snapshot.plan.clone();
        self.current_plan_duration = snapshot.plan_duration.clone();
        self.status = snapshot.status;
        self.current_period_start = snapshot.period_start;
        self.current_period_expiry = snapshot.period_expiry;
        self.updated_at = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_new_institute_is_pending_without_plan() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let institute = Institute::new("INST-1", "Springfield High", "1 Main St", "ADM-1", now);
        assert_eq!(institute.status, InstituteStatus::Pending);
        assert_eq!(institute.projection(), ProjectionSnapshot::default());
    }

    #[test]
    fn test_apply_projection_overwrites_all_fields() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let mut institute = Institute::new("INST-1", "Springfield High", "1 Main St", "ADM-1", now);
        let snapshot = ProjectionSnapshot {
            plan: Some("pro".to_string()),
            plan_duration: Some("3M".to_string()),
            status: InstituteStatus::Active,
            period_start: Some(now),
            period_expiry: Some(later),
        };
        institute.apply_projection(&snapshot, later);
        assert_eq!(institute.projection(), snapshot);
        assert_eq!(institute.updated_at, later);
    }

    #[test]
    fn test_status_strings() {
        for status in [
            InstituteStatus::Pending,
            InstituteStatus::Active,
            InstituteStatus::Inactive,
        ] {
            assert_eq!(InstituteStatus::from_stored(status.as_str()), Some(status));
        }
    }
}
