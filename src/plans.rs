//! Plan catalog.
//!
//! Static mapping from plan name to per-role headcount limits. The catalog is
//! built once at startup and shared read-only.
//!
//! ```rust
//! use campus_ledger::plans::PlanCatalog;
//!
//! let catalog = PlanCatalog::builder()
//!     .plan("basic")
//!         .max_admins(1)
//!         .max_teachers(2)
//!         .max_students(3)
//!         .done()
//!     .build();
//!
//! let limits = catalog.limits_for("Basic").unwrap();
//! assert_eq!(limits.max_teachers, 2);
//! assert!(catalog.limits_for("gold").is_err());
//! ```

use crate::members::Role;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Headcount limits for a single plan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLimits {
    pub max_admins: u32,
    pub max_teachers: u32,
    pub max_students: u32,
}

impl PlanLimits {
    /// Limit that applies to `role`.
    #[must_use]
    pub fn max_for(&self, role: Role) -> u32 {
        match role {
            Role::Admin => self.max_admins,
            Role::Teacher => self.max_teachers,
            Role::Student => self.max_students,
        }
    }
}

/// A named entry of the catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub plan_name: String,
    #[serde(flatten)]
    pub limits: PlanLimits,
}

/// Returned when a plan name matches no catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPlan {
    pub plan: String,
}

impl fmt::Display for UnknownPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown plan: '{}'", self.plan)
    }
}

impl std::error::Error for UnknownPlan {}

/// Immutable collection of plans, keyed by lowercase plan name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlanCatalog {
    plans: BTreeMap<String, PlanEntry>,
}

impl PlanCatalog {
    /// Create a builder for constructing a catalog.
    #[must_use]
    pub fn builder() -> PlanCatalogBuilder {
        PlanCatalogBuilder::new()
    }

    /// Build a catalog from a list of entries. Later entries win on name clashes.
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = PlanEntry>) -> Self {
        let plans = entries
            .into_iter()
            .map(|entry| (entry.plan_name.to_lowercase(), entry))
            .collect();
        Self { plans }
    }

    /// Parse a JSON array of `{plan_name, max_admins, max_teachers, max_students}`.
    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        let entries: Vec<PlanEntry> = serde_json::from_str(json)?;
        if entries.is_empty() {
            return Err(crate::error::CampusError::bad_request(
                "Plan catalog must contain at least one plan",
            ));
        }
        Ok(Self::from_entries(entries))
    }

    /// Limits for `plan_name`, compared case-insensitively.
    pub fn limits_for(&self, plan_name: &str) -> Result<PlanLimits, UnknownPlan> {
        self.plans
            .get(&plan_name.trim().to_lowercase())
            .map(|entry| entry.limits)
            .ok_or_else(|| UnknownPlan {
                plan: plan_name.to_string(),
            })
    }

    /// The catalog entry for `plan_name`, compared case-insensitively.
    pub fn resolve(&self, plan_name: &str) -> Result<&PlanEntry, UnknownPlan> {
        self.plans
            .get(&plan_name.trim().to_lowercase())
            .ok_or_else(|| UnknownPlan {
                plan: plan_name.to_string(),
            })
    }

    /// Check if a plan exists.
    #[must_use]
    pub fn contains(&self, plan_name: &str) -> bool {
        self.plans.contains_key(&plan_name.trim().to_lowercase())
    }

    /// Names of all plans, as configured.
    #[must_use]
    pub fn plan_names(&self) -> Vec<&str> {
        self.plans.values().map(|e| e.plan_name.as_str()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.plans.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

impl Default for PlanCatalog {
    /// The three tiers offered out of the box.
    fn default() -> Self {
        Self::builder()
            .plan("basic")
            .max_admins(1)
            .max_teachers(2)
            .max_students(3)
            .done()
            .plan("pro")
            .max_admins(2)
            .max_teachers(3)
            .max_students(4)
            .done()
            .plan("enterprise")
            .max_admins(3)
            .max_teachers(4)
            .max_students(5)
            .done()
            .build()
    }
}

/// Builder for [`PlanCatalog`].
#[derive(Debug, Default)]
#[must_use = "builder does nothing until you call build()"]
pub struct PlanCatalogBuilder {
    entries: Vec<PlanEntry>,
}

impl PlanCatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start defining a plan.
    pub fn plan(self, name: impl Into<String>) -> PlanBuilder {
        PlanBuilder {
            parent: self,
            entry: PlanEntry {
                plan_name: name.into(),
                limits: PlanLimits::default(),
            },
        }
    }

    pub fn build(self) -> PlanCatalog {
        PlanCatalog::from_entries(self.entries)
    }
}

/// Builder for a single plan inside a [`PlanCatalogBuilder`].
#[derive(Debug)]
#[must_use = "call done() to add the plan to the catalog"]
pub struct PlanBuilder {
    parent: PlanCatalogBuilder,
    entry: PlanEntry,
}

impl PlanBuilder {
    pub fn max_admins(mut self, max: u32) -> Self {
        self.entry.limits.max_admins = max;
        self
    }

    pub fn max_teachers(mut self, max: u32) -> Self {
        self.entry.limits.max_teachers = max;
        self
    }

    pub fn max_students(mut self, max: u32) -> Self {
        self.entry.limits.max_students = max;
        self
    }

    /// Finish this plan and return to the catalog builder.
    pub fn done(mut self) -> PlanCatalogBuilder {
        self.parent.entries.push(self.entry);
        self.parent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog() {
        let catalog = PlanCatalog::default();
        assert_eq!(catalog.len(), 3);

        let basic = catalog.limits_for("basic").unwrap();
        assert_eq!(
            basic,
            PlanLimits {
                max_admins: 1,
                max_teachers: 2,
                max_students: 3
            }
        );

        let pro = catalog.limits_for("pro").unwrap();
        assert_eq!(pro.max_teachers, 3);

        let enterprise = catalog.limits_for("enterprise").unwrap();
        assert_eq!(enterprise.max_students, 5);
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let catalog = PlanCatalog::default();
        assert!(catalog.limits_for("PRO").is_ok());
        assert!(catalog.limits_for("Enterprise").is_ok());
        assert!(catalog.contains("BaSiC"));
    }

    #[test]
    fn test_unknown_plan_is_an_error() {
        let catalog = PlanCatalog::default();
        let err = catalog.limits_for("platinum").unwrap_err();
        assert_eq!(err.plan, "platinum");
    }

    #[test]
    fn test_resolve_returns_configured_name() {
        let catalog = PlanCatalog::builder()
            .plan("Starter")
            .max_students(10)
            .done()
            .build();
        assert_eq!(catalog.resolve(" starter ").unwrap().plan_name, "Starter");
    }

    #[test]
    fn test_max_for_role() {
        let limits = PlanLimits {
            max_admins: 1,
            max_teachers: 2,
            max_students: 3,
        };
        assert_eq!(limits.max_for(Role::Admin), 1);
        assert_eq!(limits.max_for(Role::Teacher), 2);
        assert_eq!(limits.max_for(Role::Student), 3);
    }

    #[test]
    fn test_from_json() {
        let json = r#"[
            {"plan_name": "Starter", "max_admins": 1, "max_teachers": 5, "max_students": 50}
        ]"#;
        let catalog = PlanCatalog::from_json(json).unwrap();
        assert_eq!(catalog.limits_for("starter").unwrap().max_students, 50);
        assert_eq!(catalog.plan_names(), vec!["Starter"]);
    }

    #[test]
    fn test_from_json_rejects_empty_catalog() {
        assert!(PlanCatalog::from_json("[]").is_err());
        assert!(PlanCatalog::from_json("{").is_err());
    }
}
